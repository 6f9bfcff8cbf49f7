// Error types and the error reporting collaborator

use std::time::Duration;

use crate::model::{BarRange, GeneratorId, VoiceId};
use crate::store::GenerationResult;

/// Failure recorded for one voice in a generation result.
/// Never aborts a generation; the affected bars are left empty.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GenerationError {
    #[error("Generator '{generator}' failed on bars {bars}: {message}")]
    SegmentGeneration {
        generator: GeneratorId,
        bars: BarRange,
        message: String,
    },

    #[error("No generator available for '{generator}' on bars {bars}")]
    NoGeneratorAvailable { generator: GeneratorId, bars: BarRange },

    #[error("Voice '{voice}' has no channel in the mix")]
    ResourceExhaustion { voice: VoiceId },
}

impl GenerationError {
    /// Bars the error applies to, if it is tied to a segment
    pub fn bars(&self) -> Option<BarRange> {
        match self {
            GenerationError::SegmentGeneration { bars, .. } => Some(*bars),
            GenerationError::NoGeneratorAvailable { bars, .. } => Some(*bars),
            GenerationError::ResourceExhaustion { .. } => None,
        }
    }
}

/// Errors from the playback priority path
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("No active composition")]
    NoActiveComposition,

    #[error("Timed out after {0:?} waiting for the running generation")]
    Timeout(Duration),

    #[error("Generation worker is not running")]
    WorkerGone,

    #[error("Failed to spawn generation worker: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Receives the errors of every published result that has any
pub trait ErrorReporter: Send + Sync {
    fn report(&self, result: &GenerationResult);
}

/// Default reporter: one warning per error
#[derive(Debug, Default)]
pub struct LogErrorReporter;

impl ErrorReporter for LogErrorReporter {
    fn report(&self, result: &GenerationResult) {
        for (voice, errors) in &result.errors {
            for error in errors {
                log::warn!(
                    "Generation v{} degraded for {}: {}",
                    result.snapshot_version,
                    voice,
                    error
                );
            }
        }
    }
}
