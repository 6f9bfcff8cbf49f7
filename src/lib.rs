// Accompanist - background accompaniment generation
// Main library entry point

pub mod config;
pub mod context;
pub mod error;
pub mod export;
pub mod generation;
pub mod model;
pub mod phrase;
pub mod postprocess;
pub mod scheduler;
pub mod store;

pub use config::Config;
pub use context::ActiveContextTracker;
pub use error::{ErrorReporter, GenerationError, LogErrorReporter, SchedulerError};
pub use generation::{CancelToken, GeneratorOutput, GeneratorRegistry, PhraseGenerator, SegmentContext, VoiceSpec};
pub use phrase::{BeatRange, NoteEvent, Phrase};
pub use scheduler::{GenerationRequest, GenerationScheduler, SchedulerPhase};
pub use store::{GenerationResult, PublishOutcome, ResultStore};
