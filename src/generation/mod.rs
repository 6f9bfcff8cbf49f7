// Accompaniment generation
//
// Generators are opaque capability objects resolved by the segment's
// generator id. Each call covers exactly one segment.

pub mod builtin;
pub mod dispatcher;
pub mod registry;

pub use builtin::BasicGenerator;
pub use dispatcher::{RawGeneration, VoiceGenerationDispatcher};
pub use registry::GeneratorRegistry;

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::model::{ChannelBinding, PositionedChord, TimelineSegment, VoiceId, VoiceKind};
use crate::phrase::{BeatRange, Phrase};

/// Everything a generator may look at for one segment
pub struct SegmentContext<'a> {
    pub segment: &'a TimelineSegment,
    /// Absolute beat range of the segment
    pub beats: BeatRange,
    /// Chords overlapping the segment, clipped to it
    pub chords: Vec<PositionedChord>,
    /// Snapshot of the mix taken when the generation started
    pub binding: &'a ChannelBinding,
}

impl SegmentContext<'_> {
    /// Channel a voice is bound to, if any
    pub fn channel_of(&self, voice: &VoiceId) -> Option<u8> {
        self.binding.channel_of(voice)
    }
}

/// A voice a generator can produce
#[derive(Debug, Clone, PartialEq)]
pub struct VoiceSpec {
    pub id: VoiceId,
    pub kind: VoiceKind,
}

impl VoiceSpec {
    pub fn new(id: impl Into<String>, kind: VoiceKind) -> Self {
        Self { id: VoiceId::new(id), kind }
    }
}

/// Phrases produced for one segment, with absolute positions.
/// Voices that failed individually go to `errors`.
#[derive(Debug, Default)]
pub struct GeneratorOutput {
    pub phrases: BTreeMap<VoiceId, Phrase>,
    pub errors: BTreeMap<VoiceId, String>,
}

/// Pluggable accompaniment generator
pub trait PhraseGenerator: Send + Sync {
    fn name(&self) -> &str;

    /// Voices this generator declares
    fn voices(&self) -> Vec<VoiceSpec>;

    /// Generate one segment. Blocking; may check `cancel` to stop early.
    fn generate(&self, ctx: &SegmentContext<'_>, cancel: &CancelToken) -> anyhow::Result<GeneratorOutput>;
}

/// Cooperative cancellation flag handed to generators
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Whether both handles share one flag
    pub fn same_as(&self, other: &CancelToken) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}
