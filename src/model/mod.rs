// Composition model: voices, mix, harmony, timeline and the shared composition

pub mod composition;
pub mod drums;
pub mod harmony;
pub mod mix;
pub mod params;
pub mod timeline;
pub mod voice;

pub use composition::{
    ChangeReason, Composition, CompositionCallback, CompositionChange, CompositionId,
    CompositionSnapshot, ListenerId, SharedComposition,
};
pub use drums::{gm, DrumGroup, DrumsMix};
pub use harmony::{ChordEvent, ChordParseError, ChordQuality, ChordSymbol};
pub use mix::{ChannelBinding, VoiceBinding};
pub use params::{FillAtEnd, SegmentParams};
pub use timeline::{BarRange, GeneratorId, PositionedChord, SegmentId, Timeline, TimelineError, TimelineSegment};
pub use voice::{VoiceId, VoiceKind};
