// Logical voices (musical roles), independent of the channel they play on

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable identifier of a musical role, e.g. "Bass" or "Drums"
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VoiceId(String);

impl VoiceId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VoiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for VoiceId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// What kind of part a voice plays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoiceKind {
    /// Drum kit on a GM key map
    Drums,
    /// Other unpitched percussion
    Percussion,
    Bass,
    Chords,
    Pad,
    Melody,
}

impl VoiceKind {
    /// Percussive voices are not driven by the harmony
    pub fn is_percussive(&self) -> bool {
        matches!(self, VoiceKind::Drums | VoiceKind::Percussion)
    }

    pub fn is_drums(&self) -> bool {
        *self == VoiceKind::Drums
    }
}
