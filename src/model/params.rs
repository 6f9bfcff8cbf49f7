// Parameter values of a timeline segment
//
// Free-form values belong to the segment's generator. The reserved values
// below are interpreted by the post-processing pipeline, whatever the
// generator.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use super::drums::DrumsMix;
use super::voice::VoiceId;
use crate::phrase::Phrase;

/// Segment ending behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FillAtEnd {
    #[default]
    Off,
    /// Generator plays a fill on the last bar
    Fill,
    /// Velocities taper down toward the end of the segment
    FadeOut,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SegmentParams {
    /// Generator-owned parameter values
    #[serde(default)]
    pub values: BTreeMap<String, String>,

    /// Voices silenced on this segment
    #[serde(default)]
    pub muted_voices: BTreeSet<VoiceId>,

    /// Drum velocity multipliers for this segment
    #[serde(default)]
    pub drums_mix: DrumsMix,

    /// User-supplied phrases replacing the generator output on this segment.
    /// Positions are relative to the segment start.
    #[serde(default)]
    pub custom_phrases: BTreeMap<VoiceId, Phrase>,

    #[serde(default)]
    pub fill_at_end: FillAtEnd,
}

impl SegmentParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn value(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(|v| v.as_str())
    }

    pub fn set_value(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn is_muted(&self, voice: &VoiceId) -> bool {
        self.muted_voices.contains(voice)
    }

    pub fn set_muted(&mut self, voice: VoiceId, muted: bool) {
        if muted {
            self.muted_voices.insert(voice);
        } else {
            self.muted_voices.remove(&voice);
        }
    }
}
