// Channel binding: which channel each voice plays on, plus per-voice mix flags

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::voice::{VoiceId, VoiceKind};
use crate::phrase::MAX_CHANNEL;

/// Mix settings for one voice
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceBinding {
    /// Logical output channel (0..=31)
    pub channel: u8,
    pub kind: VoiceKind,
    /// Muted voices produce no notes at all
    #[serde(default)]
    pub muted: bool,
    /// Added to every note velocity
    #[serde(default)]
    pub velocity_shift: i8,
    /// Semitone offset of the assigned instrument
    #[serde(default)]
    pub transpose: i8,
    /// Channel drum notes must be moved to for the active output device
    #[serde(default)]
    pub drums_reroute: Option<u8>,
}

impl VoiceBinding {
    pub fn new(channel: u8, kind: VoiceKind) -> Self {
        Self {
            channel: channel.min(MAX_CHANNEL),
            kind,
            muted: false,
            velocity_shift: 0,
            transpose: 0,
            drums_reroute: None,
        }
    }

    pub fn muted(mut self, muted: bool) -> Self {
        self.muted = muted;
        self
    }

    pub fn with_velocity_shift(mut self, shift: i8) -> Self {
        self.velocity_shift = shift;
        self
    }

    pub fn with_transpose(mut self, semitones: i8) -> Self {
        self.transpose = semitones;
        self
    }

    pub fn with_drums_reroute(mut self, target: Option<u8>) -> Self {
        self.drums_reroute = target.map(|c| c.min(MAX_CHANNEL));
        self
    }
}

/// The mix of a composition: `VoiceId -> VoiceBinding`.
///
/// Read-only while a generation runs; each generation works on its own copy
/// taken when the generation starts.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ChannelBinding {
    voices: BTreeMap<VoiceId, VoiceBinding>,
}

impl ChannelBinding {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a voice, replacing any previous binding
    pub fn bind(&mut self, voice: VoiceId, binding: VoiceBinding) -> Option<VoiceBinding> {
        self.voices.insert(voice, binding)
    }

    pub fn unbind(&mut self, voice: &VoiceId) -> Option<VoiceBinding> {
        self.voices.remove(voice)
    }

    pub fn get(&self, voice: &VoiceId) -> Option<&VoiceBinding> {
        self.voices.get(voice)
    }

    pub fn get_mut(&mut self, voice: &VoiceId) -> Option<&mut VoiceBinding> {
        self.voices.get_mut(voice)
    }

    pub fn contains(&self, voice: &VoiceId) -> bool {
        self.voices.contains_key(voice)
    }

    pub fn channel_of(&self, voice: &VoiceId) -> Option<u8> {
        self.voices.get(voice).map(|b| b.channel)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&VoiceId, &VoiceBinding)> {
        self.voices.iter()
    }

    pub fn voice_ids(&self) -> impl Iterator<Item = &VoiceId> {
        self.voices.keys()
    }

    pub fn len(&self) -> usize {
        self.voices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.voices.is_empty()
    }
}
