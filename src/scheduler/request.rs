// Generation requests and their coalescing rules

use std::collections::BTreeSet;

use crate::model::{ChangeReason, CompositionId, VoiceId};

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub composition: CompositionId,
    pub snapshot_version: u64,
    pub reason: ChangeReason,
    /// `None` means every voice
    pub requested_voices: Option<BTreeSet<VoiceId>>,
}

impl GenerationRequest {
    pub fn new(composition: CompositionId, snapshot_version: u64, reason: ChangeReason) -> Self {
        Self {
            composition,
            snapshot_version,
            reason,
            requested_voices: None,
        }
    }

    pub fn for_voices(mut self, voices: BTreeSet<VoiceId>) -> Self {
        self.requested_voices = Some(voices);
        self
    }

    /// Fold a later request into this one: highest version, last reason,
    /// union of voices. A request for another composition replaces this one.
    pub fn coalesce(&mut self, newer: GenerationRequest) {
        if newer.composition != self.composition {
            *self = newer;
            return;
        }
        self.snapshot_version = self.snapshot_version.max(newer.snapshot_version);
        self.reason = newer.reason;
        self.requested_voices = match (self.requested_voices.take(), newer.requested_voices) {
            (Some(mut mine), Some(theirs)) => {
                mine.extend(theirs);
                Some(mine)
            }
            _ => None,
        };
    }
}
