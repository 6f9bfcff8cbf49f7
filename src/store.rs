// Published generation results and the active composition pointer
//
// Both live behind one lock: publication checks the result against the
// active composition and the current result atomically, so a run that
// belongs to a switched-away composition or to an older snapshot can never
// replace a newer result.

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::GenerationError;
use crate::model::{CompositionId, ListenerId, SharedComposition, VoiceId};
use crate::phrase::Phrase;

/// One complete, immutable performance of a composition snapshot
#[derive(Debug, Clone)]
pub struct GenerationResult {
    pub composition_id: CompositionId,
    pub snapshot_version: u64,
    pub phrases: BTreeMap<VoiceId, Phrase>,
    pub errors: BTreeMap<VoiceId, Vec<GenerationError>>,
    pub generated_at: DateTime<Utc>,
}

impl GenerationResult {
    pub fn phrase(&self, voice: &VoiceId) -> Option<&Phrase> {
        self.phrases.get(voice)
    }

    pub fn has_errors(&self) -> bool {
        self.errors.values().any(|e| !e.is_empty())
    }

    pub fn note_count(&self) -> usize {
        self.phrases.values().map(|p| p.len()).sum()
    }
}

/// What happened to a result handed to [`ResultStore::publish`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    Published,
    /// The composition changed since the snapshot was taken
    Superseded,
    /// A result for the same or a newer version is already published
    Duplicate,
    /// The result belongs to a composition that is no longer active
    ContextChanged,
}

/// Callback invoked once per published result
pub type ResultCallback = Arc<dyn Fn(&Arc<GenerationResult>) + Send + Sync>;

#[derive(Default)]
struct StoreState {
    active: Option<Arc<SharedComposition>>,
    result: Option<Arc<GenerationResult>>,
}

#[derive(Default)]
pub struct ResultStore {
    state: RwLock<StoreState>,
    listeners: Mutex<Vec<(ListenerId, ResultCallback)>>,
}

impl ResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active(&self) -> Option<Arc<SharedComposition>> {
        self.state.read().active.clone()
    }

    /// Make `composition` the active one. The previous result is dropped;
    /// `restored` (if it belongs to `composition`) becomes the current result
    /// and is announced to listeners.
    pub fn switch_active(
        &self,
        composition: Option<Arc<SharedComposition>>,
        restored: Option<Arc<GenerationResult>>,
    ) {
        let restored = {
            let mut state = self.state.write();
            let restored = match (&composition, restored) {
                (Some(c), Some(r)) if r.composition_id == c.id() => Some(r),
                _ => None,
            };
            state.active = composition;
            state.result = restored.clone();
            restored
        };
        if let Some(result) = restored {
            log::debug!("Restored cached result v{}", result.snapshot_version);
            self.notify(&result);
        }
    }

    pub fn last_result(&self) -> Option<Arc<GenerationResult>> {
        self.state.read().result.clone()
    }

    /// True when a result exists and matches the active composition's version
    pub fn is_last_result_up_to_date(&self) -> bool {
        let state = self.state.read();
        match (&state.active, &state.result) {
            (Some(active), Some(result)) => {
                result.composition_id == active.id() && result.snapshot_version == active.version()
            }
            _ => false,
        }
    }

    pub fn publish(&self, result: Arc<GenerationResult>) -> PublishOutcome {
        let outcome = {
            let mut state = self.state.write();
            match &state.active {
                Some(active) if active.id() == result.composition_id => {
                    if result.snapshot_version < active.version() {
                        PublishOutcome::Superseded
                    } else if state
                        .result
                        .as_ref()
                        .is_some_and(|r| r.snapshot_version >= result.snapshot_version)
                    {
                        PublishOutcome::Duplicate
                    } else {
                        state.result = Some(result.clone());
                        PublishOutcome::Published
                    }
                }
                _ => PublishOutcome::ContextChanged,
            }
        };

        match outcome {
            PublishOutcome::Published => {
                log::info!(
                    "Published v{} ({} voices, {} notes)",
                    result.snapshot_version,
                    result.phrases.len(),
                    result.note_count()
                );
                self.notify(&result);
            }
            other => log::debug!("Discarded v{}: {:?}", result.snapshot_version, other),
        }
        outcome
    }

    // ========================================================================
    // Listeners
    // ========================================================================

    pub fn add_change_listener(&self, callback: ResultCallback) -> ListenerId {
        let id = ListenerId::new();
        self.listeners.lock().push((id, callback));
        id
    }

    /// Removing an unknown listener is a no-op
    pub fn remove_change_listener(&self, id: ListenerId) {
        self.listeners.lock().retain(|(l, _)| *l != id);
    }

    fn notify(&self, result: &Arc<GenerationResult>) {
        let callbacks: Vec<ResultCallback> =
            self.listeners.lock().iter().map(|(_, cb)| cb.clone()).collect();
        for callback in callbacks {
            callback(result);
        }
    }
}
