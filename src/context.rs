// Active composition tracking and the collaborator-facing API
//
// Binding a composition makes it the store's active one, hooks its edit
// notifications up to the scheduler and restores its last result from the
// per-composition cache when that result still matches.

use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::error::{ErrorReporter, LogErrorReporter, SchedulerError};
use crate::generation::GeneratorRegistry;
use crate::model::{ChangeReason, CompositionChange, CompositionId, ListenerId, SharedComposition, VoiceId};
use crate::scheduler::{GenerationScheduler, SchedulerPhase};
use crate::store::{GenerationResult, ResultCallback, ResultStore};

/// Compositions whose last results are kept for a switch back
const RECENT_COMPOSITIONS: usize = 8;

/// Last results of the most recently bound compositions
#[derive(Default)]
struct ResultCache {
    results: HashMap<CompositionId, Arc<GenerationResult>>,
    recent: VecDeque<CompositionId>,
}

impl ResultCache {
    /// Move `id` to the front, evicting the least recently bound composition
    fn touch(&mut self, id: CompositionId) {
        self.recent.retain(|r| *r != id);
        self.recent.push_front(id);
        while self.recent.len() > RECENT_COMPOSITIONS {
            if let Some(evicted) = self.recent.pop_back() {
                self.results.remove(&evicted);
            }
        }
    }

    fn insert(&mut self, result: Arc<GenerationResult>) {
        if self.recent.contains(&result.composition_id) {
            self.results.insert(result.composition_id, result);
        }
    }

    fn get(&self, id: &CompositionId) -> Option<&Arc<GenerationResult>> {
        self.results.get(id)
    }

    fn evict(&mut self, id: &CompositionId) {
        self.recent.retain(|r| r != id);
        self.results.remove(id);
    }
}

struct BoundComposition {
    composition: Arc<SharedComposition>,
    listener: ListenerId,
}

pub struct ActiveContextTracker {
    scheduler: Arc<GenerationScheduler>,
    store: Arc<ResultStore>,
    cache: Arc<Mutex<ResultCache>>,
    cache_listener: ListenerId,
    bound: Mutex<Option<BoundComposition>>,
}

impl ActiveContextTracker {
    pub fn new(config: &Config, registry: Arc<GeneratorRegistry>) -> Result<Self, SchedulerError> {
        Self::with_reporter(config, registry, Arc::new(LogErrorReporter))
    }

    pub fn with_reporter(
        config: &Config,
        registry: Arc<GeneratorRegistry>,
        reporter: Arc<dyn ErrorReporter>,
    ) -> Result<Self, SchedulerError> {
        let store = Arc::new(ResultStore::new());
        let scheduler = Arc::new(GenerationScheduler::new(config, registry, store.clone(), reporter)?);

        let cache: Arc<Mutex<ResultCache>> = Arc::default();
        let cache_clone = cache.clone();
        let cache_listener = store.add_change_listener(Arc::new(move |result: &Arc<GenerationResult>| {
            cache_clone.lock().insert(result.clone());
        }));

        Ok(Self {
            scheduler,
            store,
            cache,
            cache_listener,
            bound: Mutex::new(None),
        })
    }

    /// Make `composition` the active one. Work still running for the previous
    /// composition can no longer publish.
    pub fn bind(&self, composition: Arc<SharedComposition>) {
        let mut bound = self.bound.lock();
        if let Some(previous) = bound.take() {
            previous.composition.remove_listener(previous.listener);
        }

        let cached = {
            let mut cache = self.cache.lock();
            cache.touch(composition.id());
            cache
                .get(&composition.id())
                .filter(|r| r.snapshot_version == composition.version())
                .cloned()
        };
        let restored = cached.is_some();
        self.store.switch_active(Some(composition.clone()), cached);

        let scheduler = Arc::downgrade(&self.scheduler);
        let listener = composition.add_listener(Arc::new(move |change: &CompositionChange| {
            if let Some(scheduler) = scheduler.upgrade() {
                scheduler.schedule(change.reason.clone(), None);
            }
        }));
        log::info!(
            "Bound composition '{}' ({})",
            composition.read().name,
            if restored { "cached result restored" } else { "generating" }
        );
        *bound = Some(BoundComposition { composition, listener });
        drop(bound);

        if !restored {
            self.scheduler.schedule(ChangeReason::ContextSwitch, None);
        }
    }

    /// Leave no composition active and forget its cached result
    pub fn unbind(&self) {
        if let Some(previous) = self.bound.lock().take() {
            previous.composition.remove_listener(previous.listener);
            self.cache.lock().evict(&previous.composition.id());
            self.store.switch_active(None, None);
            log::info!("Unbound composition {}", previous.composition.id());
        }
    }

    pub fn active(&self) -> Option<Arc<SharedComposition>> {
        self.store.active()
    }

    pub fn scheduler(&self) -> &GenerationScheduler {
        &self.scheduler
    }

    // ========================================================================
    // Collaborator API
    // ========================================================================

    pub fn request_generation(&self, reason: ChangeReason) {
        self.scheduler.request_generation(reason);
    }

    pub fn request_voices(&self, reason: ChangeReason, voices: BTreeSet<VoiceId>) {
        self.scheduler.request_voices(reason, voices);
    }

    pub fn is_generating(&self) -> bool {
        self.scheduler.is_generating()
    }

    pub fn phase(&self) -> SchedulerPhase {
        self.scheduler.phase()
    }

    pub fn is_last_result_up_to_date(&self) -> bool {
        self.store.is_last_result_up_to_date()
    }

    pub fn last_result(&self) -> Option<Arc<GenerationResult>> {
        self.store.last_result()
    }

    pub fn add_change_listener(&self, callback: ResultCallback) -> ListenerId {
        self.store.add_change_listener(callback)
    }

    pub fn remove_change_listener(&self, id: ListenerId) {
        self.store.remove_change_listener(id);
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.scheduler.set_enabled(enabled);
    }

    pub fn is_enabled(&self) -> bool {
        self.scheduler.is_enabled()
    }

    pub fn generate_now_for_playback(&self) -> Result<Arc<GenerationResult>, SchedulerError> {
        self.scheduler.generate_now_for_playback()
    }

    pub fn wait_idle(&self, timeout: Duration) -> Result<(), SchedulerError> {
        self.scheduler.wait_idle(timeout)
    }
}

impl Drop for ActiveContextTracker {
    fn drop(&mut self) {
        self.unbind();
        self.store.remove_change_listener(self.cache_listener);
    }
}
