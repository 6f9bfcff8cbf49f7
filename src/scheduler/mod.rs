// Background generation scheduling
//
// Requests are debounced on a dedicated worker thread; a generation gate
// keeps at most one generation in flight between the worker and the
// playback priority path. A run whose snapshot went stale is discarded at
// publication.

mod request;
mod worker;

pub use request::GenerationRequest;
pub use worker::RunOutcome;

use crossbeam_channel::{unbounded, Sender};
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::config::Config;
use crate::error::{ErrorReporter, SchedulerError};
use crate::generation::{CancelToken, GeneratorRegistry};
use crate::model::{ChangeReason, CompositionId, VoiceId};
use crate::postprocess::PostProcessingPipeline;
use crate::store::{GenerationResult, ResultStore};
use worker::WorkerMessage;

/// Scheduler state as seen from outside
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerPhase {
    Idle,
    /// Waiting for the edits to settle
    Debouncing,
    /// A generation runs; `superseded` once a newer request arrived
    Generating { superseded: bool },
}

/// State shared between the scheduler handle and its worker thread
pub(crate) struct SchedulerShared {
    store: Arc<ResultStore>,
    registry: Arc<GeneratorRegistry>,
    reporter: Arc<dyn ErrorReporter>,
    pipeline: PostProcessingPipeline,
    debounce: Duration,
    playback_wait: Option<Duration>,
    phase: Mutex<SchedulerPhase>,
    enabled: AtomicBool,
    /// Held for the whole of a generation, worker or priority path
    gate: Mutex<()>,
    /// Set while the priority path generates on a caller thread
    priority_running: AtomicBool,
    in_flight: Mutex<Option<InFlight>>,
}

/// The worker's running generation: its cancel flag and the snapshot
/// it covers
pub(crate) struct InFlight {
    cancel: CancelToken,
    composition: CompositionId,
    version: u64,
}

impl InFlight {
    /// Whether `request` makes this work useless: another composition or
    /// a newer snapshot
    fn outdated_by(&self, request: &GenerationRequest) -> bool {
        request.composition != self.composition || request.snapshot_version > self.version
    }
}

pub struct GenerationScheduler {
    shared: Arc<SchedulerShared>,
    request_tx: Sender<WorkerMessage>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl GenerationScheduler {
    pub fn new(
        config: &Config,
        registry: Arc<GeneratorRegistry>,
        store: Arc<ResultStore>,
        reporter: Arc<dyn ErrorReporter>,
    ) -> Result<Self, SchedulerError> {
        let shared = Arc::new(SchedulerShared {
            store,
            registry,
            reporter,
            pipeline: PostProcessingPipeline::new(config.fade_out_floor),
            debounce: config.debounce(),
            playback_wait: config.playback_wait_timeout(),
            phase: Mutex::new(SchedulerPhase::Idle),
            enabled: AtomicBool::new(config.start_enabled),
            gate: Mutex::new(()),
            priority_running: AtomicBool::new(false),
            in_flight: Mutex::new(None),
        });

        let (request_tx, request_rx) = unbounded();
        let worker_shared = shared.clone();
        let handle = std::thread::Builder::new()
            .name("accompanist-worker".into())
            .spawn(move || worker::run(worker_shared, request_rx))?;

        log::info!(
            "Generation scheduler started (debounce {:?}, {})",
            shared.debounce,
            if config.start_enabled { "enabled" } else { "disabled" }
        );

        Ok(Self {
            shared,
            request_tx,
            worker: Mutex::new(Some(handle)),
        })
    }

    pub fn store(&self) -> &Arc<ResultStore> {
        &self.shared.store
    }

    /// Ask for a fresh generation of the active composition. Never blocks.
    pub fn request_generation(&self, reason: ChangeReason) {
        let Some(active) = self.shared.store.active() else {
            log::debug!("Generation requested ({}) without an active composition", reason);
            return;
        };
        active.bump_version();
        self.schedule(reason, None);
    }

    /// Regenerate only `voices`; the other voices keep their published phrases
    pub fn request_voices(&self, reason: ChangeReason, voices: BTreeSet<VoiceId>) {
        let Some(active) = self.shared.store.active() else {
            return;
        };
        active.bump_version();
        self.schedule(reason, Some(voices));
    }

    /// Queue a request for the active composition's current version
    pub(crate) fn schedule(&self, reason: ChangeReason, voices: Option<BTreeSet<VoiceId>>) {
        let Some(active) = self.shared.store.active() else {
            return;
        };
        let mut request = GenerationRequest::new(active.id(), active.version(), reason);
        if let Some(voices) = voices {
            request = request.for_voices(voices);
        }
        log::debug!("Scheduling v{} ({})", request.snapshot_version, request.reason);

        // Phase and queue change together so wait_idle never sees a gap
        let mut phase = self.shared.phase.lock();
        if *phase == SchedulerPhase::Idle {
            *phase = SchedulerPhase::Debouncing;
        } else if let SchedulerPhase::Generating { superseded } = &mut *phase {
            *superseded = true;
            if let Some(in_flight) = self.shared.in_flight.lock().as_ref() {
                if in_flight.outdated_by(&request) {
                    in_flight.cancel.cancel();
                }
            }
        }
        if self.request_tx.send(WorkerMessage::Request(request)).is_err() {
            log::error!("Generation worker is gone; request dropped");
            *phase = SchedulerPhase::Idle;
        }
    }

    pub fn phase(&self) -> SchedulerPhase {
        *self.shared.phase.lock()
    }

    pub fn is_generating(&self) -> bool {
        matches!(self.phase(), SchedulerPhase::Generating { .. })
            || self.shared.priority_running.load(Ordering::SeqCst)
    }

    pub fn is_enabled(&self) -> bool {
        self.shared.enabled.load(Ordering::SeqCst)
    }

    /// Disabled schedulers still accept requests but never run them.
    /// Re-enabling schedules one generation of the latest snapshot.
    pub fn set_enabled(&self, enabled: bool) {
        let was = self.shared.enabled.swap(enabled, Ordering::SeqCst);
        if enabled && !was {
            log::info!("Background generation enabled");
            self.schedule(ChangeReason::Enabled, None);
        } else if !enabled && was {
            log::info!("Background generation disabled");
        }
    }

    /// Result for playback: the published one when current, otherwise a
    /// generation run right now on the calling thread, skipping the debounce.
    ///
    /// The returned result is always complete but may already be stale if
    /// the composition was edited while it was computed.
    pub fn generate_now_for_playback(&self) -> Result<Arc<GenerationResult>, SchedulerError> {
        let store = &self.shared.store;
        if store.active().is_none() {
            return Err(SchedulerError::NoActiveComposition);
        }
        if let Some(result) = self.current_result() {
            return Ok(result);
        }

        let _gate = match self.shared.playback_wait {
            Some(timeout) => self
                .shared
                .gate
                .try_lock_for(timeout)
                .ok_or(SchedulerError::Timeout(timeout))?,
            None => self.shared.gate.lock(),
        };

        // The run we waited for may have produced it
        if let Some(result) = self.current_result() {
            return Ok(result);
        }

        let active = store.active().ok_or(SchedulerError::NoActiveComposition)?;
        let request = GenerationRequest::new(active.id(), active.version(), ChangeReason::Playback);

        self.shared.priority_running.store(true, Ordering::SeqCst);
        let outcome = self.shared.generate_and_publish(&request, &CancelToken::new());
        self.shared.priority_running.store(false, Ordering::SeqCst);

        outcome
            .map(|o| o.result)
            .ok_or(SchedulerError::NoActiveComposition)
    }

    fn current_result(&self) -> Option<Arc<GenerationResult>> {
        let store = &self.shared.store;
        if store.is_last_result_up_to_date() {
            store.last_result()
        } else {
            None
        }
    }

    /// Block until no request is queued, debouncing or generating
    pub fn wait_idle(&self, timeout: Duration) -> Result<(), SchedulerError> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.worker_finished() {
                return Err(SchedulerError::WorkerGone);
            }
            {
                let phase = self.shared.phase.lock();
                if *phase == SchedulerPhase::Idle
                    && self.request_tx.is_empty()
                    && !self.shared.priority_running.load(Ordering::SeqCst)
                {
                    return Ok(());
                }
            }
            if Instant::now() >= deadline {
                return Err(SchedulerError::Timeout(timeout));
            }
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    fn worker_finished(&self) -> bool {
        self.worker
            .lock()
            .as_ref()
            .map_or(true, |handle| handle.is_finished())
    }
}

impl Drop for GenerationScheduler {
    fn drop(&mut self) {
        let _ = self.request_tx.send(WorkerMessage::Shutdown);
        if let Some(in_flight) = self.shared.in_flight.lock().as_ref() {
            in_flight.cancel.cancel();
        }
        if let Some(handle) = self.worker.lock().take() {
            if handle.thread().id() != std::thread::current().id() {
                let _ = handle.join();
            }
        }
    }
}
