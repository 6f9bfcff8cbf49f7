// Generation worker thread and the generate-then-publish step

use chrono::Utc;
use crossbeam_channel::{Receiver, RecvTimeoutError};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

use super::{GenerationRequest, InFlight, SchedulerPhase, SchedulerShared};
use crate::generation::{CancelToken, VoiceGenerationDispatcher};
use crate::store::{GenerationResult, PublishOutcome};

pub(crate) enum WorkerMessage {
    Request(GenerationRequest),
    Shutdown,
}

/// A finished generation and what the store did with it
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub result: Arc<GenerationResult>,
    pub publish: PublishOutcome,
}

/// Worker loop: idle until a request arrives, debounce until the requests
/// stop, generate, repeat
pub(crate) fn run(shared: Arc<SchedulerShared>, rx: Receiver<WorkerMessage>) {
    log::debug!("Generation worker started");
    let mut pending: Option<GenerationRequest> = None;

    'worker: loop {
        let mut request = match pending.take() {
            Some(request) => request,
            None => match rx.recv() {
                Ok(WorkerMessage::Request(request)) => request,
                Ok(WorkerMessage::Shutdown) | Err(_) => break,
            },
        };

        // Every new request restarts the quiet period
        loop {
            match rx.recv_timeout(shared.debounce) {
                Ok(WorkerMessage::Request(newer)) => request.coalesce(newer),
                Ok(WorkerMessage::Shutdown) => break 'worker,
                Err(RecvTimeoutError::Timeout) => break,
                Err(RecvTimeoutError::Disconnected) => break 'worker,
            }
        }

        if shared.enabled.load(Ordering::SeqCst) {
            let _gate = shared.gate.lock();
            let cancel = CancelToken::new();
            *shared.phase.lock() = SchedulerPhase::Generating { superseded: false };
            *shared.in_flight.lock() = Some(InFlight {
                cancel: cancel.clone(),
                composition: request.composition,
                version: request.snapshot_version,
            });

            if let Some(outcome) = shared.generate_and_publish(&request, &cancel) {
                if outcome.publish == PublishOutcome::Superseded {
                    log::debug!("v{} superseded while generating", outcome.result.snapshot_version);
                }
            }

            *shared.in_flight.lock() = None;
        } else {
            log::debug!("Generation disabled; dropping request v{}", request.snapshot_version);
        }

        // Requests that arrived meanwhile start a new debounce round
        let mut phase = shared.phase.lock();
        let mut shutdown = false;
        while let Ok(message) = rx.try_recv() {
            match message {
                WorkerMessage::Request(newer) => match pending.as_mut() {
                    Some(p) => p.coalesce(newer),
                    None => pending = Some(newer),
                },
                WorkerMessage::Shutdown => shutdown = true,
            }
        }
        *phase = if pending.is_some() && !shutdown {
            SchedulerPhase::Debouncing
        } else {
            SchedulerPhase::Idle
        };
        if shutdown {
            break;
        }
    }

    *shared.phase.lock() = SchedulerPhase::Idle;
    log::debug!("Generation worker stopped");
}

impl SchedulerShared {
    /// Snapshot, dispatch, post-process and publish. The caller holds the
    /// generation gate. Returns `None` when there is no active composition
    /// or the run was cancelled; a cancelled run is never published, the
    /// request that cancelled it is still queued.
    pub(crate) fn generate_and_publish(
        &self,
        request: &GenerationRequest,
        cancel: &CancelToken,
    ) -> Option<RunOutcome> {
        let active = self.store.active()?;
        let started = Instant::now();
        let snapshot = active.snapshot();
        if let Some(in_flight) = self.in_flight.lock().as_mut() {
            if in_flight.cancel.same_as(cancel) {
                in_flight.composition = snapshot.id;
                in_flight.version = snapshot.version;
            }
        }

        // A voice subset only makes sense on top of a result of the same
        // composition
        let previous = self
            .store
            .last_result()
            .filter(|r| r.composition_id == snapshot.id);
        let voices = match (&request.requested_voices, &previous) {
            (Some(voices), Some(_)) if request.composition == snapshot.id => Some(voices),
            _ => None,
        };

        log::debug!("Generating v{} ({})", snapshot.version, request.reason);
        let raw = VoiceGenerationDispatcher::new(&self.registry).dispatch(&snapshot, voices, cancel);
        if cancel.is_cancelled() {
            log::debug!("Generation of v{} cancelled after {:?}", snapshot.version, started.elapsed());
            return None;
        }
        let mut phrases = self.pipeline.apply(raw.phrases, &snapshot.timeline, &snapshot.mix);
        let mut errors = raw.errors;

        if let (Some(voices), Some(previous)) = (voices, &previous) {
            for (voice, phrase) in &previous.phrases {
                if voices.contains(voice) || !snapshot.mix.contains(voice) {
                    continue;
                }
                phrases.entry(voice.clone()).or_insert_with(|| phrase.clone());
                if let Some(previous_errors) = previous.errors.get(voice) {
                    errors.entry(voice.clone()).or_insert_with(|| previous_errors.clone());
                }
            }
        }

        let result = Arc::new(GenerationResult {
            composition_id: snapshot.id,
            snapshot_version: snapshot.version,
            phrases,
            errors,
            generated_at: Utc::now(),
        });

        let publish = self.store.publish(result.clone());
        log::debug!(
            "Generation of v{} took {:?}: {:?}",
            snapshot.version,
            started.elapsed(),
            publish
        );
        if publish == PublishOutcome::Published && result.has_errors() {
            self.reporter.report(&result);
        }

        Some(RunOutcome { result, publish })
    }
}
