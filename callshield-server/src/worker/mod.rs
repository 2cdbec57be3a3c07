//! Per-call advice workers
//!
//! One logical worker per active call id: parallel across calls,
//! strictly serialized within one. Ingest posts work through
//! [`AdviceDispatcher::enqueue`]; repeated posts while a cycle runs
//! coalesce into a single follow-up cycle (the `force_model` flag is
//! sticky across the coalesce). The worker is the only writer of the
//! advice, analyzing and worker-side last_error fields.

mod backoff;

pub use backoff::ModelPacing;

use crate::advice::{heuristic, stabilize, ModelClient, ModelError};
use crate::store::LiveStore;
use callshield_common::time::now_ms;
use callshield_common::Result;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Chunks loaded per advice cycle (model prompt window)
const CYCLE_WINDOW: usize = 40;

/// User-safe note for transient model failures
pub const MODEL_DELAYED_NOTE: &str = "Live analysis is delayed.";

/// User-safe note while the model is rate-limited
pub const MODEL_RATE_LIMITED_NOTE: &str = "Live analysis is temporarily rate-limited.";

#[derive(Default)]
struct Mailbox {
    pending: bool,
    force_model: bool,
    running: bool,
}

struct DispatcherInner {
    store: LiveStore,
    model: Option<ModelClient>,
    min_interval: Duration,
    mailboxes: Mutex<HashMap<String, Mailbox>>,
}

/// Cheap-to-clone handle dispatching advice work to per-call workers
#[derive(Clone)]
pub struct AdviceDispatcher {
    inner: Arc<DispatcherInner>,
}

impl AdviceDispatcher {
    pub fn new(store: LiveStore, model: Option<ModelClient>, min_interval: Duration) -> Self {
        Self {
            inner: Arc::new(DispatcherInner {
                store,
                model,
                min_interval,
                mailboxes: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Request an advice run for a call. Safe to call from any task; a
    /// run requested while a cycle is executing is never dropped.
    pub fn enqueue(&self, call_id: &str, force_model: bool) {
        let spawn = {
            let mut boxes = self.inner.mailboxes.lock().expect("mailbox lock poisoned");
            let slot = boxes.entry(call_id.to_string()).or_default();
            slot.pending = true;
            slot.force_model |= force_model;
            if slot.running {
                false
            } else {
                slot.running = true;
                true
            }
        };

        if spawn {
            let dispatcher = self.clone();
            let call_id = call_id.to_string();
            tokio::spawn(async move {
                dispatcher.run_worker(call_id).await;
            });
        }
    }

    /// Number of live worker mailboxes (for diagnostics)
    pub fn active_workers(&self) -> usize {
        self.inner
            .mailboxes
            .lock()
            .expect("mailbox lock poisoned")
            .len()
    }

    /// The worker loop for one call id. Exits when no run is pending;
    /// the mailbox slot is released once the session row is gone.
    async fn run_worker(self, call_id: String) {
        let mut pacing = ModelPacing::new();
        let mut session_gone = false;

        loop {
            let force = {
                let mut boxes = self.inner.mailboxes.lock().expect("mailbox lock poisoned");
                let slot = boxes.entry(call_id.clone()).or_default();
                if !slot.pending {
                    slot.running = false;
                    if session_gone {
                        boxes.remove(&call_id);
                    }
                    break;
                }
                slot.pending = false;
                let force = slot.force_model;
                slot.force_model = false;
                force
            };

            match self.run_cycle(&call_id, force, &mut pacing).await {
                Ok(alive) => session_gone = !alive,
                Err(e) => {
                    warn!(call_id = %call_id, "Advice cycle failed: {e}");
                    // Never leave the analyzing flag stuck on an error path
                    if let Err(e2) = self.inner.store.set_analyzing(&call_id, false).await {
                        warn!(call_id = %call_id, "Could not clear analyzing flag: {e2}");
                    }
                }
            }
        }
    }

    /// One advice cycle. Returns `Ok(false)` when the session row no
    /// longer exists and the worker should wind down.
    async fn run_cycle(
        &self,
        call_id: &str,
        force_model: bool,
        pacing: &mut ModelPacing,
    ) -> Result<bool> {
        let store = &self.inner.store;
        let Some(summary) = store.get_summary(call_id).await? else {
            debug!(call_id = %call_id, "Session gone; worker winding down");
            return Ok(false);
        };
        let call_ended = summary.status.is_terminal();

        let transcript = store.get_chunks(call_id, CYCLE_WINDOW).await?;
        if transcript.is_empty() {
            return Ok(true);
        }

        // Heuristic first: the user always gets a fresh score even when
        // the model is unavailable.
        let previous = summary.last_advice_at.and(summary.advice.as_ref());
        let provisional = heuristic::score(&transcript);
        let heuristic_advice = stabilize(previous, provisional, now_ms());
        store
            .set_advice(call_id, &heuristic_advice, None, false)
            .await?;

        if !self.should_run_model(force_model, call_ended, pacing) {
            return Ok(true);
        }

        store.set_analyzing(call_id, true).await?;
        let model = self.inner.model.as_ref().expect("gated on model presence");
        let outcome = model.score(&transcript, Some(&heuristic_advice)).await;
        let now = Instant::now();

        match outcome {
            Ok(model_advice) => {
                let stabilized = stabilize(Some(&heuristic_advice), model_advice, now_ms());
                store
                    .set_advice(call_id, &stabilized, None, false)
                    .await?;
                pacing.on_success(now);
            }
            Err(err) => {
                let note = model_failure_note(&err);
                warn!(call_id = %call_id, "Model scorer failed: {err}");
                store
                    .set_advice(call_id, &heuristic_advice, Some(note), false)
                    .await?;
                if err.is_rate_limited() {
                    pacing.on_rate_limited(now, err.retry_after_ms());
                } else {
                    pacing.on_failure(now);
                }
            }
        }

        Ok(true)
    }

    fn should_run_model(&self, force_model: bool, call_ended: bool, pacing: &ModelPacing) -> bool {
        if self.inner.model.is_none() {
            return false;
        }
        let now = Instant::now();
        if !pacing.cooldown_over(now) {
            return false;
        }
        force_model || call_ended || pacing.interval_elapsed(now, self.inner.min_interval)
    }
}

fn model_failure_note(err: &ModelError) -> &'static str {
    if err.is_rate_limited() {
        MODEL_RATE_LIMITED_NOTE
    } else {
        MODEL_DELAYED_NOTE
    }
}
