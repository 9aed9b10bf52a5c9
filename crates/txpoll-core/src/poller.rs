//! Async driver for [`PollEngine`].
//!
//! A [`Poller`] validates the transaction id, then runs the whole
//! fetch → classify → wait loop inside one [`ScheduledTask`]. Status is
//! published on a `watch` channel after every transition; the terminal
//! outcome is delivered once on a `oneshot`. Dropping or cancelling the
//! poller aborts the task, including any pending retry or close timer.

use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{oneshot, watch};

use crate::config::{Config, MessagesConfig};
use crate::engine::{PollEngine, PollFailure, PollState, PollStatus, RemoteVerdict, Step};
use crate::error::Result;
use crate::notify::{Delivery, Notifier};
use crate::scheduler::ScheduledTask;
use crate::transaction::TransactionId;
use crate::transport::StatusSource;
use crate::verdict::{Presence, Verdict};

// ---------------------------------------------------------------------------
// PollerOptions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct PollerOptions {
    pub max_attempts: u32,
    pub interval: Duration,
    pub max_id_len: usize,
    pub pending_record: bool,
    pub messages: MessagesConfig,
}

impl From<&Config> for PollerOptions {
    fn from(config: &Config) -> Self {
        Self {
            max_attempts: config.poll.max_attempts,
            interval: config.poll.interval(),
            max_id_len: config.poll.max_id_len,
            pending_record: config.poll.pending_record,
            messages: config.messages.clone(),
        }
    }
}

impl Default for PollerOptions {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

// ---------------------------------------------------------------------------
// PollOutcome
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Success { attempts: u32, delivery: Delivery },
    Failed(PollFailure),
    /// Torn down before reaching a terminal state.
    Cancelled,
}

// ---------------------------------------------------------------------------
// Poller
// ---------------------------------------------------------------------------

pub struct Poller {
    id: Option<TransactionId>,
    task: Option<ScheduledTask>,
    status: watch::Receiver<PollStatus>,
    outcome_rx: Option<oneshot::Receiver<PollOutcome>>,
    outcome: Option<PollOutcome>,
}

impl Poller {
    /// Validate `raw_id` and, if it passes, start polling.
    ///
    /// An invalid id yields a poller that is already in `Error` and never
    /// touches `source`. Must be called from within a Tokio runtime.
    pub fn start(
        raw_id: Option<&str>,
        options: PollerOptions,
        source: Arc<dyn StatusSource>,
        verdict: Verdict,
        notifier: Notifier,
    ) -> Self {
        let (outcome_tx, outcome_rx) = oneshot::channel();

        let id = match TransactionId::parse(raw_id, options.max_id_len) {
            Ok(id) => id,
            Err(failure) => {
                tracing::warn!(error = %failure, "transaction id rejected; not polling");
                let engine = PollEngine::rejected(failure.clone(), options.max_attempts);
                let (_, status) = watch::channel(engine.snapshot(&options.messages));
                let _ = outcome_tx.send(PollOutcome::Failed(PollFailure::Validation(failure)));
                return Self {
                    id: None,
                    task: None,
                    status,
                    outcome_rx: Some(outcome_rx),
                    outcome: None,
                };
            }
        };

        let engine = if options.pending_record {
            PollEngine::initializing(options.max_attempts, options.interval)
        } else {
            PollEngine::new(options.max_attempts, options.interval)
        };
        let (status_tx, status) = watch::channel(engine.snapshot(&options.messages));

        let run = PollRun {
            engine,
            id: id.clone(),
            source,
            verdict,
            notifier,
            messages: options.messages,
            status_tx,
        };
        let task = ScheduledTask::after(Duration::ZERO, run.drive(outcome_tx));

        Self {
            id: Some(id),
            task: Some(task),
            status,
            outcome_rx: Some(outcome_rx),
            outcome: None,
        }
    }

    /// [`start`](Self::start) with options and verdict taken from `config`.
    pub fn from_config(
        raw_id: Option<&str>,
        config: &Config,
        source: Arc<dyn StatusSource>,
        notifier: Notifier,
    ) -> Self {
        Self::start(
            raw_id,
            PollerOptions::from(config),
            source,
            config.verdict.to_verdict(),
            notifier,
        )
    }

    /// The validated id, or `None` if validation failed.
    pub fn transaction_id(&self) -> Option<&TransactionId> {
        self.id.as_ref()
    }

    /// Latest published status.
    pub fn status(&self) -> PollStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<PollStatus> {
        self.status.clone()
    }

    /// Resolve once the poller reaches `Success` or `Error`, or is torn down.
    ///
    /// On success this returns right after the notification is posted; the
    /// close signal still fires later unless the poller is dropped first.
    pub async fn wait(&mut self) -> PollOutcome {
        if let Some(outcome) = &self.outcome {
            return outcome.clone();
        }
        let outcome = match self.outcome_rx.take() {
            Some(rx) => rx.await.unwrap_or(PollOutcome::Cancelled),
            None => PollOutcome::Cancelled,
        };
        self.outcome = Some(outcome.clone());
        outcome
    }

    /// Wait for the background task to end, close signal included.
    pub async fn join(&mut self) {
        if let Some(task) = self.task.as_mut() {
            task.join().await;
        }
    }

    /// Tear the poller down. No request, notification, or close signal runs
    /// after this returns.
    pub fn cancel(&mut self) {
        if let Some(task) = self.task.as_mut() {
            if !task.is_finished() {
                tracing::debug!(
                    transaction_id = self.id.as_ref().map(TransactionId::as_str),
                    "poller cancelled"
                );
            }
            task.cancel();
        }
    }
}

impl std::fmt::Debug for Poller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Poller")
            .field("id", &self.id)
            .field("status", &*self.status.borrow())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Internal
// ---------------------------------------------------------------------------

struct PollRun {
    engine: PollEngine,
    id: TransactionId,
    source: Arc<dyn StatusSource>,
    verdict: Verdict,
    notifier: Notifier,
    messages: MessagesConfig,
    status_tx: watch::Sender<PollStatus>,
}

impl PollRun {
    fn publish(&self) {
        self.status_tx
            .send_replace(self.engine.snapshot(&self.messages));
    }

    async fn drive(mut self, outcome_tx: oneshot::Sender<PollOutcome>) {
        let id = self.id.as_str().to_string();

        if self.engine.state() == PollState::Initializing {
            match self.source.record_pending(&self.id).await {
                Ok(()) => tracing::info!(transaction_id = %id, "pending record written"),
                Err(e) => tracing::warn!(
                    transaction_id = %id,
                    error = %e,
                    "pending record failed; polling anyway"
                ),
            }
            self.engine.enter_checking();
            self.publish();
        }

        while self.engine.begin_attempt() {
            let attempt = self.engine.attempts() + 1;
            let fetched = self.source.fetch(&self.id).await;
            let remote = classify(fetched, &self.verdict, &self.id);
            match &remote {
                RemoteVerdict::Found => {
                    tracing::info!(transaction_id = %id, attempt, "transaction found")
                }
                RemoteVerdict::NotFound => {
                    tracing::debug!(transaction_id = %id, attempt, "transaction not found yet")
                }
                RemoteVerdict::TransportFailure(e) | RemoteVerdict::MalformedResponse(e) => {
                    tracing::warn!(transaction_id = %id, attempt, error = %e, "status check failed")
                }
            }

            let step = self.engine.record(remote);
            self.publish();
            match step {
                Step::RetryAfter(delay) => tokio::time::sleep(delay).await,
                Step::Succeeded | Step::Failed(_) | Step::Ignored => break,
            }
        }
        self.publish();

        if self.engine.state() == PollState::Success {
            let delivery = self.notifier.deliver();
            let _ = outcome_tx.send(PollOutcome::Success {
                attempts: self.engine.attempts(),
                delivery,
            });
            self.notifier.close_after_delay().await;
            return;
        }

        let failure = self.engine.failure().cloned().unwrap_or(
            PollFailure::AttemptBudgetExhausted {
                max_attempts: self.engine.max_attempts(),
                last_failure: None,
            },
        );
        tracing::warn!(transaction_id = %id, error = %failure, "polling gave up");
        let _ = outcome_tx.send(PollOutcome::Failed(failure));
    }
}

/// Turn one fetch result into a [`RemoteVerdict`].
pub fn classify(fetched: Result<String>, verdict: &Verdict, id: &TransactionId) -> RemoteVerdict {
    let body = match fetched {
        Ok(body) => body,
        Err(e) => return RemoteVerdict::TransportFailure(e.to_string()),
    };
    match serde_json::from_str::<Value>(&body) {
        Err(e) => RemoteVerdict::MalformedResponse(e.to_string()),
        Ok(parsed) => match verdict.classify(&parsed, id) {
            Presence::Found => RemoteVerdict::Found,
            Presence::NotFound => RemoteVerdict::NotFound,
        },
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
