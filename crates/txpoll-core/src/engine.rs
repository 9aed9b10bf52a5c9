//! Clock-free poll state machine.
//!
//! [`PollEngine`] owns the `PollState` / attempt-counter pair and decides what
//! happens after each classified response. It never sleeps or performs I/O;
//! [`crate::poller::Poller`] drives it on a Tokio task.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::config::MessagesConfig;
use crate::transaction::ValidationFailure;

// ---------------------------------------------------------------------------
// PollState
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PollState {
    /// Pending-record pre-step running; polling has not started.
    Initializing,
    Checking,
    Success,
    Error,
}

impl PollState {
    pub fn is_terminal(self) -> bool {
        matches!(self, PollState::Success | PollState::Error)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PollState::Initializing => "initializing",
            PollState::Checking => "checking",
            PollState::Success => "success",
            PollState::Error => "error",
        }
    }
}

impl fmt::Display for PollState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// RemoteVerdict / AttemptFailure
// ---------------------------------------------------------------------------

/// Normalized result of one poll request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteVerdict {
    Found,
    NotFound,
    MalformedResponse(String),
    TransportFailure(String),
}

/// A recoverable failure that consumed an attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum AttemptFailure {
    Transport(String),
    MalformedResponse(String),
}

impl fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptFailure::Transport(d) => write!(f, "transport failure: {d}"),
            AttemptFailure::MalformedResponse(d) => write!(f, "malformed response: {d}"),
        }
    }
}

// ---------------------------------------------------------------------------
// PollFailure
// ---------------------------------------------------------------------------

/// Why a poller ended in [`PollState::Error`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PollFailure {
    #[error("invalid transaction id: {0}")]
    Validation(ValidationFailure),

    /// The shared attempt budget ran out. `last_failure` is `None` when the
    /// final consumed attempt was a plain not-found verdict.
    #[error("gave up after {max_attempts} attempts")]
    AttemptBudgetExhausted {
        max_attempts: u32,
        last_failure: Option<AttemptFailure>,
    },
}

impl PollFailure {
    /// Text shown to the user for this failure.
    pub fn user_message<'a>(&self, messages: &'a MessagesConfig) -> &'a str {
        match self {
            PollFailure::Validation(_) => &messages.invalid_id,
            PollFailure::AttemptBudgetExhausted {
                last_failure: None, ..
            } => &messages.timeout,
            PollFailure::AttemptBudgetExhausted {
                last_failure: Some(_),
                ..
            } => &messages.failure,
        }
    }
}

// ---------------------------------------------------------------------------
// Step
// ---------------------------------------------------------------------------

/// What the driver should do after [`PollEngine::record`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    RetryAfter(Duration),
    Succeeded,
    Failed(PollFailure),
    /// The engine was already terminal; the verdict changed nothing.
    Ignored,
}

// ---------------------------------------------------------------------------
// PollStatus
// ---------------------------------------------------------------------------

/// Observable snapshot for a presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollStatus {
    pub state: PollState,
    pub attempts: u32,
    pub max_attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_failure: Option<AttemptFailure>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_checked_at: Option<DateTime<Utc>>,
}

impl PollStatus {
    /// `"(3/40)"` once at least one attempt has completed.
    pub fn progress(&self) -> Option<String> {
        (self.attempts > 0).then(|| format!("({}/{})", self.attempts, self.max_attempts))
    }
}

// ---------------------------------------------------------------------------
// PollEngine
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct PollEngine {
    max_attempts: u32,
    interval: Duration,
    state: PollState,
    attempts: u32,
    failure: Option<PollFailure>,
    last_failure: Option<AttemptFailure>,
    last_checked_at: Option<DateTime<Utc>>,
}

impl PollEngine {
    pub fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            interval,
            state: PollState::Checking,
            attempts: 0,
            failure: None,
            last_failure: None,
            last_checked_at: None,
        }
    }

    /// An engine that starts in `Initializing` and waits for
    /// [`enter_checking`](Self::enter_checking).
    pub fn initializing(max_attempts: u32, interval: Duration) -> Self {
        Self {
            state: PollState::Initializing,
            ..Self::new(max_attempts, interval)
        }
    }

    /// An engine that is already in `Error` because the id was rejected.
    pub fn rejected(failure: ValidationFailure, max_attempts: u32) -> Self {
        Self {
            state: PollState::Error,
            failure: Some(PollFailure::Validation(failure)),
            ..Self::new(max_attempts, Duration::ZERO)
        }
    }

    /// Leave `Initializing`. No-op in any other state.
    pub fn enter_checking(&mut self) {
        if self.state == PollState::Initializing {
            self.state = PollState::Checking;
        }
    }

    /// Gate before issuing a request.
    ///
    /// Returns `false` when no request may be sent: the engine is not
    /// `Checking`, or the budget is already spent (which moves it to `Error`).
    pub fn begin_attempt(&mut self) -> bool {
        if self.state != PollState::Checking {
            return false;
        }
        if self.attempts >= self.max_attempts {
            self.exhaust();
            return false;
        }
        true
    }

    pub fn record(&mut self, verdict: RemoteVerdict) -> Step {
        if self.state != PollState::Checking {
            return Step::Ignored;
        }
        self.last_checked_at = Some(Utc::now());

        match verdict {
            RemoteVerdict::Found => {
                self.state = PollState::Success;
                return Step::Succeeded;
            }
            RemoteVerdict::NotFound => self.last_failure = None,
            RemoteVerdict::TransportFailure(detail) => {
                self.last_failure = Some(AttemptFailure::Transport(detail));
            }
            RemoteVerdict::MalformedResponse(detail) => {
                self.last_failure = Some(AttemptFailure::MalformedResponse(detail));
            }
        }

        self.attempts += 1;
        if self.attempts >= self.max_attempts {
            return Step::Failed(self.exhaust());
        }
        Step::RetryAfter(self.interval)
    }

    fn exhaust(&mut self) -> PollFailure {
        let failure = PollFailure::AttemptBudgetExhausted {
            max_attempts: self.max_attempts,
            last_failure: self.last_failure.clone(),
        };
        self.state = PollState::Error;
        self.failure = Some(failure.clone());
        failure
    }

    pub fn state(&self) -> PollState {
        self.state
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn failure(&self) -> Option<&PollFailure> {
        self.failure.as_ref()
    }

    pub fn snapshot(&self, messages: &MessagesConfig) -> PollStatus {
        PollStatus {
            state: self.state,
            attempts: self.attempts,
            max_attempts: self.max_attempts,
            error: self
                .failure
                .as_ref()
                .map(|f| f.user_message(messages).to_string()),
            last_failure: self.last_failure.clone(),
            last_checked_at: self.last_checked_at,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
