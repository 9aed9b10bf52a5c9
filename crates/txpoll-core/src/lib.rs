//! `txpoll-core` — polls a remote status endpoint until a payment transaction
//! shows up, then tells the opener about it.
//!
//! # Architecture
//!
//! ```text
//! raw id ──► TransactionId::parse ──(invalid)──► Error
//!                 │
//!                 ▼
//! Poller  ← one ScheduledTask: fetch → classify → PollEngine::record → sleep
//!   │        StatusSource (HTTP GET ?transactionId=…) + Verdict predicate
//!   ▼
//! Notifier ← posts NotificationMessage to the RelatedContext, then fires
//!            the CloseSignal after a delay
//! ```
//!
//! # Quick start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use txpoll_core::{Config, HttpStatusSource, Notifier, Poller};
//!
//! let config = Config::load_or_default("txpoll.yaml".as_ref())?;
//! let source = Arc::new(HttpStatusSource::new(&config.poll.endpoint_url)?);
//! let notifier = Notifier::new(&config.notify);
//!
//! let mut poller = Poller::from_config(Some("TX-123"), &config, source, notifier);
//! println!("{:?}", poller.wait().await);
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod notify;
pub mod poller;
pub mod scheduler;
pub mod transaction;
pub mod transport;
pub mod verdict;

#[cfg(test)]
mod tests;

pub use config::Config;
pub use engine::{PollEngine, PollFailure, PollState, PollStatus, RemoteVerdict};
pub use error::{Result, TxpollError};
pub use notify::{CloseSignal, NotificationMessage, Notifier, RelatedContext};
pub use poller::{PollOutcome, Poller, PollerOptions};
pub use scheduler::ScheduledTask;
pub use transaction::{TransactionId, ValidationFailure};
pub use transport::{HttpStatusSource, StatusSource};
pub use verdict::{Presence, Verdict, VerdictRule};
