/// Shared test doubles for the host seams: a scripted status source, a
/// recording related context, and a counting close signal.
#[cfg(test)]
pub(crate) mod support {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use futures::future::BoxFuture;

    use crate::config::MessagesConfig;
    use crate::error::{Result, TxpollError};
    use crate::notify::{CloseSignal, NotificationMessage, RelatedContext};
    use crate::poller::PollerOptions;
    use crate::transaction::{TransactionId, DEFAULT_MAX_ID_LEN};
    use crate::transport::StatusSource;

    pub fn options(max_attempts: u32, interval_ms: u64) -> PollerOptions {
        PollerOptions {
            max_attempts,
            interval: Duration::from_millis(interval_ms),
            max_id_len: DEFAULT_MAX_ID_LEN,
            pending_record: false,
            messages: MessagesConfig::default(),
        }
    }

    #[derive(Debug, Clone)]
    pub enum Reply {
        Body(String),
        NetworkError,
        Http(u16),
    }

    impl Reply {
        pub fn body(s: &str) -> Self {
            Reply::Body(s.to_string())
        }

        fn into_result(self) -> Result<String> {
            match self {
                Reply::Body(b) => Ok(b),
                Reply::NetworkError => Err(TxpollError::Io(std::io::Error::new(
                    std::io::ErrorKind::ConnectionRefused,
                    "connection refused",
                ))),
                Reply::Http(status) => Err(TxpollError::Http { status }),
            }
        }
    }

    /// Replies from `script` in order, then `fallback` forever.
    pub struct ScriptedSource {
        script: Mutex<VecDeque<Reply>>,
        fallback: Reply,
        requests: AtomicU32,
        pending_writes: AtomicU32,
        fail_pending: AtomicBool,
    }

    impl ScriptedSource {
        pub fn new(script: Vec<Reply>, fallback: Reply) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                fallback,
                requests: AtomicU32::new(0),
                pending_writes: AtomicU32::new(0),
                fail_pending: AtomicBool::new(false),
            })
        }

        pub fn always(reply: Reply) -> Arc<Self> {
            Self::new(Vec::new(), reply)
        }

        pub fn failing_pending(self: Arc<Self>) -> Arc<Self> {
            self.fail_pending.store(true, Ordering::SeqCst);
            self
        }

        pub fn requests(&self) -> u32 {
            self.requests.load(Ordering::SeqCst)
        }

        pub fn pending_writes(&self) -> u32 {
            self.pending_writes.load(Ordering::SeqCst)
        }
    }

    impl StatusSource for ScriptedSource {
        fn fetch<'a>(&'a self, _id: &'a TransactionId) -> BoxFuture<'a, Result<String>> {
            self.requests.fetch_add(1, Ordering::SeqCst);
            let reply = self
                .script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| self.fallback.clone());
            Box::pin(async move { reply.into_result() })
        }

        fn record_pending<'a>(&'a self, _id: &'a TransactionId) -> BoxFuture<'a, Result<()>> {
            self.pending_writes.fetch_add(1, Ordering::SeqCst);
            let fail = self.fail_pending.load(Ordering::SeqCst);
            Box::pin(async move {
                if fail {
                    Err(TxpollError::Http { status: 500 })
                } else {
                    Ok(())
                }
            })
        }
    }

    pub struct RecordingContext {
        origin: Option<String>,
        posted: Mutex<Vec<(NotificationMessage, String)>>,
    }

    impl RecordingContext {
        pub fn new(origin: Option<&str>) -> Arc<Self> {
            Arc::new(Self {
                origin: origin.map(str::to_string),
                posted: Mutex::new(Vec::new()),
            })
        }

        pub fn posted(&self) -> Vec<(NotificationMessage, String)> {
            self.posted.lock().unwrap().clone()
        }
    }

    impl RelatedContext for RecordingContext {
        fn origin(&self) -> Option<String> {
            self.origin.clone()
        }

        fn post_message(&self, message: &NotificationMessage, target_origin: &str) {
            self.posted
                .lock()
                .unwrap()
                .push((message.clone(), target_origin.to_string()));
        }
    }

    pub struct CountingClose {
        count: AtomicU32,
    }

    impl CountingClose {
        pub fn new() -> Arc<Self> {
            Arc::new(Self {
                count: AtomicU32::new(0),
            })
        }

        pub fn count(&self) -> u32 {
            self.count.load(Ordering::SeqCst)
        }
    }

    impl CloseSignal for CountingClose {
        fn close(&self) {
            self.count.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// End-to-end behaviour of a poller against scripted sources.
#[cfg(test)]
mod scenarios {
    use std::time::Duration;

    use super::support::{options, CountingClose, RecordingContext, Reply, ScriptedSource};
    use crate::config::NotifyConfig;
    use crate::engine::{AttemptFailure, PollFailure, PollState};
    use crate::notify::{Delivery, NotificationMessage, Notifier};
    use crate::poller::{PollOutcome, Poller};
    use crate::transaction::ValidationFailure;
    use crate::verdict::VerdictRule;

    fn notifier() -> (Notifier, std::sync::Arc<RecordingContext>, std::sync::Arc<CountingClose>) {
        let ctx = RecordingContext::new(None);
        let close = CountingClose::new();
        let notifier = Notifier::new(&NotifyConfig::default())
            .with_context(ctx.clone())
            .with_close_signal(close.clone());
        (notifier, ctx, close)
    }

    #[tokio::test(start_paused = true)]
    async fn found_on_third_request_succeeds_and_notifies_once() {
        let source = ScriptedSource::new(
            vec![
                Reply::body(r#"{"found": false}"#),
                Reply::body(r#"{"found": false}"#),
            ],
            Reply::body(r#"{"found": true}"#),
        );
        let (notifier, ctx, close) = notifier();
        let mut poller = Poller::start(
            Some("TX-123"),
            options(3, 10),
            source.clone(),
            VerdictRule::default().to_verdict(),
            notifier,
        );

        let outcome = poller.wait().await;
        assert_eq!(
            outcome,
            PollOutcome::Success {
                attempts: 2,
                delivery: Delivery::Sent {
                    count: 1,
                    target_origin: "*".into()
                }
            }
        );
        assert_eq!(source.requests(), 3);
        assert_eq!(poller.status().state, PollState::Success);

        let posted = ctx.posted();
        assert_eq!(posted.len(), 1);
        assert_eq!(
            posted[0].0,
            NotificationMessage::update_text("Payment successful!")
        );

        // Close is scheduled once, after the delay.
        assert_eq!(close.count(), 0);
        poller.join().await;
        assert_eq!(close.count(), 1);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(source.requests(), 3);
        assert_eq!(ctx.posted().len(), 1);
        assert_eq!(close.count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn network_errors_exhaust_budget_without_notifying() {
        let source = ScriptedSource::always(Reply::NetworkError);
        let (notifier, ctx, close) = notifier();
        let mut poller = Poller::start(
            Some("TX-123"),
            options(2, 10),
            source.clone(),
            VerdictRule::default().to_verdict(),
            notifier,
        );

        let outcome = poller.wait().await;
        let PollOutcome::Failed(PollFailure::AttemptBudgetExhausted {
            max_attempts,
            last_failure,
        }) = &outcome
        else {
            panic!("expected budget exhaustion, got {outcome:?}")
        };
        assert_eq!(*max_attempts, 2);
        assert!(matches!(last_failure, Some(AttemptFailure::Transport(_))));
        assert_eq!(source.requests(), 2);

        let status = poller.status();
        assert_eq!(status.state, PollState::Error);
        assert_eq!(status.error.as_deref(), Some("Failed to verify payment"));

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(source.requests(), 2);
        assert!(ctx.posted().is_empty());
        assert_eq!(close.count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn never_found_times_out_after_exactly_max_attempts() {
        for max in [1u32, 4, 40] {
            let source = ScriptedSource::always(Reply::body(r#"{"found": false}"#));
            let mut poller = Poller::start(
                Some("TX-123"),
                options(max, 3000),
                source.clone(),
                VerdictRule::default().to_verdict(),
                Notifier::new(&NotifyConfig::default()),
            );

            assert!(matches!(
                poller.wait().await,
                PollOutcome::Failed(PollFailure::AttemptBudgetExhausted {
                    last_failure: None,
                    ..
                })
            ));
            assert_eq!(source.requests(), max);
            assert_eq!(
                poller.status().error.as_deref(),
                Some("Verification timeout - please try again")
            );

            tokio::time::sleep(Duration::from_secs(600)).await;
            assert_eq!(source.requests(), max, "no requests after giving up");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn retries_are_spaced_by_interval() {
        let source = ScriptedSource::always(Reply::body(r#"{"found": false}"#));
        let started = tokio::time::Instant::now();
        let mut poller = Poller::start(
            Some("TX-123"),
            options(4, 3000),
            source,
            VerdictRule::default().to_verdict(),
            Notifier::new(&NotifyConfig::default()),
        );
        poller.wait().await;
        // Three waits between four requests; none after the last.
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(9000), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(12000), "{elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_and_http_errors_consume_attempts() {
        let source = ScriptedSource::new(
            vec![Reply::body("<!doctype html>"), Reply::Http(502)],
            Reply::body(r#"{"found": true}"#),
        );
        let mut poller = Poller::start(
            Some("TX-123"),
            options(3, 10),
            source.clone(),
            VerdictRule::default().to_verdict(),
            Notifier::new(&NotifyConfig::default()),
        );
        assert!(matches!(
            poller.wait().await,
            PollOutcome::Success { attempts: 2, .. }
        ));
        assert_eq!(source.requests(), 3);
    }

    #[tokio::test]
    async fn invalid_id_never_issues_a_request() {
        let source = ScriptedSource::always(Reply::body(r#"{"found": true}"#));
        let (notifier, ctx, _close) = notifier();
        let mut poller = Poller::start(
            Some("a b"),
            options(3, 10),
            source.clone(),
            VerdictRule::default().to_verdict(),
            notifier,
        );

        assert!(poller.transaction_id().is_none());
        assert_eq!(
            poller.wait().await,
            PollOutcome::Failed(PollFailure::Validation(
                ValidationFailure::InvalidCharacters("a b".into())
            ))
        );
        let status = poller.status();
        assert_eq!(status.state, PollState::Error);
        assert_eq!(status.error.as_deref(), Some("Invalid transaction ID"));
        assert_eq!(source.requests(), 0);
        assert!(ctx.posted().is_empty());
    }

    #[tokio::test]
    async fn missing_id_is_rejected() {
        let source = ScriptedSource::always(Reply::body(r#"{"found": true}"#));
        let mut poller = Poller::start(
            None,
            options(3, 10),
            source.clone(),
            VerdictRule::default().to_verdict(),
            Notifier::new(&NotifyConfig::default()),
        );
        assert_eq!(
            poller.wait().await,
            PollOutcome::Failed(PollFailure::Validation(ValidationFailure::Missing))
        );
        assert_eq!(source.requests(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn predicate_swap_changes_classification_only() {
        let body = r#"{"found": true}"#;

        let flag_source = ScriptedSource::always(Reply::body(body));
        let mut flag = Poller::start(
            Some("TX-1"),
            options(3, 10),
            flag_source.clone(),
            VerdictRule::default().to_verdict(),
            Notifier::new(&NotifyConfig::default()),
        );
        assert!(matches!(flag.wait().await, PollOutcome::Success { .. }));
        assert_eq!(flag_source.requests(), 1);

        let status_source = ScriptedSource::always(Reply::body(body));
        let record_status: VerdictRule = serde_yaml::from_str("type: record_status").unwrap();
        let mut status = Poller::start(
            Some("TX-1"),
            options(3, 10),
            status_source.clone(),
            record_status.to_verdict(),
            Notifier::new(&NotifyConfig::default()),
        );
        assert!(matches!(
            status.wait().await,
            PollOutcome::Failed(PollFailure::AttemptBudgetExhausted {
                last_failure: None,
                ..
            })
        ));
        assert_eq!(status_source.requests(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn both_messages_are_sent_when_configured() {
        let ctx = RecordingContext::new(Some("https://shop.example.com"));
        let notifier = Notifier::new(&NotifyConfig {
            spin: Some(3),
            allowed_origins: vec!["https://shop.example.com".into()],
            ..NotifyConfig::default()
        })
        .with_context(ctx.clone());
        let mut poller = Poller::start(
            Some("TX-1"),
            options(3, 10),
            ScriptedSource::always(Reply::body(r#"{"found": true}"#)),
            VerdictRule::default().to_verdict(),
            notifier,
        );
        poller.wait().await;

        let posted = ctx.posted();
        assert_eq!(posted.len(), 2);
        assert_eq!(posted[1].0, NotificationMessage::show_spin(3));
        assert!(posted.iter().all(|(_, target)| target == "https://shop.example.com"));
    }

    #[tokio::test(start_paused = true)]
    async fn close_still_fires_without_a_related_context() {
        let close = CountingClose::new();
        let mut poller = Poller::start(
            Some("TX-1"),
            options(3, 10),
            ScriptedSource::always(Reply::body(r#"{"found": true}"#)),
            VerdictRule::default().to_verdict(),
            Notifier::new(&NotifyConfig::default()).with_close_signal(close.clone()),
        );
        assert!(matches!(
            poller.wait().await,
            PollOutcome::Success {
                delivery: Delivery::NoContext,
                ..
            }
        ));
        poller.join().await;
        assert_eq!(close.count(), 1);
    }
}
