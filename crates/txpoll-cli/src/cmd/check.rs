use crate::output::print_json_line;
use anyhow::Context;
use clap::Args;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Notify;
use txpoll_core::config::Config;
use txpoll_core::engine::PollState;
use txpoll_core::notify::{CloseSignal, NotificationMessage, Notifier, RelatedContext};
use txpoll_core::poller::{PollOutcome, Poller};
use txpoll_core::transaction;
use txpoll_core::transport::HttpStatusSource;

// ---------------------------------------------------------------------------
// Arguments
// ---------------------------------------------------------------------------

#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Transaction id to check
    pub transaction_id: Option<String>,

    /// Take the id from a URL query string instead (e.g. "?transactionId=TX-1")
    #[arg(long, conflicts_with = "transaction_id")]
    pub query: Option<String>,

    /// Status endpoint URL (overrides poll.endpoint_url)
    #[arg(long, env = "TXPOLL_ENDPOINT")]
    pub endpoint: Option<String>,

    /// Delay between attempts in milliseconds (overrides poll.interval_ms)
    #[arg(long)]
    pub interval_ms: Option<u64>,

    /// Attempt budget (overrides poll.max_attempts)
    #[arg(long)]
    pub max_attempts: Option<u32>,

    /// Origin this terminal reports as the notification receiver
    #[arg(long)]
    pub origin: Option<String>,
}

impl CheckArgs {
    fn apply(&self, config: &mut Config) {
        if let Some(endpoint) = &self.endpoint {
            config.poll.endpoint_url = endpoint.clone();
        }
        if let Some(ms) = self.interval_ms {
            config.poll.interval_ms = ms;
        }
        if let Some(n) = self.max_attempts {
            config.poll.max_attempts = n;
        }
    }

    fn raw_id(&self) -> Option<String> {
        self.transaction_id
            .clone()
            .or_else(|| self.query.as_deref().and_then(transaction::from_query))
    }
}

// ---------------------------------------------------------------------------
// Host seams: stdout is the related context, a Notify is the close signal
// ---------------------------------------------------------------------------

struct StdoutContext {
    origin: Option<String>,
}

impl RelatedContext for StdoutContext {
    fn origin(&self) -> Option<String> {
        self.origin.clone()
    }

    fn post_message(&self, message: &NotificationMessage, target_origin: &str) {
        let line = serde_json::json!({
            "target_origin": target_origin,
            "message": message,
        });
        if let Err(e) = print_json_line(&line) {
            tracing::warn!(error = %e, "failed to write notification");
        }
    }
}

struct NotifyClose(Arc<Notify>);

impl CloseSignal for NotifyClose {
    fn close(&self) {
        self.0.notify_one();
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub fn run(config_path: &Path, args: CheckArgs, json: bool) -> anyhow::Result<()> {
    let mut config = Config::load_or_default(config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;
    args.apply(&mut config);

    if config.poll.endpoint_url.trim().is_empty() {
        anyhow::bail!("no status endpoint configured: set poll.endpoint_url or pass --endpoint");
    }
    let source =
        HttpStatusSource::new(&config.poll.endpoint_url).context("failed to set up status client")?;

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(check(config, source, args, json))
}

async fn check(
    config: Config,
    source: HttpStatusSource,
    args: CheckArgs,
    json: bool,
) -> anyhow::Result<()> {
    let closed = Arc::new(Notify::new());
    let notifier = Notifier::new(&config.notify)
        .with_context(Arc::new(StdoutContext {
            origin: args.origin.clone(),
        }))
        .with_close_signal(Arc::new(NotifyClose(Arc::clone(&closed))));

    let raw_id = args.raw_id();
    let mut poller = Poller::from_config(raw_id.as_deref(), &config, Arc::new(source), notifier);

    let progress = (!json).then(|| {
        let mut rx = poller.subscribe();
        tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let status = rx.borrow_and_update().clone();
                if status.state == PollState::Checking {
                    match status.progress() {
                        Some(p) => eprintln!("Verifying your payment... {p}"),
                        None => eprintln!("Verifying your payment..."),
                    }
                }
            }
        })
    });

    let outcome = poller.wait().await;
    if let Some(handle) = progress {
        handle.abort();
    }

    let status = poller.status();
    if json {
        print_json_line(&status)?;
    }

    match outcome {
        PollOutcome::Success { attempts, .. } => {
            tracing::info!(attempts, "payment confirmed");
            if !json {
                eprintln!("Payment successful! Closing...");
            }
            closed.notified().await;
            Ok(())
        }
        PollOutcome::Failed(failure) => {
            tracing::debug!(error = %failure, "check failed");
            let message = status.error.unwrap_or_else(|| failure.to_string());
            anyhow::bail!(message)
        }
        PollOutcome::Cancelled => anyhow::bail!("check was cancelled"),
    }
}
