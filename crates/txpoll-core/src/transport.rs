use std::time::Duration;

use futures::future::BoxFuture;
use serde_json::json;

use crate::error::{Result, TxpollError};
use crate::transaction::{TransactionId, QUERY_PARAM};

/// Upper bound on a single status request. Well above any sane poll interval,
/// so a hung request still ends up consuming an attempt.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

// ─── StatusSource ─────────────────────────────────────────────────────────

/// Where the poller gets transaction status from.
///
/// `fetch` returns the raw response body; parsing and classification belong
/// to the poller. Any `Err` is treated as a transport failure.
pub trait StatusSource: Send + Sync {
    fn fetch<'a>(&'a self, id: &'a TransactionId) -> BoxFuture<'a, Result<String>>;

    /// Record that a check for `id` has started. Sources without a write path
    /// keep the default no-op.
    fn record_pending<'a>(&'a self, _id: &'a TransactionId) -> BoxFuture<'a, Result<()>> {
        Box::pin(async { Ok(()) })
    }
}

// ─── HttpStatusSource ─────────────────────────────────────────────────────

/// `GET <endpoint>?transactionId=<id>` against a remote status script.
#[derive(Debug, Clone)]
pub struct HttpStatusSource {
    client: reqwest::Client,
    endpoint: reqwest::Url,
}

impl HttpStatusSource {
    pub fn new(endpoint: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_REQUEST_TIMEOUT)
            .build()?;
        Self::with_client(client, endpoint)
    }

    pub fn with_client(client: reqwest::Client, endpoint: &str) -> Result<Self> {
        let endpoint = reqwest::Url::parse(endpoint)
            .map_err(|e| TxpollError::Config(format!("invalid endpoint '{endpoint}': {e}")))?;
        Ok(Self { client, endpoint })
    }

    pub fn endpoint(&self) -> &reqwest::Url {
        &self.endpoint
    }
}

fn check_status(resp: &reqwest::Response) -> Result<()> {
    let status = resp.status();
    if !status.is_success() {
        return Err(TxpollError::Http {
            status: status.as_u16(),
        });
    }
    Ok(())
}

impl StatusSource for HttpStatusSource {
    fn fetch<'a>(&'a self, id: &'a TransactionId) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            let resp = self
                .client
                .get(self.endpoint.clone())
                .query(&[(QUERY_PARAM, id.as_str())])
                .send()
                .await?;
            check_status(&resp)?;
            Ok(resp.text().await?)
        })
    }

    fn record_pending<'a>(&'a self, id: &'a TransactionId) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let body = json!({
                "transactionId": id.as_str(),
                "paymentStatus": "pending",
            });
            let resp = self
                .client
                .post(self.endpoint.clone())
                .json(&body)
                .send()
                .await?;
            check_status(&resp)
        })
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────
