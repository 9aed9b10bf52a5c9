use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::config::NotifyConfig;

/// Target origin used when no allow-list is configured.
pub const WILDCARD_ORIGIN: &str = "*";

// ---------------------------------------------------------------------------
// NotificationMessage
// ---------------------------------------------------------------------------

/// Payload posted to the related context when a payment is confirmed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum NotificationMessage {
    /// Ask the receiver to display `text`.
    UpdateText { text: String },
    /// Animation cue sent alongside, or instead of, the text update.
    PaymentSuccess { action: SuccessAction, spins: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SuccessAction {
    ShowSpin,
}

impl NotificationMessage {
    pub fn update_text(text: impl Into<String>) -> Self {
        NotificationMessage::UpdateText { text: text.into() }
    }

    pub fn show_spin(spins: u32) -> Self {
        NotificationMessage::PaymentSuccess {
            action: SuccessAction::ShowSpin,
            spins,
        }
    }
}

// ---------------------------------------------------------------------------
// Host seams
// ---------------------------------------------------------------------------

/// Another context (opener or parent) able to receive posted messages.
pub trait RelatedContext: Send + Sync {
    /// The context's origin, when the host can tell.
    fn origin(&self) -> Option<String>;

    /// Post `message`, restricted to receivers at `target_origin` (`"*"` for
    /// any). Fire-and-forget.
    fn post_message(&self, message: &NotificationMessage, target_origin: &str);
}

/// Ends the current context ("close now").
pub trait CloseSignal: Send + Sync {
    fn close(&self);
}

// ---------------------------------------------------------------------------
// OriginPolicy
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OriginPolicy {
    /// Post to `"*"`.
    Any,
    /// Post only to a context whose origin is listed, targeting that origin.
    AllowList(Vec<String>),
}

impl OriginPolicy {
    pub fn from_allowed(origins: &[String]) -> Self {
        if origins.is_empty() {
            OriginPolicy::Any
        } else {
            OriginPolicy::AllowList(
                origins
                    .iter()
                    .map(|o| o.trim_end_matches('/').to_string())
                    .collect(),
            )
        }
    }

    /// The target origin to post with, or `None` if delivery is not allowed.
    pub fn target_for(&self, context_origin: Option<&str>) -> Option<String> {
        match self {
            OriginPolicy::Any => Some(WILDCARD_ORIGIN.to_string()),
            OriginPolicy::AllowList(allowed) => {
                let origin = context_origin?.trim_end_matches('/');
                allowed
                    .iter()
                    .any(|a| a == origin)
                    .then(|| origin.to_string())
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Delivery
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// `count` messages were posted to `target_origin`.
    Sent { count: usize, target_origin: String },
    /// No related context; nothing to do.
    NoContext,
    /// The context's origin is not on the allow-list.
    Blocked { origin: Option<String> },
}

// ---------------------------------------------------------------------------
// Notifier
// ---------------------------------------------------------------------------

/// Tells the related context about a confirmed payment, then closes the
/// current context after a delay.
#[derive(Clone)]
pub struct Notifier {
    messages: Vec<NotificationMessage>,
    policy: OriginPolicy,
    close_delay: Duration,
    context: Option<Arc<dyn RelatedContext>>,
    close: Option<Arc<dyn CloseSignal>>,
}

impl Notifier {
    pub fn new(config: &NotifyConfig) -> Self {
        let mut messages = Vec::new();
        if let Some(text) = &config.update_text {
            messages.push(NotificationMessage::update_text(text.clone()));
        }
        if let Some(spins) = config.spin {
            messages.push(NotificationMessage::show_spin(spins));
        }
        Self {
            messages,
            policy: OriginPolicy::from_allowed(&config.allowed_origins),
            close_delay: config.close_delay(),
            context: None,
            close: None,
        }
    }

    pub fn with_context(mut self, context: Arc<dyn RelatedContext>) -> Self {
        self.context = Some(context);
        self
    }

    pub fn with_close_signal(mut self, close: Arc<dyn CloseSignal>) -> Self {
        self.close = Some(close);
        self
    }

    pub fn messages(&self) -> &[NotificationMessage] {
        &self.messages
    }

    pub fn policy(&self) -> &OriginPolicy {
        &self.policy
    }

    pub fn close_delay(&self) -> Duration {
        self.close_delay
    }

    /// Post the configured messages to the related context, if any.
    pub fn deliver(&self) -> Delivery {
        let Some(context) = &self.context else {
            tracing::debug!("no related context; skipping notification");
            return Delivery::NoContext;
        };

        let origin = context.origin();
        let Some(target_origin) = self.policy.target_for(origin.as_deref()) else {
            tracing::warn!(
                origin = origin.as_deref().unwrap_or("<unknown>"),
                "related context origin is not allowed; notification not sent"
            );
            return Delivery::Blocked { origin };
        };
        if target_origin == WILDCARD_ORIGIN {
            tracing::warn!("posting notification to any origin ('*'); configure allowed_origins");
        }

        for message in &self.messages {
            context.post_message(message, &target_origin);
        }
        tracing::info!(count = self.messages.len(), %target_origin, "notification posted");
        Delivery::Sent {
            count: self.messages.len(),
            target_origin,
        }
    }

    /// Wait out the close delay, then fire the close signal once.
    pub async fn close_after_delay(&self) {
        tokio::time::sleep(self.close_delay).await;
        if let Some(close) = &self.close {
            tracing::debug!("closing current context");
            close.close();
        }
    }
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier")
            .field("messages", &self.messages)
            .field("policy", &self.policy)
            .field("close_delay", &self.close_delay)
            .field("has_context", &self.context.is_some())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
