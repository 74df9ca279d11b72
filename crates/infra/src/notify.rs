//! Notification collaborator.
//!
//! Delivery is best effort: callers go through [`deliver`], which bounds the
//! call, logs failures and never retries.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    pub email: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotificationPayload {
    Link { text: String, url: String },
    Code { code: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub recipient: Recipient,
    pub message: String,
    pub payload: Option<NotificationPayload>,
}

impl Notification {
    pub fn link(recipient: Recipient, message: impl Into<String>, text: &str, url: String) -> Self {
        Self {
            recipient,
            message: message.into(),
            payload: Some(NotificationPayload::Link {
                text: text.to_string(),
                url,
            }),
        }
    }

    pub fn plain(recipient: Recipient, message: impl Into<String>) -> Self {
        Self {
            recipient,
            message: message.into(),
            payload: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("notification delivery failed: {0}")]
pub struct NotifyError(pub String);

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notification: Notification) -> Result<(), NotifyError>;
}

/// Send and swallow the outcome.
pub async fn deliver(notifier: &dyn Notifier, notification: Notification, limit: Duration) {
    let email = notification.recipient.email.clone();
    match tokio::time::timeout(limit, notifier.send(notification)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(recipient = %email, error = %e, "notification not delivered"),
        Err(_) => warn!(recipient = %email, "notification timed out"),
    }
}
