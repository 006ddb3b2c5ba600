// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Notification Gateway
//!
//! Outbound, best-effort delivery of confirmation prompts and disclosures to
//! humans (the chat bot). The broker only ever calls the gateway after its
//! transaction has committed; a failed delivery is reported back to the
//! caller as a [`DeliveryStatus`] and never retried here.
//!
//! The bot answers prompts by calling the confirm/deny endpoints with the
//! correlation id, so nothing is awaited across the human round-trip.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use url::Url;
use utoipa::ToSchema;

/// Default timeout for one webhook call.
pub const DEFAULT_WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

pub type GatewayFuture<'a> = Pin<Box<dyn Future<Output = Result<(), GatewayError>> + Send + 'a>>;

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("notification gateway unavailable: {0}")]
    Unavailable(String),

    #[error("notification request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("notification gateway answered {status}")]
    Rejected { status: u16 },

    #[error("invalid notification webhook url: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

/// Asks the uploader to confirm or deny a request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConfirmationPrompt {
    /// Access request id; the reply must quote it.
    pub correlation_id: u64,
    /// Uploader being asked.
    pub recipient: String,
    pub requester: String,
    pub credential_id: u64,
    pub game: String,
    pub expires_at: DateTime<Utc>,
}

/// Cleartext credential handed to a grantee.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Disclosure {
    pub correlation_id: u64,
    /// Grantee.
    pub recipient: String,
    pub game: String,
    pub game_username: String,
    pub game_password: String,
}

impl fmt::Debug for Disclosure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Disclosure")
            .field("correlation_id", &self.correlation_id)
            .field("recipient", &self.recipient)
            .field("game", &self.game)
            .field("game_username", &"<redacted>")
            .field("game_password", &"<redacted>")
            .finish()
    }
}

/// Outcome of the notification attempted after a committed transition.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DeliveryStatus {
    Sent,
    Failed { reason: String },
}

impl DeliveryStatus {
    pub fn from_result(result: Result<(), GatewayError>) -> Self {
        match result {
            Ok(()) => DeliveryStatus::Sent,
            Err(err) => {
                warn!(error = %err, "Notification delivery failed");
                DeliveryStatus::Failed {
                    reason: err.to_string(),
                }
            }
        }
    }

    pub fn is_sent(&self) -> bool {
        matches!(self, DeliveryStatus::Sent)
    }
}

pub trait NotificationGateway: Send + Sync {
    /// Prompt the uploader for a decision.
    fn request_confirmation<'a>(&'a self, prompt: &'a ConfirmationPrompt) -> GatewayFuture<'a>;

    /// Hand the unsealed credential to the grantee.
    fn deliver_secret<'a>(&'a self, disclosure: &'a Disclosure) -> GatewayFuture<'a>;
}

// =============================================================================
// Webhook
// =============================================================================

/// Posts JSON to the chat bot's webhook.
///
/// `POST {base}/confirmations` with a [`ConfirmationPrompt`] and
/// `POST {base}/disclosures` with a [`Disclosure`]. Any non-2xx answer is a
/// delivery failure.
#[derive(Debug, Clone)]
pub struct WebhookGateway {
    http: Client,
    confirmations: Url,
    disclosures: Url,
}

impl WebhookGateway {
    pub fn new(base: &Url, timeout: Duration) -> Result<Self, GatewayError> {
        let mut base = base.clone();
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let http = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            http,
            confirmations: base.join("confirmations")?,
            disclosures: base.join("disclosures")?,
        })
    }

    async fn post<T: Serialize>(&self, url: &Url, body: &T) -> Result<(), GatewayError> {
        let response = self.http.post(url.clone()).json(body).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::Rejected {
                status: status.as_u16(),
            });
        }
        Ok(())
    }
}

impl NotificationGateway for WebhookGateway {
    fn request_confirmation<'a>(&'a self, prompt: &'a ConfirmationPrompt) -> GatewayFuture<'a> {
        Box::pin(async move {
            self.post(&self.confirmations, prompt).await?;
            info!(
                request_id = prompt.correlation_id,
                recipient = %prompt.recipient,
                "Confirmation prompt delivered"
            );
            Ok(())
        })
    }

    fn deliver_secret<'a>(&'a self, disclosure: &'a Disclosure) -> GatewayFuture<'a> {
        Box::pin(async move {
            self.post(&self.disclosures, disclosure).await?;
            info!(
                request_id = disclosure.correlation_id,
                recipient = %disclosure.recipient,
                "Credential disclosed"
            );
            Ok(())
        })
    }
}

// =============================================================================
// Log-only fallback
// =============================================================================

/// Used when no webhook is configured. Logs prompts, never payloads, and
/// reports every delivery as failed so callers see the warning.
#[derive(Debug, Clone, Default)]
pub struct LogGateway;

impl NotificationGateway for LogGateway {
    fn request_confirmation<'a>(&'a self, prompt: &'a ConfirmationPrompt) -> GatewayFuture<'a> {
        Box::pin(async move {
            info!(
                request_id = prompt.correlation_id,
                recipient = %prompt.recipient,
                requester = %prompt.requester,
                game = %prompt.game,
                "Confirmation prompt (no webhook configured)"
            );
            Err(GatewayError::Unavailable("no webhook configured".into()))
        })
    }

    fn deliver_secret<'a>(&'a self, disclosure: &'a Disclosure) -> GatewayFuture<'a> {
        Box::pin(async move {
            info!(
                request_id = disclosure.correlation_id,
                recipient = %disclosure.recipient,
                "Disclosure withheld (no webhook configured)"
            );
            Err(GatewayError::Unavailable("no webhook configured".into()))
        })
    }
}

// =============================================================================
// Test gateways
// =============================================================================

#[cfg(test)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Delivery {
    Confirmation(ConfirmationPrompt),
    Disclosure(Disclosure),
}

/// Remembers every call in order.
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct RecordingGateway {
    sent: std::sync::Mutex<Vec<Delivery>>,
}

#[cfg(test)]
impl RecordingGateway {
    pub(crate) fn sent(&self) -> Vec<Delivery> {
        self.sent.lock().unwrap().clone()
    }

    pub(crate) fn disclosures(&self) -> Vec<Disclosure> {
        self.sent()
            .into_iter()
            .filter_map(|d| match d {
                Delivery::Disclosure(disclosure) => Some(disclosure),
                Delivery::Confirmation(_) => None,
            })
            .collect()
    }

    pub(crate) fn confirmations(&self) -> Vec<ConfirmationPrompt> {
        self.sent()
            .into_iter()
            .filter_map(|d| match d {
                Delivery::Confirmation(prompt) => Some(prompt),
                Delivery::Disclosure(_) => None,
            })
            .collect()
    }
}

#[cfg(test)]
impl NotificationGateway for RecordingGateway {
    fn request_confirmation<'a>(&'a self, prompt: &'a ConfirmationPrompt) -> GatewayFuture<'a> {
        self.sent
            .lock()
            .unwrap()
            .push(Delivery::Confirmation(prompt.clone()));
        Box::pin(async { Ok(()) })
    }

    fn deliver_secret<'a>(&'a self, disclosure: &'a Disclosure) -> GatewayFuture<'a> {
        self.sent
            .lock()
            .unwrap()
            .push(Delivery::Disclosure(disclosure.clone()));
        Box::pin(async { Ok(()) })
    }
}

/// Always fails.
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct FailingGateway;

#[cfg(test)]
impl NotificationGateway for FailingGateway {
    fn request_confirmation<'a>(&'a self, _prompt: &'a ConfirmationPrompt) -> GatewayFuture<'a> {
        Box::pin(async { Err(GatewayError::Unavailable("bot offline".into())) })
    }

    fn deliver_secret<'a>(&'a self, _disclosure: &'a Disclosure) -> GatewayFuture<'a> {
        Box::pin(async { Err(GatewayError::Unavailable("bot offline".into())) })
    }
}
