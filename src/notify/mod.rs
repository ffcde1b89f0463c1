//! Outbound notification transports.
//!
//! Every transport is reduced to one capability, [`Notifier::deliver`], so the
//! poller can fan a message out without knowing whether a destination is a
//! Telegram chat or a Discord channel.

pub mod discord;
pub mod telegram;

pub use discord::DiscordNotifier;
pub use telegram::TelegramNotifier;

use async_trait::async_trait;
use thiserror::Error;

/// A single failed delivery.  Isolated to one destination; never aborts a
/// cycle.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("destination {0} not found")]
    DestinationNotFound(String),

    #[error("rejected with HTTP {status}: {description}")]
    Rejected {
        status: reqwest::StatusCode,
        description: String,
    },

    #[error("cancelled before completion")]
    Cancelled,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Transport label for logs, e.g. `telegram`.
    fn name(&self) -> &'static str;

    /// Send `text` to the destination identified by `destination`.
    async fn deliver(&self, destination: &str, text: &str) -> Result<(), DeliveryError>;
}

/// Pull a human-readable reason out of an error response body.
///
/// Both APIs answer with JSON; Telegram uses `description`, Discord uses
/// `message`.  Falls back to the raw body.
pub(crate) fn error_description(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| {
            value
                .get("description")
                .or_else(|| value.get("message"))
                .and_then(|v| v.as_str())
                .map(String::from)
        })
        .unwrap_or_else(|| body.trim().to_string())
}
