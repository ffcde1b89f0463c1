use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{error_description, DeliveryError, Notifier};

pub const DEFAULT_API_URL: &str = "https://api.telegram.org";

/// Sends plain-text messages through the Telegram Bot API.
pub struct TelegramNotifier {
    client: Client,
    api_url: String,
    token: String,
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
}

#[derive(Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

impl TelegramNotifier {
    pub fn new(client: Client, api_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_url, self.token, method)
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    fn name(&self) -> &'static str {
        "telegram"
    }

    async fn deliver(&self, destination: &str, text: &str) -> Result<(), DeliveryError> {
        let response = self
            .client
            .post(self.method_url("sendMessage"))
            .json(&SendMessage {
                chat_id: destination,
                text,
            })
            .send()
            .await
            .map_err(|e| DeliveryError::Http(e.without_url()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| DeliveryError::Http(e.without_url()))?;

        if !status.is_success() {
            return Err(DeliveryError::Rejected {
                status,
                description: error_description(&body),
            });
        }

        // Telegram can answer 200 with ok=false.
        match serde_json::from_str::<ApiResponse>(&body) {
            Ok(ApiResponse { ok: true, .. }) => Ok(()),
            Ok(ApiResponse { description, .. }) => Err(DeliveryError::Rejected {
                status,
                description: description.unwrap_or_else(|| "ok=false".to_string()),
            }),
            Err(_) => Err(DeliveryError::Rejected {
                status,
                description: error_description(&body),
            }),
        }
    }
}
