use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use super::{error_description, DeliveryError, Notifier};

pub const DEFAULT_API_URL: &str = "https://discord.com/api/v10";

/// Posts messages to Discord text channels as a bot user.
///
/// Delivery is two requests: the channel is looked up first so a missing or
/// inaccessible channel is reported as such, then the message is created.
pub struct DiscordNotifier {
    client: Client,
    api_url: String,
    token: String,
}

/// The part of Discord's channel object we care about.
#[derive(Debug, Deserialize)]
pub struct Channel {
    pub id: String,
}

#[derive(Serialize)]
struct CreateMessage<'a> {
    content: &'a str,
}

impl DiscordNotifier {
    pub fn new(client: Client, api_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    fn authorization(&self) -> String {
        format!("Bot {}", self.token)
    }

    /// Look up a channel by id.
    pub async fn resolve_channel(&self, channel_id: &str) -> Result<Channel, DeliveryError> {
        let response = self
            .client
            .get(format!("{}/channels/{}", self.api_url, channel_id))
            .header(AUTHORIZATION, self.authorization())
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => Ok(response.json::<Channel>().await?),
            StatusCode::NOT_FOUND => Err(DeliveryError::DestinationNotFound(channel_id.to_string())),
            status => Err(DeliveryError::Rejected {
                status,
                description: error_description(&response.text().await?),
            }),
        }
    }

    async fn create_message(&self, channel: &Channel, text: &str) -> Result<(), DeliveryError> {
        let response = self
            .client
            .post(format!("{}/channels/{}/messages", self.api_url, channel.id))
            .header(AUTHORIZATION, self.authorization())
            .json(&CreateMessage { content: text })
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(DeliveryError::Rejected {
                status,
                description: error_description(&response.text().await?),
            })
        }
    }
}

#[async_trait]
impl Notifier for DiscordNotifier {
    fn name(&self) -> &'static str {
        "discord"
    }

    async fn deliver(&self, destination: &str, text: &str) -> Result<(), DeliveryError> {
        let channel = self.resolve_channel(destination).await?;
        self.create_message(&channel, text).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn notifier(server: &MockServer) -> DiscordNotifier {
        DiscordNotifier::new(Client::new(), server.uri(), "secret")
    }

    #[tokio::test]
    async fn resolves_then_posts() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/channels/555"))
            .and(header("authorization", "Bot secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "555", "type": 0 })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/channels/555/messages"))
            .and(header("authorization", "Bot secret"))
            .and(body_json(json!({ "content": "Title\nhttps://x" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "1" })))
            .expect(1)
            .mount(&server)
            .await;

        notifier(&server)
            .deliver("555", "Title\nhttps://x")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn unknown_channel_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/channels/404"))
            .respond_with(
                ResponseTemplate::new(404)
                    .set_body_json(json!({ "message": "Unknown Channel", "code": 10003 })),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let err = notifier(&server).deliver("404", "hi").await.unwrap_err();
        assert!(matches!(err, DeliveryError::DestinationNotFound(id) if id == "404"));
    }

    #[tokio::test]
    async fn rejected_post_carries_reason() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "7" })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(403)
                    .set_body_json(json!({ "message": "Missing Permissions", "code": 50013 })),
            )
            .mount(&server)
            .await;

        let err = notifier(&server).deliver("7", "hi").await.unwrap_err();
        match err {
            DeliveryError::Rejected { status, description } => {
                assert_eq!(status, StatusCode::FORBIDDEN);
                assert_eq!(description, "Missing Permissions");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
