//! RSS feed source implementation.
//!
//! Fetches an RSS 2.0 document over HTTP with the configured agent string and
//! converts it into a [`FeedSnapshot`].  Parsing is split from I/O so tests
//! can exercise it without the network.

use async_trait::async_trait;
use reqwest::header::USER_AGENT;
use reqwest::Client;
use tracing::debug;

use super::{parse_timestamp, FeedItem, FeedSnapshot, FeedSource, FetchError};

/// An RSS feed data source.
pub struct RssSource {
    client: Client,
    url: String,
    user_agent: String,
}

impl RssSource {
    /// Create a new RSS source.
    ///
    /// # Arguments
    ///
    /// * `client`: shared HTTP client (timeouts, pooling).
    /// * `url`: full URL of the RSS feed.
    /// * `user_agent`: sent as the `User-Agent` header on every request.
    pub fn new(client: Client, url: impl Into<String>, user_agent: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
            user_agent: user_agent.into(),
        }
    }

    /// Parse an already-fetched [`rss::Channel`] into a [`FeedSnapshot`].
    ///
    /// The build date comes from `<lastBuildDate>`, falling back to the
    /// channel's `<pubDate>`.
    pub fn parse_channel(channel: &rss::Channel) -> FeedSnapshot {
        let build_date = channel
            .last_build_date()
            .and_then(parse_timestamp)
            .or_else(|| channel.pub_date().and_then(parse_timestamp));

        let items = channel
            .items()
            .iter()
            .map(|item| FeedItem {
                title: item.title().unwrap_or("(untitled)").to_string(),
                link: item.link().map(String::from),
                // Unreadable dates degrade to None and are never "new".
                published: item.pub_date().and_then(parse_timestamp),
            })
            .collect();

        FeedSnapshot { build_date, items }
    }
}

#[async_trait]
impl FeedSource for RssSource {
    fn name(&self) -> &str {
        &self.url
    }

    async fn fetch(&self) -> Result<FeedSnapshot, FetchError> {
        let response = self
            .client
            .get(&self.url)
            .header(USER_AGENT, &self.user_agent)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status));
        }

        let body = response.bytes().await?;
        let channel = rss::Channel::read_from(body.as_ref())?;
        debug!(url = %self.url, items = channel.items().len(), "feed fetched");
        Ok(Self::parse_channel(&channel))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
