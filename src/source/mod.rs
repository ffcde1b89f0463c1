//! Feed source abstraction layer.
//!
//! This module defines the [`FeedSource`] trait and the [`FeedSnapshot`] it
//! produces.  Concrete implementations live in sub-modules (currently only
//! [`rss`]).
//!
//! ## Adding a new source
//!
//! 1. Create a new file in this directory (e.g. `atom.rs`).
//! 2. Define a struct and implement [`FeedSource`] for it.
//! 3. Add `mod atom;` below and re-export your struct in the `pub use` block.
//! 4. Construct it in `main.rs` instead of [`RssSource`].
//!
//! The poll loop only ever sees a [`FeedSnapshot`], so change detection and
//! dispatch stay source-agnostic.

mod feed_item;
mod rss;

pub use self::feed_item::{parse_timestamp, FeedItem, FeedSnapshot};
pub use self::rss::RssSource;

use async_trait::async_trait;
use thiserror::Error;

/// Why a fetch did not produce a snapshot.
///
/// The poller logs these and retries on the next tick; none of them are fatal.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("feed responded with HTTP {0}")]
    Status(reqwest::StatusCode),

    #[error("feed could not be parsed: {0}")]
    Parse(#[from] ::rss::Error),
}

/// Trait that every feed source must implement.
///
/// The poller calls [`fetch()`](FeedSource::fetch) once per cycle and awaits
/// it before deciding what is new.
#[async_trait]
pub trait FeedSource: Send + Sync {
    /// Human-readable label used in log output.
    fn name(&self) -> &str;

    /// Fetch and parse the feed.
    async fn fetch(&self) -> Result<FeedSnapshot, FetchError>;
}
