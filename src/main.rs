//! feed-relay: forwards newly published RSS items to Telegram and Discord.
//!
//! ## Architecture overview
//!
//! ```text
//! ┌───────────┐ FeedSnapshot ┌──────────┐  deliver()  ┌───────────┐
//! │ source/   │ ───────────► │ poll.rs  │ ──────────► │ notify/   │
//! │ (RSS)     │   (fetch)    │ (Poller) │  (spawned)  │ tg / dc   │
//! └───────────┘              └──────────┘             └───────────┘
//!                                 ▲
//!                                 │ ScrapperSettings
//!                            ┌─────────────┐
//!                            │ settings.rs │
//!                            └─────────────┘
//! ```
//!
//! * **`source/`**: the `FeedSource` trait and the RSS implementation.
//! * **`notify/`**: the `Notifier` trait with Telegram and Discord adapters.
//! * **`poll`**: the timer-driven change detection and dispatch loop.
//! * **`settings`**: JSON settings loading and validation.
//! * **`logging`**: `tracing` subscriber setup.
//! * **`main`**: wires everything together and waits for Ctrl-C.

mod logging;
mod notify;
mod poll;
mod settings;
mod source;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::info;

use logging::LogFormat;
use notify::{DiscordNotifier, TelegramNotifier};
use poll::Poller;
use settings::AppSettings;
use source::RssSource;

/// Upper bound for any single HTTP request, so a hung server cannot stall a
/// cycle indefinitely.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Path to the JSON settings file.
    #[arg(short, long, env = "FEED_RELAY_CONFIG", default_value = "config.json")]
    config: PathBuf,

    /// Telegram bot token; overrides `telegram.token` in the settings file.
    #[arg(long, env = "TELEGRAM_BOT_TOKEN", hide_env_values = true)]
    telegram_token: Option<String>,

    /// Discord bot token; overrides `discord.token` in the settings file.
    #[arg(long, env = "DISCORD_BOT_TOKEN", hide_env_values = true)]
    discord_token: Option<String>,

    #[arg(long, env = "FEED_RELAY_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.log_format, "info")?;

    // -- load and validate settings (fatal on error) -------------------------
    let mut raw = AppSettings::read_raw(&cli.config)?;
    if let Some(token) = cli.telegram_token {
        settings::merge(&mut raw, json!({ "telegram": { "token": token } }));
    }
    if let Some(token) = cli.discord_token {
        settings::merge(&mut raw, json!({ "discord": { "token": token } }));
    }
    let settings = AppSettings::from_value(&raw).context("invalid settings")?;

    // -- collaborators -------------------------------------------------------
    let client = reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .context("failed to build HTTP client")?;

    let scrapper = &settings.scrapper;
    let source = RssSource::new(client.clone(), scrapper.url(), scrapper.user_agent());
    let telegram = TelegramNotifier::new(
        client.clone(),
        &settings.telegram.api_url,
        &settings.telegram.token,
    );
    let discord = DiscordNotifier::new(client, &settings.discord.api_url, &settings.discord.token);

    // -- poll until Ctrl-C ---------------------------------------------------
    let cancel = CancellationToken::new();
    let poller = Poller::new(
        scrapper,
        Box::new(source),
        Arc::new(telegram),
        Arc::new(discord),
        cancel.clone(),
    );

    info!(
        url = scrapper.url(),
        telegram = scrapper.chat_id().telegram.len(),
        discord = scrapper.chat_id().discord.len(),
        "relay starting"
    );
    let task = tokio::spawn(poller.run());

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("shutdown requested");
    cancel.cancel();
    task.await.context("poller task failed")?;

    Ok(())
}
