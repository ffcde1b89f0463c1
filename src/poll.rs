//! Feed polling, change detection and dispatch.
//!
//! [`Poller`] owns the only piece of mutable state in the relay: the
//! high-water mark (`last_seen`), the most recent feed build date it has
//! processed.  Each cycle fetches the feed, decides which items are newer than
//! the mark, fans notifications out to every destination and then moves the
//! mark to the fetched build date.
//!
//! ## Ordering
//!
//! Cycles run one after another on a single task, so the mark needs no lock.
//! Deliveries are spawned as independent tasks and may still be in flight
//! when the next cycle starts; they never touch the mark.
//!
//! ## First cycle
//!
//! Without a seed the mark starts empty and the first cycle only records the
//! build date.  Nothing is sent until the feed changes after that.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::notify::{DeliveryError, Notifier};
use crate::settings::ScrapperSettings;
use crate::source::{FeedItem, FeedSource, FetchError};

/// One transport and the destinations it should deliver to.
struct Route {
    notifier: Arc<dyn Notifier>,
    destinations: Vec<String>,
}

/// Outcome of a single delivery task.
#[derive(Debug)]
pub struct Delivery {
    pub transport: &'static str,
    pub destination: String,
    pub result: Result<(), DeliveryError>,
}

/// Handles to the delivery tasks spawned by one cycle.
///
/// Dropping this detaches the tasks; they keep running until they finish or
/// the poller's cancellation token fires.
#[derive(Debug, Default)]
pub struct Dispatch {
    tasks: Vec<JoinHandle<Delivery>>,
}

impl Dispatch {
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Wait for every delivery.  Completion order is not meaningful.
    pub async fn join(self) -> Vec<Delivery> {
        let mut deliveries = Vec::with_capacity(self.tasks.len());
        for task in self.tasks {
            match task.await {
                Ok(delivery) => deliveries.push(delivery),
                Err(e) => warn!(error = %e, "delivery task did not complete"),
            }
        }
        deliveries
    }
}

/// What a single cycle did.
#[derive(Debug)]
pub struct Cycle {
    /// High-water mark the cycle compared against.
    pub previous: Option<DateTime<Utc>>,
    /// Build date reported by the feed.
    pub build_date: Option<DateTime<Utc>>,
    pub new_items: usize,
    pub dispatch: Dispatch,
}

pub struct Poller {
    source: Box<dyn FeedSource>,
    routes: Vec<Route>,
    interval: Duration,
    last_seen: Option<DateTime<Utc>>,
    cancel: CancellationToken,
}

impl Poller {
    pub fn new(
        settings: &ScrapperSettings,
        source: Box<dyn FeedSource>,
        telegram: Arc<dyn Notifier>,
        discord: Arc<dyn Notifier>,
        cancel: CancellationToken,
    ) -> Self {
        let routes = vec![
            Route {
                notifier: telegram,
                destinations: settings.chat_id().telegram.clone(),
            },
            Route {
                notifier: discord,
                destinations: settings.chat_id().discord.clone(),
            },
        ];

        Self {
            source,
            routes,
            interval: settings.interval(),
            last_seen: settings.seed(),
            cancel,
        }
    }

    /// The current high-water mark.
    pub fn last_seen(&self) -> Option<DateTime<Utc>> {
        self.last_seen
    }

    /// Run one fetch, detect, dispatch, advance cycle.
    ///
    /// On a fetch error the mark is left untouched and nothing is sent.
    pub async fn poll_once(&mut self) -> Result<Cycle, FetchError> {
        let snapshot = self.source.fetch().await?;
        let previous = self.last_seen;
        let build_date = snapshot.build_date;

        let fresh: Vec<&FeedItem> = match (previous, build_date) {
            (Some(seen), Some(built)) if built > seen => snapshot
                .items
                .iter()
                .filter(|item| item.published.is_some_and(|published| published > seen))
                .collect(),
            _ => Vec::new(),
        };

        let mut dispatch = Dispatch::default();
        for item in &fresh {
            info!(
                title = %item.title.trim(),
                published = ?item.published,
                "new post found"
            );
            let text: Arc<str> = render_message(item).into();
            for route in &self.routes {
                for destination in &route.destinations {
                    dispatch.tasks.push(spawn_delivery(
                        Arc::clone(&route.notifier),
                        destination.clone(),
                        Arc::clone(&text),
                        self.cancel.clone(),
                    ));
                }
            }
        }

        match build_date {
            Some(built) => {
                if previous.is_none() {
                    info!(build_date = %built, "baseline established");
                }
                self.last_seen = Some(built);
            }
            None => warn!(
                source = self.source.name(),
                "feed has no readable build date; keeping high-water mark"
            ),
        }

        Ok(Cycle {
            previous,
            build_date,
            new_items: fresh.len(),
            dispatch,
        })
    }

    /// Poll forever at the configured interval until cancelled.
    ///
    /// The first cycle runs immediately.  A slow cycle delays the next tick
    /// rather than overlapping it.
    pub async fn run(mut self) {
        let cancel = self.cancel.clone();
        let mut timer = tokio::time::interval(self.interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            source = self.source.name(),
            interval_secs = self.interval.as_secs(),
            "poller started"
        );

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = timer.tick() => {
                    // A fetch can hang until the request timeout; shutdown
                    // must not wait for it.
                    let outcome = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => break,
                        outcome = self.poll_once() => outcome,
                    };
                    match outcome {
                        Ok(cycle) => {
                            debug!(
                                previous = ?cycle.previous,
                                build_date = ?cycle.build_date,
                                new_items = cycle.new_items,
                                deliveries = cycle.dispatch.len(),
                                "cycle complete"
                            );
                            if !cycle.dispatch.is_empty() {
                                tokio::spawn(report(cycle.dispatch));
                            }
                        }
                        Err(e) => error!(
                            source = self.source.name(),
                            error = %e,
                            "feed fetch failed; retrying next tick"
                        ),
                    }
                }
            }
        }

        info!("poller stopped");
    }
}

/// Message body for an item: trimmed title, then trimmed link.
pub fn render_message(item: &FeedItem) -> String {
    let title = item.title.trim();
    match item.link.as_deref().map(str::trim) {
        Some(link) if !link.is_empty() => format!("{title}\n{link}"),
        _ => title.to_string(),
    }
}

/// Summarise a cycle's deliveries once they settle, off the poll task.
async fn report(dispatch: Dispatch) {
    let deliveries = dispatch.join().await;
    let failed = failed_routes(&deliveries);

    let delivered = deliveries.len() - failed.len();
    if failed.is_empty() {
        debug!(delivered, "dispatch settled");
    } else {
        warn!(delivered, failed = ?failed, "dispatch settled with failures");
    }
}

/// `transport:destination` for every delivery that did not succeed.
fn failed_routes(deliveries: &[Delivery]) -> Vec<String> {
    deliveries
        .iter()
        .filter(|d| d.result.is_err())
        .map(|d| format!("{}:{}", d.transport, d.destination))
        .collect()
}

fn spawn_delivery(
    notifier: Arc<dyn Notifier>,
    destination: String,
    text: Arc<str>,
    cancel: CancellationToken,
) -> JoinHandle<Delivery> {
    tokio::spawn(async move {
        let transport = notifier.name();
        let result = tokio::select! {
            _ = cancel.cancelled() => Err(DeliveryError::Cancelled),
            result = notifier.deliver(&destination, &text) => result,
        };

        match &result {
            Ok(()) => debug!(transport, destination = %destination, "delivered"),
            Err(DeliveryError::Cancelled) => {
                debug!(transport, destination = %destination, "delivery cancelled")
            }
            Err(e) => warn!(
                transport,
                destination = %destination,
                error = %e,
                "delivery failed"
            ),
        }

        Delivery {
            transport,
            destination,
            result,
        }
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
