//! The aggregation loop: one claimed feed per tick, fetched and ingested
//! before the next wait begins.

mod interval;

pub use interval::{parse_interval, IntervalError};

use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::time::MissedTickBehavior;

use crate::feed::{ingest_document, FeedFetcher, FetchError, IngestReport};
use crate::storage::{Feed, FeedStore, StoreError};

/// Errors that stop the loop.
///
/// Fetch failures are not among them: they end the tick, not the loop.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("couldn't claim next feed: {0}")]
    Claim(#[source] StoreError),
}

/// What one tick did with the feed it claimed.
#[derive(Debug)]
pub struct FetchOutcome {
    pub feed: Feed,
    pub result: Result<IngestReport, FetchError>,
}

impl FetchOutcome {
    /// Report the tick: `info` with the ingestion counts, or `error` with the fetch failure.
    pub fn log(&self) {
        match &self.result {
            Ok(report) => tracing::info!(
                feed = %self.feed.name,
                inserted = report.inserted,
                skipped = report.skipped,
                failed = report.failed,
                "Feed collected"
            ),
            Err(e) => tracing::error!(
                feed = %self.feed.name,
                url = %self.feed.url,
                error = %e,
                "Failed to fetch feed"
            ),
        }
    }
}

pub struct Scheduler<S> {
    store: S,
    fetcher: FeedFetcher,
    interval: Duration,
}

impl<S: FeedStore> Scheduler<S> {
    pub fn new(store: S, fetcher: FeedFetcher, interval: Duration) -> Self {
        Self {
            store,
            fetcher,
            interval,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Claim the least recently fetched feed, fetch it and store its items.
    ///
    /// # Errors
    ///
    /// Only a failed claim (including "no feeds") is returned as an error.
    /// A fetch or parse failure is part of the returned [`FetchOutcome`].
    pub async fn tick(&self) -> Result<FetchOutcome, SchedulerError> {
        let feed = self
            .store
            .claim_next_feed()
            .await
            .map_err(SchedulerError::Claim)?;
        tracing::debug!(feed = %feed.name, url = %feed.url, "Claimed feed");

        let result = match self.fetcher.fetch(&feed.url).await {
            Ok(doc) => {
                let report = ingest_document(&self.store, &feed, &doc).await;
                if let Err(e) = self.store.mark_fetched(feed.id).await {
                    tracing::warn!(feed = %feed.name, error = %e, "Failed to record fetch completion");
                }
                Ok(report)
            }
            Err(e) => Err(e),
        };

        let outcome = FetchOutcome { feed, result };
        outcome.log();
        Ok(outcome)
    }

    /// Tick forever. Returns only when a claim fails.
    pub async fn run(&self) -> Result<(), SchedulerError> {
        self.run_until(std::future::pending()).await
    }

    /// Tick until `shutdown` resolves.
    ///
    /// The first tick is immediate. A tick that overruns the interval delays
    /// the next one rather than causing a burst. `shutdown` is only observed
    /// between ticks, so an in-flight tick always completes.
    pub async fn run_until<F>(&self, shutdown: F) -> Result<(), SchedulerError>
    where
        F: Future<Output = ()>,
    {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    tracing::info!("Shutdown requested, stopping aggregation");
                    return Ok(());
                }
                _ = ticker.tick() => {}
            }

            self.tick().await?;
        }
    }
}
