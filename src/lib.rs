use scraper::Html;
use tokio::time::{Duration, Instant};

pub mod config;
pub mod dedup;
pub mod encuestas;
pub mod navigator;
pub mod politeness;
pub mod sink;

mod data;
mod error;
mod utils;

pub use data::Table;
pub use error::{CrawlerError, Fault, NavError};
pub use utils::fmt_duration;

const MAX_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// A browsing session that renders pages and exposes them as document snapshots.
///
/// `find`, `attribute` and `text` are served by `scraper` over the snapshot, so a
/// session only has to load, act and report what it currently shows.
#[async_trait::async_trait]
pub trait Navigator: Send {
    async fn load(&mut self, url: &str) -> Result<(), NavError>;

    /// Current document as rendered HTML.
    async fn snapshot(&mut self) -> Result<String, NavError>;

    /// Click-equivalent on the first element matching `selector`.
    async fn invoke_action(&mut self, selector: &str) -> Result<(), NavError>;

    async fn wait_until<P>(&mut self, predicate: P, timeout: Duration) -> Result<(), NavError>
    where
        P: Fn(&Html) -> bool + Send + Sync,
    {
        let started = Instant::now();
        let interval = (timeout / 4).min(MAX_POLL_INTERVAL);
        loop {
            let html = self.snapshot().await?;
            let satisfied = {
                let doc = Html::parse_document(&html);
                predicate(&doc)
            };
            if satisfied {
                return Ok(());
            }
            if started.elapsed() >= timeout {
                return Err(NavError::TimedOut(timeout, "condition".to_string()));
            }
            tokio::time::sleep(interval).await;
        }
    }

    async fn close(&mut self) -> Result<(), NavError> {
        Ok(())
    }
}

#[async_trait::async_trait]
pub trait NavigatorFactory: Send + Sync {
    type Navigator: Navigator + 'static;

    /// Opens an independent session.
    async fn acquire(&self) -> Result<Self::Navigator, NavError>;
}

/// Durable, append-only destination of records.
#[async_trait::async_trait]
pub trait RecordSink: Send {
    /// Appends one record; it must be durable when this returns.
    async fn append(&mut self, record: &encuestas::Record) -> Result<(), CrawlerError>;

    /// Keys of the records already present in the store.
    async fn existing_keys(&mut self) -> Result<Vec<encuestas::SeenKey>, CrawlerError>;
}
