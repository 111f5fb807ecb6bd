use crate::encuestas::{Record, SeenKey};
use crate::{CrawlerError, RecordSink};
use std::collections::HashSet;
use tokio::sync::Mutex;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum DedupPolicy {
    /// Start every process with an empty key set.
    #[default]
    AppendAlways,
    /// Seed the key set with the records already in the store.
    LoadExisting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Offer {
    Written,
    Duplicate,
}

struct Inner<S> {
    seen: HashSet<SeenKey>,
    sink: S,
    written: u64,
    duplicates: u64,
}

/// Run-scoped key set in front of a sink.
///
/// The membership check, the append and the key insertion happen under one
/// lock, so concurrent offers of the same key write at most once and appends
/// never interleave.
pub struct Deduplicator<S> {
    inner: Mutex<Inner<S>>,
}

impl<S: RecordSink> Deduplicator<S> {
    pub fn new(sink: S) -> Self {
        Deduplicator {
            inner: Mutex::new(Inner {
                seen: HashSet::new(),
                sink,
                written: 0,
                duplicates: 0,
            }),
        }
    }

    pub async fn with_policy(mut sink: S, policy: DedupPolicy) -> Result<Self, CrawlerError> {
        let seen: HashSet<SeenKey> = match policy {
            DedupPolicy::AppendAlways => HashSet::new(),
            DedupPolicy::LoadExisting => sink.existing_keys().await?.into_iter().collect(),
        };
        info!("Dedup policy {:?}, {} known keys", policy, seen.len());
        Ok(Deduplicator {
            inner: Mutex::new(Inner {
                seen,
                sink,
                written: 0,
                duplicates: 0,
            }),
        })
    }

    pub async fn offer(&self, record: Record) -> Result<Offer, CrawlerError> {
        let key = record.seen_key();
        let mut inner = self.inner.lock().await;
        if inner.seen.contains(&key) {
            inner.duplicates += 1;
            debug!(
                subject = %record.subject_url,
                row_id = %record.row_id,
                "Duplicate record skipped"
            );
            return Ok(Offer::Duplicate);
        }
        inner.sink.append(&record).await?;
        inner.seen.insert(key);
        inner.written += 1;
        Ok(Offer::Written)
    }

    pub async fn written(&self) -> u64 {
        self.inner.lock().await.written
    }

    pub async fn duplicates(&self) -> u64 {
        self.inner.lock().await.duplicates
    }
}
