//! Append-only record stores.

use crate::encuestas::{Record, SeenKey, RECORD_HEADERS};
use crate::{CrawlerError, RecordSink};
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// CSV file with a fixed header. Never truncated or rewritten.
pub struct CsvSink {
    path: PathBuf,
    writer: csv::Writer<File>,
}

impl CsvSink {
    /// Opens `path` for appending, writing the header when the file is new or empty.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<CsvSink, CrawlerError> {
        let path = path.as_ref().to_path_buf();
        let is_new = fs::metadata(&path).map(|m| m.len() == 0).unwrap_or(true);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        if is_new {
            writer.write_record(RECORD_HEADERS)?;
            writer.flush()?;
            debug!("Created {}", path.display());
        }
        Ok(CsvSink { path, writer })
    }

    /// Every record currently stored at `path`, in file order.
    pub fn read_all<P: AsRef<Path>>(path: P) -> Result<Vec<Record>, CrawlerError> {
        let mut reader = csv::Reader::from_path(path)?;
        let mut records = vec![];
        for record in reader.deserialize() {
            records.push(record?);
        }
        Ok(records)
    }
}

#[async_trait::async_trait]
impl RecordSink for CsvSink {
    async fn append(&mut self, record: &Record) -> Result<(), CrawlerError> {
        self.writer.serialize(record)?;
        self.writer.flush()?;
        Ok(())
    }

    async fn existing_keys(&mut self) -> Result<Vec<SeenKey>, CrawlerError> {
        Ok(CsvSink::read_all(&self.path)?
            .iter()
            .map(Record::seen_key)
            .collect())
    }
}

/// In-process store. Clones share the same records.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    records: Arc<Mutex<Vec<Record>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: Vec<Record>) -> Self {
        MemorySink {
            records: Arc::new(Mutex::new(records)),
        }
    }

    pub fn records(&self) -> Vec<Record> {
        match self.records.lock() {
            Ok(records) => records.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait::async_trait]
impl RecordSink for MemorySink {
    async fn append(&mut self, record: &Record) -> Result<(), CrawlerError> {
        match self.records.lock() {
            Ok(mut records) => records.push(record.clone()),
            Err(poisoned) => poisoned.into_inner().push(record.clone()),
        }
        Ok(())
    }

    async fn existing_keys(&mut self) -> Result<Vec<SeenKey>, CrawlerError> {
        Ok(self.records().iter().map(Record::seen_key).collect())
    }
}
