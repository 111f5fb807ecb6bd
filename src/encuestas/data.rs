use super::{Record, SeenKey};
use crate::{utils, CrawlerError, RecordSink, Table};
use futures::TryStreamExt;
use sqlx::{sqlite::SqliteConnectOptions, Row, SqlitePool};
use std::path::Path;
use tracing::debug;

pub struct RecordTable {
    name: String,
    pool: SqlitePool,
}

#[async_trait::async_trait]
impl Table for RecordTable {
    type Record<'a> = &'a Record;

    fn get_name(&self) -> &str {
        self.name.as_str()
    }

    fn get_pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn create(&self) -> Result<(), sqlx::Error> {
        if !utils::is_table_exists(self.get_pool(), &self.name).await? {
            let query = format!(
                r#"
                        CREATE TABLE {} (
                            id INTEGER PRIMARY KEY AUTOINCREMENT,
                            created_at DATETIME,
                            term TEXT NOT NULL,
                            department TEXT NOT NULL,
                            department_url TEXT NOT NULL,
                            subject TEXT NOT NULL,
                            subject_url TEXT NOT NULL,
                            row_id TEXT NOT NULL,
                            comment TEXT NOT NULL
                        )
                    "#,
                &self.name
            );
            sqlx::query(query.as_str()).execute(self.get_pool()).await?;
            debug!("Created {}", self.name);
        }
        Ok(())
    }

    async fn insert<'a>(&self, record: Self::Record<'a>) -> Result<(), sqlx::Error> {
        let mut tx = self.get_pool().begin().await?;
        let query = format!(
            r#"INSERT INTO {} (
                term,
                department,
                department_url,
                subject,
                subject_url,
                row_id,
                comment,
                created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#,
            self.name
        );
        sqlx::query(&query)
            .bind(&record.term_label)
            .bind(&record.department_name)
            .bind(&record.department_url)
            .bind(&record.subject_name)
            .bind(&record.subject_url)
            .bind(&record.row_id)
            .bind(&record.comment_text)
            .bind(utils::get_now())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }
}

impl RecordTable {
    pub async fn keys(&self) -> Result<Vec<SeenKey>, sqlx::Error> {
        let query = format!(
            "SELECT subject_url, row_id, comment FROM {} ORDER BY id",
            self.name
        );
        let mut keys = vec![];
        let mut rows = sqlx::query(&query).fetch(self.get_pool());
        while let Some(row) = rows.try_next().await? {
            keys.push(SeenKey {
                subject_url: row.try_get("subject_url")?,
                row_id: row.try_get("row_id")?,
                comment_text: row.try_get("comment")?,
            });
        }
        Ok(keys)
    }

    pub async fn records(&self) -> Result<Vec<Record>, sqlx::Error> {
        let query = format!(
            "SELECT term, department, department_url, subject, subject_url, row_id, comment
             FROM {} ORDER BY id",
            self.name
        );
        let mut records = vec![];
        let mut rows = sqlx::query(&query).fetch(self.get_pool());
        while let Some(row) = rows.try_next().await? {
            records.push(Record {
                term_label: row.try_get("term")?,
                department_name: row.try_get("department")?,
                department_url: row.try_get("department_url")?,
                subject_name: row.try_get("subject")?,
                subject_url: row.try_get("subject_url")?,
                row_id: row.try_get("row_id")?,
                comment_text: row.try_get("comment")?,
            });
        }
        Ok(records)
    }
}

/// Records stored in a SQLite database, one committed transaction per record.
pub struct SqliteSink {
    pub records: RecordTable,
}

impl SqliteSink {
    pub async fn new<P: AsRef<Path>>(path: P) -> Result<SqliteSink, CrawlerError> {
        let opt = SqliteConnectOptions::new()
            .filename(path.as_ref())
            .create_if_missing(true);
        let pool = SqlitePool::connect_with(opt).await?;
        let sink = SqliteSink {
            records: RecordTable {
                name: "records".to_string(),
                pool,
            },
        };
        sink.records.create().await?;
        Ok(sink)
    }
}

#[async_trait::async_trait]
impl RecordSink for SqliteSink {
    async fn append(&mut self, record: &Record) -> Result<(), CrawlerError> {
        Ok(self.records.insert(record).await?)
    }

    async fn existing_keys(&mut self) -> Result<Vec<SeenKey>, CrawlerError> {
        Ok(self.records.keys().await?)
    }
}
