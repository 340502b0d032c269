use std::str::FromStr;

use anyhow::Result;
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};

use crate::db::models::GenerationRow;
use crate::paperdoll::ports::{GenerationRecord, HistoryStore};

const WRITER_QUEUE_CAPACITY: usize = 1000;

enum WriterCommand {
    Insert(Vec<GenerationRecord>),
    Flush(oneshot::Sender<()>),
}

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
    sender: mpsc::Sender<WriterCommand>,
}

impl Database {
    pub async fn init(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        // Every in-memory connection is its own database.
        let max_connections = if database_url.contains(":memory:") { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS generations (\
                id INTEGER PRIMARY KEY AUTOINCREMENT,\
                owner TEXT NOT NULL,\
                features_summary TEXT NOT NULL,\
                style_id TEXT NOT NULL,\
                line_art_url TEXT,\
                color_url TEXT,\
                created_at TEXT NOT NULL\
            );",
        )
        .execute(&pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_generations_owner_created ON generations(owner, created_at);",
        )
        .execute(&pool)
        .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_generations_created ON generations(created_at);")
            .execute(&pool)
            .await?;

        info!("Database tables created successfully");

        let (sender, receiver) = mpsc::channel(WRITER_QUEUE_CAPACITY);
        let writer_pool = pool.clone();
        tokio::spawn(async move {
            db_writer(writer_pool, receiver).await;
        });

        info!("Database writer task started");

        Ok(Database { pool, sender })
    }

    pub async fn queue_generations(&self, records: Vec<GenerationRecord>) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        self.sender
            .send(WriterCommand::Insert(records))
            .await
            .map_err(|err| anyhow::anyhow!("Failed to queue generation insert: {err}"))
    }

    /// Resolves once every insert queued before this call has been applied.
    pub async fn flush(&self) -> Result<()> {
        let (done_tx, done_rx) = oneshot::channel();
        self.sender
            .send(WriterCommand::Flush(done_tx))
            .await
            .map_err(|err| anyhow::anyhow!("Failed to queue flush: {err}"))?;
        done_rx
            .await
            .map_err(|_| anyhow::anyhow!("Database writer stopped before flush"))
    }

    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    pub fn queue_len(&self) -> usize {
        self.sender
            .max_capacity()
            .saturating_sub(self.sender.capacity())
    }

    pub async fn list_by_owner(&self, owner: &str, limit: i64) -> Result<Vec<GenerationRow>> {
        let rows = sqlx::query_as::<_, GenerationRow>(
            "SELECT id, owner, features_summary, style_id, line_art_url, color_url, created_at \
             FROM generations WHERE owner = ? ORDER BY created_at DESC, id DESC LIMIT ?",
        )
        .bind(owner)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Public gallery: newest records across all owners.
    pub async fn list_recent(&self, limit: i64) -> Result<Vec<GenerationRow>> {
        let rows = sqlx::query_as::<_, GenerationRow>(
            "SELECT id, owner, features_summary, style_id, line_art_url, color_url, created_at \
             FROM generations ORDER BY created_at DESC, id DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

#[async_trait]
impl HistoryStore for Database {
    async fn record_generations(&self, records: Vec<GenerationRecord>) -> Result<()> {
        self.queue_generations(records).await
    }
}

async fn insert_batch(pool: &SqlitePool, records: Vec<GenerationRecord>) -> Result<()> {
    let mut tx = pool.begin().await?;
    for record in records {
        sqlx::query(
            "INSERT INTO generations (owner, features_summary, style_id, line_art_url, color_url, created_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(record.owner)
        .bind(record.features_summary)
        .bind(record.style_id)
        .bind(record.line_art_url)
        .bind(record.color_url)
        .bind(record.created_at)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;
    Ok(())
}

async fn db_writer(pool: SqlitePool, mut receiver: mpsc::Receiver<WriterCommand>) {
    while let Some(command) = receiver.recv().await {
        match command {
            WriterCommand::Insert(records) => {
                let count = records.len();
                if let Err(err) = insert_batch(&pool, records).await {
                    warn!("Error in db_writer ({count} generation rows dropped): {err}");
                }
            }
            WriterCommand::Flush(done) => {
                let _ = done.send(());
            }
        }
    }

    let _ = pool.close().await;
    info!("Database writer task stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn record(owner: &str, style: &str, minutes: i64) -> GenerationRecord {
        GenerationRecord {
            owner: owner.to_string(),
            features_summary: format!("{owner} summary"),
            style_id: style.to_string(),
            line_art_url: Some(format!("file:///x/{owner}-{style}-lineart.png")),
            color_url: None,
            created_at: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
                + Duration::minutes(minutes),
        }
    }

    #[tokio::test]
    async fn queued_records_are_listed_newest_first() {
        let db = Database::init("sqlite::memory:").await.unwrap();
        db.health_check().await.unwrap();

        db.record_generations(vec![record("7", "simple", 0), record("7", "sd", 5)])
            .await
            .unwrap();
        db.record_generations(vec![record("8", "noir", 10)]).await.unwrap();
        db.flush().await.unwrap();

        let mine = db.list_by_owner("7", 20).await.unwrap();
        let styles: Vec<&str> = mine.iter().map(|row| row.style_id.as_str()).collect();
        assert_eq!(styles, vec!["sd", "simple"]);
        assert_eq!(mine[0].features_summary, "7 summary");
        assert_eq!(mine[0].preview_url(), Some("file:///x/7-sd-lineart.png"));

        let gallery = db.list_recent(2).await.unwrap();
        let owners: Vec<&str> = gallery.iter().map(|row| row.owner.as_str()).collect();
        assert_eq!(owners, vec!["8", "7"]);
    }

    #[tokio::test]
    async fn empty_batches_are_ignored() {
        let db = Database::init("sqlite::memory:").await.unwrap();
        db.record_generations(Vec::new()).await.unwrap();
        db.flush().await.unwrap();
        assert!(db.list_recent(10).await.unwrap().is_empty());
        assert_eq!(db.queue_len(), 0);
    }
}
