//! SQLite-backed [`SnapshotStore`], for the "periodic checkpoint to
//! durable storage" deployments where an in-process `InMemorySnapshotStore`
//! would lose history on restart. Mirrors the repository-over-`SqlitePool`
//! idiom the pack's own orchestrator service uses for its checkpoint
//! table (bind params, `RETURNING *`, `FromRow`).

use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{FromRow, SqlitePool};

use crate::error::Result;
use crate::traits::{SnapshotRecord, SnapshotStore};

#[derive(Debug, Clone, FromRow)]
struct SnapshotRow {
    execution_id: String,
    seq: i64,
    body: Vec<u8>,
    created_at: String,
}

impl From<SnapshotRow> for SnapshotRecord {
    fn from(row: SnapshotRow) -> Self {
        Self { execution_id: row.execution_id, seq: row.seq as u64, body: row.body, created_at: row.created_at }
    }
}

pub struct SqliteSnapshotStore {
    pool: SqlitePool,
}

impl SqliteSnapshotStore {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new().max_connections(5).connect(database_url).await?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS snapshots (
                execution_id TEXT NOT NULL,
                seq INTEGER NOT NULL,
                body BLOB NOT NULL,
                created_at TEXT NOT NULL,
                PRIMARY KEY (execution_id, seq)
            )",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl SnapshotStore for SqliteSnapshotStore {
    async fn put(&self, record: SnapshotRecord) -> Result<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO snapshots (execution_id, seq, body, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&record.execution_id)
        .bind(record.seq as i64)
        .bind(&record.body)
        .bind(&record.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_latest(&self, execution_id: &str) -> Result<Option<SnapshotRecord>> {
        let row = sqlx::query_as::<_, SnapshotRow>(
            "SELECT * FROM snapshots WHERE execution_id = ? ORDER BY seq DESC LIMIT 1",
        )
        .bind(execution_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(SnapshotRecord::from))
    }

    async fn list(&self, execution_id: &str) -> Result<Vec<SnapshotRecord>> {
        let rows = sqlx::query_as::<_, SnapshotRow>(
            "SELECT * FROM snapshots WHERE execution_id = ? ORDER BY seq ASC",
        )
        .bind(execution_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(SnapshotRecord::from).collect())
    }

    async fn delete(&self, execution_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM snapshots WHERE execution_id = ?").bind(execution_id).execute(&self.pool).await?;
        Ok(())
    }
}
