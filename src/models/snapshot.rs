use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;

use crate::db::PersistenceLayer;
use crate::error::LedgerError;

/// One row of a batched balance snapshot. Spec section 3.
#[derive(Debug, Clone, serde::Serialize, sqlx::FromRow)]
pub struct BackupRow {
    pub id: i64,
    pub snapshot_id: String,
    pub player_uuid: String,
    pub player_name: String,
    pub currency_id: i32,
    pub balance: Decimal,
    pub memo: String,
    pub created_at: DateTime<Utc>,
}

/// Representative summary of a snapshot batch, for admin listing.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SnapshotSummary {
    pub snapshot_id: String,
    pub memo: String,
    pub created_at: DateTime<Utc>,
    pub row_count: i64,
}

/// Grounded on `Trade::settle`'s batched-transaction insert shape, generalized
/// to one-row-per-account batch inserts under a shared snapshot id.
pub struct SnapshotRepo<'a> {
    persistence: &'a PersistenceLayer,
}

impl<'a> SnapshotRepo<'a> {
    pub fn new(persistence: &'a PersistenceLayer) -> Self {
        Self { persistence }
    }

    fn pool(&self) -> Result<&PgPool, LedgerError> {
        self.persistence.require_ready()?;
        Ok(self.persistence.pool())
    }

    /// Batch-insert one row per `(player_name, player_uuid, currency_id, balance)`
    /// tuple, all sharing `snapshot_id`/`memo`/`created_at`.
    pub async fn insert_batch(
        &self,
        snapshot_id: &str,
        memo: &str,
        rows: &[(String, String, i32, Decimal)],
    ) -> Result<(), LedgerError> {
        if rows.is_empty() {
            return Err(LedgerError::SnapshotEmpty);
        }
        let pool = self.pool()?;
        let mut tx = pool.begin().await?;
        let created_at = Utc::now();
        for (player_name, player_uuid, currency_id, balance) in rows {
            sqlx::query(
                "INSERT INTO backup_snapshot
                    (snapshot_id, player_uuid, player_name, currency_id, balance, memo, created_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7)",
            )
            .bind(snapshot_id)
            .bind(player_uuid)
            .bind(player_name)
            .bind(currency_id)
            .bind(balance)
            .bind(memo)
            .bind(created_at)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn rows_for_snapshot(&self, snapshot_id: &str) -> Result<Vec<BackupRow>, LedgerError> {
        let rows = sqlx::query_as::<_, BackupRow>(
            "SELECT * FROM backup_snapshot WHERE snapshot_id = $1 ORDER BY id",
        )
        .bind(snapshot_id)
        .fetch_all(self.pool()?)
        .await?;
        Ok(rows)
    }

    pub async fn rows_for_snapshot_and_player(
        &self,
        snapshot_id: &str,
        player_name: &str,
    ) -> Result<Vec<BackupRow>, LedgerError> {
        let rows = sqlx::query_as::<_, BackupRow>(
            "SELECT * FROM backup_snapshot WHERE snapshot_id = $1 AND player_name = $2 ORDER BY id",
        )
        .bind(snapshot_id)
        .bind(player_name)
        .fetch_all(self.pool()?)
        .await?;
        Ok(rows)
    }

    pub async fn list_snapshots(&self) -> Result<Vec<SnapshotSummary>, LedgerError> {
        let rows: Vec<(String, String, DateTime<Utc>, i64)> = sqlx::query_as(
            "SELECT snapshot_id, memo, MIN(created_at) as created_at, COUNT(*) as row_count
             FROM backup_snapshot
             GROUP BY snapshot_id, memo
             ORDER BY created_at DESC",
        )
        .fetch_all(self.pool()?)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(snapshot_id, memo, created_at, row_count)| SnapshotSummary {
                snapshot_id,
                memo,
                created_at,
                row_count,
            })
            .collect())
    }

    pub async fn count_snapshots(&self) -> Result<i64, LedgerError> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(DISTINCT snapshot_id) FROM backup_snapshot")
                .fetch_one(self.pool()?)
                .await?;
        Ok(count)
    }

    pub async fn delete_snapshot(&self, snapshot_id: &str) -> Result<(), LedgerError> {
        sqlx::query("DELETE FROM backup_snapshot WHERE snapshot_id = $1")
            .bind(snapshot_id)
            .execute(self.pool()?)
            .await?;
        Ok(())
    }

    /// Delete the oldest snapshot ids until at most `max_snapshots` remain.
    pub async fn enforce_retention(&self, max_snapshots: usize) -> Result<Vec<String>, LedgerError> {
        let summaries = self.list_snapshots().await?;
        if summaries.len() <= max_snapshots {
            return Ok(Vec::new());
        }
        let to_delete = &summaries[max_snapshots..];
        let mut deleted = Vec::new();
        for summary in to_delete {
            self.delete_snapshot(&summary.snapshot_id).await?;
            deleted.push(summary.snapshot_id.clone());
        }
        Ok(deleted)
    }
}
