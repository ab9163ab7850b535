//! Snapshot/rollback engine. Spec section 4.7. Grounded on `Trade::settle`'s
//! batched-transaction shape (via `models::snapshot::SnapshotRepo`) for
//! capture, and on `AccountRepo::force_update` for restore, since a rollback
//! must win against concurrent cached-path writers rather than clobber them.

use std::sync::Arc;

use rust_decimal::Decimal;

use crate::account_store::AccountStore;
use crate::db::PersistenceLayer;
use crate::error::LedgerError;
use crate::models::{AccountRepo, AuditRepo, SnapshotRepo, SnapshotSummary, TransactionType};
use crate::registry::CurrencyRegistry;

pub struct BackupEngine {
    persistence: Arc<PersistenceLayer>,
    registry: Arc<CurrencyRegistry>,
    account_store: Arc<AccountStore>,
    max_snapshots: usize,
}

impl BackupEngine {
    pub fn new(
        persistence: Arc<PersistenceLayer>,
        registry: Arc<CurrencyRegistry>,
        account_store: Arc<AccountStore>,
        max_snapshots: usize,
    ) -> Self {
        Self {
            persistence,
            registry,
            account_store,
            max_snapshots,
        }
    }

    /// Snapshot every account row, including zero-balance ones, under a fresh
    /// opaque id. Enforces retention after capture so a flood of snapshots
    /// cannot grow `backup_snapshot` without bound.
    pub async fn create_snapshot(&self, memo: &str) -> Result<String, LedgerError> {
        self.persistence.require_ready()?;
        let snapshot_id = uuid::Uuid::new_v4().to_string();
        let accounts = AccountRepo::new(&self.persistence).list_all().await?;

        let rows: Vec<(String, String, i32, Decimal)> = accounts
            .into_iter()
            .map(|a| (a.player_name, a.player_uuid, a.currency_id, a.balance))
            .collect();

        let repo = SnapshotRepo::new(&self.persistence);
        repo.insert_batch(&snapshot_id, memo, &rows).await?;

        let deleted = repo.enforce_retention(self.max_snapshots).await?;
        if !deleted.is_empty() {
            tracing::info!(count = deleted.len(), "backup retention evicted oldest snapshots");
        }

        tracing::info!(snapshot_id, rows = rows.len(), "created backup snapshot");
        Ok(snapshot_id)
    }

    pub async fn list_snapshots(&self) -> Result<Vec<SnapshotSummary>, LedgerError> {
        self.persistence.require_ready()?;
        SnapshotRepo::new(&self.persistence).list_snapshots().await
    }

    /// Restore every row captured in `snapshot_id`, ledger-wide.
    pub async fn rollback(&self, snapshot_id: &str) -> Result<usize, LedgerError> {
        self.persistence.require_ready()?;
        let rows = SnapshotRepo::new(&self.persistence).rows_for_snapshot(snapshot_id).await?;
        if rows.is_empty() {
            return Err(LedgerError::SnapshotNotFound(snapshot_id.to_string()));
        }
        self.restore_rows(snapshot_id, rows).await
    }

    /// Restore only `player_name`'s rows captured in `snapshot_id`.
    pub async fn rollback_player(
        &self,
        snapshot_id: &str,
        player_name: &str,
    ) -> Result<usize, LedgerError> {
        self.persistence.require_ready()?;
        let rows = SnapshotRepo::new(&self.persistence)
            .rows_for_snapshot_and_player(snapshot_id, player_name)
            .await?;
        if rows.is_empty() {
            return Err(LedgerError::SnapshotNotFound(snapshot_id.to_string()));
        }
        self.restore_rows(snapshot_id, rows).await
    }

    async fn restore_rows(
        &self,
        snapshot_id: &str,
        rows: Vec<crate::models::BackupRow>,
    ) -> Result<usize, LedgerError> {
        let account_repo = AccountRepo::new(&self.persistence);
        let audit_repo = AuditRepo::new(&self.persistence);
        let reason = format!("rollback:{snapshot_id}");
        let mut restored = 0usize;

        for row in rows {
            let currency = self
                .registry
                .get_by_id(row.currency_id)
                .ok_or_else(|| LedgerError::UnknownCurrency(row.currency_id.to_string()))?;

            let account = account_repo
                .get_or_create(&row.player_name, &row.player_uuid, row.currency_id)
                .await?;
            let balance_before = account.balance;
            let updated = account_repo.force_update(account.id, row.balance).await?;

            audit_repo
                .write_log(
                    &row.player_name,
                    &row.player_uuid,
                    row.currency_id,
                    TransactionType::Rollback,
                    row.balance,
                    balance_before,
                    updated.balance,
                    &reason,
                    "SYSTEM",
                )
                .await?;

            self.account_store
                .refresh_cache_entry(&row.player_name, currency.id)
                .await?;
            restored += 1;
        }

        tracing::info!(snapshot_id, restored, "rollback complete");
        Ok(restored)
    }
}
