use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;

use crate::db::PersistenceLayer;
use crate::error::LedgerError;

/// A (player, currency) balance binding. Spec section 3.
#[derive(Debug, Clone, serde::Serialize, sqlx::FromRow)]
pub struct Account {
    pub id: i32,
    pub player_uuid: String,
    pub player_name: String,
    pub currency_id: i32,
    pub balance: Decimal,
    pub max_balance: i64,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Typed repository over the `account` table. `update_with_version` and
/// `get_or_create` implement spec section 4.2's optimistic-concurrency
/// contract; the shape (load, compute, conditional write) is grounded on
/// `LedgerEntry::append`'s read-current/insert-new sequence, generalized from
/// an advisory-lock model to an explicit version column because the cached
/// path (spec section 4.6) needs a conflict signal, not just serialization.
pub struct AccountRepo<'a> {
    persistence: &'a PersistenceLayer,
}

impl<'a> AccountRepo<'a> {
    pub fn new(persistence: &'a PersistenceLayer) -> Self {
        Self { persistence }
    }

    fn pool(&self) -> Result<&PgPool, LedgerError> {
        self.persistence.require_ready()?;
        Ok(self.persistence.pool())
    }

    pub async fn find(
        &self,
        player_name: &str,
        currency_id: i32,
    ) -> Result<Option<Account>, LedgerError> {
        let row = sqlx::query_as::<_, Account>(
            "SELECT * FROM account WHERE player_name = $1 AND currency_id = $2",
        )
        .bind(player_name)
        .bind(currency_id)
        .fetch_optional(self.pool()?)
        .await?;
        Ok(row)
    }

    pub async fn list_by_player(&self, player_name: &str) -> Result<Vec<Account>, LedgerError> {
        let rows = sqlx::query_as::<_, Account>(
            "SELECT * FROM account WHERE player_name = $1 ORDER BY currency_id",
        )
        .bind(player_name)
        .fetch_all(self.pool()?)
        .await?;
        Ok(rows)
    }

    pub async fn list_by_currency(&self, currency_id: i32) -> Result<Vec<Account>, LedgerError> {
        let rows = sqlx::query_as::<_, Account>(
            "SELECT * FROM account WHERE currency_id = $1 ORDER BY player_name",
        )
        .bind(currency_id)
        .fetch_all(self.pool()?)
        .await?;
        Ok(rows)
    }

    pub async fn list_all(&self) -> Result<Vec<Account>, LedgerError> {
        let rows = sqlx::query_as::<_, Account>("SELECT * FROM account ORDER BY id")
            .fetch_all(self.pool()?)
            .await?;
        Ok(rows)
    }

    /// Return the existing row, or insert a zero-balance row at version 1.
    /// Refreshes `player_uuid` when the caller supplies a non-empty uuid that
    /// differs from what is stored (spec: "advisory, updated on name<->uuid
    /// discovery").
    pub async fn get_or_create(
        &self,
        player_name: &str,
        player_uuid: &str,
        currency_id: i32,
    ) -> Result<Account, LedgerError> {
        let pool = self.pool()?;
        if let Some(existing) = self.find(player_name, currency_id).await? {
            if !player_uuid.is_empty() && player_uuid != existing.player_uuid {
                let row = sqlx::query_as::<_, Account>(
                    "UPDATE account SET player_uuid = $2, updated_at = NOW() WHERE id = $1 RETURNING *",
                )
                .bind(existing.id)
                .bind(player_uuid)
                .fetch_one(pool)
                .await?;
                return Ok(row);
            }
            return Ok(existing);
        }

        let row = sqlx::query_as::<_, Account>(
            "INSERT INTO account (player_uuid, player_name, currency_id, balance, max_balance, version)
             VALUES ($1, $2, $3, 0, -1, 1)
             ON CONFLICT (player_name, currency_id) DO UPDATE SET player_name = EXCLUDED.player_name
             RETURNING *",
        )
        .bind(player_uuid)
        .bind(player_name)
        .bind(currency_id)
        .fetch_one(pool)
        .await?;
        Ok(row)
    }

    /// `WHERE version = entity.version; SET version = version + 1`. Returns
    /// `Ok(Some(updated))` on match, `Ok(None)` on conflict (affected = 0) —
    /// callers decide whether to retry, resync, or report `Conflict`.
    pub async fn update_with_version(
        &self,
        account_id: i32,
        expected_version: i64,
        new_balance: Decimal,
    ) -> Result<Option<Account>, LedgerError> {
        let row = sqlx::query_as::<_, Account>(
            "UPDATE account SET balance = $3, version = version + 1, updated_at = NOW()
             WHERE id = $1 AND version = $2
             RETURNING *",
        )
        .bind(account_id)
        .bind(expected_version)
        .bind(new_balance)
        .fetch_optional(self.pool()?)
        .await?;
        Ok(row)
    }

    pub async fn set_max_balance(
        &self,
        player_name: &str,
        currency_id: i32,
        max_balance: i64,
    ) -> Result<Account, LedgerError> {
        let account = self.get_or_create(player_name, "", currency_id).await?;
        let row = sqlx::query_as::<_, Account>(
            "UPDATE account SET max_balance = $2, updated_at = NOW() WHERE id = $1 RETURNING *",
        )
        .bind(account.id)
        .bind(max_balance)
        .fetch_one(self.pool()?)
        .await?;
        Ok(row)
    }

    /// Re-read the current version, then perform a standard versioned update —
    /// never bypasses the version column (spec section 4.2's `force-update`).
    /// Used by the backup engine's rollback path, which must win against
    /// concurrent cached-path writers rather than clobber them blindly.
    pub async fn force_update(
        &self,
        account_id: i32,
        new_balance: Decimal,
    ) -> Result<Account, LedgerError> {
        const MAX_RETRIES: u32 = 5;
        for _ in 0..MAX_RETRIES {
            let current = sqlx::query_as::<_, Account>("SELECT * FROM account WHERE id = $1")
                .bind(account_id)
                .fetch_one(self.pool()?)
                .await?;
            if let Some(updated) = self
                .update_with_version(account_id, current.version, new_balance)
                .await?
            {
                return Ok(updated);
            }
        }
        Err(LedgerError::Conflict)
    }
}
