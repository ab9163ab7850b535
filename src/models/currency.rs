use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::db::PersistenceLayer;
use crate::error::LedgerError;
use crate::precision::clamp_precision;

/// A ledger-wide currency definition. Spec section 3.
#[derive(Debug, Clone, serde::Serialize, sqlx::FromRow)]
pub struct Currency {
    pub id: i32,
    pub identifier: String,
    pub name: String,
    pub symbol: String,
    pub precision: i16,
    pub default_max_balance: i64,
    pub is_primary: bool,
    pub enabled: bool,
    pub deleted: bool,
    pub console_log: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Typed repository over the `currency` table, grounded on the teacher's
/// `sqlx::query_as::<_, T>` idiom (`models/balance.rs`, `models/ledger.rs`).
pub struct CurrencyRepo<'a> {
    persistence: &'a PersistenceLayer,
}

impl<'a> CurrencyRepo<'a> {
    pub fn new(persistence: &'a PersistenceLayer) -> Self {
        Self { persistence }
    }

    fn pool(&self) -> Result<&PgPool, LedgerError> {
        self.persistence.require_ready()?;
        Ok(self.persistence.pool())
    }

    pub async fn find_by_id(&self, id: i32) -> Result<Option<Currency>, LedgerError> {
        let row = sqlx::query_as::<_, Currency>("SELECT * FROM currency WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool()?)
            .await?;
        Ok(row)
    }

    /// Case-insensitive lookup. `include_deleted` mirrors spec's "find by
    /// identifier (with and without the deleted filter)".
    pub async fn find_by_identifier(
        &self,
        identifier: &str,
        include_deleted: bool,
    ) -> Result<Option<Currency>, LedgerError> {
        let sql = if include_deleted {
            "SELECT * FROM currency WHERE LOWER(identifier) = LOWER($1)"
        } else {
            "SELECT * FROM currency WHERE LOWER(identifier) = LOWER($1) AND NOT deleted"
        };
        let row = sqlx::query_as::<_, Currency>(sql)
            .bind(identifier)
            .fetch_optional(self.pool()?)
            .await?;
        Ok(row)
    }

    pub async fn list_active(&self) -> Result<Vec<Currency>, LedgerError> {
        let rows = sqlx::query_as::<_, Currency>(
            "SELECT * FROM currency WHERE NOT deleted ORDER BY id",
        )
        .fetch_all(self.pool()?)
        .await?;
        Ok(rows)
    }

    pub async fn list_enabled(&self) -> Result<Vec<Currency>, LedgerError> {
        let rows = sqlx::query_as::<_, Currency>(
            "SELECT * FROM currency WHERE NOT deleted AND enabled ORDER BY id",
        )
        .fetch_all(self.pool()?)
        .await?;
        Ok(rows)
    }

    pub async fn find_primary(&self) -> Result<Option<Currency>, LedgerError> {
        let row = sqlx::query_as::<_, Currency>(
            "SELECT * FROM currency WHERE is_primary AND NOT deleted LIMIT 1",
        )
        .fetch_optional(self.pool()?)
        .await?;
        Ok(row)
    }

    pub async fn insert(
        &self,
        identifier: &str,
        name: &str,
        symbol: &str,
        precision: i16,
        default_max_balance: i64,
        console_log: bool,
    ) -> Result<Currency, LedgerError> {
        let precision = clamp_precision(precision);
        let row = sqlx::query_as::<_, Currency>(
            "INSERT INTO currency
                (identifier, name, symbol, precision, default_max_balance, is_primary, enabled, deleted, console_log)
             VALUES (LOWER($1), $2, $3, $4, $5, FALSE, TRUE, FALSE, $6)
             RETURNING *",
        )
        .bind(identifier)
        .bind(name)
        .bind(symbol)
        .bind(precision)
        .bind(default_max_balance)
        .bind(console_log)
        .fetch_one(self.pool()?)
        .await?;
        Ok(row)
    }

    pub async fn update_touch(&self, currency: &Currency) -> Result<Currency, LedgerError> {
        let row = sqlx::query_as::<_, Currency>(
            "UPDATE currency SET
                name = $2, symbol = $3, default_max_balance = $4,
                enabled = $5, console_log = $6, updated_at = NOW()
             WHERE id = $1
             RETURNING *",
        )
        .bind(currency.id)
        .bind(&currency.name)
        .bind(&currency.symbol)
        .bind(currency.default_max_balance)
        .bind(currency.enabled)
        .bind(currency.console_log)
        .fetch_one(self.pool()?)
        .await?;
        Ok(row)
    }

    pub async fn soft_delete(&self, id: i32) -> Result<(), LedgerError> {
        sqlx::query("UPDATE currency SET deleted = TRUE, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(self.pool()?)
            .await?;
        Ok(())
    }

    /// Bulk-clear primary on every non-deleted row, then set it on `id`, inside
    /// one transaction so a reader never observes zero or two primaries.
    pub async fn set_primary(&self, id: i32) -> Result<Currency, LedgerError> {
        let pool = self.pool()?;
        let mut tx = pool.begin().await?;
        sqlx::query("UPDATE currency SET is_primary = FALSE WHERE is_primary AND NOT deleted")
            .execute(&mut *tx)
            .await?;
        let row = sqlx::query_as::<_, Currency>(
            "UPDATE currency SET is_primary = TRUE, updated_at = NOW() WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(row)
    }

    pub async fn set_enabled(&self, id: i32, enabled: bool) -> Result<Currency, LedgerError> {
        let row = sqlx::query_as::<_, Currency>(
            "UPDATE currency SET enabled = $2, updated_at = NOW() WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(enabled)
        .fetch_one(self.pool()?)
        .await?;
        Ok(row)
    }
}
