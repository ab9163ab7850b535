use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;

use crate::db::PersistenceLayer;
use crate::error::LedgerError;

/// Mutation kind recorded in the audit trail. Spec section 3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionType {
    Deposit,
    Withdraw,
    Set,
    Rollback,
}

impl std::fmt::Display for TransactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionType::Deposit => write!(f, "DEPOSIT"),
            TransactionType::Withdraw => write!(f, "WITHDRAW"),
            TransactionType::Set => write!(f, "SET"),
            TransactionType::Rollback => write!(f, "ROLLBACK"),
        }
    }
}

impl std::str::FromStr for TransactionType {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DEPOSIT" => Ok(TransactionType::Deposit),
            "WITHDRAW" => Ok(TransactionType::Withdraw),
            "SET" => Ok(TransactionType::Set),
            "ROLLBACK" => Ok(TransactionType::Rollback),
            other => Err(LedgerError::Database(format!("unknown transaction type {other}"))),
        }
    }
}

/// An append-only audit row. Spec section 3; never updated or deleted.
#[derive(Debug, Clone, serde::Serialize, sqlx::FromRow)]
pub struct TransactionRecord {
    pub id: i64,
    pub player_uuid: String,
    pub player_name: String,
    pub currency_id: i32,
    #[sqlx(rename = "type")]
    pub kind: String,
    pub amount: Decimal,
    pub balance_before: Decimal,
    pub balance_after: Decimal,
    pub reason: String,
    pub operator: String,
    pub occurred_at: DateTime<Utc>,
}

/// Grounded on `LedgerEntry::get_history`/`append`'s insert-then-return shape
/// and `Order::list_for_user`/`count_for_user`'s paging helpers.
pub struct AuditRepo<'a> {
    persistence: &'a PersistenceLayer,
}

impl<'a> AuditRepo<'a> {
    pub fn new(persistence: &'a PersistenceLayer) -> Self {
        Self { persistence }
    }

    fn pool(&self) -> Result<&PgPool, LedgerError> {
        self.persistence.require_ready()?;
        Ok(self.persistence.pool())
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn write_log(
        &self,
        player_name: &str,
        player_uuid: &str,
        currency_id: i32,
        kind: TransactionType,
        amount: Decimal,
        balance_before: Decimal,
        balance_after: Decimal,
        reason: &str,
        operator: &str,
    ) -> Result<TransactionRecord, LedgerError> {
        if reason.is_empty() || operator.is_empty() {
            return Err(LedgerError::Database(
                "audit reason and operator must be non-empty".to_string(),
            ));
        }
        let row = sqlx::query_as::<_, TransactionRecord>(
            "INSERT INTO transaction_log
                (player_uuid, player_name, currency_id, type, amount, balance_before, balance_after, reason, operator)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
             RETURNING *",
        )
        .bind(player_uuid)
        .bind(player_name)
        .bind(currency_id)
        .bind(kind.to_string())
        .bind(amount)
        .bind(balance_before)
        .bind(balance_after)
        .bind(reason)
        .bind(operator)
        .fetch_one(self.pool()?)
        .await?;
        Ok(row)
    }

    pub async fn query_logs(
        &self,
        player_name: &str,
        page: i64,
        page_size: i64,
    ) -> Result<Vec<TransactionRecord>, LedgerError> {
        let offset = page.max(0) * page_size;
        let rows = sqlx::query_as::<_, TransactionRecord>(
            "SELECT * FROM transaction_log WHERE player_name = $1
             ORDER BY occurred_at DESC, id DESC
             LIMIT $2 OFFSET $3",
        )
        .bind(player_name)
        .bind(page_size)
        .bind(offset)
        .fetch_all(self.pool()?)
        .await?;
        Ok(rows)
    }

    pub async fn query_logs_by_player_and_currency(
        &self,
        player_name: &str,
        currency_id: i32,
        page: i64,
        page_size: i64,
    ) -> Result<Vec<TransactionRecord>, LedgerError> {
        let offset = page.max(0) * page_size;
        let rows = sqlx::query_as::<_, TransactionRecord>(
            "SELECT * FROM transaction_log WHERE player_name = $1 AND currency_id = $2
             ORDER BY occurred_at DESC, id DESC
             LIMIT $3 OFFSET $4",
        )
        .bind(player_name)
        .bind(currency_id)
        .bind(page_size)
        .bind(offset)
        .fetch_all(self.pool()?)
        .await?;
        Ok(rows)
    }

    pub async fn count_logs(&self, player_name: &str) -> Result<i64, LedgerError> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM transaction_log WHERE player_name = $1")
                .bind(player_name)
                .fetch_one(self.pool()?)
                .await?;
        Ok(count)
    }

    pub async fn count_logs_by_player_and_currency(
        &self,
        player_name: &str,
        currency_id: i32,
    ) -> Result<i64, LedgerError> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM transaction_log WHERE player_name = $1 AND currency_id = $2",
        )
        .bind(player_name)
        .bind(currency_id)
        .fetch_one(self.pool()?)
        .await?;
        Ok(count)
    }
}
