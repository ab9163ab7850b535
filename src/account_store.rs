//! Per-(player, currency) balance cache and write-behind persistence. Spec
//! section 4.6 — the heart of the ledger core. Grounded on
//! `LedgerEntry::append`'s validate/compute/persist shape, generalized into
//! two paths: a cached path that answers the caller before the persist
//! completes, and a direct CAS-retry path modeled on the teacher's advisory
//! lock loop but driven by the `version` column instead (see
//! `models::account::AccountRepo`).

use std::sync::Arc;

use dashmap::DashMap;
use rust_decimal::Decimal;

use crate::config::RoundingMode;
use crate::db::PersistenceLayer;
use crate::error::LedgerError;
use crate::executor::AsyncExecutor;
use crate::hooks::{ChangeEvent, HookDispatcher};
use crate::models::{Account, AccountRepo, AuditRepo, Currency, TransactionType};
use crate::precision::scale;
use crate::registry::CurrencyRegistry;

const MAX_VERSION_RETRIES: u32 = 64;

/// Outcome of a mutation attempt, before the facade turns it into an
/// `OperationResult`.
pub enum MutationOutcome {
    Success(Decimal),
    Cancelled(Decimal),
    InsufficientFunds(Decimal),
    LimitExceeded(Decimal),
    Conflict,
}

type CacheKey = (String, i32);

pub struct AccountStore {
    persistence: Arc<PersistenceLayer>,
    registry: Arc<CurrencyRegistry>,
    hooks: Arc<HookDispatcher>,
    executor: Arc<AsyncExecutor>,
    rounding_mode: RoundingMode,
    cache: Arc<DashMap<CacheKey, Decimal>>,
}

fn effective_max(account_max_balance: i64, currency_default_max: i64) -> i64 {
    if account_max_balance > 0 {
        account_max_balance
    } else {
        currency_default_max
    }
}

impl AccountStore {
    pub fn new(
        persistence: Arc<PersistenceLayer>,
        registry: Arc<CurrencyRegistry>,
        hooks: Arc<HookDispatcher>,
        executor: Arc<AsyncExecutor>,
        rounding_mode: RoundingMode,
    ) -> Self {
        Self {
            persistence,
            registry,
            hooks,
            executor,
            rounding_mode,
            cache: Arc::new(DashMap::new()),
        }
    }

    fn key(player_name: &str, currency_id: i32) -> CacheKey {
        (player_name.to_string(), currency_id)
    }

    fn resolve_currency(&self, identifier: &str) -> Result<Currency, LedgerError> {
        self.registry
            .get_by_identifier(identifier)
            .ok_or_else(|| LedgerError::UnknownCurrency(identifier.to_string()))
    }

    // ---- cache lifecycle (spec section 4.6 "Cache lifecycle") ----

    pub async fn load_player_balances(
        &self,
        player_name: &str,
        player_uuid: &str,
    ) -> Result<(), LedgerError> {
        self.persistence.require_ready()?;
        let repo = AccountRepo::new(&self.persistence);
        for currency in self.registry.list_enabled() {
            let account = repo.get_or_create(player_name, player_uuid, currency.id).await?;
            self.cache.insert(Self::key(player_name, currency.id), account.balance);
        }
        Ok(())
    }

    pub fn unload_player(&self, player_name: &str) {
        self.cache.retain(|(name, _), _| name != player_name);
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    /// Overwrite the cache entry from whatever is currently persisted.
    /// Used after a version conflict, and by the backup engine after restore.
    pub async fn refresh_cache_entry(
        &self,
        player_name: &str,
        currency_id: i32,
    ) -> Result<(), LedgerError> {
        self.persistence.require_ready()?;
        let repo = AccountRepo::new(&self.persistence);
        if let Some(account) = repo.find(player_name, currency_id).await? {
            self.cache.insert(Self::key(player_name, currency_id), account.balance);
        }
        Ok(())
    }

    // ---- queries ----

    pub fn get_balance_cached(&self, player_name: &str, currency_id: i32) -> Decimal {
        self.cache
            .get(&Self::key(player_name, currency_id))
            .map(|v| *v)
            .unwrap_or(Decimal::ZERO)
    }

    pub async fn get_balance_direct(
        &self,
        player_name: &str,
        currency_id: i32,
    ) -> Result<Decimal, LedgerError> {
        self.persistence.require_ready()?;
        let repo = AccountRepo::new(&self.persistence);
        Ok(repo
            .find(player_name, currency_id)
            .await?
            .map(|a| a.balance)
            .unwrap_or(Decimal::ZERO))
    }

    #[allow(clippy::too_many_arguments)]
    fn console_log_line(
        &self,
        currency: &Currency,
        action: &str,
        player_name: &str,
        amount: Decimal,
        before: Decimal,
        after: Decimal,
        reason: &str,
        operator: &str,
    ) {
        if currency.console_log {
            tracing::info!(
                target: "ledger_core::console",
                "{action} {player_name} {identifier} {amount} ({before} -> {after}) reason=\"{reason}\" operator={operator}",
                action = action,
                player_name = player_name,
                identifier = currency.identifier,
                amount = amount,
                before = before,
                after = after,
                reason = reason,
                operator = operator,
            );
        }
    }

    // ---- cached path (spec section 4.6) ----

    #[allow(clippy::too_many_arguments)]
    pub async fn mutate_cached(
        &self,
        player_name: &str,
        player_uuid: &str,
        currency_identifier: &str,
        kind: TransactionType,
        amount: Decimal,
        reason: &str,
        operator: &str,
    ) -> Result<MutationOutcome, LedgerError> {
        self.persistence.require_ready()?;
        let currency = self.resolve_currency(currency_identifier)?;
        if matches!(kind, TransactionType::Deposit | TransactionType::Withdraw) && !currency.enabled {
            return Err(LedgerError::CurrencyDisabled(currency_identifier.to_string()));
        }
        validate_amount(kind, amount)?;
        let amount = scale(amount, currency.precision, self.rounding_mode);

        let key = Self::key(player_name, currency.id);
        let balance_before = self.get_balance_cached(player_name, currency.id);
        let balance_after = match kind {
            TransactionType::Deposit => scale(balance_before + amount, currency.precision, self.rounding_mode),
            TransactionType::Withdraw => scale(balance_before - amount, currency.precision, self.rounding_mode),
            TransactionType::Set => scale(amount, currency.precision, self.rounding_mode),
            TransactionType::Rollback => unreachable!("rollback never goes through the cached path"),
        };

        if kind == TransactionType::Deposit {
            let max = currency.default_max_balance;
            if max != -1 && balance_after > Decimal::from(max) {
                return Ok(MutationOutcome::LimitExceeded(balance_before));
            }
        }
        if kind == TransactionType::Withdraw && balance_before < amount {
            return Ok(MutationOutcome::InsufficientFunds(balance_before));
        }

        let change = ChangeEvent {
            player_name: player_name.to_string(),
            player_uuid: player_uuid.to_string(),
            currency_identifier: currency.identifier.clone(),
            kind,
            amount,
            balance_before,
            balance_after,
            reason: reason.to_string(),
            operator: operator.to_string(),
            occurred_at: chrono::Utc::now(),
        };
        if self.hooks.dispatch_pre(change) {
            return Ok(MutationOutcome::Cancelled(balance_before));
        }

        self.cache.insert(key, balance_after);

        self.console_log_line(
            &currency,
            action_label(kind),
            player_name,
            amount,
            balance_before,
            balance_after,
            reason,
            operator,
        );

        self.spawn_persist_cached(
            player_name.to_string(),
            player_uuid.to_string(),
            currency,
            kind,
            amount,
            balance_before,
            balance_after,
            reason.to_string(),
            operator.to_string(),
        )
        .await;

        Ok(MutationOutcome::Success(balance_after))
    }

    /// Step 7 of the cached path: schedule the persisted write asynchronously
    /// so the caller in `mutate_cached` doesn't wait for it. If the executor's
    /// queue is saturated the write still has to land, so it falls back to
    /// running on the caller's own task instead of silently dropping it.
    #[allow(clippy::too_many_arguments)]
    async fn spawn_persist_cached(
        &self,
        player_name: String,
        player_uuid: String,
        currency: Currency,
        kind: TransactionType,
        amount: Decimal,
        balance_before: Decimal,
        balance_after: Decimal,
        reason: String,
        operator: String,
    ) {
        let persistence = self.persistence.clone();
        let hooks = self.hooks.clone();
        let cache = self.cache.clone();
        let currency_for_fallback = currency.clone();

        let task = persist_cached(
            persistence, hooks, cache, player_name.clone(), player_uuid.clone(), currency, kind,
            amount, balance_before, balance_after, reason.clone(), operator.clone(),
        );

        if self.executor.run_async(task).is_err() {
            tracing::warn!(player_name, "executor queue saturated, persisting cached mutation inline");
            persist_cached(
                self.persistence.clone(), self.hooks.clone(), self.cache.clone(), player_name,
                player_uuid, currency_for_fallback, kind, amount, balance_before, balance_after,
                reason, operator,
            )
            .await;
        }
    }

    // ---- direct path (spec section 4.6) ----

    #[allow(clippy::too_many_arguments)]
    pub async fn mutate_direct(
        &self,
        player_name: &str,
        player_uuid: &str,
        currency_identifier: &str,
        kind: TransactionType,
        amount: Decimal,
        reason: &str,
        operator: &str,
    ) -> Result<MutationOutcome, LedgerError> {
        self.persistence.require_ready()?;
        let currency = self.resolve_currency(currency_identifier)?;
        if matches!(kind, TransactionType::Deposit | TransactionType::Withdraw) && !currency.enabled {
            return Err(LedgerError::CurrencyDisabled(currency_identifier.to_string()));
        }
        validate_amount(kind, amount)?;
        let amount = scale(amount, currency.precision, self.rounding_mode);
        let repo = AccountRepo::new(&self.persistence);

        for attempt in 0..MAX_VERSION_RETRIES {
            let account = repo.get_or_create(player_name, player_uuid, currency.id).await?;
            let balance_before = account.balance;
            let balance_after = match kind {
                TransactionType::Deposit => scale(balance_before + amount, currency.precision, self.rounding_mode),
                TransactionType::Withdraw => scale(balance_before - amount, currency.precision, self.rounding_mode),
                TransactionType::Set => scale(amount, currency.precision, self.rounding_mode),
                TransactionType::Rollback => unreachable!("rollback never goes through mutate_direct"),
            };

            if kind == TransactionType::Deposit {
                let max = effective_max(account.max_balance, currency.default_max_balance);
                if max != -1 && balance_after > Decimal::from(max) {
                    return Ok(MutationOutcome::LimitExceeded(balance_before));
                }
            }
            if kind == TransactionType::Withdraw && balance_before < amount {
                return Ok(MutationOutcome::InsufficientFunds(balance_before));
            }

            let change = ChangeEvent {
                player_name: player_name.to_string(),
                player_uuid: player_uuid.to_string(),
                currency_identifier: currency.identifier.clone(),
                kind,
                amount,
                balance_before,
                balance_after,
                reason: reason.to_string(),
                operator: operator.to_string(),
                occurred_at: chrono::Utc::now(),
            };
            if self.hooks.dispatch_pre(change) {
                return Ok(MutationOutcome::Cancelled(balance_before));
            }

            match repo.update_with_version(account.id, account.version, balance_after).await? {
                Some(_updated) => {
                    let audit = AuditRepo::new(&self.persistence);
                    audit
                        .write_log(
                            player_name, player_uuid, currency.id, kind, amount, balance_before,
                            balance_after, reason, operator,
                        )
                        .await?;

                    self.console_log_line(
                        &currency, action_label(kind), player_name, amount, balance_before,
                        balance_after, reason, operator,
                    );

                    if self.cache.contains_key(&Self::key(player_name, currency.id)) {
                        self.refresh_cache_entry(player_name, currency.id).await?;
                    }

                    self.hooks.dispatch_post(ChangeEvent {
                        player_name: player_name.to_string(),
                        player_uuid: player_uuid.to_string(),
                        currency_identifier: currency.identifier.clone(),
                        kind,
                        amount,
                        balance_before,
                        balance_after,
                        reason: reason.to_string(),
                        operator: operator.to_string(),
                        occurred_at: chrono::Utc::now(),
                    });

                    return Ok(MutationOutcome::Success(balance_after));
                }
                None => {
                    tracing::debug!(player_name, currency = %currency.identifier, attempt, "direct path version conflict, retrying");
                    let backoff_ms = std::cmp::min(attempt + 1, 10);
                    tokio::time::sleep(std::time::Duration::from_millis(backoff_ms as u64)).await;
                    continue;
                }
            }
        }

        Ok(MutationOutcome::Conflict)
    }

    pub async fn set_max_balance(
        &self,
        player_name: &str,
        currency_identifier: &str,
        max_balance: i64,
    ) -> Result<Account, LedgerError> {
        self.persistence.require_ready()?;
        let currency = self.resolve_currency(currency_identifier)?;
        let repo = AccountRepo::new(&self.persistence);
        repo.set_max_balance(player_name, currency.id, max_balance).await
    }

}

/// Step 7 of the cached path, as a free function so it can run either on the
/// executor's worker pool or inline on the caller's task without borrowing
/// `AccountStore`.
#[allow(clippy::too_many_arguments)]
async fn persist_cached(
    persistence: Arc<PersistenceLayer>,
    hooks: Arc<HookDispatcher>,
    cache: Arc<DashMap<CacheKey, Decimal>>,
    player_name: String,
    player_uuid: String,
    currency: Currency,
    kind: TransactionType,
    amount: Decimal,
    balance_before: Decimal,
    balance_after: Decimal,
    reason: String,
    operator: String,
) {
    let cache_key = (player_name.clone(), currency.id);
    let repo = AccountRepo::new(&persistence);
    let account = match repo.get_or_create(&player_name, &player_uuid, currency.id).await {
        Ok(a) => a,
        Err(e) => {
            tracing::error!(error = %e, player_name, currency = %currency.identifier, "get_or_create failed during cached persist, rolling back cache");
            cache.insert(cache_key, balance_before);
            return;
        }
    };

    match repo.update_with_version(account.id, account.version, balance_after).await {
        Ok(Some(_updated)) => {
            let audit = AuditRepo::new(&persistence);
            if let Err(e) = audit
                .write_log(
                    &player_name, &player_uuid, currency.id, kind, amount, balance_before,
                    balance_after, &reason, &operator,
                )
                .await
            {
                tracing::error!(error = %e, player_name, "audit append failed after successful persist; balance is durable, audit row is missing");
            }
            hooks.dispatch_post(ChangeEvent {
                player_name,
                player_uuid,
                currency_identifier: currency.identifier.clone(),
                kind,
                amount,
                balance_before,
                balance_after,
                reason,
                operator,
                occurred_at: chrono::Utc::now(),
            });
        }
        Ok(None) => {
            tracing::warn!(player_name, currency = %currency.identifier, "version conflict on cached persist, resyncing cache from persistence");
            if let Ok(Some(fresh)) = repo.find(&player_name, currency.id).await {
                cache.insert(cache_key, fresh.balance);
            }
        }
        Err(e) => {
            tracing::error!(error = %e, player_name, currency = %currency.identifier, "cached persist failed, rolling cache back to pre-mutation balance");
            cache.insert(cache_key, balance_before);
        }
    }
}

fn validate_amount(kind: TransactionType, amount: Decimal) -> Result<(), LedgerError> {
    match kind {
        TransactionType::Deposit | TransactionType::Withdraw => {
            if amount <= Decimal::ZERO {
                return Err(LedgerError::InvalidAmount(
                    "amount must be strictly positive".to_string(),
                ));
            }
        }
        TransactionType::Set => {
            if amount < Decimal::ZERO {
                return Err(LedgerError::InvalidAmount(
                    "amount must be non-negative".to_string(),
                ));
            }
        }
        TransactionType::Rollback => {}
    }
    Ok(())
}

fn action_label(kind: TransactionType) -> &'static str {
    match kind {
        TransactionType::Deposit => "DEPOSIT",
        TransactionType::Withdraw => "WITHDRAW",
        TransactionType::Set => "SET",
        TransactionType::Rollback => "ROLLBACK",
    }
}
