//! The ledger facade. Spec section 4.8: the single entry point every external
//! collaborator talks to. Every mutation funnels through here and comes back
//! as a universal `OperationResult` — callers never see a thrown
//! `LedgerError` directly, matching spec section 7/9's "no panics across the
//! boundary" contract. Grounded on the teacher's `AppState` + handler shape
//! (`routes/balances.rs`), generalized from "one handler per HTTP route" to
//! "one facade method per ledger operation", with HTTP wired on top in `http`.

use std::sync::Arc;

use rust_decimal::Decimal;

use crate::account_store::{AccountStore, MutationOutcome};
use crate::backup::BackupEngine;
use crate::config::LedgerConfig;
use crate::db::PersistenceLayer;
use crate::error::{LedgerError, OperationResult};
use crate::executor::AsyncExecutor;
use crate::hooks::{HookDispatcher, PostHookFn, PreHookFn};
use crate::models::{Account, AuditRepo, Currency, SnapshotSummary, TransactionRecord, TransactionType};
use crate::registry::CurrencyRegistry;

pub struct Ledger {
    persistence: Arc<PersistenceLayer>,
    registry: Arc<CurrencyRegistry>,
    account_store: Arc<AccountStore>,
    backup: Arc<BackupEngine>,
    hooks: Arc<HookDispatcher>,
    executor: Arc<AsyncExecutor>,
}

impl Ledger {
    pub async fn bootstrap(config: &LedgerConfig, database_url: &str) -> Result<Self, LedgerError> {
        let persistence = PersistenceLayer::connect(database_url)
            .await
            .map_err(LedgerError::from)?;
        persistence.run_migrations().await.map_err(LedgerError::from)?;

        let registry = Arc::new(CurrencyRegistry::init(&persistence, &config.default_currency).await?);
        let persistence = Arc::new(persistence);
        let hooks = Arc::new(HookDispatcher::new());
        let executor = Arc::new(AsyncExecutor::new(1024));
        let account_store = Arc::new(AccountStore::new(
            persistence.clone(),
            registry.clone(),
            hooks.clone(),
            executor.clone(),
            config.rounding_mode,
        ));
        let backup = Arc::new(BackupEngine::new(
            persistence.clone(),
            registry.clone(),
            account_store.clone(),
            config.backup_max_snapshots,
        ));

        Ok(Self {
            persistence,
            registry,
            account_store,
            backup,
            hooks,
            executor,
        })
    }

    pub fn is_ready(&self) -> bool {
        self.persistence.is_ready()
    }

    pub fn subscribe_pre(&self, hook: PreHookFn) {
        self.hooks.subscribe_pre(hook);
    }

    pub fn subscribe_post(&self, hook: PostHookFn) {
        self.hooks.subscribe_post(hook);
    }

    pub fn executor(&self) -> &Arc<AsyncExecutor> {
        &self.executor
    }

    // ---- balance queries ----

    pub async fn load_player(&self, player_name: &str, player_uuid: &str) -> Result<(), LedgerError> {
        self.account_store.load_player_balances(player_name, player_uuid).await
    }

    pub fn unload_player(&self, player_name: &str) {
        self.account_store.unload_player(player_name);
    }

    pub fn balance_cached(&self, player_name: &str, currency_identifier: &str) -> Decimal {
        match self.registry.get_by_identifier(currency_identifier) {
            Some(currency) => self.account_store.get_balance_cached(player_name, currency.id),
            None => Decimal::ZERO,
        }
    }

    pub async fn balance_direct(
        &self,
        player_name: &str,
        currency_identifier: &str,
    ) -> Result<Decimal, LedgerError> {
        let currency = self
            .registry
            .get_by_identifier(currency_identifier)
            .ok_or_else(|| LedgerError::UnknownCurrency(currency_identifier.to_string()))?;
        self.account_store.get_balance_direct(player_name, currency.id).await
    }

    // ---- mutations: cached path ----

    pub async fn deposit(
        &self,
        player_name: &str,
        player_uuid: &str,
        currency_identifier: &str,
        amount: Decimal,
        reason: &str,
        operator: &str,
    ) -> OperationResult {
        self.apply_cached(
            player_name, player_uuid, currency_identifier, TransactionType::Deposit, amount,
            reason, operator,
        )
        .await
    }

    pub async fn withdraw(
        &self,
        player_name: &str,
        player_uuid: &str,
        currency_identifier: &str,
        amount: Decimal,
        reason: &str,
        operator: &str,
    ) -> OperationResult {
        self.apply_cached(
            player_name, player_uuid, currency_identifier, TransactionType::Withdraw, amount,
            reason, operator,
        )
        .await
    }

    pub async fn set_balance(
        &self,
        player_name: &str,
        player_uuid: &str,
        currency_identifier: &str,
        amount: Decimal,
        reason: &str,
        operator: &str,
    ) -> OperationResult {
        self.apply_cached(
            player_name, player_uuid, currency_identifier, TransactionType::Set, amount, reason,
            operator,
        )
        .await
    }

    #[allow(clippy::too_many_arguments)]
    async fn apply_cached(
        &self,
        player_name: &str,
        player_uuid: &str,
        currency_identifier: &str,
        kind: TransactionType,
        amount: Decimal,
        reason: &str,
        operator: &str,
    ) -> OperationResult {
        let before = self.balance_cached(player_name, currency_identifier);
        match self
            .account_store
            .mutate_cached(player_name, player_uuid, currency_identifier, kind, amount, reason, operator)
            .await
        {
            Ok(MutationOutcome::Success(balance)) => OperationResult::success(balance),
            Ok(MutationOutcome::Cancelled(balance)) => OperationResult::failure(LedgerError::Cancelled, balance),
            Ok(MutationOutcome::InsufficientFunds(balance)) => {
                OperationResult::failure(LedgerError::InsufficientFunds, balance)
            }
            Ok(MutationOutcome::LimitExceeded(balance)) => {
                OperationResult::failure(LedgerError::LimitExceeded, balance)
            }
            Ok(MutationOutcome::Conflict) => OperationResult::failure(LedgerError::Conflict, before),
            Err(e) => OperationResult::failure(e, before),
        }
    }

    // ---- mutations: direct path ----

    pub async fn deposit_direct(
        &self,
        player_name: &str,
        player_uuid: &str,
        currency_identifier: &str,
        amount: Decimal,
        reason: &str,
        operator: &str,
    ) -> OperationResult {
        self.apply_direct(
            player_name, player_uuid, currency_identifier, TransactionType::Deposit, amount,
            reason, operator,
        )
        .await
    }

    pub async fn withdraw_direct(
        &self,
        player_name: &str,
        player_uuid: &str,
        currency_identifier: &str,
        amount: Decimal,
        reason: &str,
        operator: &str,
    ) -> OperationResult {
        self.apply_direct(
            player_name, player_uuid, currency_identifier, TransactionType::Withdraw, amount,
            reason, operator,
        )
        .await
    }

    pub async fn set_balance_direct(
        &self,
        player_name: &str,
        player_uuid: &str,
        currency_identifier: &str,
        amount: Decimal,
        reason: &str,
        operator: &str,
    ) -> OperationResult {
        self.apply_direct(
            player_name, player_uuid, currency_identifier, TransactionType::Set, amount, reason,
            operator,
        )
        .await
    }

    #[allow(clippy::too_many_arguments)]
    async fn apply_direct(
        &self,
        player_name: &str,
        player_uuid: &str,
        currency_identifier: &str,
        kind: TransactionType,
        amount: Decimal,
        reason: &str,
        operator: &str,
    ) -> OperationResult {
        let before = self
            .balance_direct(player_name, currency_identifier)
            .await
            .unwrap_or(Decimal::ZERO);
        match self
            .account_store
            .mutate_direct(player_name, player_uuid, currency_identifier, kind, amount, reason, operator)
            .await
        {
            Ok(MutationOutcome::Success(balance)) => OperationResult::success(balance),
            Ok(MutationOutcome::Cancelled(balance)) => OperationResult::failure(LedgerError::Cancelled, balance),
            Ok(MutationOutcome::InsufficientFunds(balance)) => {
                OperationResult::failure(LedgerError::InsufficientFunds, balance)
            }
            Ok(MutationOutcome::LimitExceeded(balance)) => {
                OperationResult::failure(LedgerError::LimitExceeded, balance)
            }
            Ok(MutationOutcome::Conflict) => OperationResult::failure(LedgerError::Conflict, before),
            Err(e) => OperationResult::failure(e, before),
        }
    }

    pub async fn set_max_balance(
        &self,
        player_name: &str,
        currency_identifier: &str,
        max_balance: i64,
    ) -> Result<Account, LedgerError> {
        self.account_store
            .set_max_balance(player_name, currency_identifier, max_balance)
            .await
    }

    // ---- currency registry ----

    #[allow(clippy::too_many_arguments)]
    pub async fn create_currency(
        &self,
        identifier: &str,
        name: &str,
        symbol: &str,
        precision: i16,
        default_max_balance: i64,
        console_log: bool,
    ) -> Result<Currency, LedgerError> {
        self.registry
            .create(&self.persistence, identifier, name, symbol, precision, default_max_balance, console_log)
            .await
    }

    pub async fn delete_currency(&self, identifier: &str) -> Result<(), LedgerError> {
        self.registry.delete(&self.persistence, identifier).await
    }

    pub async fn set_currency_enabled(&self, identifier: &str, enabled: bool) -> Result<Currency, LedgerError> {
        self.registry.set_enabled(&self.persistence, identifier, enabled).await
    }

    pub async fn set_primary_currency(&self, identifier: &str) -> Result<Currency, LedgerError> {
        self.registry.set_primary(&self.persistence, identifier).await
    }

    pub fn get_currency(&self, identifier: &str) -> Option<Currency> {
        self.registry.get_by_identifier(identifier)
    }

    pub fn list_currencies(&self) -> Vec<Currency> {
        self.registry.list_active()
    }

    pub fn primary_currency(&self) -> Option<Currency> {
        self.registry.get_primary()
    }

    // ---- audit ----

    pub async fn audit_for_player(
        &self,
        player_name: &str,
        page: i64,
        page_size: i64,
    ) -> Result<Vec<TransactionRecord>, LedgerError> {
        self.persistence.require_ready()?;
        AuditRepo::new(&self.persistence).query_logs(player_name, page, page_size).await
    }

    // ---- backups ----

    pub async fn create_snapshot(&self, memo: &str) -> Result<String, LedgerError> {
        self.backup.create_snapshot(memo).await
    }

    pub async fn list_snapshots(&self) -> Result<Vec<SnapshotSummary>, LedgerError> {
        self.backup.list_snapshots().await
    }

    pub async fn rollback_snapshot(&self, snapshot_id: &str) -> Result<usize, LedgerError> {
        self.backup.rollback(snapshot_id).await
    }

    pub async fn rollback_snapshot_for_player(
        &self,
        snapshot_id: &str,
        player_name: &str,
    ) -> Result<usize, LedgerError> {
        self.backup.rollback_player(snapshot_id, player_name).await
    }
}
