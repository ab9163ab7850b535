//! In-memory cache of currency definitions. Spec section 4.3.
//!
//! No teacher precedent for an in-process read cache (the `accounts` service
//! always hits Postgres); grounded on `parking_lot::Mutex` as carried into
//! the pack via `afadil-wealthfolio`'s dependency table for guarding shared
//! mutable state cheaply without going through `tokio::sync`.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::config::DefaultCurrencyConfig;
use crate::db::PersistenceLayer;
use crate::error::LedgerError;
use crate::models::{Currency, CurrencyRepo};

struct Indices {
    by_identifier: HashMap<String, Currency>,
    by_id: HashMap<i32, Currency>,
}

impl Indices {
    fn empty() -> Self {
        Self {
            by_identifier: HashMap::new(),
            by_id: HashMap::new(),
        }
    }

    fn rebuild(rows: Vec<Currency>) -> Self {
        let mut indices = Self::empty();
        for row in rows {
            indices.upsert(row);
        }
        indices
    }

    fn upsert(&mut self, currency: Currency) {
        self.by_identifier
            .insert(currency.identifier.to_lowercase(), currency.clone());
        self.by_id.insert(currency.id, currency);
    }
}

pub struct CurrencyRegistry {
    indices: Mutex<Indices>,
}

impl CurrencyRegistry {
    /// Load all non-deleted currencies from persistence. If none exist,
    /// bootstrap a default primary currency from configuration.
    pub async fn init(
        persistence: &PersistenceLayer,
        default_currency: &DefaultCurrencyConfig,
    ) -> Result<Self, LedgerError> {
        let repo = CurrencyRepo::new(persistence);
        let mut rows = repo.list_active().await?;

        if rows.is_empty() {
            tracing::info!(
                identifier = %default_currency.identifier,
                "currency registry empty, bootstrapping default primary currency"
            );
            let created = repo
                .insert(
                    &default_currency.identifier,
                    &default_currency.name,
                    &default_currency.symbol,
                    default_currency.precision,
                    default_currency.default_max_balance,
                    default_currency.console_log,
                )
                .await?;
            let created = repo.set_primary(created.id).await?;
            rows.push(created);
        }

        Ok(Self {
            indices: Mutex::new(Indices::rebuild(rows)),
        })
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn create(
        &self,
        persistence: &PersistenceLayer,
        identifier: &str,
        name: &str,
        symbol: &str,
        precision: i16,
        default_max_balance: i64,
        console_log: bool,
    ) -> Result<Currency, LedgerError> {
        let repo = CurrencyRepo::new(persistence);
        if repo.find_by_identifier(identifier, true).await?.is_some() {
            return Err(LedgerError::DuplicateIdentifier(identifier.to_string()));
        }
        let created = repo
            .insert(identifier, name, symbol, precision, default_max_balance, console_log)
            .await?;
        self.indices.lock().upsert(created.clone());
        Ok(created)
    }

    pub async fn delete(
        &self,
        persistence: &PersistenceLayer,
        identifier: &str,
    ) -> Result<(), LedgerError> {
        let repo = CurrencyRepo::new(persistence);
        let currency = repo
            .find_by_identifier(identifier, false)
            .await?
            .ok_or_else(|| LedgerError::UnknownCurrency(identifier.to_string()))?;
        if currency.is_primary {
            return Err(LedgerError::PrimaryCurrencyProtected);
        }
        repo.soft_delete(currency.id).await?;
        let mut indices = self.indices.lock();
        indices.by_identifier.remove(&currency.identifier.to_lowercase());
        indices.by_id.remove(&currency.id);
        Ok(())
    }

    pub async fn set_enabled(
        &self,
        persistence: &PersistenceLayer,
        identifier: &str,
        enabled: bool,
    ) -> Result<Currency, LedgerError> {
        let current = self
            .get_by_identifier(identifier)
            .ok_or_else(|| LedgerError::UnknownCurrency(identifier.to_string()))?;
        if current.enabled == enabled {
            return Ok(current);
        }
        let repo = CurrencyRepo::new(persistence);
        let updated = repo.set_enabled(current.id, enabled).await?;
        self.indices.lock().upsert(updated.clone());
        Ok(updated)
    }

    pub async fn set_primary(
        &self,
        persistence: &PersistenceLayer,
        identifier: &str,
    ) -> Result<Currency, LedgerError> {
        let target = self
            .get_by_identifier(identifier)
            .ok_or_else(|| LedgerError::UnknownCurrency(identifier.to_string()))?;
        let repo = CurrencyRepo::new(persistence);
        let updated = repo.set_primary(target.id).await?;

        // refresh every currency's primary flag in the in-memory index
        let rows = repo.list_active().await?;
        *self.indices.lock() = Indices::rebuild(rows);
        Ok(updated)
    }

    pub fn get_by_identifier(&self, identifier: &str) -> Option<Currency> {
        self.indices
            .lock()
            .by_identifier
            .get(&identifier.to_lowercase())
            .cloned()
    }

    pub fn get_by_id(&self, id: i32) -> Option<Currency> {
        self.indices.lock().by_id.get(&id).cloned()
    }

    pub fn get_primary(&self) -> Option<Currency> {
        self.indices
            .lock()
            .by_id
            .values()
            .find(|c| c.is_primary)
            .cloned()
    }

    pub fn list_active(&self) -> Vec<Currency> {
        self.indices.lock().by_id.values().cloned().collect()
    }

    pub fn list_enabled(&self) -> Vec<Currency> {
        self.indices
            .lock()
            .by_id
            .values()
            .filter(|c| c.enabled)
            .cloned()
            .collect()
    }

    pub fn list_identifiers_enabled(&self) -> Vec<String> {
        self.list_enabled().into_iter().map(|c| c.identifier).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_persistence;

    #[tokio::test]
    #[serial_test::serial]
    async fn init_bootstraps_default_currency_when_empty() {
        let persistence = test_persistence().await;
        let default = DefaultCurrencyConfig::default();
        let registry = CurrencyRegistry::init(&persistence, &default).await.unwrap();

        let primary = registry.get_primary().expect("should have a primary currency");
        assert_eq!(primary.identifier, default.identifier);
        assert!(primary.is_primary);
    }

    #[tokio::test]
    #[serial_test::serial]
    async fn create_rejects_case_insensitive_duplicate_including_deleted() {
        let persistence = test_persistence().await;
        let registry = CurrencyRegistry::init(&persistence, &DefaultCurrencyConfig::default())
            .await
            .unwrap();

        registry
            .create(&persistence, "gem", "Gem", "G", 2, -1, false)
            .await
            .unwrap();
        registry.delete(&persistence, "gem").await.unwrap();

        let err = registry
            .create(&persistence, "GEM", "Gem Again", "G", 2, -1, false)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::DuplicateIdentifier(_)));
    }

    #[tokio::test]
    #[serial_test::serial]
    async fn set_primary_leaves_exactly_one_primary() {
        let persistence = test_persistence().await;
        let registry = CurrencyRegistry::init(&persistence, &DefaultCurrencyConfig::default())
            .await
            .unwrap();
        registry
            .create(&persistence, "gem", "Gem", "G", 2, -1, false)
            .await
            .unwrap();

        registry.set_primary(&persistence, "gem").await.unwrap();

        let primaries: Vec<_> = registry.list_active().into_iter().filter(|c| c.is_primary).collect();
        assert_eq!(primaries.len(), 1);
        assert_eq!(primaries[0].identifier, "gem");
    }

    #[tokio::test]
    #[serial_test::serial]
    async fn delete_rejects_primary_currency() {
        let persistence = test_persistence().await;
        let registry = CurrencyRegistry::init(&persistence, &DefaultCurrencyConfig::default())
            .await
            .unwrap();
        let primary_id = registry.get_primary().unwrap().identifier;

        let err = registry.delete(&persistence, &primary_id).await.unwrap_err();
        assert!(matches!(err, LedgerError::PrimaryCurrencyProtected));
    }
}
