use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Deserialize;

use super::repository::{InvoiceRepository, RepositoryError};

/// The `[database]` table of the config file.
///
/// `connection_string` is forwarded untouched to the factory registered for
/// `backend`:
///
/// | backend    | connection_string examples          |
/// |------------|-------------------------------------|
/// | `sqlite`   | `invoices.db`, `:memory:`           |
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DbConfig {
    pub backend: String,
    pub connection_string: String,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            backend: "sqlite".to_string(),
            connection_string: ":memory:".to_string(),
        }
    }
}

/// Opens an [`InvoiceRepository`] for one storage backend. A freshly created
/// repository is migrated and seeded.
#[async_trait]
pub trait RepositoryFactory: Send + Sync {
    /// Lowercase name used in [`DbConfig::backend`].
    fn backend_name(&self) -> &'static str;

    async fn create(&self, config: &DbConfig) -> Result<Box<dyn InvoiceRepository>, RepositoryError>;
}

/// Backends known to the running binary.
#[derive(Default)]
pub struct RepositoryRegistry {
    factories: BTreeMap<&'static str, Box<dyn RepositoryFactory>>,
}

impl RepositoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A later factory with the same name wins.
    pub fn register(&mut self, factory: Box<dyn RepositoryFactory>) {
        self.factories.insert(factory.backend_name(), factory);
    }

    pub fn available_backends(&self) -> Vec<&'static str> {
        self.factories.keys().copied().collect()
    }

    /// Opens the backend named by `config.backend`, compared without case or
    /// surrounding whitespace.
    ///
    /// Fails with [`RepositoryError::Configuration`] for an unregistered
    /// name; factory errors pass through.
    pub async fn create(
        &self,
        config: &DbConfig,
    ) -> Result<Box<dyn InvoiceRepository>, RepositoryError> {
        let requested = config.backend.trim().to_lowercase();
        let Some(factory) = self.factories.get(requested.as_str()) else {
            return Err(RepositoryError::Configuration(format!(
                "no '{}' backend in this build (have: {})",
                config.backend,
                self.available_backends().join(", ")
            )));
        };

        factory.create(config).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    use async_trait::async_trait;
    use chrono::{DateTime, Utc};

    use crate::db::repository::InvoiceUnitOfWork;
    use crate::models::{Client, Invoice, InvoiceNumber, InvoiceStatus, NewClient, NewTaxRate, TaxRate};

    use super::{DbConfig, InvoiceRepository, RepositoryError, RepositoryFactory, RepositoryRegistry};

    // never queried
    struct StubRepository;

    #[async_trait]
    impl InvoiceRepository for StubRepository {
        async fn begin(&self) -> Result<Box<dyn InvoiceUnitOfWork>, RepositoryError> {
            unimplemented!()
        }
        async fn get_invoice(&self, _id: i64) -> Result<Invoice, RepositoryError> {
            unimplemented!()
        }
        async fn list_invoices(&self) -> Result<Vec<Invoice>, RepositoryError> {
            unimplemented!()
        }
        async fn list_invoice_ids(&self) -> Result<Vec<i64>, RepositoryError> {
            unimplemented!()
        }
        async fn find_invoice_by_number(
            &self,
            _number: &InvoiceNumber,
        ) -> Result<Option<i64>, RepositoryError> {
            unimplemented!()
        }
        async fn last_number_for_year(
            &self,
            _year: i32,
        ) -> Result<Option<InvoiceNumber>, RepositoryError> {
            unimplemented!()
        }
        async fn set_status(
            &self,
            _id: i64,
            _status: InvoiceStatus,
            _now: DateTime<Utc>,
        ) -> Result<(), RepositoryError> {
            unimplemented!()
        }
        async fn delete_invoice(&self, _id: i64) -> Result<(), RepositoryError> {
            unimplemented!()
        }
        async fn get_tax_rate(&self, _id: i64) -> Result<TaxRate, RepositoryError> {
            unimplemented!()
        }
        async fn list_tax_rates(&self, _active_only: bool) -> Result<Vec<TaxRate>, RepositoryError> {
            unimplemented!()
        }
        async fn create_tax_rate(&self, _tax_rate: &NewTaxRate) -> Result<TaxRate, RepositoryError> {
            unimplemented!()
        }
        async fn set_tax_rate_active(&self, _id: i64, _is_active: bool) -> Result<(), RepositoryError> {
            unimplemented!()
        }
        async fn get_client(&self, _id: i64) -> Result<Client, RepositoryError> {
            unimplemented!()
        }
        async fn list_clients(&self) -> Result<Vec<Client>, RepositoryError> {
            unimplemented!()
        }
        async fn create_client(&self, _client: &NewClient) -> Result<Client, RepositoryError> {
            unimplemented!()
        }
    }

    struct StubFactory {
        name: &'static str,
        called: Arc<AtomicBool>,
    }

    #[async_trait]
    impl RepositoryFactory for StubFactory {
        fn backend_name(&self) -> &'static str {
            self.name
        }
        async fn create(
            &self,
            _config: &DbConfig,
        ) -> Result<Box<dyn InvoiceRepository>, RepositoryError> {
            self.called.store(true, Ordering::SeqCst);
            Ok(Box::new(StubRepository))
        }
    }

    struct FailingFactory;

    #[async_trait]
    impl RepositoryFactory for FailingFactory {
        fn backend_name(&self) -> &'static str {
            "failing"
        }
        async fn create(
            &self,
            _config: &DbConfig,
        ) -> Result<Box<dyn InvoiceRepository>, RepositoryError> {
            Err(RepositoryError::Connection("database locked".to_string()))
        }
    }

    fn stub_factory(name: &'static str) -> (Box<dyn RepositoryFactory>, Arc<AtomicBool>) {
        let flag = Arc::new(AtomicBool::new(false));
        (
            Box::new(StubFactory {
                name,
                called: flag.clone(),
            }),
            flag,
        )
    }

    fn config(backend: &str) -> DbConfig {
        DbConfig {
            backend: backend.to_string(),
            connection_string: ":memory:".to_string(),
        }
    }

    #[test]
    fn backends_listed_once_in_name_order() {
        let mut registry = RepositoryRegistry::new();
        assert!(registry.available_backends().is_empty());

        for name in ["sqlite", "postgres", "sqlite"] {
            registry.register(stub_factory(name).0);
        }

        assert_eq!(registry.available_backends(), vec!["postgres", "sqlite"]);
    }

    #[tokio::test]
    async fn backend_name_ignores_case_and_padding() {
        let mut registry = RepositoryRegistry::new();
        let (factory, called) = stub_factory("sqlite");
        registry.register(factory);

        assert!(registry.create(&config(" SQLite ")).await.is_ok());
        assert!(called.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn create_calls_matching_factory_only() {
        let mut registry = RepositoryRegistry::new();
        let (sqlite_factory, sqlite_called) = stub_factory("sqlite");
        let (postgres_factory, postgres_called) = stub_factory("postgres");
        registry.register(sqlite_factory);
        registry.register(postgres_factory);

        let result = registry.create(&config("sqlite")).await;

        assert!(result.is_ok(), "unexpected error: {:?}", result.err());
        assert!(sqlite_called.load(Ordering::SeqCst));
        assert!(!postgres_called.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn unknown_backend_is_a_configuration_error() {
        let mut registry = RepositoryRegistry::new();
        registry.register(stub_factory("sqlite").0);

        let err = registry.create(&config("postgres")).await.err();

        assert_eq!(
            err,
            Some(RepositoryError::Configuration(
                "no 'postgres' backend in this build (have: sqlite)".to_string()
            ))
        );
    }

    #[tokio::test]
    async fn create_propagates_factory_error() {
        let mut registry = RepositoryRegistry::new();
        registry.register(Box::new(FailingFactory));

        let err = registry.create(&config("failing")).await.err();

        assert_eq!(
            err,
            Some(RepositoryError::Connection("database locked".to_string()))
        );
    }
}
