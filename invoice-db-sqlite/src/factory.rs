use std::path::PathBuf;

use async_trait::async_trait;

use invoice_core::db::repository::{InvoiceRepository, RepositoryError};
use invoice_core::db::{DbConfig, RepositoryFactory};
use tracing::debug;

use crate::repository::SqliteRepository;

/// Directory holding the seed SQL files.
///
/// `INVOICE_DB_SQLITE_SEEDS_DIR` wins when set. Otherwise `./seeds` is used if
/// present, and this crate's own `seeds/` directory after that.
pub fn seeds_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("INVOICE_DB_SQLITE_SEEDS_DIR") {
        return PathBuf::from(dir);
    }
    let cwd_seeds = PathBuf::from("./seeds");
    if cwd_seeds.is_dir() {
        return cwd_seeds;
    }
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("seeds")
}

/// The `"sqlite"` backend.
///
/// ```rust,no_run
/// use invoice_core::db::RepositoryRegistry;
/// use invoice_db_sqlite::SqliteRepositoryFactory;
///
/// let mut registry = RepositoryRegistry::new();
/// registry.register(Box::new(SqliteRepositoryFactory));
/// ```
pub struct SqliteRepositoryFactory;

#[async_trait]
impl RepositoryFactory for SqliteRepositoryFactory {
    fn backend_name(&self) -> &'static str {
        "sqlite"
    }

    /// `connection_string` is a file path, a `sqlite:` URL or `:memory:`.
    /// Missing files are created.
    async fn create(
        &self,
        config: &DbConfig,
    ) -> Result<Box<dyn InvoiceRepository>, RepositoryError> {
        let repo = SqliteRepository::new(&config.connection_string)
            .await
            .map_err(|e| RepositoryError::Connection(format!("{e:#}")))?;
        repo.run_migrations()
            .await
            .map_err(|e| RepositoryError::Database(format!("{e:#}")))?;

        let seeds = seeds_dir();
        debug!(seeds_dir = %seeds.display(), "loading seeds");
        repo.run_seeds(&seeds)
            .await
            .map_err(|e| RepositoryError::Database(format!("{e:#}")))?;
        Ok(Box::new(repo))
    }
}
