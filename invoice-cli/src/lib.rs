pub mod config;
pub mod legacy_import;

use invoice_core::db::RepositoryRegistry;
use invoice_db_sqlite::SqliteRepositoryFactory;
use tracing_subscriber::EnvFilter;

pub use config::AppConfig;
pub use legacy_import::{ImportReport, LegacyImporter};

/// Every backend this build can open.
pub fn build_registry() -> RepositoryRegistry {
    let mut registry = RepositoryRegistry::new();
    registry.register(Box::new(SqliteRepositoryFactory));
    registry
}

/// Initialise the tracing subscriber.
///
/// * Honours `RUST_LOG` when set.
/// * Falls back to `default_level` (normally `info`) otherwise.
/// * Strips timestamps and target names to keep CLI output clean.
pub fn init_tracing(default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .without_time()
        .with_target(false)
        .init();
}
