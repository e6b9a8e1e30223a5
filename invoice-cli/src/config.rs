use std::path::{Path, PathBuf};

use invoice_core::InvoiceSettings;
use invoice_core::db::DbConfig;
use serde::Deserialize;
use thiserror::Error;

/// Looked up in the working directory when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "invoice-admin.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid config file '{path}': {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Everything the admin tool reads from its TOML file.
///
/// ```toml
/// log_level = "debug"
///
/// [database]
/// backend = "sqlite"
/// connection_string = "invoices.db"
///
/// [invoice]
/// default_tax_rate_id = 4
/// default_payment_days = 14
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: DbConfig,
    pub invoice: InvoiceSettings,
    pub log_level: Option<String>,
}

impl AppConfig {
    pub fn from_toml(path: &Path, text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Reads `path` when given. Otherwise reads [`DEFAULT_CONFIG_FILE`] if it
    /// exists, falling back to defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => {
                let default = PathBuf::from(DEFAULT_CONFIG_FILE);
                if !default.is_file() {
                    return Ok(Self::default());
                }
                default
            }
        };

        let text = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        Self::from_toml(&path, &text)
    }

    /// Command-line flags win over the file.
    pub fn with_overrides(mut self, backend: Option<String>, connection_string: Option<String>) -> Self {
        if let Some(backend) = backend {
            self.database.backend = backend;
        }
        if let Some(connection_string) = connection_string {
            self.database.connection_string = connection_string;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;

    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let config = AppConfig::from_toml(Path::new("empty.toml"), "").unwrap();

        assert_eq!(config, AppConfig::default());
        assert_eq!(config.database.backend, "sqlite");
        assert_eq!(config.invoice.default_payment_days, 14);
    }

    #[test]
    fn parses_all_sections() {
        let text = r#"
log_level = "debug"

[database]
backend = "sqlite"
connection_string = "invoices.db"

[invoice]
default_tax_rate_id = 4
fallback_vat_rate = "24.00"
default_payment_days = 30
"#;

        let config = AppConfig::from_toml(Path::new("invoice-admin.toml"), text).unwrap();

        assert_eq!(config.log_level.as_deref(), Some("debug"));
        assert_eq!(config.database.connection_string, "invoices.db");
        assert_eq!(config.invoice.default_tax_rate_id, Some(4));
        assert_eq!(config.invoice.fallback_vat_rate, Some(dec!(24.00)));
        assert_eq!(config.invoice.default_payment_days, 30);
    }

    #[test]
    fn partial_section_keeps_other_defaults() {
        let text = "[database]\nconnection_string = \"other.db\"\n";

        let config = AppConfig::from_toml(Path::new("partial.toml"), text).unwrap();

        assert_eq!(config.database.backend, "sqlite");
        assert_eq!(config.database.connection_string, "other.db");
    }

    #[test]
    fn parse_error_names_the_file() {
        let err = AppConfig::from_toml(Path::new("broken.toml"), "[database\n").unwrap_err();

        assert!(err.to_string().contains("broken.toml"));
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let result = AppConfig::load(Some(Path::new("/nonexistent/invoice-admin.toml")));

        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn flags_override_file_values() {
        let config = AppConfig::default().with_overrides(None, Some("cli.db".to_string()));

        assert_eq!(config.database.backend, "sqlite");
        assert_eq!(config.database.connection_string, "cli.db");
    }
}
