//! Configuration loading and validation.

mod types;
mod validation;

pub use types::*;

use crate::core::TableSpec;
use crate::error::{MigrateError, Result};
use mongodb::options::{ClientOptions, Credential, ServerAddress};
use sqlx::mysql::{MySqlConnectOptions, MySqlSslMode};
use std::path::Path;

/// Which tables a run covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationMode {
    /// Every table in the source database, names mirrored 1:1.
    Bulk,
    /// Exactly one explicit source table → destination collection pair.
    SingleTable(TableSpec),
}

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            MigrateError::Config(format!("Cannot read {}: {}", path.display(), e))
        })?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }

    /// Resolve the run mode from the optional table names.
    pub fn mode(&self) -> MigrationMode {
        match self.source.table {
            Some(ref source) => {
                let dest = self.target.table.clone().unwrap_or_else(|| source.clone());
                MigrationMode::SingleTable(TableSpec::new(source.clone(), dest))
            }
            None => MigrationMode::Bulk,
        }
    }
}

impl SourceConfig {
    /// Build sqlx connection options for the MySQL source.
    pub fn connect_options(&self) -> MySqlConnectOptions {
        MySqlConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.user)
            .password(&self.password)
            .database(&self.database)
            .ssl_mode(MySqlSslMode::Preferred)
    }
}

impl TargetConfig {
    /// Build driver options for the MongoDB target.
    pub fn client_options(&self) -> ClientOptions {
        let mut options = ClientOptions::default();
        options.hosts = vec![ServerAddress::Tcp {
            host: self.host.clone(),
            port: Some(self.port),
        }];
        options.app_name = Some("mysql-mongo-migrate".to_string());

        if let Some(ref user) = self.user {
            let mut credential = Credential::default();
            credential.username = Some(user.clone());
            credential.password = self.password.clone();
            options.credential = Some(credential);
        }

        options
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const MINIMAL: &str = r#"
source:
  database: shop
target:
  database: shop_docs
"#;

    #[test]
    fn test_minimal_yaml_uses_defaults() {
        let config = Config::from_yaml(MINIMAL).unwrap();
        assert_eq!(config.source.host, "localhost");
        assert_eq!(config.source.port, 3306);
        assert_eq!(config.target.port, 27017);
        assert_eq!(config.migration.concurrency_limit, DEFAULT_CONCURRENCY_LIMIT);
        assert_eq!(config.migration.chunk_size, 1_000_000);
        assert!(!config.migration.silent);
        assert!(config.migration.operation_timeout().is_none());
        assert_eq!(config.mode(), MigrationMode::Bulk);
    }

    #[test]
    fn test_single_table_mode_defaults_dest_name() {
        let yaml = r#"
source:
  database: shop
  table: users
target:
  database: shop_docs
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(
            config.mode(),
            MigrationMode::SingleTable(TableSpec::new("users", "users"))
        );
    }

    #[test]
    fn test_single_table_mode_with_renamed_collection() {
        let yaml = r#"
source:
  database: shop
  table: users
target:
  database: shop_docs
  table: customers
migration:
  concurrency_limit: 3
  chunk_size: 500
  operation_timeout_secs: 30
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(
            config.mode(),
            MigrationMode::SingleTable(TableSpec::new("users", "customers"))
        );
        assert_eq!(config.migration.concurrency_limit, 3);
        assert_eq!(config.migration.chunk_size, 500);
        assert_eq!(
            config.migration.operation_timeout(),
            Some(std::time::Duration::from_secs(30))
        );
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(MINIMAL.as_bytes()).unwrap();
        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.source.database, "shop");
    }

    #[test]
    fn test_invalid_yaml_is_error() {
        assert!(Config::from_yaml("source: [").is_err());
    }

    #[test]
    fn test_client_options_with_credentials() {
        let mut config = Config::from_yaml(MINIMAL).unwrap();
        config.target.user = Some("admin".into());
        config.target.password = Some("pw".into());
        let options = config.target.client_options();
        assert_eq!(options.hosts.len(), 1);
        let credential = options.credential.unwrap();
        assert_eq!(credential.username.as_deref(), Some("admin"));
        assert_eq!(credential.password.as_deref(), Some("pw"));
    }

    #[test]
    fn test_client_options_without_credentials() {
        let config = Config::from_yaml(MINIMAL).unwrap();
        assert!(config.target.client_options().credential.is_none());
    }

    #[test]
    fn test_default_source_pool_size_tracks_concurrency() {
        let mut config = Config::from_yaml(MINIMAL).unwrap();
        config.migration.concurrency_limit = 4;
        assert_eq!(config.migration.get_max_source_connections(), 5);
        config.migration.max_source_connections = Some(2);
        assert_eq!(config.migration.get_max_source_connections(), 2);
    }
}
