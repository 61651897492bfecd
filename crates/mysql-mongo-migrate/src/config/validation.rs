//! Configuration validation.

use super::Config;
use crate::error::{MigrateError, Result};

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    // Source validation
    if config.source.host.is_empty() {
        return Err(MigrateError::Config("source.host is required".into()));
    }
    if config.source.database.is_empty() {
        return Err(MigrateError::Config("source.database is required".into()));
    }
    if config.source.user.is_empty() {
        return Err(MigrateError::Config("source.user is required".into()));
    }
    if matches!(config.source.table.as_deref(), Some("")) {
        return Err(MigrateError::Config(
            "source.table must not be empty when set".into(),
        ));
    }

    // Target validation
    if config.target.host.is_empty() {
        return Err(MigrateError::Config("target.host is required".into()));
    }
    if config.target.database.is_empty() {
        return Err(MigrateError::Config("target.database is required".into()));
    }
    if matches!(config.target.table.as_deref(), Some("")) {
        return Err(MigrateError::Config(
            "target.table must not be empty when set".into(),
        ));
    }
    if config.target.table.is_some() && config.source.table.is_none() {
        return Err(MigrateError::Config(
            "target.table requires source.table (single-table mode)".into(),
        ));
    }
    if config.target.password.is_some() && config.target.user.is_none() {
        return Err(MigrateError::Config(
            "target.password requires target.user".into(),
        ));
    }

    // Migration config validation
    if config.migration.concurrency_limit == 0 {
        return Err(MigrateError::Config(
            "migration.concurrency_limit must be at least 1".into(),
        ));
    }
    if config.migration.chunk_size == 0 {
        return Err(MigrateError::Config(
            "migration.chunk_size must be at least 1".into(),
        ));
    }
    if let Some(0) = config.migration.operation_timeout_secs {
        return Err(MigrateError::Config(
            "migration.operation_timeout_secs must be at least 1".into(),
        ));
    }
    if let Some(0) = config.migration.max_source_connections {
        return Err(MigrateError::Config(
            "migration.max_source_connections must be at least 1".into(),
        ));
    }
    if config.source.table.is_some()
        && (!config.migration.include_tables.is_empty()
            || !config.migration.exclude_tables.is_empty())
    {
        return Err(MigrateError::Config(
            "include_tables/exclude_tables only apply when migrating all tables".into(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MigrationConfig, SourceConfig, TargetConfig};

    fn valid_config() -> Config {
        Config {
            source: SourceConfig {
                host: "localhost".to_string(),
                port: 3306,
                user: "root".to_string(),
                password: "password".to_string(),
                database: "shop".to_string(),
                table: None,
            },
            target: TargetConfig {
                host: "localhost".to_string(),
                port: 27017,
                database: "shop".to_string(),
                table: None,
                user: None,
                password: None,
            },
            migration: MigrationConfig::default(),
        }
    }

    #[test]
    fn test_valid_config() {
        let config = valid_config();
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_missing_source_host() {
        let mut config = valid_config();
        config.source.host = "".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_missing_target_database() {
        let mut config = valid_config();
        config.target.database = "".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_dest_table_without_source_table() {
        let mut config = valid_config();
        config.target.table = Some("users".to_string());
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("target.table requires source.table"));
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let mut config = valid_config();
        config.migration.concurrency_limit = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_zero_chunk_size_rejected() {
        let mut config = valid_config();
        config.migration.chunk_size = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_filters_rejected_in_single_table_mode() {
        let mut config = valid_config();
        config.source.table = Some("users".to_string());
        config.migration.exclude_tables = vec!["tmp_*".to_string()];
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_source_config_debug_redacts_password() {
        let mut config = valid_config();
        config.source.password = "super_secret_password_123".to_string();
        let debug_output = format!("{:?}", config.source);
        assert!(
            debug_output.contains("[REDACTED]"),
            "Debug output should contain [REDACTED]"
        );
        assert!(
            !debug_output.contains("super_secret_password_123"),
            "Debug output should not contain actual password value"
        );
    }

    #[test]
    fn test_target_config_debug_redacts_password() {
        let mut config = valid_config();
        config.target.user = Some("admin".to_string());
        config.target.password = Some("super_secret_password_456".to_string());
        let debug_output = format!("{:?}", config.target);
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("super_secret_password_456"));
    }
}
