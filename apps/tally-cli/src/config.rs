//! # CLI Configuration
//!
//! Where the database lives, who the operator is, and the ledger policy.
//!
//! ## Config File Location
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  --config <PATH> / TALLY_CONFIG, otherwise:                             │
//! │     ~/.config/tally/tally.toml (Linux)                                  │
//! │     ~/Library/Application Support/com.tally.tally/tally.toml (macOS)    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//! ```toml
//! # tally.toml
//! [database]
//! path = "/var/lib/tally/tally.db"
//! max_connections = 5
//!
//! [operator]
//! id = "admin-1"
//!
//! [policy]
//! default_commission_percent = 20
//! restock_on_return = false
//! commission_approved_only = false
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tally_core::{CommissionRate, LedgerPolicy};
use tally_db::DbConfig;
use thiserror::Error;
use tracing::{debug, info};

/// Configuration error types.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {0}")]
    InvalidValue(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

// =============================================================================
// Sections
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    pub path: PathBuf,
    pub max_connections: u32,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: default_database_path(),
            max_connections: 5,
        }
    }
}

/// The administrator the CLI acts as.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OperatorSettings {
    pub id: String,
}

impl Default for OperatorSettings {
    fn default() -> Self {
        OperatorSettings {
            id: "admin".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicySettings {
    /// Whole percent given to newly registered sellers.
    pub default_commission_percent: u32,
    pub restock_on_return: bool,
    pub commission_approved_only: bool,
}

impl Default for PolicySettings {
    fn default() -> Self {
        PolicySettings {
            default_commission_percent: 20,
            restock_on_return: false,
            commission_approved_only: false,
        }
    }
}

// =============================================================================
// AppConfig
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub operator: OperatorSettings,

    #[serde(default)]
    pub policy: PolicySettings,
}

impl AppConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (tally.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading config from file");
                config = Self::from_file(&path)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;

        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    /// Applies `TALLY_*` overrides read through `lookup`.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup("TALLY_DB_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = PathBuf::from(path);
        }

        if let Some(id) = lookup("TALLY_OPERATOR_ID") {
            debug!(operator_id = %id, "Overriding operator from environment");
            self.operator.id = id;
        }

        if let Some(percent) = lookup("TALLY_DEFAULT_COMMISSION_PERCENT") {
            self.policy.default_commission_percent = percent
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue("TALLY_DEFAULT_COMMISSION_PERCENT".into()))?;
        }

        if let Some(flag) = lookup("TALLY_RESTOCK_ON_RETURN") {
            self.policy.restock_on_return = match flag.trim().to_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                _ => return Err(ConfigError::InvalidValue("TALLY_RESTOCK_ON_RETURN".into())),
            };
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.operator.id.trim().is_empty() {
            return Err(ConfigError::Invalid("operator id must not be empty".into()));
        }

        if self.database.path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("database path must not be empty".into()));
        }

        if self.database.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "max_connections must be greater than 0".into(),
            ));
        }

        if self.policy.default_commission_percent > 100 {
            return Err(ConfigError::Invalid(format!(
                "default_commission_percent must be at most 100, got {}",
                self.policy.default_commission_percent
            )));
        }

        Ok(())
    }

    pub fn db_config(&self) -> DbConfig {
        DbConfig::new(&self.database.path).max_connections(self.database.max_connections)
    }

    pub fn policy(&self) -> LedgerPolicy {
        LedgerPolicy {
            default_commission_rate: CommissionRate::from_percent(
                self.policy.default_commission_percent,
            ),
            restock_on_return: self.policy.restock_on_return,
            commission_approved_only: self.policy.commission_approved_only,
        }
    }

    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "tally", "tally")
            .map(|dirs| dirs.config_dir().join("tally.toml"))
    }
}

fn default_database_path() -> PathBuf {
    directories::ProjectDirs::from("com", "tally", "tally")
        .map(|dirs| dirs.data_dir().join("tally.db"))
        .unwrap_or_else(|| PathBuf::from("./tally.db"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        config.validate().unwrap();

        let policy = config.policy();
        assert_eq!(policy.default_commission_rate.bps(), 2000);
        assert!(!policy.restock_on_return);
        assert!(!policy.commission_approved_only);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            [operator]
            id = "admin-7"

            [policy]
            restock_on_return = true
            commission_approved_only = true
            "#,
        )
        .unwrap();

        assert_eq!(config.operator.id, "admin-7");
        assert!(config.policy.restock_on_return);
        assert!(config.policy().commission_approved_only);
        assert_eq!(config.policy.default_commission_percent, 20);
        assert_eq!(config.database.max_connections, 5);
    }

    #[test]
    fn test_env_overrides_file_values() {
        let mut config: AppConfig = toml::from_str(
            r#"
            [database]
            path = "/srv/tally.db"
            "#,
        )
        .unwrap();

        config
            .apply_env_overrides(env(&[
                ("TALLY_DB_PATH", "/tmp/other.db"),
                ("TALLY_OPERATOR_ID", "ops"),
                ("TALLY_DEFAULT_COMMISSION_PERCENT", "15"),
                ("TALLY_RESTOCK_ON_RETURN", "yes"),
            ]))
            .unwrap();

        assert_eq!(config.database.path, PathBuf::from("/tmp/other.db"));
        assert_eq!(config.operator.id, "ops");
        assert_eq!(config.policy().default_commission_rate.bps(), 1500);
        assert!(config.policy().restock_on_return);
    }

    #[test]
    fn test_bad_env_values_are_rejected() {
        let mut config = AppConfig::default();
        let err = config
            .apply_env_overrides(env(&[("TALLY_DEFAULT_COMMISSION_PERCENT", "twenty")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(_)));

        let err = config
            .apply_env_overrides(env(&[("TALLY_RESTOCK_ON_RETURN", "maybe")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(_)));
    }

    #[test]
    fn test_validation() {
        let mut config = AppConfig::default();
        config.operator.id = "  ".to_string();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.policy.default_commission_percent = 101;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.database.max_connections = 0;
        assert!(config.validate().is_err());
    }
}
