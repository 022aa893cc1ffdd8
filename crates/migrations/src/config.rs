//! Migration configuration
//!
//! Values come from defaults, then environment variables, then whatever the
//! caller overrides explicitly.

use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use thiserror::Error;

use crate::backends::postgres::validate_table_name;

/// Configuration source information for debugging
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    EnvVar(String),
    Default(String),
    /// Set by the caller after loading, e.g. a command line flag
    Explicit(String),
}

#[derive(Debug, Clone)]
pub struct MigrationConfig {
    /// Directory where migration files are stored
    pub migrations_dir: PathBuf,
    /// Table name for tracking applied migrations
    pub migrations_table: String,
    /// Advisory lock key held for the duration of a run
    pub lock_id: i64,
    /// Wrap each unit and its ledger write in one transaction
    pub transactional: bool,
    pub database_url: Option<String>,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            migrations_dir: PathBuf::from("migrations"),
            migrations_table: "elif_migrations".to_string(),
            lock_id: 0x656c_6966, // "elif"
            transactional: true,
            database_url: None,
        }
    }
}

impl MigrationConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let migrations_dir = get_env_optional("MIGRATIONS_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.migrations_dir);
        let migrations_table = get_env_or_default("MIGRATIONS_TABLE", &defaults.migrations_table);

        let lock_id = match get_env_optional("MIGRATIONS_LOCK_ID") {
            Some(value) => value.parse::<i64>().map_err(|_| ConfigError::InvalidValue {
                field: "lock_id".to_string(),
                value,
                expected: "a 64-bit integer".to_string(),
            })?,
            None => defaults.lock_id,
        };

        let transactional = match get_env_optional("MIGRATIONS_TRANSACTIONAL") {
            Some(value) => parse_bool("transactional", value)?,
            None => defaults.transactional,
        };

        let config = MigrationConfig {
            migrations_dir,
            migrations_table,
            lock_id,
            transactional,
            database_url: get_env_optional("DATABASE_URL"),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.migrations_dir.as_os_str().is_empty() {
            return Err(ConfigError::ValidationFailed {
                field: "migrations_dir".to_string(),
                reason: "Migrations directory cannot be empty".to_string(),
            });
        }

        if validate_table_name(&self.migrations_table).is_err() {
            return Err(ConfigError::InvalidValue {
                field: "migrations_table".to_string(),
                value: self.migrations_table.clone(),
                expected: "a plain SQL identifier".to_string(),
            });
        }

        if let Some(url) = &self.database_url {
            if !(url.starts_with("postgres://") || url.starts_with("postgresql://")) {
                return Err(ConfigError::InvalidValue {
                    field: "database_url".to_string(),
                    value: url.clone(),
                    expected: "a postgres:// or postgresql:// URL".to_string(),
                });
            }
        }

        Ok(())
    }

    /// The database URL, required for commands that touch the database
    pub fn require_database_url(&self) -> Result<&str, ConfigError> {
        self.database_url
            .as_deref()
            .ok_or_else(|| ConfigError::MissingEnvVar {
                var: "DATABASE_URL".to_string(),
            })
    }

    pub fn config_sources(&self) -> HashMap<String, ConfigSource> {
        let source = |var: &str, default: &str| {
            if env::var(var).is_ok() {
                ConfigSource::EnvVar(var.to_string())
            } else {
                ConfigSource::Default(default.to_string())
            }
        };

        let mut sources = HashMap::new();
        sources.insert("migrations_dir".to_string(), source("MIGRATIONS_DIR", "migrations"));
        sources.insert("migrations_table".to_string(), source("MIGRATIONS_TABLE", "elif_migrations"));
        sources.insert("lock_id".to_string(), source("MIGRATIONS_LOCK_ID", "1701603686"));
        sources.insert("transactional".to_string(), source("MIGRATIONS_TRANSACTIONAL", "true"));
        sources.insert("database_url".to_string(), source("DATABASE_URL", "<unset>"));
        sources
    }
}

fn parse_bool(field: &str, value: String) -> Result<bool, ConfigError> {
    match value.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            field: field.to_string(),
            value,
            expected: "true or false".to_string(),
        }),
    }
}

// Helper functions for environment variable handling
fn get_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.is_empty())
}

fn get_env_or_default(key: &str, default: &str) -> String {
    get_env_optional(key).unwrap_or_else(|| default.to_string())
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {var}")]
    MissingEnvVar { var: String },

    #[error("Invalid value for {field}: '{value}', expected {expected}")]
    InvalidValue {
        field: String,
        value: String,
        expected: String,
    },

    #[error("Validation failed for {field}: {reason}")]
    ValidationFailed { field: String, reason: String },
}

impl From<ConfigError> for crate::error::MigrationError {
    fn from(err: ConfigError) -> Self {
        crate::error::MigrationError::Configuration(err.to_string())
    }
}
