//! Error types for the migration engine
//!
//! One enum covers discovery, history consistency, unit execution and ledger
//! persistence failures so callers can tell how far a run progressed.

use thiserror::Error;

use crate::version::Version;

/// Result type alias for migration operations
pub type MigrateResult<T> = Result<T, MigrationError>;

/// Why the catalog could not be built
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiscoveryError {
    #[error("duplicate migration version {version}: '{first}' and '{second}'")]
    DuplicateVersion {
        version: Version,
        first: String,
        second: String,
    },

    #[error("cannot parse a version from '{source_name}': {reason}")]
    UnparseableVersion { source_name: String, reason: String },

    #[error("catalog mixes version schemes: {timestamp} is a timestamp but {sequential} is sequential")]
    MixedSchemes {
        timestamp: Version,
        sequential: Version,
    },
}

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("Discovery error: {0}")]
    Discovery(#[from] DiscoveryError),

    #[error("Inconsistent history: version {version} is applied but has no migration unit")]
    InconsistentHistory { version: Version },

    #[error("Migration {version} ({description}) failed: {message}")]
    UnitExecution {
        version: Version,
        description: String,
        message: String,
    },

    #[error("Migration {version} ({description}) ran but the ledger update failed: {message}")]
    Persistence {
        version: Version,
        description: String,
        message: String,
    },

    #[error("Migration {0} not found")]
    NotFound(Version),

    #[error("Migration {0} is already recorded as applied")]
    AlreadyRecorded(Version),

    #[error("Migration {0} is not recorded as applied")]
    NotRecorded(Version),

    #[error("Rollback target {0} is not zero, an applied version or a known migration")]
    UnknownTarget(Version),

    #[error("Allocated version {version} does not sort after existing version {latest}")]
    VersionCollision { version: Version, latest: Version },

    #[error("Migration ledger is locked by another run: {0}")]
    Locked(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl From<sqlx::Error> for MigrationError {
    fn from(err: sqlx::Error) -> Self {
        MigrationError::Database(err.to_string())
    }
}
