//! Migration Definitions - Core types shared across the engine
//!
//! Defines the discovered unit, the ledger record and the direction a unit
//! is executed in.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::database::{MigrationOperation, SqlOperation};
use crate::version::Version;

/// A single versioned, reversible schema change.
///
/// Operations are resolved once when the unit is discovered and never looked
/// up again by name.
#[derive(Clone)]
pub struct MigrationUnit {
    version: Version,
    description: String,
    origin: String,
    up: Arc<dyn MigrationOperation>,
    down: Arc<dyn MigrationOperation>,
}

impl MigrationUnit {
    pub fn new(
        version: Version,
        description: impl Into<String>,
        up: Arc<dyn MigrationOperation>,
        down: Arc<dyn MigrationOperation>,
    ) -> Self {
        let description = description.into();
        Self {
            version,
            origin: description.clone(),
            description,
            up,
            down,
        }
    }

    /// Unit whose forward and reverse changes are SQL blocks
    pub fn sql(
        version: Version,
        description: impl Into<String>,
        up_sql: impl Into<String>,
        down_sql: impl Into<String>,
    ) -> Self {
        Self::new(
            version,
            description,
            Arc::new(SqlOperation::new(up_sql)),
            Arc::new(SqlOperation::new(down_sql)),
        )
    }

    /// Record where the unit came from (file name, module path)
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = origin.into();
        self
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn operation(&self, direction: MigrationDirection) -> &dyn MigrationOperation {
        match direction {
            MigrationDirection::Up => self.up.as_ref(),
            MigrationDirection::Down => self.down.as_ref(),
        }
    }
}

impl fmt::Debug for MigrationUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MigrationUnit")
            .field("version", &self.version)
            .field("description", &self.description)
            .field("origin", &self.origin)
            .finish_non_exhaustive()
    }
}

/// Ledger row for an applied unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedRecord {
    pub version: Version,
    pub description: String,
    pub applied_at: DateTime<Utc>,
    pub execution_time_ms: u64,
}

/// Migration direction for execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MigrationDirection {
    /// Apply the migration (run the forward operation)
    Up,
    /// Revert the migration (run the reverse operation)
    Down,
}

impl fmt::Display for MigrationDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MigrationDirection::Up => write!(f, "up"),
            MigrationDirection::Down => write!(f, "down"),
        }
    }
}
