//! Run results and status reporting

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

use crate::definitions::{MigrationDirection, MigrationUnit};
use crate::error::MigrationError;
use crate::version::Version;

/// Outcome of one attempted unit
#[derive(Debug, Serialize)]
pub struct MigrationResult {
    pub version: Version,
    pub description: String,
    pub execution_time_ms: u64,
    pub dry_run: bool,
    #[serde(serialize_with = "serialize_error", skip_serializing_if = "Option::is_none")]
    pub error: Option<MigrationError>,
}

fn serialize_error<S: Serializer>(error: &Option<MigrationError>, serializer: S) -> Result<S::Ok, S::Error> {
    match error {
        Some(err) => serializer.serialize_str(&err.to_string()),
        None => serializer.serialize_none(),
    }
}

impl MigrationResult {
    pub fn planned(unit: &MigrationUnit) -> Self {
        Self {
            version: unit.version(),
            description: unit.description().to_string(),
            execution_time_ms: 0,
            dry_run: true,
            error: None,
        }
    }

    pub fn succeeded(unit: &MigrationUnit, execution_time_ms: u64) -> Self {
        Self {
            version: unit.version(),
            description: unit.description().to_string(),
            execution_time_ms,
            dry_run: false,
            error: None,
        }
    }

    pub fn failed(unit: &MigrationUnit, execution_time_ms: u64, error: MigrationError) -> Self {
        Self {
            version: unit.version(),
            description: unit.description().to_string(),
            execution_time_ms,
            dry_run: false,
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Everything one `migrate` or `rollback` invocation did
#[derive(Debug, Serialize)]
pub struct RunSummary {
    pub direction: MigrationDirection,
    pub dry_run: bool,
    /// Units applied (or reverted, for rollbacks) in execution order
    pub executed: Vec<MigrationResult>,
    pub errors: Vec<MigrationResult>,
    pub total_time_ms: u64,
}

impl RunSummary {
    pub fn new(direction: MigrationDirection, dry_run: bool) -> Self {
        Self {
            direction,
            dry_run,
            executed: Vec::new(),
            errors: Vec::new(),
            total_time_ms: 0,
        }
    }

    pub fn push(&mut self, result: MigrationResult) {
        if result.is_success() {
            self.executed.push(result);
        } else {
            self.errors.push(result);
        }
    }

    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn executed_versions(&self) -> Vec<Version> {
        self.executed.iter().map(|r| r.version).collect()
    }

    pub fn error_versions(&self) -> Vec<Version> {
        self.errors.iter().map(|r| r.version).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.executed.is_empty() && self.errors.is_empty()
    }
}

/// Per-unit line of a status report
#[derive(Debug, Clone, Serialize)]
pub struct MigrationStatusEntry {
    pub version: Version,
    pub description: String,
    pub applied: bool,
    pub applied_at: Option<DateTime<Utc>>,
    pub execution_time_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub current_version: Version,
    pub latest_version: Version,
    pub total_migrations: usize,
    pub applied_count: usize,
    pub pending_count: usize,
    pub migrations: Vec<MigrationStatusEntry>,
    /// Unapplied units numbered below the current version; `migrate` skips them
    pub out_of_order: Vec<Version>,
    /// Applied versions with no unit in the catalog
    pub orphaned: Vec<Version>,
}

impl StatusReport {
    pub fn is_up_to_date(&self) -> bool {
        self.pending_count == 0
    }
}
