//! Units registered in code

use std::sync::Arc;

use super::MigrationSource;
use crate::database::MigrationOperation;
use crate::definitions::MigrationUnit;
use crate::error::MigrateResult;
use crate::version::Version;

/// In-process list of units with explicit operation values
#[derive(Debug, Clone, Default)]
pub struct CodeSource {
    units: Vec<MigrationUnit>,
}

impl CodeSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a unit with custom operations
    pub fn register(
        mut self,
        version: i64,
        description: &str,
        up: Arc<dyn MigrationOperation>,
        down: Arc<dyn MigrationOperation>,
    ) -> Self {
        self.units.push(MigrationUnit::new(Version::new(version), description, up, down));
        self
    }

    /// Register a unit whose changes are plain SQL
    pub fn sql(mut self, version: i64, description: &str, up: &str, down: &str) -> Self {
        self.units.push(MigrationUnit::sql(Version::new(version), description, up, down));
        self
    }

    pub fn push(&mut self, unit: MigrationUnit) {
        self.units.push(unit);
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

impl MigrationSource for CodeSource {
    fn name(&self) -> String {
        "code".to_string()
    }

    fn load(&self) -> MigrateResult<Vec<MigrationUnit>> {
        Ok(self.units.clone())
    }
}
