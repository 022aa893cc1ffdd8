//! Non-durable ledger for tests and embedded use

use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Mutex;

use super::StateStore;
use crate::definitions::AppliedRecord;
use crate::error::{MigrateResult, MigrationError};
use crate::version::Version;

#[derive(Debug, Default)]
pub struct InMemoryStateStore {
    records: Mutex<BTreeMap<Version, AppliedRecord>>,
    locked: Mutex<bool>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the ledger with already applied records
    pub fn with_records(records: impl IntoIterator<Item = AppliedRecord>) -> Self {
        let store = Self::new();
        if let Ok(mut map) = store.records.lock() {
            map.extend(records.into_iter().map(|r| (r.version, r)));
        }
        store
    }

    pub fn is_locked(&self) -> bool {
        self.locked.lock().map(|l| *l).unwrap_or(false)
    }

    fn records(&self) -> MigrateResult<std::sync::MutexGuard<'_, BTreeMap<Version, AppliedRecord>>> {
        self.records
            .lock()
            .map_err(|_| MigrationError::Database("in-memory ledger lock poisoned".to_string()))
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn prepare(&self) -> MigrateResult<()> {
        Ok(())
    }

    async fn applied(&self) -> MigrateResult<Vec<AppliedRecord>> {
        Ok(self.records()?.values().cloned().collect())
    }

    async fn record(
        &self,
        version: Version,
        description: &str,
        execution_time_ms: u64,
    ) -> MigrateResult<AppliedRecord> {
        let mut records = self.records()?;
        if records.contains_key(&version) {
            return Err(MigrationError::AlreadyRecorded(version));
        }
        let record = AppliedRecord {
            version,
            description: description.to_string(),
            applied_at: Utc::now(),
            execution_time_ms,
        };
        records.insert(version, record.clone());
        Ok(record)
    }

    async fn remove(&self, version: Version) -> MigrateResult<()> {
        self.records()?
            .remove(&version)
            .map(|_| ())
            .ok_or(MigrationError::NotRecorded(version))
    }

    async fn lock(&self) -> MigrateResult<()> {
        let mut locked = self
            .locked
            .lock()
            .map_err(|_| MigrationError::Locked("in-memory lock poisoned".to_string()))?;
        if *locked {
            return Err(MigrationError::Locked("in-memory ledger".to_string()));
        }
        *locked = true;
        Ok(())
    }

    async fn unlock(&self) -> MigrateResult<()> {
        if let Ok(mut locked) = self.locked.lock() {
            *locked = false;
        }
        Ok(())
    }
}
