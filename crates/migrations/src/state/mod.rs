//! Migration State Store - the durable ledger of applied units
//!
//! The ledger is the only source of truth for the current version. Every
//! implementation must reject double recording and removal of absent rows.

pub mod json_file;
pub mod memory;

pub use json_file::JsonFileStateStore;
pub use memory::InMemoryStateStore;

use async_trait::async_trait;

use crate::definitions::AppliedRecord;
use crate::error::MigrateResult;
use crate::version::Version;

#[async_trait]
pub trait StateStore: Send + Sync {
    /// Create the ledger storage if it does not exist yet
    async fn prepare(&self) -> MigrateResult<()>;

    /// Every applied record, ascending by version
    async fn applied(&self) -> MigrateResult<Vec<AppliedRecord>>;

    /// Highest applied version, or zero when nothing is applied
    async fn current_version(&self) -> MigrateResult<Version> {
        Ok(self
            .applied()
            .await?
            .iter()
            .map(|record| record.version)
            .max()
            .unwrap_or(Version::ZERO))
    }

    /// Record a unit as applied. Fails if the version is already recorded.
    async fn record(
        &self,
        version: Version,
        description: &str,
        execution_time_ms: u64,
    ) -> MigrateResult<AppliedRecord>;

    /// Delete the record for a reverted unit. Fails if it is absent.
    async fn remove(&self, version: Version) -> MigrateResult<()>;

    /// Whether `record` and `remove` run inside the unit's database
    /// transaction. Stores that do not share it are written only after the
    /// unit commits.
    fn shares_transaction(&self) -> bool {
        false
    }

    /// Take the exclusive run lock
    async fn lock(&self) -> MigrateResult<()>;

    async fn unlock(&self) -> MigrateResult<()>;
}
