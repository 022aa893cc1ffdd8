//! Unit sources
//!
//! A source enumerates the raw units it knows about. Ordering and duplicate
//! checks happen in the [`Catalog`](crate::catalog::Catalog), not here.

pub mod code;
pub mod directory;

pub use code::CodeSource;
pub use directory::DirectorySource;

use crate::definitions::MigrationUnit;
use crate::error::MigrateResult;

/// Enumerates migration units from wherever they are stored
pub trait MigrationSource: Send + Sync {
    /// Short label used in logs
    fn name(&self) -> String;

    /// Load every unit this source provides, in any order
    fn load(&self) -> MigrateResult<Vec<MigrationUnit>>;
}
