//! # elif-migrations: Schema migrations for elif.rs
//!
//! Discovers ordered migration units, tracks which have been applied in a
//! durable ledger, and applies or reverts them one at a time with fail-fast
//! semantics.
//!
//! ```rust,no_run
//! use elif_migrations::{MigrationConfig, MigrationRunner};
//!
//! # async fn example() -> elif_migrations::MigrateResult<()> {
//! let runner = MigrationRunner::connect(MigrationConfig::from_env()?).await?;
//! let summary = runner.migrate(None, false).await?;
//! println!("applied {} migration(s)", summary.executed.len());
//! # Ok(())
//! # }
//! ```

pub mod backends;
pub mod catalog;
pub mod config;
pub mod database;
pub mod definitions;
pub mod error;
pub mod report;
pub mod runner;
pub mod scaffold;
pub mod sources;
pub mod state;
pub mod version;


pub use backends::{PgDatabase, PostgresStateStore};
pub use catalog::Catalog;
pub use config::{ConfigError, ConfigSource, MigrationConfig};
pub use database::{Database, MigrationOperation, OfflineDatabase, SqlOperation};
pub use definitions::{AppliedRecord, MigrationDirection, MigrationUnit};
pub use error::{DiscoveryError, MigrateResult, MigrationError};
pub use report::{MigrationResult, MigrationStatusEntry, RunSummary, StatusReport};
pub use runner::{MigrationRunner, RollbackTarget};
pub use scaffold::{ScaffoldedMigration, Scaffolder};
pub use sources::{CodeSource, DirectorySource, MigrationSource};
pub use state::{InMemoryStateStore, JsonFileStateStore, StateStore};
pub use version::{Version, VersionScheme};
