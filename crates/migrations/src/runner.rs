//! Migration Runner - plans and executes runs against the ledger
//!
//! A run discovers the catalog, reads the ledger, computes a plan and then
//! executes it one unit at a time. The first failing unit halts the run; the
//! summary still lists everything that succeeded before it.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Instant;

use crate::backends::postgres::PgDatabase;
use crate::catalog::Catalog;
use crate::config::MigrationConfig;
use crate::database::Database;
use crate::definitions::{AppliedRecord, MigrationDirection, MigrationUnit};
use crate::error::{MigrateResult, MigrationError};
use crate::report::{MigrationResult, MigrationStatusEntry, RunSummary, StatusReport};
use crate::scaffold::{ScaffoldedMigration, Scaffolder};
use crate::sources::{DirectorySource, MigrationSource};
use crate::state::StateStore;
use crate::version::Version;

/// How far a rollback should go
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollbackTarget {
    /// Revert every applied unit above this version
    Version(Version),
    /// Revert the newest `n` applied units
    Steps(usize),
}

/// Executes migrations against a database and its ledger
pub struct MigrationRunner {
    config: MigrationConfig,
    source: Box<dyn MigrationSource>,
    store: Arc<dyn StateStore>,
    database: Arc<dyn Database>,
}

impl MigrationRunner {
    pub fn new(
        config: MigrationConfig,
        source: Box<dyn MigrationSource>,
        store: Arc<dyn StateStore>,
        database: Arc<dyn Database>,
    ) -> Self {
        Self {
            config,
            source,
            store,
            database,
        }
    }

    /// Runner over the configured migrations directory and a Postgres ledger
    pub async fn connect(config: MigrationConfig) -> MigrateResult<Self> {
        config.validate()?;
        let database = PgDatabase::connect(config.require_database_url()?).await?;
        let store = database.state_store(&config.migrations_table, config.lock_id)?;
        let source = DirectorySource::new(&config.migrations_dir);

        Ok(Self::new(
            config,
            Box::new(source),
            Arc::new(store),
            Arc::new(database),
        ))
    }

    pub fn config(&self) -> &MigrationConfig {
        &self.config
    }

    pub fn store(&self) -> &dyn StateStore {
        self.store.as_ref()
    }

    /// Discover and validate the catalog
    pub fn catalog(&self) -> MigrateResult<Catalog> {
        Catalog::discover(self.source.as_ref())
    }

    /// Apply pending units in ascending order, up to `target` when given
    pub async fn migrate(&self, target: Option<Version>, dry_run: bool) -> MigrateResult<RunSummary> {
        self.exclusive(dry_run, self.run_migrate(target, dry_run)).await
    }

    /// Revert applied units above `target`, newest first
    pub async fn rollback(&self, target: Version, dry_run: bool) -> MigrateResult<RunSummary> {
        self.exclusive(dry_run, self.run_rollback(RollbackTarget::Version(target), dry_run))
            .await
    }

    /// Revert the newest `steps` applied units
    pub async fn rollback_steps(&self, steps: usize, dry_run: bool) -> MigrateResult<RunSummary> {
        self.exclusive(dry_run, self.run_rollback(RollbackTarget::Steps(steps), dry_run))
            .await
    }

    /// Revert every applied unit
    pub async fn reset(&self, dry_run: bool) -> MigrateResult<RunSummary> {
        self.rollback(Version::ZERO, dry_run).await
    }

    /// Catalog and ledger side by side
    pub async fn status(&self) -> MigrateResult<StatusReport> {
        let catalog = self.catalog()?;
        let applied = applied_map(self.store.applied().await?);
        let current = applied.keys().next_back().copied().unwrap_or(Version::ZERO);

        let migrations: Vec<MigrationStatusEntry> = catalog
            .units()
            .map(|unit| {
                let record = applied.get(&unit.version());
                MigrationStatusEntry {
                    version: unit.version(),
                    description: unit.description().to_string(),
                    applied: record.is_some(),
                    applied_at: record.map(|r| r.applied_at),
                    execution_time_ms: record.map(|r| r.execution_time_ms),
                }
            })
            .collect();

        let pending_count = migrations
            .iter()
            .filter(|m| !m.applied && m.version > current)
            .count();
        let out_of_order = migrations
            .iter()
            .filter(|m| !m.applied && m.version < current)
            .map(|m| m.version)
            .collect();
        let orphaned = applied
            .keys()
            .filter(|v| !catalog.contains(**v))
            .copied()
            .collect();

        Ok(StatusReport {
            current_version: current,
            latest_version: catalog.latest_version(),
            total_migrations: catalog.len(),
            applied_count: migrations.iter().filter(|m| m.applied).count(),
            pending_count,
            migrations,
            out_of_order,
            orphaned,
        })
    }

    /// Scaffold a new unit in the migrations directory
    pub fn create_migration(&self, name: &str) -> MigrateResult<ScaffoldedMigration> {
        let latest = self.catalog()?.latest_version();
        Scaffolder::new(&self.config.migrations_dir).create(name, latest)
    }

    /// Hold the ledger lock around a mutating run. Dry runs only read, so
    /// they neither prepare the ledger nor lock it.
    async fn exclusive<F>(&self, dry_run: bool, run: F) -> MigrateResult<RunSummary>
    where
        F: std::future::Future<Output = MigrateResult<RunSummary>>,
    {
        if dry_run {
            return run.await;
        }

        self.store.prepare().await?;
        self.store.lock().await?;
        let result = run.await;
        if let Err(e) = self.store.unlock().await {
            tracing::warn!(error = %e, "failed to release migration lock");
        }
        result
    }

    async fn run_migrate(&self, target: Option<Version>, dry_run: bool) -> MigrateResult<RunSummary> {
        let started = Instant::now();
        let catalog = self.catalog()?;
        let applied = applied_map(self.store.applied().await?);
        let current = self.store.current_version().await?;

        for version in applied.keys().filter(|v| !catalog.contains(**v)) {
            tracing::warn!(version = %version, "applied migration has no unit in the catalog");
        }
        for unit in catalog
            .units()
            .filter(|u| u.version() < current && !applied.contains_key(&u.version()))
        {
            tracing::warn!(
                version = %unit.version(),
                description = unit.description(),
                current = %current,
                "migration is older than the current version and will not be applied"
            );
        }

        let plan: Vec<&MigrationUnit> = catalog
            .units()
            .filter(|u| u.version() > current)
            .filter(|u| target.map_or(true, |t| u.version() <= t))
            .collect();

        tracing::info!(
            current = %current,
            pending = plan.len(),
            dry_run,
            "computed migration plan"
        );

        let summary = self.execute_plan(&plan, MigrationDirection::Up, dry_run, started).await;
        Ok(summary)
    }

    async fn run_rollback(&self, target: RollbackTarget, dry_run: bool) -> MigrateResult<RunSummary> {
        let started = Instant::now();
        let catalog = self.catalog()?;
        let applied: BTreeSet<Version> = self
            .store
            .applied()
            .await?
            .into_iter()
            .map(|r| r.version)
            .collect();

        let target = match target {
            RollbackTarget::Version(version) => {
                if !version.is_zero() && !applied.contains(&version) && !catalog.contains(version) {
                    return Err(MigrationError::UnknownTarget(version));
                }
                version
            }
            RollbackTarget::Steps(steps) => applied
                .iter()
                .rev()
                .nth(steps)
                .copied()
                .unwrap_or(Version::ZERO),
        };

        // Resolve the whole plan first so a gap in history reverts nothing.
        let plan = applied
            .iter()
            .rev()
            .filter(|v| **v > target)
            .map(|v| {
                catalog
                    .lookup(*v)
                    .map_err(|_| MigrationError::InconsistentHistory { version: *v })
            })
            .collect::<MigrateResult<Vec<&MigrationUnit>>>()?;

        tracing::info!(target = %target, candidates = plan.len(), dry_run, "computed rollback plan");

        let summary = self.execute_plan(&plan, MigrationDirection::Down, dry_run, started).await;
        Ok(summary)
    }

    async fn execute_plan(
        &self,
        plan: &[&MigrationUnit],
        direction: MigrationDirection,
        dry_run: bool,
        started: Instant,
    ) -> RunSummary {
        let mut summary = RunSummary::new(direction, dry_run);

        for unit in plan {
            if dry_run {
                summary.push(MigrationResult::planned(unit));
                continue;
            }

            match self.execute_unit(unit, direction).await {
                Ok(elapsed) => {
                    tracing::info!(
                        version = %unit.version(),
                        description = unit.description(),
                        direction = %direction,
                        elapsed_ms = elapsed,
                        "migration finished"
                    );
                    summary.push(MigrationResult::succeeded(unit, elapsed));
                }
                Err((elapsed, error)) => {
                    tracing::error!(
                        version = %unit.version(),
                        direction = %direction,
                        error = %error,
                        "migration failed, halting run"
                    );
                    summary.push(MigrationResult::failed(unit, elapsed, error));
                    break;
                }
            }
        }

        summary.total_time_ms = elapsed_ms(started);
        summary
    }

    /// Run one unit and update the ledger. On failure returns the elapsed
    /// time with either a `UnitExecution` or a `Persistence` error.
    async fn execute_unit(
        &self,
        unit: &MigrationUnit,
        direction: MigrationDirection,
    ) -> Result<u64, (u64, MigrationError)> {
        let transactional = self.config.transactional;
        let unit_error = |message: String| MigrationError::UnitExecution {
            version: unit.version(),
            description: unit.description().to_string(),
            message,
        };
        let persistence_error = |message: String| MigrationError::Persistence {
            version: unit.version(),
            description: unit.description().to_string(),
            message,
        };

        if transactional {
            self.database
                .begin()
                .await
                .map_err(|e| (0, unit_error(format!("failed to start transaction: {}", e))))?;
        }

        let started = Instant::now();
        let outcome = unit.operation(direction).run(self.database.as_ref()).await;
        let elapsed = elapsed_ms(started);

        if let Err(e) = outcome {
            if transactional {
                self.abort(unit).await;
            }
            return Err((elapsed, unit_error(e.to_string())));
        }

        let ledger_in_transaction = transactional && self.store.shares_transaction();
        if ledger_in_transaction {
            if let Err(e) = self.update_ledger(unit, direction, elapsed).await {
                self.abort(unit).await;
                return Err((elapsed, persistence_error(e.to_string())));
            }
        }

        // A failed commit discards the unit's changes, so the ledger must not
        // have been touched outside the transaction yet.
        if transactional {
            if let Err(e) = self.database.commit().await {
                self.abort(unit).await;
                return Err((elapsed, unit_error(format!("commit failed: {}", e))));
            }
        }

        if !ledger_in_transaction {
            self.update_ledger(unit, direction, elapsed)
                .await
                .map_err(|e| (elapsed, persistence_error(e.to_string())))?;
        }

        Ok(elapsed)
    }

    async fn update_ledger(
        &self,
        unit: &MigrationUnit,
        direction: MigrationDirection,
        elapsed: u64,
    ) -> MigrateResult<()> {
        match direction {
            MigrationDirection::Up => self
                .store
                .record(unit.version(), unit.description(), elapsed)
                .await
                .map(|_| ()),
            MigrationDirection::Down => self.store.remove(unit.version()).await,
        }
    }

    async fn abort(&self, unit: &MigrationUnit) {
        if let Err(e) = self.database.rollback().await {
            tracing::error!(version = %unit.version(), error = %e, "transaction rollback failed");
        }
    }
}

fn applied_map(records: Vec<AppliedRecord>) -> BTreeMap<Version, AppliedRecord> {
    records.into_iter().map(|r| (r.version, r)).collect()
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
