use anyhow::{bail, Context, Result};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use elif_migrations::{
    Catalog, ConfigSource, Database, DirectorySource, JsonFileStateStore, MigrationConfig, MigrationRunner,
    OfflineDatabase, PgDatabase, RunSummary, Scaffolder, Version,
};

use crate::output;

/// Options shared by every migration command
#[derive(Debug, Clone, Default, clap::Args)]
pub struct ConnectionArgs {
    /// Directory holding migration files (default: $MIGRATIONS_DIR or ./migrations)
    #[arg(long, global = true)]
    pub dir: Option<PathBuf>,

    /// Ledger table name (default: $MIGRATIONS_TABLE or elif_migrations)
    #[arg(long, global = true)]
    pub table: Option<String>,

    /// Database URL (default: $DATABASE_URL)
    #[arg(long, global = true)]
    pub database_url: Option<String>,

    /// Keep the ledger in a JSON file instead of the database
    #[arg(long, global = true)]
    pub ledger: Option<PathBuf>,

    /// Do not wrap each migration in a transaction
    #[arg(long, global = true)]
    pub no_transaction: bool,
}

impl ConnectionArgs {
    pub fn config(&self) -> Result<MigrationConfig> {
        let mut config = MigrationConfig::from_env()?;
        if let Some(dir) = &self.dir {
            config.migrations_dir = dir.clone();
        }
        if let Some(table) = &self.table {
            config.migrations_table = table.clone();
        }
        if let Some(url) = &self.database_url {
            config.database_url = Some(url.clone());
        }
        if self.no_transaction {
            config.transactional = false;
        }
        config.validate()?;

        for (field, source) in self.config_sources(&config) {
            tracing::debug!(field = %field, source = ?source, "configuration source");
        }
        Ok(config)
    }

    /// Where each setting came from, with flags taking precedence
    pub fn config_sources(&self, config: &MigrationConfig) -> BTreeMap<String, ConfigSource> {
        let mut sources: BTreeMap<_, _> = config.config_sources().into_iter().collect();
        let flags = [
            ("migrations_dir", "--dir", self.dir.is_some()),
            ("migrations_table", "--table", self.table.is_some()),
            ("database_url", "--database-url", self.database_url.is_some()),
            ("transactional", "--no-transaction", self.no_transaction),
        ];
        for (field, flag, set) in flags {
            if set {
                sources.insert(field.to_string(), ConfigSource::Explicit(flag.to_string()));
            }
        }
        sources
    }

    async fn runner(&self) -> Result<MigrationRunner> {
        let config = self.config()?;

        let Some(ledger) = &self.ledger else {
            if config.database_url.is_none() {
                bail!("DATABASE_URL is not set; pass --database-url or use --ledger <file>");
            }
            return MigrationRunner::connect(config)
                .await
                .context("failed to open the migration ledger");
        };

        let database: Arc<dyn Database> = match config.database_url.as_deref() {
            Some(url) => Arc::new(PgDatabase::connect(url).await?),
            None => Arc::new(OfflineDatabase),
        };
        let source = DirectorySource::new(&config.migrations_dir);
        Ok(MigrationRunner::new(
            config,
            Box::new(source),
            Arc::new(JsonFileStateStore::new(ledger)),
            database,
        ))
    }
}

fn finish(summary: &RunSummary, json: bool) -> Result<ExitCode> {
    if json {
        println!("{}", serde_json::to_string_pretty(summary)?);
    } else {
        print!("{}", output::render_summary(summary));
    }
    Ok(if summary.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

pub fn create(args: &ConnectionArgs, name: &str) -> Result<ExitCode> {
    let config = args.config()?;
    let catalog = Catalog::discover(&DirectorySource::new(&config.migrations_dir))?;
    let created = Scaffolder::new(&config.migrations_dir).create(name, catalog.latest_version())?;

    println!("Created migration: {}", created.path.display());
    Ok(ExitCode::SUCCESS)
}

pub async fn run(args: &ConnectionArgs, target: Option<i64>, dry_run: bool, json: bool) -> Result<ExitCode> {
    let runner = args.runner().await?;
    let summary = runner.migrate(target.map(Version::new), dry_run).await?;
    finish(&summary, json)
}

pub async fn rollback(
    args: &ConnectionArgs,
    target: Option<i64>,
    steps: Option<usize>,
    dry_run: bool,
    json: bool,
) -> Result<ExitCode> {
    let runner = args.runner().await?;
    let summary = match (target, steps) {
        (Some(target), _) => runner.rollback(Version::new(target), dry_run).await?,
        (None, Some(steps)) => runner.rollback_steps(steps, dry_run).await?,
        // Rollback the last migration
        (None, None) => runner.rollback_steps(1, dry_run).await?,
    };
    finish(&summary, json)
}

pub async fn reset(args: &ConnectionArgs, dry_run: bool, json: bool) -> Result<ExitCode> {
    let runner = args.runner().await?;
    let summary = runner.reset(dry_run).await?;
    finish(&summary, json)
}

pub async fn status(args: &ConnectionArgs, json: bool) -> Result<ExitCode> {
    let runner = args.runner().await?;
    let report = runner.status().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", output::render_status(&report));
    }
    Ok(ExitCode::SUCCESS)
}
