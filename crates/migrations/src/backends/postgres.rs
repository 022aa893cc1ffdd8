//! PostgreSQL backend
//!
//! [`PgDatabase`] and [`PostgresStateStore`] share one connection so a unit's
//! statements and its ledger row commit or roll back together.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use sqlx::{Connection, Executor, PgConnection, Row};
use std::sync::{Arc, OnceLock};
use tokio::sync::Mutex;

use crate::database::Database;
use crate::definitions::AppliedRecord;
use crate::error::{MigrateResult, MigrationError};
use crate::state::StateStore;
use crate::version::Version;

/// Database collaborator backed by a single Postgres session
#[derive(Clone)]
pub struct PgDatabase {
    conn: Arc<Mutex<PgConnection>>,
}

impl PgDatabase {
    pub async fn connect(database_url: &str) -> MigrateResult<Self> {
        let conn = PgConnection::connect(database_url)
            .await
            .map_err(|e| MigrationError::Database(format!("Failed to connect to database: {}", e)))?;
        Ok(Self::from_connection(conn))
    }

    pub fn from_connection(conn: PgConnection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    /// Ledger store sharing this session
    pub fn state_store(&self, table: &str, lock_id: i64) -> MigrateResult<PostgresStateStore> {
        PostgresStateStore::new(self.conn.clone(), table, lock_id)
    }

    async fn simple(&self, sql: &str) -> MigrateResult<()> {
        let mut conn = self.conn.lock().await;
        (&mut *conn).execute(sql).await?;
        Ok(())
    }
}

#[async_trait]
impl Database for PgDatabase {
    async fn execute(&self, sql: &str) -> MigrateResult<u64> {
        let mut conn = self.conn.lock().await;
        let result = sqlx::query(sql).execute(&mut *conn).await?;
        Ok(result.rows_affected())
    }

    async fn begin(&self) -> MigrateResult<()> {
        self.simple("BEGIN").await
    }

    async fn commit(&self) -> MigrateResult<()> {
        self.simple("COMMIT").await
    }

    async fn rollback(&self) -> MigrateResult<()> {
        self.simple("ROLLBACK").await
    }
}

fn identifier_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]{0,62}$").expect("valid identifier regex"))
}

/// Check a ledger table name before it is interpolated into SQL
pub fn validate_table_name(table: &str) -> MigrateResult<()> {
    if identifier_pattern().is_match(table) {
        Ok(())
    } else {
        Err(MigrationError::Configuration(format!(
            "'{}' is not a valid table name",
            table
        )))
    }
}

/// Ledger table in Postgres, guarded by a session advisory lock
pub struct PostgresStateStore {
    conn: Arc<Mutex<PgConnection>>,
    table: String,
    lock_id: i64,
}

impl PostgresStateStore {
    fn new(conn: Arc<Mutex<PgConnection>>, table: &str, lock_id: i64) -> MigrateResult<Self> {
        validate_table_name(table)?;
        Ok(Self {
            conn,
            table: table.to_string(),
            lock_id,
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// SQL to create the ledger table
    pub fn create_table_sql(&self) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n    \
                version BIGINT PRIMARY KEY,\n    \
                description TEXT NOT NULL,\n    \
                applied_at TIMESTAMPTZ NOT NULL DEFAULT CURRENT_TIMESTAMP,\n    \
                execution_time_ms BIGINT NOT NULL\n\
            )",
            self.table
        )
    }

    fn applied_sql(&self) -> String {
        format!(
            "SELECT version, description, applied_at, execution_time_ms FROM {} ORDER BY version ASC",
            self.table
        )
    }

    fn record_sql(&self) -> String {
        format!(
            "INSERT INTO {} (version, description, applied_at, execution_time_ms) \
             VALUES ($1, $2, $3, $4) ON CONFLICT (version) DO NOTHING",
            self.table
        )
    }

    fn remove_sql(&self) -> String {
        format!("DELETE FROM {} WHERE version = $1", self.table)
    }

    /// Reads must not create the ledger, so a missing table reads as empty
    async fn ledger_exists(&self, conn: &mut PgConnection) -> MigrateResult<bool> {
        let row = sqlx::query(
            "SELECT EXISTS (SELECT 1 FROM information_schema.tables \
             WHERE table_schema = current_schema() AND table_name = $1) AS present",
        )
        .bind(self.table.to_lowercase())
        .fetch_one(&mut *conn)
        .await?;
        Ok(row.try_get("present")?)
    }
}

#[async_trait]
impl StateStore for PostgresStateStore {
    async fn prepare(&self) -> MigrateResult<()> {
        let mut conn = self.conn.lock().await;
        sqlx::query(&self.create_table_sql())
            .execute(&mut *conn)
            .await
            .map_err(|e| MigrationError::Database(format!("Failed to create migrations table: {}", e)))?;
        Ok(())
    }

    async fn applied(&self) -> MigrateResult<Vec<AppliedRecord>> {
        let mut conn = self.conn.lock().await;
        if !self.ledger_exists(&mut conn).await? {
            return Ok(Vec::new());
        }
        let rows = sqlx::query(&self.applied_sql())
            .fetch_all(&mut *conn)
            .await
            .map_err(|e| MigrationError::Database(format!("Failed to query applied migrations: {}", e)))?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let version: i64 = row.try_get("version")?;
            let description: String = row.try_get("description")?;
            let applied_at: DateTime<Utc> = row.try_get("applied_at")?;
            let execution_time_ms: i64 = row.try_get("execution_time_ms")?;

            records.push(AppliedRecord {
                version: Version::new(version),
                description,
                applied_at,
                execution_time_ms: execution_time_ms.max(0) as u64,
            });
        }
        Ok(records)
    }

    async fn current_version(&self) -> MigrateResult<Version> {
        let mut conn = self.conn.lock().await;
        if !self.ledger_exists(&mut conn).await? {
            return Ok(Version::ZERO);
        }
        let sql = format!("SELECT COALESCE(MAX(version), 0) AS current FROM {}", self.table);
        let row = sqlx::query(&sql).fetch_one(&mut *conn).await?;
        let current: i64 = row.try_get("current")?;
        Ok(Version::new(current))
    }

    async fn record(
        &self,
        version: Version,
        description: &str,
        execution_time_ms: u64,
    ) -> MigrateResult<AppliedRecord> {
        let applied_at = Utc::now();
        let mut conn = self.conn.lock().await;
        let result = sqlx::query(&self.record_sql())
            .bind(version.value())
            .bind(description)
            .bind(applied_at)
            .bind(i64::try_from(execution_time_ms).unwrap_or(i64::MAX))
            .execute(&mut *conn)
            .await?;

        if result.rows_affected() == 0 {
            return Err(MigrationError::AlreadyRecorded(version));
        }
        Ok(AppliedRecord {
            version,
            description: description.to_string(),
            applied_at,
            execution_time_ms,
        })
    }

    async fn remove(&self, version: Version) -> MigrateResult<()> {
        let mut conn = self.conn.lock().await;
        let result = sqlx::query(&self.remove_sql())
            .bind(version.value())
            .execute(&mut *conn)
            .await?;
        if result.rows_affected() == 0 {
            return Err(MigrationError::NotRecorded(version));
        }
        Ok(())
    }

    /// Built only from a `PgDatabase`, so it writes on the same session
    fn shares_transaction(&self) -> bool {
        true
    }

    async fn lock(&self) -> MigrateResult<()> {
        let mut conn = self.conn.lock().await;
        let row = sqlx::query("SELECT pg_try_advisory_lock($1) AS locked")
            .bind(self.lock_id)
            .fetch_one(&mut *conn)
            .await?;
        let locked: bool = row.try_get("locked")?;
        if !locked {
            return Err(MigrationError::Locked(format!(
                "advisory lock {} is held by another session",
                self.lock_id
            )));
        }
        Ok(())
    }

    async fn unlock(&self) -> MigrateResult<()> {
        let mut conn = self.conn.lock().await;
        sqlx::query("SELECT pg_advisory_unlock($1)")
            .bind(self.lock_id)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_name_validation() {
        assert!(validate_table_name("elif_migrations").is_ok());
        assert!(validate_table_name("_ledger2").is_ok());
        assert!(validate_table_name("2ledger").is_err());
        assert!(validate_table_name("users; DROP TABLE users").is_err());
        assert!(validate_table_name("").is_err());
    }
}
