//! Database collaborator and migration operations
//!
//! The engine never talks to a driver directly. Units carry operations that
//! run against a [`Database`], and the runner uses the same handle to wrap
//! each unit in a transaction.

use async_trait::async_trait;
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;

use crate::error::{MigrateResult, MigrationError};

/// Executes schema statements on behalf of migration units
#[async_trait]
pub trait Database: Send + Sync {
    /// Execute a single statement and return the affected row count
    async fn execute(&self, sql: &str) -> MigrateResult<u64>;

    /// Start a transaction around one unit
    async fn begin(&self) -> MigrateResult<()> {
        Ok(())
    }

    async fn commit(&self) -> MigrateResult<()> {
        Ok(())
    }

    async fn rollback(&self) -> MigrateResult<()> {
        Ok(())
    }
}

/// Stand-in used when no database is configured. Planning, status and dry
/// runs work; any attempt to execute a statement fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineDatabase;

#[async_trait]
impl Database for OfflineDatabase {
    async fn execute(&self, _sql: &str) -> MigrateResult<u64> {
        Err(MigrationError::Database(
            "no database configured; set DATABASE_URL".to_string(),
        ))
    }
}

/// A forward or reverse change carried by a migration unit
#[async_trait]
pub trait MigrationOperation: Send + Sync {
    async fn run(&self, db: &dyn Database) -> MigrateResult<()>;
}

/// Operation backed by a block of SQL
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SqlOperation {
    sql: String,
}

impl SqlOperation {
    pub fn new(sql: impl Into<String>) -> Self {
        Self { sql: sql.into() }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn is_empty(&self) -> bool {
        self.sql.trim().is_empty()
    }

    pub fn statements(&self) -> Vec<String> {
        split_sql_statements(&self.sql)
    }
}

#[async_trait]
impl MigrationOperation for SqlOperation {
    async fn run(&self, db: &dyn Database) -> MigrateResult<()> {
        for statement in self.statements() {
            db.execute(&statement).await?;
        }
        Ok(())
    }
}

/// Split a SQL body into executable statements.
///
/// Statements go through `sqlparser` first. Bodies it cannot parse (vendor
/// syntax, procedural blocks) fall back to splitting on `;`.
pub fn split_sql_statements(sql: &str) -> Vec<String> {
    if sql.trim().is_empty() {
        return Vec::new();
    }

    let dialect = GenericDialect {};
    match Parser::parse_sql(&dialect, sql) {
        Ok(parsed) => parsed.into_iter().map(|stmt| format!("{};", stmt)).collect(),
        Err(e) => {
            tracing::warn!(error = %e, "SQL parsing failed, using naive semicolon splitting");
            sql.split(';')
                .map(|s| s.trim())
                .filter(|s| !s.is_empty())
                .map(|s| format!("{};", s))
                .collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        statements: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Database for Recorder {
        async fn execute(&self, sql: &str) -> MigrateResult<u64> {
            self.statements.lock().unwrap().push(sql.to_string());
            Ok(0)
        }
    }

    #[test]
    fn test_split_parsed_statements() {
        let statements =
            split_sql_statements("CREATE TABLE users (id INT);\nCREATE INDEX idx ON users (id);");
        assert_eq!(statements.len(), 2);
        assert!(statements[0].starts_with("CREATE TABLE users"));
        assert!(statements[1].ends_with(';'));
    }

    #[test]
    fn test_split_falls_back_on_unparseable_sql() {
        let statements = split_sql_statements("FROBNICATE everything; FROBNICATE nothing");
        assert_eq!(
            statements,
            vec!["FROBNICATE everything;".to_string(), "FROBNICATE nothing;".to_string()]
        );
    }

    #[test]
    fn test_split_empty() {
        assert!(split_sql_statements("  \n ").is_empty());
    }

    #[tokio::test]
    async fn test_sql_operation_runs_each_statement() {
        let db = Recorder::default();
        let op = SqlOperation::new("CREATE TABLE a (id INT); CREATE TABLE b (id INT);");
        op.run(&db).await.unwrap();
        assert_eq!(db.statements.lock().unwrap().len(), 2);

        let empty = SqlOperation::default();
        assert!(empty.is_empty());
        empty.run(&db).await.unwrap();
        assert_eq!(db.statements.lock().unwrap().len(), 2);
    }
}
