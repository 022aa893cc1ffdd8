//! Database backends for the engine's collaborator and ledger traits

pub mod postgres;

pub use postgres::{PgDatabase, PostgresStateStore};
