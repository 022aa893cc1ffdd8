//! Ledger kept in a JSON file
//!
//! Writes go to a sibling temporary file that is renamed over the ledger, so
//! a crash leaves either the old or the new ledger on disk. The run lock is a
//! `<ledger>.lock` file created exclusively.

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use super::StateStore;
use crate::definitions::AppliedRecord;
use crate::error::{MigrateResult, MigrationError};
use crate::version::Version;

#[derive(Debug, Default, Serialize, Deserialize)]
struct Ledger {
    migrations: Vec<AppliedRecord>,
}

#[derive(Debug)]
pub struct JsonFileStateStore {
    path: PathBuf,
    lock_path: PathBuf,
    holds_lock: AtomicBool,
}

impl JsonFileStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let lock_path = sibling(&path, ".lock");
        Self {
            path,
            lock_path,
            holds_lock: AtomicBool::new(false),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> MigrateResult<Ledger> {
        if !self.path.exists() {
            return Ok(Ledger::default());
        }
        let content = fs::read_to_string(&self.path)?;
        if content.trim().is_empty() {
            return Ok(Ledger::default());
        }
        let mut ledger: Ledger = serde_json::from_str(&content)?;
        ledger.migrations.sort_by_key(|r| r.version);
        Ok(ledger)
    }

    fn write(&self, ledger: &Ledger) -> MigrateResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let tmp = sibling(&self.path, ".tmp");
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(serde_json::to_string_pretty(ledger)?.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

#[async_trait]
impl StateStore for JsonFileStateStore {
    async fn prepare(&self) -> MigrateResult<()> {
        if !self.path.exists() {
            self.write(&Ledger::default())?;
        }
        Ok(())
    }

    async fn applied(&self) -> MigrateResult<Vec<AppliedRecord>> {
        Ok(self.read()?.migrations)
    }

    async fn record(
        &self,
        version: Version,
        description: &str,
        execution_time_ms: u64,
    ) -> MigrateResult<AppliedRecord> {
        let mut ledger = self.read()?;
        if ledger.migrations.iter().any(|r| r.version == version) {
            return Err(MigrationError::AlreadyRecorded(version));
        }
        let record = AppliedRecord {
            version,
            description: description.to_string(),
            applied_at: Utc::now(),
            execution_time_ms,
        };
        ledger.migrations.push(record.clone());
        ledger.migrations.sort_by_key(|r| r.version);
        self.write(&ledger)?;
        Ok(record)
    }

    async fn remove(&self, version: Version) -> MigrateResult<()> {
        let mut ledger = self.read()?;
        let before = ledger.migrations.len();
        ledger.migrations.retain(|r| r.version != version);
        if ledger.migrations.len() == before {
            return Err(MigrationError::NotRecorded(version));
        }
        self.write(&ledger)
    }

    async fn lock(&self) -> MigrateResult<()> {
        create_exclusive(&self.lock_path, |file| writeln!(file, "{}", std::process::id())).map_err(
            |e| match e.kind() {
                io::ErrorKind::AlreadyExists => MigrationError::Locked(self.lock_path.display().to_string()),
                _ => MigrationError::Io(e),
            },
        )?;
        self.holds_lock.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn unlock(&self) -> MigrateResult<()> {
        if self.holds_lock.swap(false, Ordering::SeqCst) {
            fs::remove_file(&self.lock_path)?;
        }
        Ok(())
    }
}

/// Create `path` only if it does not exist yet. A file that could not be
/// filled is removed again so it cannot outlive the failed attempt.
fn create_exclusive<F>(path: &Path, fill: F) -> io::Result<()>
where
    F: FnOnce(&mut File) -> io::Result<()>,
{
    let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
    if let Err(e) = fill(&mut file) {
        drop(file);
        let _ = fs::remove_file(path);
        return Err(e);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_ledger_survives_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("ledger.json");

        let store = JsonFileStateStore::new(&path);
        store.prepare().await.unwrap();
        store.record(Version::new(2), "add email index", 12).await.unwrap();
        store.record(Version::new(1), "create users", 3).await.unwrap();
        drop(store);

        let reopened = JsonFileStateStore::new(&path);
        let applied = reopened.applied().await.unwrap();
        assert_eq!(applied.len(), 2);
        assert_eq!(applied[0].version, Version::new(1));
        assert_eq!(applied[1].execution_time_ms, 12);
        assert_eq!(reopened.current_version().await.unwrap(), Version::new(2));
    }

    #[tokio::test]
    async fn test_double_record_and_missing_remove() {
        let temp_dir = TempDir::new().unwrap();
        let store = JsonFileStateStore::new(temp_dir.path().join("ledger.json"));

        store.record(Version::new(1), "create users", 1).await.unwrap();
        assert!(matches!(
            store.record(Version::new(1), "create users", 1).await,
            Err(MigrationError::AlreadyRecorded(_))
        ));
        assert!(matches!(
            store.remove(Version::new(5)).await,
            Err(MigrationError::NotRecorded(_))
        ));
        store.remove(Version::new(1)).await.unwrap();
        assert!(store.applied().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_lock_file_excludes_second_store() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("ledger.json");
        let first = JsonFileStateStore::new(&path);
        let second = JsonFileStateStore::new(&path);

        first.lock().await.unwrap();
        assert!(matches!(second.lock().await, Err(MigrationError::Locked(_))));

        // Only the holder removes the lock file.
        second.unlock().await.unwrap();
        assert!(temp_dir.path().join("ledger.json.lock").exists());

        first.unlock().await.unwrap();
        second.lock().await.unwrap();
        second.unlock().await.unwrap();
    }

    #[tokio::test]
    async fn test_unwritable_lock_file_is_not_left_behind() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("ledger.json");
        let store = JsonFileStateStore::new(&path);
        let lock_path = temp_dir.path().join("ledger.json.lock");

        let err = create_exclusive(&lock_path, |_| Err(io::Error::new(io::ErrorKind::Other, "disk full")))
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::Other);
        assert!(!lock_path.exists());

        store.lock().await.unwrap();
        assert!(lock_path.exists());
        store.unlock().await.unwrap();
        assert!(!lock_path.exists());
    }
}
