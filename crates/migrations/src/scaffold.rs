//! Scaffolder - writes skeleton migration files

use chrono::{DateTime, Utc};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{MigrateResult, MigrationError};
use crate::version::{Version, VersionScheme};

/// Creates new `<version>_<name>.sql` units in a directory
#[derive(Debug, Clone)]
pub struct Scaffolder {
    dir: PathBuf,
}

/// A freshly written migration file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScaffoldedMigration {
    pub version: Version,
    pub name: String,
    pub path: PathBuf,
}

impl Scaffolder {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create a migration stamped with the current time
    pub fn create(&self, name: &str, latest: Version) -> MigrateResult<ScaffoldedMigration> {
        self.create_at(name, latest, Utc::now())
    }

    /// Create a migration stamped with `now`.
    ///
    /// A sequentially numbered catalog gets `latest + 1`; anything else gets a
    /// timestamp. The allocated version must sort after `latest`, otherwise the
    /// new unit would land below the current version and never be applied.
    pub fn create_at(
        &self,
        name: &str,
        latest: Version,
        now: DateTime<Utc>,
    ) -> MigrateResult<ScaffoldedMigration> {
        let name = normalize_name(name)?;
        let version = allocate_version(latest, now);
        if version <= latest || (!latest.is_zero() && version.scheme() != latest.scheme()) {
            return Err(MigrationError::VersionCollision { version, latest });
        }

        if self.version_taken(version)? {
            return Err(MigrationError::VersionCollision { version, latest });
        }

        fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(format!("{}_{}.sql", version, name));

        // create_new refuses to clobber a file written in the same second
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::AlreadyExists => MigrationError::VersionCollision { version, latest },
                _ => MigrationError::Io(e),
            })?;
        file.write_all(migration_template(&name, version, now).as_bytes())?;

        tracing::info!(version = %version, path = %path.display(), "created migration");
        Ok(ScaffoldedMigration { version, name, path })
    }

    /// Whether a file in the directory already carries this version
    fn version_taken(&self, version: Version) -> MigrateResult<bool> {
        if !self.dir.exists() {
            return Ok(false);
        }
        let prefix = format!("{}_", version);
        for entry in fs::read_dir(&self.dir)? {
            if entry?.file_name().to_string_lossy().starts_with(&prefix) {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

fn allocate_version(latest: Version, now: DateTime<Utc>) -> Version {
    match latest.scheme() {
        VersionScheme::Sequential if !latest.is_zero() => Version::new(latest.value().saturating_add(1)),
        _ => Version::from_datetime(now),
    }
}

/// Lowercase snake_case name; anything that is not alphanumeric becomes `_`
fn normalize_name(name: &str) -> MigrateResult<String> {
    let mut normalized = String::with_capacity(name.len());
    for c in name.trim().chars() {
        if c.is_ascii_alphanumeric() {
            normalized.push(c.to_ascii_lowercase());
        } else if !normalized.ends_with('_') {
            normalized.push('_');
        }
    }
    let normalized = normalized.trim_matches('_').to_string();

    if normalized.is_empty() {
        return Err(MigrationError::Configuration(format!(
            "migration name '{}' must contain letters or digits",
            name
        )));
    }
    Ok(normalized)
}

fn migration_template(name: &str, version: Version, now: DateTime<Utc>) -> String {
    format!(
        "-- Migration: {}\n\
         -- Version: {}\n\
         -- Created: {}\n\n\
         -- Up migration\n\
         -- Add your schema changes here\n\n\n\
         -- Down migration\n\
         -- Add rollback statements here\n\n",
        name,
        version,
        now.format("%Y-%m-%d %H:%M:%S UTC")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::{DirectorySource, MigrationSource};
    use chrono::TimeZone;
    use tempfile::TempDir;

    #[test]
    fn test_normalize_name() {
        assert_eq!(normalize_name("Create Users Table").unwrap(), "create_users_table");
        assert_eq!(normalize_name("add-email--index!").unwrap(), "add_email_index");
        assert!(normalize_name("  ").is_err());
        assert!(normalize_name("!!!").is_err());
    }

    #[test]
    fn test_create_writes_discoverable_template() {
        let temp_dir = TempDir::new().unwrap();
        let scaffolder = Scaffolder::new(temp_dir.path().join("migrations"));
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();

        let created = scaffolder.create_at("create users table", Version::ZERO, now).unwrap();
        assert_eq!(created.version, Version::new(20240101120000));
        assert!(created.path.ends_with("20240101120000_create_users_table.sql"));

        let content = fs::read_to_string(&created.path).unwrap();
        assert!(content.contains("-- Migration: create_users_table"));
        assert!(content.contains("-- Up migration"));
        assert!(content.contains("-- Down migration"));

        let units = DirectorySource::new(scaffolder.dir()).load().unwrap();
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].version(), created.version);
        assert_eq!(units[0].description(), "create users table");
    }

    #[test]
    fn test_create_rejects_non_increasing_version() {
        let temp_dir = TempDir::new().unwrap();
        let scaffolder = Scaffolder::new(temp_dir.path());
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();

        scaffolder.create_at("first", Version::ZERO, now).unwrap();

        // Same second, as if the catalog was not refreshed
        let err = scaffolder.create_at("second", Version::ZERO, now).unwrap_err();
        assert!(matches!(err, MigrationError::VersionCollision { .. }));

        let err = scaffolder
            .create_at("third", Version::new(20240101120000), now)
            .unwrap_err();
        assert!(matches!(err, MigrationError::VersionCollision { latest, .. } if latest == Version::new(20240101120000)));
    }

    #[test]
    fn test_sequential_catalog_stays_sequential() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(
            temp_dir.path().join("1_create_users.sql"),
            "-- up\nCREATE TABLE users (id INT);\n-- down\nDROP TABLE users;\n",
        )
        .unwrap();
        let scaffolder = Scaffolder::new(temp_dir.path());
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();

        let created = scaffolder.create_at("add posts", Version::new(1), now).unwrap();
        assert_eq!(created.version, Version::new(2));
        assert!(created.path.ends_with("2_add_posts.sql"));

        let catalog = crate::Catalog::discover(&DirectorySource::new(scaffolder.dir())).unwrap();
        assert_eq!(catalog.versions().collect::<Vec<_>>(), vec![Version::new(1), Version::new(2)]);
    }
}
