//! Migration files on disk
//!
//! Each `*.sql` file is one unit named `<version>_<name>.sql`. The legacy
//! `YYYYMMDD_HHMMSS_<name>.sql` layout is read as the 14 digit version
//! `YYYYMMDDHHMMSS`.

use std::fs;
use std::path::{Path, PathBuf};

use super::MigrationSource;
use crate::definitions::MigrationUnit;
use crate::error::{DiscoveryError, MigrateResult, MigrationError};
use crate::version::Version;

/// Loads units from `.sql` files in one directory
#[derive(Debug, Clone)]
pub struct DirectorySource {
    dir: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Preamble,
    Up,
    Down,
}

impl DirectorySource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn parse_file(&self, path: &Path) -> MigrateResult<MigrationUnit> {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| DiscoveryError::UnparseableVersion {
                source_name: file_name.clone(),
                reason: "file name is not valid UTF-8".to_string(),
            })?;

        let (version, name) = parse_stem(stem).map_err(|reason| DiscoveryError::UnparseableVersion {
            source_name: file_name.clone(),
            reason,
        })?;

        let content = fs::read_to_string(path)?;
        let (up_sql, down_sql) = parse_migration_content(&content);

        Ok(MigrationUnit::sql(version, name.replace('_', " "), up_sql, down_sql).with_origin(file_name))
    }
}

impl MigrationSource for DirectorySource {
    fn name(&self) -> String {
        self.dir.display().to_string()
    }

    fn load(&self) -> MigrateResult<Vec<MigrationUnit>> {
        if !self.dir.exists() {
            tracing::debug!(dir = %self.dir.display(), "migrations directory does not exist");
            return Ok(Vec::new());
        }

        let mut units = Vec::new();
        for entry in fs::read_dir(&self.dir).map_err(MigrationError::Io)? {
            let path = entry?.path();
            if path.is_file() && path.extension().map_or(false, |ext| ext == "sql") {
                units.push(self.parse_file(&path)?);
            }
        }
        Ok(units)
    }
}

/// Split a file stem into its version and name parts
fn parse_stem(stem: &str) -> Result<(Version, &str), String> {
    let (prefix, rest) = stem
        .split_once('_')
        .ok_or_else(|| "expected '<version>_<name>'".to_string())?;

    let is_digits = |s: &str| !s.is_empty() && s.chars().all(|c| c.is_ascii_digit());

    // YYYYMMDD_HHMMSS_name
    let (digits, name) = match rest.split_once('_') {
        Some((time, name)) if prefix.len() == 8 && time.len() == 6 && is_digits(time) => {
            (format!("{}{}", prefix, time), name)
        }
        _ if prefix.len() == 8 && rest.len() == 6 && is_digits(rest) => {
            return Err("missing name after the timestamp".to_string());
        }
        _ => (prefix.to_string(), rest),
    };

    if !is_digits(&digits) {
        return Err(format!("version prefix '{}' is not numeric", prefix));
    }
    if name.trim_matches('_').is_empty() {
        return Err("missing name after the version".to_string());
    }

    let version: Version = digits.parse()?;
    if version.is_zero() {
        return Err("version must be greater than zero".to_string());
    }
    Ok((version, name.trim_matches('_')))
}

fn section_marker(line: &str) -> Option<Section> {
    let trimmed = line.trim();
    let comment = trimmed.strip_prefix("--")?.trim().to_lowercase();
    let comment = comment.strip_prefix("+migrate").map(str::trim).unwrap_or(&comment);

    if comment == "up" || comment.starts_with("up migration") {
        Some(Section::Up)
    } else if comment == "down" || comment.starts_with("down migration") {
        Some(Section::Down)
    } else {
        None
    }
}

/// Extract the up and down SQL blocks from a migration file
fn parse_migration_content(content: &str) -> (String, String) {
    let mut up_sql = Vec::new();
    let mut down_sql = Vec::new();
    let mut section = Section::Preamble;

    for line in content.lines() {
        if let Some(marker) = section_marker(line) {
            section = marker;
            continue;
        }

        // Skip comment lines and empty lines
        if line.trim().is_empty() || line.trim().starts_with("--") {
            continue;
        }

        match section {
            Section::Up => up_sql.push(line),
            Section::Down => down_sql.push(line),
            Section::Preamble => {}
        }
    }

    (
        up_sql.join("\n").trim().to_string(),
        down_sql.join("\n").trim().to_string(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_stem_layouts() {
        assert_eq!(
            parse_stem("20240101120000_create_users").unwrap(),
            (Version::new(20240101120000), "create_users")
        );
        assert_eq!(
            parse_stem("20240101_120000_create_users").unwrap(),
            (Version::new(20240101120000), "create_users")
        );
        assert_eq!(parse_stem("3_create_posts").unwrap(), (Version::new(3), "create_posts"));
    }

    #[test]
    fn test_double_underscore_layout() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(
            temp_dir.path().join("20240101_120000__create_users.sql"),
            "-- Up migration\nCREATE TABLE users (id INT);\n-- Down migration\nDROP TABLE users;",
        )
        .unwrap();

        let units = DirectorySource::new(temp_dir.path()).load().unwrap();
        assert_eq!(units[0].version(), Version::new(20240101120000));
        assert_eq!(units[0].description(), "create users");
    }

    #[test]
    fn test_parse_stem_rejects_bad_names() {
        assert!(parse_stem("create_users").is_err());
        assert!(parse_stem("20240101").is_err());
        assert!(parse_stem("0_nothing").is_err());
        assert!(parse_stem("12_").is_err());
        assert!(parse_stem("20240101_120000").is_err());
    }

    #[test]
    fn test_parse_content_sections() {
        let content = "-- Migration: users\n\
                       -- Created: 2024-01-01\n\n\
                       -- Up migration\n\
                       CREATE TABLE users (id INT);\n\
                       -- a note\n\
                       CREATE INDEX users_id ON users (id);\n\n\
                       -- Down migration\n\
                       DROP TABLE users;\n";
        let (up, down) = parse_migration_content(content);
        assert_eq!(up, "CREATE TABLE users (id INT);\nCREATE INDEX users_id ON users (id);");
        assert_eq!(down, "DROP TABLE users;");
    }

    #[test]
    fn test_update_comment_is_not_a_marker() {
        assert_eq!(section_marker("-- update the users table"), None);
        assert_eq!(section_marker("-- UP"), Some(Section::Up));
        assert_eq!(section_marker("-- +migrate Down"), Some(Section::Down));
    }

    #[test]
    fn test_load_directory() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(
            temp_dir.path().join("20240101_130000_test2.sql"),
            "-- Up migration\nCREATE TABLE test2 (id INT);\n-- Down migration\nDROP TABLE test2;",
        )
        .unwrap();
        fs::write(
            temp_dir.path().join("20240101120000_test1.sql"),
            "-- Up migration\nCREATE TABLE test1 (id INT);\n-- Down migration\nDROP TABLE test1;",
        )
        .unwrap();
        fs::write(temp_dir.path().join("README.md"), "not a migration").unwrap();

        let source = DirectorySource::new(temp_dir.path());
        let mut units = source.load().unwrap();
        units.sort_by_key(|u| u.version());

        assert_eq!(units.len(), 2);
        assert_eq!(units[0].version(), Version::new(20240101120000));
        assert_eq!(units[0].description(), "test1");
        assert_eq!(units[0].origin(), "20240101120000_test1.sql");
        assert_eq!(units[1].description(), "test2");
    }

    #[test]
    fn test_missing_directory_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let source = DirectorySource::new(temp_dir.path().join("nope"));
        assert!(source.load().unwrap().is_empty());
    }

    #[test]
    fn test_unparseable_file_name() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("users.sql"), "-- Up migration\n").unwrap();

        let err = DirectorySource::new(temp_dir.path()).load().unwrap_err();
        assert!(matches!(
            err,
            MigrationError::Discovery(DiscoveryError::UnparseableVersion { .. })
        ));
    }
}
