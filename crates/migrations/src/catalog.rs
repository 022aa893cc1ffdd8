//! Migration Catalog - the validated, ordered set of known units

use std::collections::BTreeMap;

use crate::definitions::MigrationUnit;
use crate::error::{DiscoveryError, MigrateResult, MigrationError};
use crate::sources::MigrationSource;
use crate::version::{Version, VersionScheme};

/// Read-only view over every unit a source provides, ascending by version
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    units: BTreeMap<Version, MigrationUnit>,
}

impl Catalog {
    /// Load units from a source and validate them.
    ///
    /// Fails if two units share a version or if the catalog mixes the
    /// timestamp and sequential numbering schemes.
    pub fn discover(source: &dyn MigrationSource) -> MigrateResult<Self> {
        let loaded = source.load()?;
        tracing::debug!(source = %source.name(), units = loaded.len(), "discovered migration units");
        Self::from_units(loaded)
    }

    pub fn from_units(loaded: Vec<MigrationUnit>) -> MigrateResult<Self> {
        let mut units: BTreeMap<Version, MigrationUnit> = BTreeMap::new();

        for unit in loaded {
            if unit.version().value() <= 0 {
                return Err(DiscoveryError::UnparseableVersion {
                    source_name: unit.origin().to_string(),
                    reason: format!("version {} must be greater than zero", unit.version()),
                }
                .into());
            }
            if let Some(existing) = units.get(&unit.version()) {
                return Err(DiscoveryError::DuplicateVersion {
                    version: unit.version(),
                    first: existing.origin().to_string(),
                    second: unit.origin().to_string(),
                }
                .into());
            }
            units.insert(unit.version(), unit);
        }

        let timestamp = units.keys().find(|v| v.scheme() == VersionScheme::Timestamp);
        let sequential = units.keys().find(|v| v.scheme() == VersionScheme::Sequential);
        if let (Some(timestamp), Some(sequential)) = (timestamp, sequential) {
            return Err(DiscoveryError::MixedSchemes {
                timestamp: *timestamp,
                sequential: *sequential,
            }
            .into());
        }

        Ok(Self { units })
    }

    /// All units in ascending version order
    pub fn units(&self) -> impl Iterator<Item = &MigrationUnit> {
        self.units.values()
    }

    pub fn versions(&self) -> impl Iterator<Item = Version> + '_ {
        self.units.keys().copied()
    }

    pub fn lookup(&self, version: Version) -> MigrateResult<&MigrationUnit> {
        self.units.get(&version).ok_or(MigrationError::NotFound(version))
    }

    pub fn contains(&self, version: Version) -> bool {
        self.units.contains_key(&version)
    }

    /// Highest known version, or zero for an empty catalog
    pub fn latest_version(&self) -> Version {
        self.units.keys().next_back().copied().unwrap_or(Version::ZERO)
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}
