//! Remote catalog built from a titledb-style `titles.json` and `versions.json`.
//!
//! `titles.json` maps an arbitrary key to a title object carrying at least
//! `id` and `name`; DLC appear as their own entries and are attached to their
//! base application. `versions.json` maps a lower-case base id to an object of
//! `version -> release date`.

use std::collections::hash_map;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

use chrono::NaiveDate;
use serde::Deserialize;
use tracing::{debug, trace};

use crate::error::CatalogError;
use crate::title::{TitleId, TitleKind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionEntry {
    pub version: u32,
    pub release_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DlcEntry {
    pub id: TitleId,
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TitleRecord {
    pub id: TitleId,
    pub name: String,
    /// Sorted by version, ascending.
    pub versions: Vec<VersionEntry>,
    /// Sorted by id.
    pub dlc: Vec<DlcEntry>,
}

impl TitleRecord {
    pub fn new(id: TitleId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            versions: Vec::new(),
            dlc: Vec::new(),
        }
    }

    pub fn latest_version(&self) -> Option<&VersionEntry> {
        self.versions.iter().max_by_key(|entry| entry.version)
    }

    pub fn dlc_name(&self, id: TitleId) -> Option<&str> {
        self.dlc
            .iter()
            .find(|entry| entry.id == id)
            .and_then(|entry| entry.name.as_deref())
    }
}

#[derive(Debug, Clone, Default)]
pub struct RemoteCatalog {
    titles: HashMap<TitleId, TitleRecord>,
}

impl RemoteCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, record: TitleRecord) {
        self.titles.insert(record.id, record);
    }

    pub fn get(&self, id: &TitleId) -> Option<&TitleRecord> {
        self.titles.get(id)
    }

    pub fn contains(&self, id: &TitleId) -> bool {
        self.titles.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.titles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.titles.is_empty()
    }

    pub fn iter(&self) -> hash_map::Values<'_, TitleId, TitleRecord> {
        self.titles.values()
    }
}

impl FromIterator<TitleRecord> for RemoteCatalog {
    fn from_iter<I: IntoIterator<Item = TitleRecord>>(iter: I) -> Self {
        let mut catalog = RemoteCatalog::new();
        for record in iter {
            catalog.insert(record);
        }
        catalog
    }
}

#[derive(Debug, Deserialize)]
struct RawTitle {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

/// Read both cached files and build the catalog.
pub fn build_catalog(titles_path: &Path, versions_path: &Path) -> Result<RemoteCatalog, CatalogError> {
    let titles = fs::read_to_string(titles_path).map_err(|source| CatalogError::Io {
        path: titles_path.to_path_buf(),
        source,
    })?;
    let versions = fs::read_to_string(versions_path).map_err(|source| CatalogError::Io {
        path: versions_path.to_path_buf(),
        source,
    })?;
    parse_catalog(&titles, &versions)
}

pub fn parse_catalog(titles_json: &str, versions_json: &str) -> Result<RemoteCatalog, CatalogError> {
    let raw_titles: HashMap<String, RawTitle> =
        serde_json::from_str(titles_json).map_err(|source| CatalogError::Json {
            resource: "titles",
            source,
        })?;
    let raw_versions: HashMap<String, BTreeMap<String, String>> =
        serde_json::from_str(versions_json).map_err(|source| CatalogError::Json {
            resource: "versions",
            source,
        })?;

    let mut catalog = RemoteCatalog::new();
    let mut dlc: Vec<DlcEntry> = Vec::new();

    for (key, raw) in raw_titles {
        let Some(id) = raw.id.as_deref().and_then(|id| id.parse::<TitleId>().ok()) else {
            trace!("Skipping catalog entry '{}' without a usable id", key);
            continue;
        };
        let name = raw.name.filter(|name| !name.trim().is_empty());
        match id.kind() {
            TitleKind::Base => {
                catalog.insert(TitleRecord::new(id, name.unwrap_or_default()));
            }
            TitleKind::Dlc => dlc.push(DlcEntry { id, name }),
            TitleKind::Update => {}
        }
    }

    let mut orphan_dlc = 0usize;
    for entry in dlc {
        match catalog.titles.get_mut(&entry.id.base()) {
            Some(record) => record.dlc.push(entry),
            None => orphan_dlc += 1,
        }
    }
    if orphan_dlc > 0 {
        debug!("{} DLC entries have no base title in the catalog", orphan_dlc);
    }

    for (raw_id, history) in raw_versions {
        let Ok(id) = raw_id.parse::<TitleId>() else {
            trace!("Skipping version history for invalid id '{}'", raw_id);
            continue;
        };
        let Some(record) = catalog.titles.get_mut(&id.base()) else {
            continue;
        };
        for (version, date) in history {
            let Ok(version) = version.parse::<u32>() else {
                continue;
            };
            record.versions.push(VersionEntry {
                version,
                release_date: NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d").ok(),
            });
        }
    }

    for record in catalog.titles.values_mut() {
        record.versions.sort_by_key(|entry| entry.version);
        record.versions.dedup_by_key(|entry| entry.version);
        record.dlc.sort_by_key(|entry| entry.id);
        record.dlc.dedup_by_key(|entry| entry.id);
    }

    Ok(catalog)
}
