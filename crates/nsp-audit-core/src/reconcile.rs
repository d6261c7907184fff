//! Completeness of the local inventory against the remote catalog.
//!
//! Only titles present on both sides are compared. A catalog title that is not
//! owned at all is never reported as incomplete.

use chrono::NaiveDate;

use crate::catalog::{DlcEntry, RemoteCatalog};
use crate::inventory::LocalInventory;
use crate::title::TitleId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncompleteUpdateRecord {
    pub id: TitleId,
    pub name: String,
    pub local_version: u32,
    pub latest_version: u32,
    pub latest_release_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncompleteDlcRecord {
    pub id: TitleId,
    pub name: String,
    pub missing: Vec<DlcEntry>,
}

/// Share of catalog titles present locally.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Completion {
    pub owned: usize,
    pub total: usize,
}

impl Completion {
    pub fn compute(local: &LocalInventory, remote: &RemoteCatalog) -> Self {
        let owned = local.iter().filter(|title| remote.contains(&title.id)).count();
        Self {
            owned,
            total: remote.len(),
        }
    }

    /// An empty catalog has nothing left to complete and counts as 100%.
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        self.owned as f64 / self.total as f64 * 100.0
    }
}

/// Titles whose local version is behind the newest catalog version. Titles
/// with an unknown local version are not compared.
pub fn diff_updates(local: &LocalInventory, remote: &RemoteCatalog) -> Vec<IncompleteUpdateRecord> {
    let mut records: Vec<IncompleteUpdateRecord> = local
        .iter()
        .filter_map(|title| {
            let record = remote.get(&title.id)?;
            let local_version = title.local_version()?;
            let latest = record.latest_version()?;
            (local_version < latest.version).then(|| IncompleteUpdateRecord {
                id: record.id,
                name: record.name.clone(),
                local_version,
                latest_version: latest.version,
                latest_release_date: latest.release_date,
            })
        })
        .collect();
    records.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
    records
}

/// Titles missing one or more of the DLC the catalog lists for them.
pub fn diff_dlc(local: &LocalInventory, remote: &RemoteCatalog) -> Vec<IncompleteDlcRecord> {
    let mut records: Vec<IncompleteDlcRecord> = local
        .iter()
        .filter_map(|title| {
            let record = remote.get(&title.id)?;
            let owned = title.dlc_ids();
            let missing: Vec<DlcEntry> = record
                .dlc
                .iter()
                .filter(|entry| !owned.contains(&entry.id))
                .cloned()
                .collect();
            (!missing.is_empty()).then(|| IncompleteDlcRecord {
                id: record.id,
                name: record.name.clone(),
                missing,
            })
        })
        .collect();
    records.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
    records
}
