use std::collections::hash_map;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use tracing::{debug, trace};
use walkdir::WalkDir;

use crate::error::InventoryError;
use crate::title::{TitleId, TitleKind};

pub const SUPPORTED_EXTENSIONS: &[&str] = &["nsp", "nsz", "xci", "xcz"];

/// A package file on disk, identified by its title id and version tags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFile {
    pub path: PathBuf,
    pub id: TitleId,
    pub version: u32,
}

impl LocalFile {
    pub fn kind(&self) -> TitleKind {
        self.id.kind()
    }

    pub fn extension(&self) -> Option<&str> {
        self.path.extension().and_then(|ext| ext.to_str())
    }
}

/// Everything found locally for one base title.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalTitle {
    pub id: TitleId,
    pub base: Option<LocalFile>,
    pub updates: Vec<LocalFile>,
    pub dlc: BTreeMap<TitleId, LocalFile>,
}

impl LocalTitle {
    pub fn new(id: TitleId) -> Self {
        Self {
            id,
            base: None,
            updates: Vec::new(),
            dlc: BTreeMap::new(),
        }
    }

    pub fn add(&mut self, file: LocalFile) {
        match file.kind() {
            TitleKind::Base => {
                let newer = self
                    .base
                    .as_ref()
                    .map_or(true, |current| file.version > current.version);
                if newer {
                    self.base = Some(file);
                }
            }
            TitleKind::Update => self.updates.push(file),
            TitleKind::Dlc => {
                let newer = self
                    .dlc
                    .get(&file.id)
                    .map_or(true, |current| file.version > current.version);
                if newer {
                    self.dlc.insert(file.id, file);
                }
            }
        }
    }

    pub fn latest_update(&self) -> Option<&LocalFile> {
        self.updates.iter().max_by_key(|file| file.version)
    }

    /// Highest installed version, or `None` when only DLC were found.
    pub fn local_version(&self) -> Option<u32> {
        match self.latest_update() {
            Some(update) => Some(update.version),
            None => self.base.as_ref().map(|base| base.version),
        }
    }

    /// Update files older than the newest update for this title.
    pub fn superseded_updates(&self) -> Vec<&LocalFile> {
        let Some(latest) = self.latest_update() else {
            return Vec::new();
        };
        self.updates
            .iter()
            .filter(|file| file.version < latest.version)
            .collect()
    }

    pub fn dlc_ids(&self) -> BTreeSet<TitleId> {
        self.dlc.keys().copied().collect()
    }

    pub fn files(&self) -> impl Iterator<Item = &LocalFile> {
        self.base
            .iter()
            .chain(self.updates.iter())
            .chain(self.dlc.values())
    }
}

#[derive(Debug, Clone, Default)]
pub struct LocalInventory {
    titles: HashMap<TitleId, LocalTitle>,
    unrecognized: Vec<PathBuf>,
}

impl LocalInventory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_file(&mut self, file: LocalFile) {
        let base = file.id.base();
        self.titles
            .entry(base)
            .or_insert_with(|| LocalTitle::new(base))
            .add(file);
    }

    pub fn add_unrecognized(&mut self, path: PathBuf) {
        self.unrecognized.push(path);
    }

    pub fn get(&self, id: &TitleId) -> Option<&LocalTitle> {
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

    pub fn iter(&self) -> hash_map::Values<'_, TitleId, LocalTitle> {
        self.titles.values()
    }

    pub fn unrecognized(&self) -> &[PathBuf] {
        &self.unrecognized
    }
}

pub trait InventoryBuilder {
    /// Build an inventory from the immediate contents of `root`.
    fn build(
        &self,
        entries: &[PathBuf],
        root: &Path,
        recursive: bool,
        deep_scan: bool,
    ) -> Result<LocalInventory, InventoryError>;
}

/// Identifies packages by the `[TitleId]` and `[vVersion]` tags in their file
/// names. Content inspection is not performed.
#[derive(Debug, Default, Clone, Copy)]
pub struct FilenameInventoryBuilder;

impl InventoryBuilder for FilenameInventoryBuilder {
    fn build(
        &self,
        entries: &[PathBuf],
        root: &Path,
        recursive: bool,
        deep_scan: bool,
    ) -> Result<LocalInventory, InventoryError> {
        if deep_scan {
            debug!("Header inspection is not available here, matching on file tags");
        }

        let mut inventory = LocalInventory::new();
        for entry in entries {
            if entry.is_dir() {
                if !recursive {
                    trace!("Skipping sub folder {}", entry.display());
                    continue;
                }
                for walked in WalkDir::new(entry).follow_links(false).sort_by_file_name() {
                    let walked = walked?;
                    if walked.file_type().is_file() {
                        classify(&mut inventory, walked.path());
                    }
                }
            } else {
                classify(&mut inventory, entry);
            }
        }

        debug!(
            "Scanned {}: {} titles, {} unrecognized files",
            root.display(),
            inventory.len(),
            inventory.unrecognized().len()
        );
        Ok(inventory)
    }
}

fn classify(inventory: &mut LocalInventory, path: &Path) {
    let Some(file_name) = path.file_name().and_then(|name| name.to_str()) else {
        return;
    };
    if file_name.starts_with('.') || !has_supported_extension(path) {
        trace!("Ignoring {}", path.display());
        return;
    }
    match parse_file_name(file_name) {
        Some((id, version)) => {
            trace!("{} -> {} v{}", file_name, id, version);
            inventory.add_file(LocalFile {
                path: path.to_path_buf(),
                id,
                version,
            });
        }
        None => {
            debug!("No title id tag in {}", path.display());
            inventory.add_unrecognized(path.to_path_buf());
        }
    }
}

fn has_supported_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map_or(false, |ext| {
            SUPPORTED_EXTENSIONS
                .iter()
                .any(|supported| ext.eq_ignore_ascii_case(supported))
        })
}

/// Extract the title id and version from bracketed tags, e.g.
/// `Some Game [0100000000010800][v65536].nsp`. A missing version tag means 0.
pub fn parse_file_name(file_name: &str) -> Option<(TitleId, u32)> {
    let mut id = None;
    let mut version = None;

    for tag in file_name.split('[').skip(1) {
        let Some((tag, _)) = tag.split_once(']') else {
            continue;
        };
        let tag = tag.trim();
        if id.is_none() {
            if let Ok(parsed) = tag.parse::<TitleId>() {
                id = Some(parsed);
                continue;
            }
        }
        if version.is_none() {
            if let Some(digits) = tag.strip_prefix('v').or_else(|| tag.strip_prefix('V')) {
                if digits.bytes().all(|b| b.is_ascii_digit()) {
                    if let Ok(parsed) = digits.parse::<u32>() {
                        version = Some(parsed);
                    }
                }
            }
        }
    }

    id.map(|id| (id, version.unwrap_or(0)))
}
