use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::catalog::RemoteCatalog;
use crate::config::OrganizeOptions;
use crate::error::MaintenanceError;
use crate::inventory::{LocalInventory, LocalTitle};
use crate::title::{TitleId, TitleKind};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteSummary {
    pub deleted: Vec<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrganizeSummary {
    pub moved: Vec<(PathBuf, PathBuf)>,
    pub skipped: Vec<PathBuf>,
}

pub trait LibraryMaintainer {
    /// Remove update files that a newer update of the same title replaces.
    fn delete_old_updates(&self, inventory: &LocalInventory) -> Result<DeleteSummary, MaintenanceError>;

    /// Rename files and/or move them into one folder per title.
    fn organize(
        &self,
        root: &Path,
        inventory: &LocalInventory,
        catalog: &RemoteCatalog,
        options: &OrganizeOptions,
    ) -> Result<OrganizeSummary, MaintenanceError>;
}

/// Works directly on the file system. Stops at the first I/O error.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsMaintainer;

impl LibraryMaintainer for FsMaintainer {
    fn delete_old_updates(&self, inventory: &LocalInventory) -> Result<DeleteSummary, MaintenanceError> {
        let mut summary = DeleteSummary::default();
        for title in sorted_titles(inventory) {
            for file in title.superseded_updates() {
                fs::remove_file(&file.path).map_err(|source| MaintenanceError::Io {
                    action: "delete",
                    path: file.path.clone(),
                    source,
                })?;
                info!("Deleted old update {}", file.path.display());
                summary.deleted.push(file.path.clone());
            }
        }
        Ok(summary)
    }

    fn organize(
        &self,
        root: &Path,
        inventory: &LocalInventory,
        catalog: &RemoteCatalog,
        options: &OrganizeOptions,
    ) -> Result<OrganizeSummary, MaintenanceError> {
        let mut summary = OrganizeSummary::default();

        for title in sorted_titles(inventory) {
            let Some(record) = catalog.get(&title.id) else {
                debug!("{} is not in the catalog, leaving its files alone", title.id);
                summary.skipped.extend(title.files().map(|file| file.path.clone()));
                continue;
            };

            let title_folder = options.create_folder_per_game.then(|| {
                let data = TemplateData {
                    name: &record.name,
                    id: record.id,
                    version: title.local_version().unwrap_or(0),
                    kind: TitleKind::Base,
                };
                root.join(file_name_or_id(&apply_template(&options.folder_name_template, &data), record.id))
            });

            for file in title.files() {
                // The inventory predates old-update deletion, so removed files are still listed.
                if !file.path.exists() {
                    debug!("{} is gone, nothing to move", file.path.display());
                    continue;
                }

                let dir = match &title_folder {
                    Some(folder) => folder.clone(),
                    None => file
                        .path
                        .parent()
                        .map_or_else(|| root.to_path_buf(), Path::to_path_buf),
                };

                let file_name: OsString = if options.rename_files {
                    let name = match file.kind() {
                        TitleKind::Dlc => record.dlc_name(file.id).unwrap_or(record.name.as_str()),
                        TitleKind::Base | TitleKind::Update => record.name.as_str(),
                    };
                    let data = TemplateData {
                        name,
                        id: file.id,
                        version: file.version,
                        kind: file.kind(),
                    };
                    let stem = file_name_or_id(&apply_template(&options.file_name_template, &data), file.id);
                    match file.extension() {
                        Some(ext) => format!("{}.{}", stem, ext).into(),
                        None => stem.into(),
                    }
                } else {
                    match file.path.file_name() {
                        Some(name) => name.to_os_string(),
                        None => continue,
                    }
                };

                let target = dir.join(file_name);
                if target == file.path {
                    continue;
                }
                if target.exists() {
                    warn!(
                        "{} already exists, leaving {} in place",
                        target.display(),
                        file.path.display()
                    );
                    summary.skipped.push(file.path.clone());
                    continue;
                }

                fs::create_dir_all(&dir).map_err(|source| MaintenanceError::Io {
                    action: "create folder",
                    path: dir.clone(),
                    source,
                })?;
                fs::rename(&file.path, &target).map_err(|source| MaintenanceError::Io {
                    action: "move",
                    path: file.path.clone(),
                    source,
                })?;
                debug!("Moved {} -> {}", file.path.display(), target.display());
                summary.moved.push((file.path.clone(), target));
            }
        }

        info!(
            "Organized library: {} files moved, {} skipped",
            summary.moved.len(),
            summary.skipped.len()
        );
        Ok(summary)
    }
}

fn sorted_titles(inventory: &LocalInventory) -> Vec<&LocalTitle> {
    let mut titles: Vec<&LocalTitle> = inventory.iter().collect();
    titles.sort_by_key(|title| title.id);
    titles
}

#[derive(Debug, Clone, Copy)]
pub struct TemplateData<'a> {
    pub name: &'a str,
    pub id: TitleId,
    pub version: u32,
    pub kind: TitleKind,
}

/// Expand `{TITLE_NAME}`, `{TITLE_ID}`, `{VERSION}` and `{TYPE}`.
pub fn apply_template(template: &str, data: &TemplateData<'_>) -> String {
    template
        .replace("{TITLE_NAME}", data.name)
        .replace("{TITLE_ID}", &data.id.to_string())
        .replace("{VERSION}", &data.version.to_string())
        .replace("{TYPE}", &data.kind.to_string())
}

/// Strip characters that are invalid in file names on common file systems.
pub fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| {
            !c.is_control()
                && !matches!(c, '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' | '®' | '™' | '©')
        })
        .collect();
    cleaned
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim_end_matches('.')
        .trim()
        .to_string()
}

fn file_name_or_id(name: &str, id: TitleId) -> String {
    let sanitized = sanitize_file_name(name);
    if sanitized.is_empty() {
        id.to_string()
    } else {
        sanitized
    }
}
