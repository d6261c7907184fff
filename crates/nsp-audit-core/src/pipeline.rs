use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, error, info};

use crate::catalog;
use crate::config::{RunOverrides, Settings, SettingsStore};
use crate::error::{PipelineError, Warning};
use crate::fetch::{Fetched, ResourceFetcher};
use crate::inventory::{FilenameInventoryBuilder, InventoryBuilder};
use crate::maintenance::{DeleteSummary, FsMaintainer, LibraryMaintainer, OrganizeSummary};
use crate::progress::{ProgressReporter, Stage, StageScope};
use crate::reconcile::{self, Completion, IncompleteDlcRecord, IncompleteUpdateRecord};
use crate::report;

pub const TITLES_JSON_FILENAME: &str = "titles.json";
pub const VERSIONS_JSON_FILENAME: &str = "versions.json";

/// Everything a run reads, captured once before it starts.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub settings: Settings,
    pub overrides: RunOverrides,
    /// Where the cached catalog files are kept.
    pub base_dir: PathBuf,
    /// True when a usable decryption key was found.
    pub deep_scan: bool,
}

impl RunConfig {
    pub fn new(settings: Settings, overrides: RunOverrides, base_dir: impl Into<PathBuf>) -> Self {
        Self {
            settings,
            overrides,
            base_dir: base_dir.into(),
            deep_scan: false,
        }
    }

    pub fn with_deep_scan(mut self, deep_scan: bool) -> Self {
        self.deep_scan = deep_scan;
        self
    }
}

#[derive(Debug)]
pub struct RunReport {
    pub scan_dir: PathBuf,
    pub recursive: bool,
    pub completion: Completion,
    pub local_titles: usize,
    pub unrecognized_files: usize,
    pub deleted: Option<DeleteSummary>,
    pub organized: Option<OrganizeSummary>,
    pub missing_updates: Option<Vec<IncompleteUpdateRecord>>,
    pub missing_dlc: Option<Vec<IncompleteDlcRecord>>,
    pub warnings: Vec<Warning>,
    /// Stages that ran, in order.
    pub stages: Vec<Stage>,
}

pub struct Pipeline {
    fetcher: Box<dyn ResourceFetcher>,
    store: Box<dyn SettingsStore>,
    inventory_builder: Box<dyn InventoryBuilder>,
    maintainer: Box<dyn LibraryMaintainer>,
}

impl Pipeline {
    pub fn new(fetcher: Box<dyn ResourceFetcher>, store: Box<dyn SettingsStore>) -> Self {
        Self {
            fetcher,
            store,
            inventory_builder: Box::new(FilenameInventoryBuilder),
            maintainer: Box::new(FsMaintainer),
        }
    }

    pub fn with_inventory_builder(mut self, builder: Box<dyn InventoryBuilder>) -> Self {
        self.inventory_builder = builder;
        self
    }

    pub fn with_maintainer(mut self, maintainer: Box<dyn LibraryMaintainer>) -> Self {
        self.maintainer = maintainer;
        self
    }

    /// Run the audit:
    /// 1. Fetch the catalog files (skipped transfer when the ETag matches) and save the tokens
    /// 2. Build the remote catalog
    /// 3. Resolve and list the folder to scan
    /// 4. Build the local inventory
    /// 5. Report completion
    /// 6-9. Optional maintenance and reports, each behind its own setting
    ///
    /// Reports are written to `out`. Stages 6-9 all see the inventory from step 4.
    pub fn run<W: Write>(
        &self,
        config: &RunConfig,
        reporter: &dyn ProgressReporter,
        out: &mut W,
    ) -> Result<RunReport, PipelineError> {
        let settings = &config.settings;
        let mut warnings = Vec::new();
        let mut stages = Vec::new();

        // Stage 1: retrieval
        let scope = StageScope::enter(reporter, Stage::ResourceRetrieval);
        let titles = self.fetch_resource(
            "titles",
            &settings.titles_url,
            &config.base_dir.join(TITLES_JSON_FILENAME),
            &settings.titles_etag,
        )?;
        let versions = self.fetch_resource(
            "versions",
            &settings.versions_url,
            &config.base_dir.join(VERSIONS_JSON_FILENAME),
            &settings.versions_etag,
        )?;
        let mut updated = settings.clone();
        updated.titles_etag = titles.token.clone();
        updated.versions_etag = versions.token.clone();
        if let Err(err) = self.store.save(&updated) {
            push_warning(
                reporter,
                &mut warnings,
                Warning::SettingsNotSaved {
                    message: err.to_string(),
                },
            );
        }
        scope.complete();
        stages.push(Stage::ResourceRetrieval);

        // Stage 2: catalog
        let scope = StageScope::enter(reporter, Stage::CatalogConstruction);
        let catalog = catalog::build_catalog(&titles.path, &versions.path)
            .map_err(PipelineError::CatalogInvalid)?;
        info!("Catalog contains {} titles", catalog.len());
        scope.complete();
        stages.push(Stage::CatalogConstruction);

        // Stage 3: target folder
        let scope = StageScope::enter(reporter, Stage::TargetResolution);
        let scan_dir = config
            .overrides
            .resolve_folder(settings)
            .ok_or(PipelineError::NoTargetDirectory)?;
        let listing = list_directory(&scan_dir).map_err(|source| PipelineError::DirectoryUnreadable {
            path: scan_dir.clone(),
            source,
        })?;
        info!("Scanning folder [{}]", scan_dir.display());
        scope.complete();
        stages.push(Stage::TargetResolution);

        // Stage 4: inventory
        let scope = StageScope::enter(reporter, Stage::InventoryConstruction);
        let recursive = config.overrides.recurse.resolve(settings.scan_recursively);
        if !config.deep_scan {
            push_warning(reporter, &mut warnings, Warning::DeepScanUnavailable);
        }
        let inventory = self
            .inventory_builder
            .build(&listing, &scan_dir, recursive, config.deep_scan)
            .map_err(PipelineError::InventoryBuildFailed)?;
        info!(
            "Finished scan: {} titles, {} unrecognized files",
            inventory.len(),
            inventory.unrecognized().len()
        );
        scope.complete();
        stages.push(Stage::InventoryConstruction);

        // Stage 5: completion
        let scope = StageScope::enter(reporter, Stage::Completion);
        let completion = Completion::compute(&inventory, &catalog);
        scope.complete();
        stages.push(Stage::Completion);
        emit(report::render_completion(out, &completion));

        let mut deleted = None;
        if settings.organize_options.delete_old_update_files {
            let scope = StageScope::enter(reporter, Stage::DeleteOldUpdates);
            stages.push(Stage::DeleteOldUpdates);
            match self.maintainer.delete_old_updates(&inventory) {
                Ok(summary) => {
                    info!("Deleted {} old update files", summary.deleted.len());
                    deleted = Some(summary);
                    scope.complete();
                }
                Err(err) => {
                    scope.fail();
                    push_warning(
                        reporter,
                        &mut warnings,
                        Warning::MaintenanceStageFailed {
                            stage: Stage::DeleteOldUpdates,
                            message: err.to_string(),
                        },
                    );
                }
            }
        }

        let mut organized = None;
        if settings.reorganize_library() {
            let scope = StageScope::enter(reporter, Stage::ReorganizeLibrary);
            stages.push(Stage::ReorganizeLibrary);
            match self
                .maintainer
                .organize(&scan_dir, &inventory, &catalog, &settings.organize_options)
            {
                Ok(summary) => {
                    organized = Some(summary);
                    scope.complete();
                }
                Err(err) => {
                    scope.fail();
                    push_warning(
                        reporter,
                        &mut warnings,
                        Warning::MaintenanceStageFailed {
                            stage: Stage::ReorganizeLibrary,
                            message: err.to_string(),
                        },
                    );
                }
            }
        }

        let mut missing_updates = None;
        if settings.check_for_missing_updates {
            let scope = StageScope::enter(reporter, Stage::MissingUpdates);
            let records = reconcile::diff_updates(&inventory, &catalog);
            debug!("{} titles have newer updates", records.len());
            scope.complete();
            stages.push(Stage::MissingUpdates);
            emit(report::render_missing_updates(out, &records));
            missing_updates = Some(records);
        }

        let mut missing_dlc = None;
        if settings.check_for_missing_dlc {
            let scope = StageScope::enter(reporter, Stage::MissingDlc);
            let records = reconcile::diff_dlc(&inventory, &catalog);
            debug!("{} titles are missing DLC", records.len());
            scope.complete();
            stages.push(Stage::MissingDlc);
            emit(report::render_missing_dlc(out, &records));
            missing_dlc = Some(records);
        }

        Ok(RunReport {
            scan_dir,
            recursive,
            completion,
            local_titles: inventory.len(),
            unrecognized_files: inventory.unrecognized().len(),
            deleted,
            organized,
            missing_updates,
            missing_dlc,
            warnings,
            stages,
        })
    }

    fn fetch_resource(
        &self,
        resource: &'static str,
        url: &str,
        dest: &Path,
        token: &str,
    ) -> Result<Fetched, PipelineError> {
        info!("Downloading latest {} file", resource);
        let fetched = self
            .fetcher
            .fetch(url, dest, token)
            .map_err(|source| PipelineError::ResourceUnavailable { resource, source })?;
        if !fetched.transferred {
            debug!("{} file is unchanged", resource);
        }
        Ok(fetched)
    }
}

/// The reporter is the only user-facing channel for warnings.
fn push_warning(reporter: &dyn ProgressReporter, warnings: &mut Vec<Warning>, warning: Warning) {
    debug!("Warning: {}", warning);
    reporter.on_warning(&warning);
    warnings.push(warning);
}

fn emit(result: io::Result<()>) {
    if let Err(err) = result {
        error!("Failed to write report: {}", err);
    }
}

/// Immediate contents of `dir`, sorted by path.
fn list_directory(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut entries = fs::read_dir(dir)?
        .map(|entry| entry.map(|entry| entry.path()))
        .collect::<io::Result<Vec<_>>>()?;
    entries.sort();
    Ok(entries)
}
