use std::cell::RefCell;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::{Arc, Mutex};

use tempfile::{tempdir, TempDir};

use nsp_audit_core::catalog::RemoteCatalog;
use nsp_audit_core::config::{OrganizeOptions, RecurseOverride, RunOverrides, Settings, SettingsStore};
use nsp_audit_core::error::{
    FetchError, InventoryError, MaintenanceError, PipelineError, SettingsError, Warning,
};
use nsp_audit_core::fetch::{Fetched, ResourceFetcher};
use nsp_audit_core::inventory::{InventoryBuilder, LocalInventory};
use nsp_audit_core::maintenance::{DeleteSummary, LibraryMaintainer, OrganizeSummary};
use nsp_audit_core::pipeline::{Pipeline, RunConfig, RunReport};
use nsp_audit_core::progress::{ProgressReporter, SilentReporter, Stage, StageOutcome};

const TITLES_URL: &str = "http://catalog.test/titles.json";
const VERSIONS_URL: &str = "http://catalog.test/versions.json";

const TITLES: &str = r#"{
    "1": { "id": "0100000000010000", "name": "Alpha" },
    "2": { "id": "0100000000020000", "name": "Beta" }
}"#;

const VERSIONS: &str = r#"{
    "0100000000010000": { "1": "2020-01-01", "2": "2020-02-01", "3": "2020-03-01" },
    "0100000000020000": { "1": "2020-01-01" }
}"#;

struct StaticFetcher {
    titles: &'static str,
    versions: &'static str,
    fail_on: Option<&'static str>,
}

impl ResourceFetcher for StaticFetcher {
    fn fetch(&self, url: &str, dest: &Path, token: &str) -> Result<Fetched, FetchError> {
        if self.fail_on.is_some_and(|needle| url.contains(needle)) {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: 503,
            });
        }
        let (body, new_token) = if url == TITLES_URL {
            (self.titles, "etag-titles")
        } else {
            (self.versions, "etag-versions")
        };
        if token == new_token && dest.is_file() {
            return Ok(Fetched {
                path: dest.to_path_buf(),
                token: token.to_string(),
                transferred: false,
            });
        }
        fs::write(dest, body).map_err(|source| FetchError::Io {
            path: dest.to_path_buf(),
            source,
        })?;
        Ok(Fetched {
            path: dest.to_path_buf(),
            token: new_token.to_string(),
            transferred: true,
        })
    }
}

struct MemoryStore {
    saved: Rc<RefCell<Vec<Settings>>>,
}

impl SettingsStore for MemoryStore {
    fn load(&self) -> Result<Settings, SettingsError> {
        Ok(self.saved.borrow().last().cloned().unwrap_or_default())
    }

    fn save(&self, settings: &Settings) -> Result<(), SettingsError> {
        self.saved.borrow_mut().push(settings.clone());
        Ok(())
    }
}

struct RecordingMaintainer {
    calls: Rc<RefCell<Vec<&'static str>>>,
    fail_delete: bool,
}

impl LibraryMaintainer for RecordingMaintainer {
    fn delete_old_updates(&self, _inventory: &LocalInventory) -> Result<DeleteSummary, MaintenanceError> {
        self.calls.borrow_mut().push("delete");
        if self.fail_delete {
            return Err(MaintenanceError::Io {
                action: "delete",
                path: PathBuf::from("locked.nsp"),
                source: io::Error::new(io::ErrorKind::PermissionDenied, "locked"),
            });
        }
        Ok(DeleteSummary::default())
    }

    fn organize(
        &self,
        _root: &Path,
        _inventory: &LocalInventory,
        _catalog: &RemoteCatalog,
        _options: &OrganizeOptions,
    ) -> Result<OrganizeSummary, MaintenanceError> {
        self.calls.borrow_mut().push("organize");
        Ok(OrganizeSummary::default())
    }
}

struct FailingBuilder;

impl InventoryBuilder for FailingBuilder {
    fn build(
        &self,
        _entries: &[PathBuf],
        root: &Path,
        _recursive: bool,
        _deep_scan: bool,
    ) -> Result<LocalInventory, InventoryError> {
        Err(InventoryError::Io {
            path: root.to_path_buf(),
            source: io::Error::new(io::ErrorKind::Other, "boom"),
        })
    }
}

#[derive(Default)]
struct RecordingReporter {
    finished: RefCell<Vec<(Stage, StageOutcome)>>,
    warnings: RefCell<Vec<Warning>>,
}

impl ProgressReporter for RecordingReporter {
    fn on_stage_finish(&self, stage: Stage, outcome: StageOutcome) {
        self.finished.borrow_mut().push((stage, outcome));
    }

    fn on_warning(&self, warning: &Warning) {
        self.warnings.borrow_mut().push(warning.clone());
    }
}

/// Log output collected from a scoped `fmt` subscriber.
#[derive(Clone, Default)]
struct CapturedLog(Arc<Mutex<Vec<u8>>>);

impl CapturedLog {
    fn contents(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }
}

impl Write for CapturedLog {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

struct Harness {
    base: TempDir,
    library: TempDir,
    saved: Rc<RefCell<Vec<Settings>>>,
    maintenance: Rc<RefCell<Vec<&'static str>>>,
}

impl Harness {
    /// Library layout:
    ///   Alpha [0100000000010000][v0].nsp
    ///   Alpha [0100000000010800][v2].nsp
    ///   sub/Gamma [0100000000030000][v0].nsp   (not in catalog)
    fn new() -> Self {
        let library = tempdir().unwrap();
        fs::write(library.path().join("Alpha [0100000000010000][v0].nsp"), b"base").unwrap();
        fs::write(library.path().join("Alpha [0100000000010800][v2].nsp"), b"update").unwrap();
        fs::create_dir_all(library.path().join("sub")).unwrap();
        fs::write(
            library.path().join("sub").join("Gamma [0100000000030000][v0].nsp"),
            b"other",
        )
        .unwrap();

        Self {
            base: tempdir().unwrap(),
            library,
            saved: Rc::new(RefCell::new(Vec::new())),
            maintenance: Rc::new(RefCell::new(Vec::new())),
        }
    }

    fn settings(&self) -> Settings {
        Settings {
            folder: self.library.path().to_string_lossy().into_owned(),
            titles_url: TITLES_URL.to_string(),
            versions_url: VERSIONS_URL.to_string(),
            ..Settings::default()
        }
    }

    fn config(&self, settings: Settings) -> RunConfig {
        RunConfig::new(settings, RunOverrides::default(), self.base.path())
    }

    fn pipeline(&self) -> Pipeline {
        self.pipeline_with(None, false)
    }

    fn pipeline_with(&self, fail_on: Option<&'static str>, fail_delete: bool) -> Pipeline {
        Pipeline::new(
            Box::new(StaticFetcher {
                titles: TITLES,
                versions: VERSIONS,
                fail_on,
            }),
            Box::new(MemoryStore {
                saved: Rc::clone(&self.saved),
            }),
        )
        .with_maintainer(Box::new(RecordingMaintainer {
            calls: Rc::clone(&self.maintenance),
            fail_delete,
        }))
    }

    fn run(&self, pipeline: &Pipeline, config: &RunConfig) -> (Result<RunReport, PipelineError>, String) {
        let mut out = Vec::new();
        let result = pipeline.run(config, &SilentReporter, &mut out);
        (result, String::from_utf8(out).unwrap())
    }
}

fn all_checks(mut settings: Settings) -> Settings {
    settings.check_for_missing_updates = true;
    settings.check_for_missing_dlc = true;
    settings
}

#[test]
fn test_half_complete_library_reports_one_update() {
    let h = Harness::new();
    let config = h.config(all_checks(h.settings()));
    let (result, output) = h.run(&h.pipeline(), &config);
    let report = result.unwrap();

    assert_eq!(report.completion.owned, 1);
    assert_eq!(report.completion.total, 2);
    assert!(output.contains("Local library completion status: 50.00% (have 1 titles, out of 2 titles)"));

    let updates = report.missing_updates.unwrap();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].name, "Alpha");
    assert_eq!(updates[0].local_version, 2);
    assert_eq!(updates[0].latest_version, 3);
    assert!(output.contains("Found available updates:"));

    assert!(report.missing_dlc.unwrap().is_empty());
    assert!(output.contains("No missing DLC!"));
}

#[test]
fn test_all_gates_off_runs_core_stages_only() {
    let h = Harness::new();
    let config = h.config(h.settings());
    let (result, output) = h.run(&h.pipeline(), &config);
    let report = result.unwrap();

    assert_eq!(
        report.stages,
        vec![
            Stage::ResourceRetrieval,
            Stage::CatalogConstruction,
            Stage::TargetResolution,
            Stage::InventoryConstruction,
            Stage::Completion,
        ]
    );
    assert!(h.maintenance.borrow().is_empty());
    assert!(report.deleted.is_none());
    assert!(report.organized.is_none());
    assert!(report.missing_updates.is_none());
    assert!(report.missing_dlc.is_none());
    assert_eq!(output.lines().count(), 1);
}

#[test]
fn test_stages_run_in_fixed_order_when_all_enabled() {
    let h = Harness::new();
    let mut settings = all_checks(h.settings());
    settings.organize_options.delete_old_update_files = true;
    settings.organize_options.create_folder_per_game = true;
    let (result, _) = h.run(&h.pipeline(), &h.config(settings));
    let report = result.unwrap();

    assert_eq!(
        report.stages[5..],
        [
            Stage::DeleteOldUpdates,
            Stage::ReorganizeLibrary,
            Stage::MissingUpdates,
            Stage::MissingDlc,
        ]
    );
    assert_eq!(*h.maintenance.borrow(), vec!["delete", "organize"]);
}

#[test]
fn test_fetch_failure_aborts_before_scanning() {
    let h = Harness::new();
    let reporter = RecordingReporter::default();
    let pipeline = h.pipeline_with(Some("versions"), false);
    let mut out = Vec::new();

    let err = pipeline
        .run(&h.config(all_checks(h.settings())), &reporter, &mut out)
        .unwrap_err();

    assert!(matches!(err, PipelineError::ResourceUnavailable { resource: "versions", .. }));
    assert_eq!(err.stage(), Stage::ResourceRetrieval);
    assert_eq!(err.exit_code(), 2);
    assert!(out.is_empty());
    assert!(h.saved.borrow().is_empty());
    assert_eq!(
        *reporter.finished.borrow(),
        vec![(Stage::ResourceRetrieval, StageOutcome::Aborted)]
    );
}

#[test]
fn test_tokens_saved_even_when_later_stage_aborts() {
    let h = Harness::new();
    let mut settings = h.settings();
    settings.folder = String::new();

    let (result, output) = h.run(&h.pipeline(), &h.config(settings));
    let err = result.unwrap_err();

    assert!(matches!(err, PipelineError::NoTargetDirectory));
    assert_eq!(err.stage(), Stage::TargetResolution);
    assert!(output.is_empty());
    let saved = h.saved.borrow();
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].titles_etag, "etag-titles");
    assert_eq!(saved[0].versions_etag, "etag-versions");
}

#[test]
fn test_second_run_reuses_cached_files() {
    let h = Harness::new();
    let pipeline = h.pipeline();
    let (first, _) = h.run(&pipeline, &h.config(h.settings()));
    first.unwrap();

    let stored = h.saved.borrow().last().cloned().unwrap();
    let mut settings = h.settings();
    settings.titles_etag = stored.titles_etag;
    settings.versions_etag = stored.versions_etag;
    let (second, _) = h.run(&pipeline, &h.config(settings));
    second.unwrap();

    let saved = h.saved.borrow();
    assert_eq!(saved.len(), 2);
    assert_eq!(saved[1].titles_etag, "etag-titles");
}

#[test]
fn test_folder_override_wins_over_persisted_folder() {
    let h = Harness::new();
    let other = tempdir().unwrap();
    let mut settings = h.settings();
    settings.folder = "/does/not/exist".to_string();
    let overrides = RunOverrides {
        folder: Some(other.path().to_path_buf()),
        recurse: RecurseOverride::Unset,
    };
    let config = RunConfig::new(settings, overrides, h.base.path());

    let (result, _) = h.run(&h.pipeline(), &config);
    let report = result.unwrap();
    assert_eq!(report.scan_dir, other.path());
    assert_eq!(report.completion.owned, 0);
}

#[test]
fn test_unreadable_directory_aborts() {
    let h = Harness::new();
    let mut settings = h.settings();
    settings.folder = h.library.path().join("missing").to_string_lossy().into_owned();

    let (result, _) = h.run(&h.pipeline(), &h.config(settings));
    let err = result.unwrap_err();
    assert!(matches!(err, PipelineError::DirectoryUnreadable { .. }));
    assert_eq!(err.exit_code(), 5);
}

#[test]
fn test_inventory_failure_aborts() {
    let h = Harness::new();
    let pipeline = h.pipeline().with_inventory_builder(Box::new(FailingBuilder));

    let (result, output) = h.run(&pipeline, &h.config(all_checks(h.settings())));
    let err = result.unwrap_err();
    assert!(matches!(err, PipelineError::InventoryBuildFailed(_)));
    assert_eq!(err.stage(), Stage::InventoryConstruction);
    assert!(output.is_empty());
}

#[test]
fn test_invalid_catalog_aborts() {
    let h = Harness::new();
    let pipeline = Pipeline::new(
        Box::new(StaticFetcher {
            titles: "not json",
            versions: VERSIONS,
            fail_on: None,
        }),
        Box::new(MemoryStore {
            saved: Rc::clone(&h.saved),
        }),
    );
    let (result, _) = h.run(&pipeline, &h.config(h.settings()));
    let err = result.unwrap_err();
    assert!(matches!(err, PipelineError::CatalogInvalid(_)));
    assert_eq!(err.exit_code(), 3);
}

#[test]
fn test_missing_keys_warns_exactly_once() {
    let h = Harness::new();
    let reporter = RecordingReporter::default();
    let mut out = Vec::new();

    let report = h
        .pipeline()
        .run(&h.config(all_checks(h.settings())), &reporter, &mut out)
        .unwrap();

    let count = report
        .warnings
        .iter()
        .filter(|warning| **warning == Warning::DeepScanUnavailable)
        .count();
    assert_eq!(count, 1);
    assert_eq!(*reporter.warnings.borrow(), vec![Warning::DeepScanUnavailable]);
    assert_eq!(report.completion.owned, 1);

    let report = h
        .pipeline()
        .run(
            &h.config(h.settings()).with_deep_scan(true),
            &SilentReporter,
            &mut Vec::new(),
        )
        .unwrap();
    assert!(report.warnings.is_empty());
}

#[test]
fn test_warning_reaches_user_only_through_reporter() {
    let h = Harness::new();
    let reporter = RecordingReporter::default();
    let log = CapturedLog::default();
    let writer = log.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();

    let report = tracing::subscriber::with_default(subscriber, || {
        h.pipeline()
            .run(&h.config(h.settings()), &reporter, &mut Vec::new())
            .unwrap()
    });

    assert_eq!(report.warnings, vec![Warning::DeepScanUnavailable]);
    assert_eq!(*reporter.warnings.borrow(), vec![Warning::DeepScanUnavailable]);
    let output = log.contents();
    assert!(output.contains("Scanning folder"));
    assert!(!output.contains(&Warning::DeepScanUnavailable.to_string()));
}

#[test]
fn test_maintenance_failure_is_not_fatal() {
    let h = Harness::new();
    let reporter = RecordingReporter::default();
    let mut settings = all_checks(h.settings());
    settings.organize_options.delete_old_update_files = true;
    settings.organize_options.rename_files = true;

    let report = h
        .pipeline_with(None, true)
        .run(&h.config(settings), &reporter, &mut Vec::new())
        .unwrap();

    assert_eq!(*h.maintenance.borrow(), vec!["delete", "organize"]);
    assert!(report.deleted.is_none());
    assert!(report.organized.is_some());
    assert_eq!(report.missing_updates.map(|records| records.len()), Some(1));
    assert!(report.warnings.iter().any(|warning| matches!(
        warning,
        Warning::MaintenanceStageFailed {
            stage: Stage::DeleteOldUpdates,
            ..
        }
    )));
    assert!(reporter
        .finished
        .borrow()
        .contains(&(Stage::DeleteOldUpdates, StageOutcome::Failed)));
}

#[test]
fn test_delete_then_reorganize_on_disk() {
    let h = Harness::new();
    let old = h.library.path().join("Alpha [0100000000010800][v1].nsp");
    fs::write(&old, b"old update").unwrap();

    let pipeline = Pipeline::new(
        Box::new(StaticFetcher {
            titles: TITLES,
            versions: VERSIONS,
            fail_on: None,
        }),
        Box::new(MemoryStore {
            saved: Rc::clone(&h.saved),
        }),
    );
    let mut settings = all_checks(h.settings());
    settings.organize_options.delete_old_update_files = true;
    settings.organize_options.create_folder_per_game = true;

    let (result, output) = h.run(&pipeline, &h.config(settings));
    let report = result.unwrap();

    assert!(report.warnings.iter().all(|warning| !matches!(
        warning,
        Warning::MaintenanceStageFailed { .. }
    )));
    assert_eq!(report.deleted.unwrap().deleted, vec![old.clone()]);
    assert!(!old.exists());

    let organized = report.organized.unwrap();
    assert_eq!(organized.moved.len(), 2);
    let folder = h.library.path().join("Alpha");
    assert!(folder.join("Alpha [0100000000010000][v0].nsp").is_file());
    assert!(folder.join("Alpha [0100000000010800][v2].nsp").is_file());
    assert!(!folder.join("Alpha [0100000000010800][v1].nsp").exists());
    assert!(h.library.path().join("sub").join("Gamma [0100000000030000][v0].nsp").is_file());

    // Reports still describe the library as scanned.
    assert_eq!(report.missing_updates.map(|records| records.len()), Some(1));
    assert!(output.contains("Found available updates:"));
}

#[test]
fn test_recursion_follows_settings_and_restrictive_override() {
    let h = Harness::new();

    let (result, _) = h.run(&h.pipeline(), &h.config(h.settings()));
    let report = result.unwrap();
    assert!(report.recursive);
    assert_eq!(report.local_titles, 2);

    let overrides = RunOverrides {
        folder: None,
        recurse: RecurseOverride::NonRecursive,
    };
    let config = RunConfig::new(h.settings(), overrides, h.base.path());
    let (result, _) = h.run(&h.pipeline(), &config);
    let report = result.unwrap();
    assert!(!report.recursive);
    assert_eq!(report.local_titles, 1);

    let mut settings = h.settings();
    settings.scan_recursively = false;
    let overrides = RunOverrides {
        folder: None,
        recurse: RecurseOverride::Recursive,
    };
    let config = RunConfig::new(settings, overrides, h.base.path());
    let (result, _) = h.run(&h.pipeline(), &config);
    assert!(!result.unwrap().recursive);
}

#[test]
fn test_empty_catalog_counts_as_complete() {
    let h = Harness::new();
    let pipeline = Pipeline::new(
        Box::new(StaticFetcher {
            titles: "{}",
            versions: "{}",
            fail_on: None,
        }),
        Box::new(MemoryStore {
            saved: Rc::clone(&h.saved),
        }),
    );
    let (result, output) = h.run(&pipeline, &h.config(h.settings()));
    let report = result.unwrap();
    assert_eq!(report.completion.total, 0);
    assert_eq!(report.completion.percent(), 100.0);
    assert!(output.contains("100.00%"));
}
