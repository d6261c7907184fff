use std::fmt;

use crate::error::Warning;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    ResourceRetrieval,
    CatalogConstruction,
    TargetResolution,
    InventoryConstruction,
    Completion,
    DeleteOldUpdates,
    ReorganizeLibrary,
    MissingUpdates,
    MissingDlc,
}

impl Stage {
    pub fn description(self) -> &'static str {
        match self {
            Stage::ResourceRetrieval => "Downloading latest catalog files",
            Stage::CatalogConstruction => "Building title catalog",
            Stage::TargetResolution => "Resolving folder to scan",
            Stage::InventoryConstruction => "Scanning local files",
            Stage::Completion => "Computing completion",
            Stage::DeleteOldUpdates => "Deleting old updates",
            Stage::ReorganizeLibrary => "Organizing library",
            Stage::MissingUpdates => "Checking for missing updates",
            Stage::MissingDlc => "Checking for missing DLC",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageOutcome {
    Completed,
    Failed,
    Aborted,
}

/// Trait for reporting pipeline progress.
///
/// The CLI implements it with indicatif spinners. All methods have default
/// no-op implementations.
pub trait ProgressReporter {
    fn on_stage_start(&self, _stage: Stage) {}
    fn on_stage_finish(&self, _stage: Stage, _outcome: StageOutcome) {}
    fn on_warning(&self, _warning: &Warning) {}
}

/// No-op progress reporter for silent operation.
pub struct SilentReporter;

impl ProgressReporter for SilentReporter {}

/// Brackets one stage. `on_stage_finish` fires when the scope is dropped, so a
/// stage left early through `?` is reported as aborted.
pub struct StageScope<'a> {
    reporter: &'a dyn ProgressReporter,
    stage: Stage,
    outcome: StageOutcome,
}

impl<'a> StageScope<'a> {
    pub fn enter(reporter: &'a dyn ProgressReporter, stage: Stage) -> Self {
        reporter.on_stage_start(stage);
        Self {
            reporter,
            stage,
            outcome: StageOutcome::Aborted,
        }
    }

    pub fn complete(mut self) {
        self.outcome = StageOutcome::Completed;
    }

    pub fn fail(mut self) {
        self.outcome = StageOutcome::Failed;
    }
}

impl Drop for StageScope<'_> {
    fn drop(&mut self) {
        self.reporter.on_stage_finish(self.stage, self.outcome);
    }
}
