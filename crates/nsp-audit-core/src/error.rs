use std::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::progress::Stage;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid title id '{0}'")]
pub struct TitleIdError(pub String);

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("failed to read {}: {source}", path.display())]
    Io { path: PathBuf, source: io::Error },

    #[error("malformed {resource} JSON: {source}")]
    Json {
        resource: &'static str,
        source: serde_json::Error,
    },
}

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server returned {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("failed to write {}: {source}", path.display())]
    Io { path: PathBuf, source: io::Error },
}

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("failed to serialize settings: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to write {}: {source}", path.display())]
    Io { path: PathBuf, source: io::Error },
}

#[derive(Error, Debug)]
pub enum InventoryError {
    #[error("error walking directory: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("error reading {}: {source}", path.display())]
    Io { path: PathBuf, source: io::Error },
}

#[derive(Error, Debug)]
pub enum MaintenanceError {
    #[error("failed to {action} {}: {source}", path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        source: io::Error,
    },
}

/// Fatal pipeline failures. Each variant belongs to exactly one stage.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("unable to retrieve {resource}: {source}")]
    ResourceUnavailable {
        resource: &'static str,
        source: FetchError,
    },

    #[error("catalog could not be built: {0}")]
    CatalogInvalid(#[source] CatalogError),

    #[error("no folder to scan was defined")]
    NoTargetDirectory,

    #[error("failed accessing folder {}: {source}", path.display())]
    DirectoryUnreadable { path: PathBuf, source: io::Error },

    #[error("failed to process local folder: {0}")]
    InventoryBuildFailed(#[source] InventoryError),
}

impl PipelineError {
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::ResourceUnavailable { .. } => Stage::ResourceRetrieval,
            PipelineError::CatalogInvalid(_) => Stage::CatalogConstruction,
            PipelineError::NoTargetDirectory | PipelineError::DirectoryUnreadable { .. } => {
                Stage::TargetResolution
            }
            PipelineError::InventoryBuildFailed(_) => Stage::InventoryConstruction,
        }
    }

    /// Process exit code for this abort. 0 and 1 are reserved for success and
    /// configuration failures.
    pub fn exit_code(&self) -> u8 {
        match self {
            PipelineError::ResourceUnavailable { .. } => 2,
            PipelineError::CatalogInvalid(_) => 3,
            PipelineError::NoTargetDirectory => 4,
            PipelineError::DirectoryUnreadable { .. } => 5,
            PipelineError::InventoryBuildFailed(_) => 6,
        }
    }
}

/// Non-fatal conditions surfaced to the user. None of them change the inputs
/// of later stages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Warning {
    DeepScanUnavailable,
    MaintenanceStageFailed { stage: Stage, message: String },
    SettingsNotSaved { message: String },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::DeepScanUnavailable => write!(
                f,
                "keys file was not found, deep scan is disabled, library will be based on file tags"
            ),
            Warning::MaintenanceStageFailed { stage, message } => {
                write!(f, "{} failed: {}", stage, message)
            }
            Warning::SettingsNotSaved { message } => {
                write!(f, "settings could not be saved: {}", message)
            }
        }
    }
}
