pub mod catalog;
pub mod config;
pub mod error;
pub mod fetch;
pub mod inventory;
pub mod keys;
pub mod maintenance;
pub mod pipeline;
pub mod progress;
pub mod reconcile;
pub mod report;
pub mod title;

pub use catalog::RemoteCatalog;
pub use config::{JsonSettingsStore, RecurseOverride, RunOverrides, Settings, SettingsStore};
pub use error::{PipelineError, Warning};
pub use fetch::{HttpFetcher, ResourceFetcher};
pub use inventory::{FilenameInventoryBuilder, InventoryBuilder, LocalInventory};
pub use maintenance::{FsMaintainer, LibraryMaintainer};
pub use pipeline::{Pipeline, RunConfig, RunReport};
pub use progress::{ProgressReporter, SilentReporter, Stage, StageOutcome};
pub use reconcile::Completion;
pub use title::{TitleId, TitleKind};
