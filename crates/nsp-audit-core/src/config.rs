use config::{Config, Environment, File as ConfigFile, FileFormat};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use crate::error::SettingsError;

pub const SETTINGS_FILENAME: &str = "settings.json";
pub const ENV_PREFIX: &str = "NSP_AUDIT";

pub const DEFAULT_TITLES_URL: &str =
    "https://raw.githubusercontent.com/blawar/titledb/master/US.en.json";
pub const DEFAULT_VERSIONS_URL: &str =
    "https://raw.githubusercontent.com/blawar/titledb/master/versions.json";

/// Every persisted option with its default. Missing keys fall back to the
/// default, unknown keys are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub folder: String,
    pub scan_recursively: bool,
    pub titles_etag: String,
    pub versions_etag: String,
    pub titles_url: String,
    pub versions_url: String,
    pub fetch_timeout_secs: u64,
    pub check_for_missing_updates: bool,
    pub check_for_missing_dlc: bool,
    pub organize_options: OrganizeOptions,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrganizeOptions {
    pub delete_old_update_files: bool,
    pub rename_files: bool,
    pub create_folder_per_game: bool,
    pub folder_name_template: String,
    pub file_name_template: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            folder: String::new(),
            scan_recursively: true,
            titles_etag: String::new(),
            versions_etag: String::new(),
            titles_url: DEFAULT_TITLES_URL.to_string(),
            versions_url: DEFAULT_VERSIONS_URL.to_string(),
            fetch_timeout_secs: 60,
            check_for_missing_updates: false,
            check_for_missing_dlc: false,
            organize_options: OrganizeOptions::default(),
        }
    }
}

impl Default for OrganizeOptions {
    fn default() -> Self {
        Self {
            delete_old_update_files: false,
            rename_files: false,
            create_folder_per_game: false,
            folder_name_template: "{TITLE_NAME}".to_string(),
            file_name_template: "{TITLE_NAME} [{TITLE_ID}][v{VERSION}]".to_string(),
        }
    }
}

impl Settings {
    pub fn reorganize_library(&self) -> bool {
        self.organize_options.rename_files || self.organize_options.create_folder_per_game
    }
}

pub trait SettingsStore {
    fn load(&self) -> Result<Settings, SettingsError>;
    fn save(&self, settings: &Settings) -> Result<(), SettingsError>;
}

/// `settings.json` in a base directory, with `NSP_AUDIT_*` environment
/// variables layered on top when loading.
#[derive(Debug, Clone)]
pub struct JsonSettingsStore {
    base_dir: PathBuf,
    env_prefix: String,
}

impl JsonSettingsStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            env_prefix: ENV_PREFIX.to_string(),
        }
    }

    /// `FOLDER` under prefix `APP` is read from `APP_FOLDER`; nested keys use
    /// `__`, as in `APP_ORGANIZE_OPTIONS__RENAME_FILES`.
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    pub fn path(&self) -> PathBuf {
        self.base_dir.join(SETTINGS_FILENAME)
    }
}

impl SettingsStore for JsonSettingsStore {
    fn load(&self) -> Result<Settings, SettingsError> {
        let builder = Config::builder()
            .add_source(
                ConfigFile::from(self.path().as_path())
                    .format(FileFormat::Json)
                    .required(false),
            )
            .add_source(
                Environment::with_prefix(&self.env_prefix)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        Ok(builder.try_deserialize::<Settings>()?)
    }

    fn save(&self, settings: &Settings) -> Result<(), SettingsError> {
        let path = self.path();
        fs::create_dir_all(&self.base_dir).map_err(|source| SettingsError::Io {
            path: self.base_dir.clone(),
            source,
        })?;
        let content = serde_json::to_string_pretty(settings)?;
        fs::write(&path, content).map_err(|source| SettingsError::Io { path, source })
    }
}

/// Per-run recurse override. Only an explicit non-recursive request replaces
/// the persisted value; asking for recursion defers to the saved setting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RecurseOverride {
    #[default]
    Unset,
    Recursive,
    NonRecursive,
}

impl RecurseOverride {
    pub fn from_flag(flag: Option<bool>) -> Self {
        match flag {
            None => RecurseOverride::Unset,
            Some(true) => RecurseOverride::Recursive,
            Some(false) => RecurseOverride::NonRecursive,
        }
    }

    pub fn resolve(self, persisted: bool) -> bool {
        match self {
            RecurseOverride::NonRecursive => false,
            RecurseOverride::Unset | RecurseOverride::Recursive => persisted,
        }
    }
}

/// Options that apply to a single run and are never saved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOverrides {
    pub folder: Option<PathBuf>,
    pub recurse: RecurseOverride,
}

impl RunOverrides {
    pub fn resolve_folder(&self, settings: &Settings) -> Option<PathBuf> {
        match &self.folder {
            Some(folder) if !folder.as_os_str().is_empty() => Some(folder.clone()),
            _ if !settings.folder.trim().is_empty() => Some(PathBuf::from(settings.folder.trim())),
            _ => None,
        }
    }
}
