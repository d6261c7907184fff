//! Detection of a `prod.keys` file. Only key presence is checked here; the
//! values are never used for decryption.

use std::collections::HashMap;
use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

pub const KEY_FILE_NAMES: &[&str] = &["prod.keys", "keys.txt"];
pub const HEADER_KEY: &str = "header_key";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeySet {
    keys: HashMap<String, String>,
}

impl KeySet {
    /// Parse `name = hexvalue` lines. Blank lines and `;`/`#` comments are skipped.
    pub fn parse(content: &str) -> Self {
        let keys = content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with(';') && !line.starts_with('#'))
            .filter_map(|line| line.split_once('='))
            .map(|(name, value)| (name.trim().to_ascii_lowercase(), value.trim().to_string()))
            .collect();
        Self { keys }
    }

    pub fn load(path: &Path) -> io::Result<Self> {
        Ok(Self::parse(&fs::read_to_string(path)?))
    }

    /// Look in `base_dir`, then `~/.switch`.
    pub fn discover(base_dir: &Path) -> Option<Self> {
        let home = env::var_os("HOME").map(|home| PathBuf::from(home).join(".switch"));
        let dirs = std::iter::once(base_dir.to_path_buf()).chain(home);
        for dir in dirs {
            for name in KEY_FILE_NAMES {
                let candidate = dir.join(name);
                if !candidate.is_file() {
                    continue;
                }
                match Self::load(&candidate) {
                    Ok(keys) => {
                        debug!("Loaded {} keys from {}", keys.len(), candidate.display());
                        return Some(keys);
                    }
                    Err(err) => debug!("Unable to read {}: {}", candidate.display(), err),
                }
            }
        }
        None
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.keys.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn has_header_key(&self) -> bool {
        self.get(HEADER_KEY).is_some_and(|value| !value.is_empty())
    }
}
