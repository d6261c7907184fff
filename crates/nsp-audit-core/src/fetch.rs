use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{ETAG, IF_NONE_MATCH};
use reqwest::StatusCode;
use tracing::{debug, info};

use crate::error::FetchError;

/// Result of a cached fetch. `token` is the validation token to store for the
/// next run; it is unchanged when nothing was transferred.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fetched {
    pub path: PathBuf,
    pub token: String,
    pub transferred: bool,
}

pub trait ResourceFetcher {
    /// Download `url` into `dest` unless `dest` already holds the version
    /// identified by `token`.
    fn fetch(&self, url: &str, dest: &Path, token: &str) -> Result<Fetched, FetchError>;
}

/// Conditional GET using the ETag as validation token.
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(concat!("nsp-audit/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

impl ResourceFetcher for HttpFetcher {
    fn fetch(&self, url: &str, dest: &Path, token: &str) -> Result<Fetched, FetchError> {
        let cached = dest.is_file();
        let mut request = self.client.get(url);
        if cached && !token.is_empty() {
            request = request.header(IF_NONE_MATCH, token);
        }

        let response = request.send()?;
        let status = response.status();

        if status == StatusCode::NOT_MODIFIED && cached {
            debug!("{} not modified, using {}", url, dest.display());
            return Ok(Fetched {
                path: dest.to_path_buf(),
                token: token.to_string(),
                transferred: false,
            });
        }

        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let new_token = response
            .headers()
            .get(ETAG)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let body = response.bytes()?;

        let partial = partial_path(dest);
        fs::write(&partial, &body).map_err(|source| FetchError::Io {
            path: partial.clone(),
            source,
        })?;
        fs::rename(&partial, dest).map_err(|source| FetchError::Io {
            path: dest.to_path_buf(),
            source,
        })?;
        info!("Downloaded {} ({} bytes)", url, body.len());

        Ok(Fetched {
            path: dest.to_path_buf(),
            token: new_token,
            transferred: true,
        })
    }
}

fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().map(|name| name.to_os_string()).unwrap_or_default();
    name.push(".part");
    dest.with_file_name(name)
}
