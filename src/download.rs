//! One-time dataset download
//!
//! Files already present and non-empty are left alone, so the command can
//! be rerun safely. Downloads land in a `.part` file first and are renamed
//! once complete.

use crate::core::{Result, SVMError};
use log::{info, warn};
use reqwest::blocking::Client;
use serde::Serialize;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::time::Duration;

const USER_AGENT: &str = concat!("emnist-svm/", env!("CARGO_PKG_VERSION"));

/// Result of fetching one file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownloadOutcome {
    pub path: PathBuf,
    pub bytes: u64,
    /// The file already existed and was not fetched again
    pub skipped: bool,
}

/// HTTP downloader writing into a data directory
pub struct DatasetDownloader {
    client: Client,
    data_dir: PathBuf,
}

impl DatasetDownloader {
    pub fn new<P: AsRef<Path>>(data_dir: P, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            data_dir: data_dir.as_ref().to_path_buf(),
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Path a URL is stored under
    pub fn target_path(&self, url: &str) -> Result<PathBuf> {
        let name = file_name_from_url(url).ok_or_else(|| {
            SVMError::DownloadError(format!("cannot derive a file name from {url}"))
        })?;
        Ok(self.data_dir.join(name))
    }

    /// Download `url` unless its target file already has content
    pub fn fetch(&self, url: &str) -> Result<DownloadOutcome> {
        let path = self.target_path(url)?;

        if let Ok(meta) = fs::metadata(&path) {
            if meta.is_file() && meta.len() > 0 {
                info!("{} already present, skipping download", path.display());
                return Ok(DownloadOutcome {
                    path,
                    bytes: meta.len(),
                    skipped: true,
                });
            }
        }

        fs::create_dir_all(&self.data_dir)?;
        info!("Downloading {url}");

        let mut resp = self.client.get(url).send()?;
        if !resp.status().is_success() {
            return Err(SVMError::DownloadError(format!(
                "{url} returned status {}",
                resp.status()
            )));
        }

        let partial = path.with_extension(match path.extension() {
            Some(ext) => format!("{}.part", ext.to_string_lossy()),
            None => "part".to_string(),
        });
        let bytes = {
            let mut writer = BufWriter::new(File::create(&partial)?);
            resp.copy_to(&mut writer)?
        };
        if bytes == 0 {
            // Leave nothing behind that a later run would mistake for data
            if let Err(e) = fs::remove_file(&partial) {
                warn!("could not remove {}: {e}", partial.display());
            }
            return Err(SVMError::DownloadError(format!("{url} returned no data")));
        }
        fs::rename(&partial, &path)?;

        info!("Saved {} ({} bytes)", path.display(), bytes);
        Ok(DownloadOutcome {
            path,
            bytes,
            skipped: false,
        })
    }

    /// Fetch several files, stopping at the first failure
    pub fn fetch_all(&self, urls: &[String]) -> Result<Vec<DownloadOutcome>> {
        urls.iter().map(|url| self.fetch(url)).collect()
    }
}

/// Last path segment of a URL, without query or fragment
pub fn file_name_from_url(url: &str) -> Option<String> {
    let without_query = url.split(['?', '#']).next()?;
    let after_scheme = without_query
        .split_once("://")
        .map_or(without_query, |(_, rest)| rest);
    // A bare host has no file name
    let (_, path) = after_scheme.split_once('/')?;
    path.rsplit('/')
        .next()
        .filter(|name| !name.is_empty())
        .map(str::to_string)
}
