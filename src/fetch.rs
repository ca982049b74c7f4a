//! Archive fetcher: conditional download of one remote archive and
//! extraction into its staging subdirectory.

use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, FixedOffset, Utc};
use reqwest::header::{CONTENT_LENGTH, LAST_MODIFIED};
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use crate::config::{ARCHIVE_DIR, STAGING_DIR};
use crate::error::IngestError;

/// A URL to one compressed archive in the remote listing. Not persisted;
/// lives only between discovery and fetch.
#[derive(Debug, Clone)]
pub struct RemoteArchiveRef {
    pub url: String,
}

impl RemoteArchiveRef {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    /// Base filename of the archive (last path segment of the URL).
    pub fn file_name(&self) -> &str {
        self.url.rsplit('/').next().unwrap_or(&self.url)
    }

    /// Staging subdirectory name, derived by stripping the known filename
    /// pattern: `JC-202001-citibike-tripdata.csv.zip` -> `202001`.
    pub fn staging_group(&self) -> String {
        let mut name = self.file_name().to_string();
        for suffix in [".zip", ".csv"] {
            if let Some(rest) = name.strip_suffix(suffix) {
                name = rest.to_string();
            }
        }
        if let Some(rest) = name.strip_prefix("JC-") {
            name = rest.to_string();
        }
        if let Some(rest) = name.strip_suffix("-citibike-tripdata") {
            name = rest.to_string();
        }
        name
    }
}

/// What fetch did for one archive, for run accounting and optional upload.
#[derive(Debug)]
pub struct FetchOutcome {
    /// false when the freshness check kept the existing local copy.
    pub downloaded: bool,
    pub archive_path: PathBuf,
}

pub struct ArchiveFetcher {
    http: reqwest::Client,
    download_root: PathBuf,
}

impl ArchiveFetcher {
    pub fn new(http: reqwest::Client, download_root: impl Into<PathBuf>) -> Self {
        Self {
            http,
            download_root: download_root.into(),
        }
    }

    /// Retrieve one archive and extract it into its staging subdirectory.
    ///
    /// Downstream discovery is by directory scan: this returns no file list,
    /// the caller re-lists the staging layout to find results.
    pub async fn fetch(&self, archive: &RemoteArchiveRef) -> Result<FetchOutcome, IngestError> {
        let archive_dir = self.download_root.join(ARCHIVE_DIR);
        let staging_root = self.download_root.join(STAGING_DIR);
        tokio::fs::create_dir_all(&archive_dir)
            .await
            .map_err(|e| IngestError::fs(&archive_dir, e))?;
        tokio::fs::create_dir_all(&staging_root)
            .await
            .map_err(|e| IngestError::fs(&staging_root, e))?;

        let dest = archive_dir.join(archive.file_name());

        let downloaded = if self.is_local_current(&dest, &archive.url).await? {
            info!(url = %archive.url, path = %dest.display(), "local archive is current, skipping download");
            false
        } else {
            self.download(&archive.url, &dest).await?;
            info!(url = %archive.url, path = %dest.display(), "download complete");
            true
        };

        let unzip_dir = staging_root.join(archive.staging_group());
        let archive_path = dest.clone();
        tokio::task::spawn_blocking(move || extract_archive(&archive_path, &unzip_dir))
            .await
            .map_err(|e| IngestError::fs(&dest, io::Error::other(e)))??;

        Ok(FetchOutcome {
            downloaded,
            archive_path: dest,
        })
    }

    /// Explicit freshness check replacing wget's `-N`: HEAD the URL and
    /// compare remote size and modification time against the local file.
    async fn is_local_current(&self, dest: &Path, url: &str) -> Result<bool, IngestError> {
        let meta = match tokio::fs::metadata(dest).await {
            Ok(meta) => meta,
            Err(_) => return Ok(false),
        };

        let response = self
            .http
            .head(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| IngestError::Download {
                url: url.to_string(),
                source: Box::new(e),
            })?;

        let remote_len = response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());
        let remote_modified = response
            .headers()
            .get(LAST_MODIFIED)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| DateTime::parse_from_rfc2822(v).ok());

        Ok(local_is_current(
            meta.len(),
            meta.modified().ok(),
            remote_len,
            remote_modified,
        ))
    }

    /// Stream the body to a `.part` file, then rename into place so a failed
    /// download never looks like a complete archive.
    async fn download(&self, url: &str, dest: &Path) -> Result<(), IngestError> {
        let download_err = |source: Box<dyn std::error::Error + Send + Sync>| IngestError::Download {
            url: url.to_string(),
            source,
        };

        info!(url, "starting download");
        let mut response = self
            .http
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| download_err(Box::new(e)))?;

        let part = dest.with_file_name(format!("{}.part", dest_file_name(dest)));
        let mut file = tokio::fs::File::create(&part)
            .await
            .map_err(|e| download_err(Box::new(e)))?;

        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| download_err(Box::new(e)))?
        {
            file.write_all(&chunk)
                .await
                .map_err(|e| download_err(Box::new(e)))?;
        }
        file.flush().await.map_err(|e| download_err(Box::new(e)))?;
        drop(file);

        tokio::fs::rename(&part, dest)
            .await
            .map_err(|e| download_err(Box::new(e)))
    }
}

fn dest_file_name(dest: &Path) -> String {
    dest.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "archive".to_string())
}

/// Conditional-download policy: keep the local copy only when the remote
/// reports the same size and the local copy is not older. Missing headers
/// force a re-download.
fn local_is_current(
    local_len: u64,
    local_mtime: Option<SystemTime>,
    remote_len: Option<u64>,
    remote_modified: Option<DateTime<FixedOffset>>,
) -> bool {
    if remote_len != Some(local_len) {
        return false;
    }
    match (local_mtime, remote_modified) {
        (Some(mtime), Some(modified)) => {
            DateTime::<Utc>::from(mtime) >= modified.with_timezone(&Utc)
        }
        _ => false,
    }
}

/// Extract an archive into the staging subdirectory, dispatching on file
/// extension. Unknown extensions warn and complete without extraction.
/// Re-extracting into the same directory overwrites the same file set.
pub(crate) fn extract_archive(archive: &Path, dest: &Path) -> Result<(), IngestError> {
    let extension = archive
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "zip" => {
            std::fs::create_dir_all(dest).map_err(|e| IngestError::fs(dest, e))?;
            let file = std::fs::File::open(archive).map_err(|e| IngestError::fs(archive, e))?;
            let mut zip = zip::ZipArchive::new(file).map_err(|e| IngestError::CorruptZip {
                path: archive.to_path_buf(),
                source: e,
            })?;
            zip.extract(dest).map_err(|e| IngestError::CorruptZip {
                path: archive.to_path_buf(),
                source: e,
            })?;
            info!(path = %archive.display(), dest = %dest.display(), "zip extraction complete");
        }
        "tar" => {
            let file = std::fs::File::open(archive).map_err(|e| IngestError::fs(archive, e))?;
            unpack_tar(tar::Archive::new(file), archive, dest)?;
        }
        "gz" => {
            let file = std::fs::File::open(archive).map_err(|e| IngestError::fs(archive, e))?;
            unpack_tar(tar::Archive::new(flate2::read::GzDecoder::new(file)), archive, dest)?;
        }
        "bz2" => {
            let file = std::fs::File::open(archive).map_err(|e| IngestError::fs(archive, e))?;
            unpack_tar(tar::Archive::new(bzip2::read::BzDecoder::new(file)), archive, dest)?;
        }
        _ => {
            warn!(path = %archive.display(), "unknown file type, skipping extraction");
        }
    }

    Ok(())
}

fn unpack_tar<R: io::Read>(
    mut tar: tar::Archive<R>,
    archive: &Path,
    dest: &Path,
) -> Result<(), IngestError> {
    std::fs::create_dir_all(dest).map_err(|e| IngestError::fs(dest, e))?;
    tar.unpack(dest).map_err(|e| IngestError::CorruptTar {
        path: archive.to_path_buf(),
        source: e,
    })?;
    info!(path = %archive.display(), dest = %dest.display(), "tar extraction complete");
    Ok(())
}
