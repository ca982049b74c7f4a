//! Staging locator: walks the extraction layout on disk and decides which
//! files feed the loader.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::config::STAGING_DIR;
use crate::error::IngestError;

/// One tabular file found under the staging layout, tagged with the group
/// (staging subdirectory name) its destination table is derived from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedFile {
    pub path: PathBuf,
    pub group: String,
}

/// Walk `<download_root>/unzipped_files/<group>/` and return every loadable
/// file, every group, in sorted order so runs over the same tree are
/// deterministic. Files are discovered from disk, never carried over from the
/// fetch step, so previously extracted groups are picked up too.
pub fn locate_staged_files(download_root: &Path) -> Result<Vec<StagedFile>, IngestError> {
    let staging_root = download_root.join(STAGING_DIR);
    if !staging_root.exists() {
        return Ok(Vec::new());
    }

    let mut groups = Vec::new();
    for entry in std::fs::read_dir(&staging_root).map_err(|e| IngestError::fs(&staging_root, e))? {
        let entry = entry.map_err(|e| IngestError::fs(&staging_root, e))?;
        if entry
            .file_type()
            .map_err(|e| IngestError::fs(entry.path(), e))?
            .is_dir()
        {
            groups.push(entry.path());
        }
    }
    groups.sort();

    let mut staged = Vec::new();
    for group_dir in &groups {
        let group = group_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut files = Vec::new();
        for entry in std::fs::read_dir(group_dir).map_err(|e| IngestError::fs(group_dir, e))? {
            let entry = entry.map_err(|e| IngestError::fs(group_dir, e))?;
            if entry
                .file_type()
                .map_err(|e| IngestError::fs(entry.path(), e))?
                .is_file()
            {
                files.push(entry.path());
            }
        }
        files.sort();

        for path in files {
            if is_loadable(&path) {
                staged.push(StagedFile {
                    path,
                    group: group.clone(),
                });
            } else {
                warn!(path = %path.display(), "unsupported staged file, skipping");
            }
        }
    }

    info!(count = staged.len(), "staging scan complete");
    Ok(staged)
}

/// Only CSV files feed the loader. Parquet files appear in some months'
/// archives but are recognized and skipped rather than loaded.
fn is_loadable(path: &Path) -> bool {
    path.extension()
        .map(|e| e.to_ascii_lowercase() == "csv")
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn stage(root: &Path, group: &str, file: &str) {
        let dir = root.join(STAGING_DIR).join(group);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(file), b"started_at,ended_at\n").unwrap();
    }

    #[test]
    fn missing_staging_root_yields_nothing() {
        let dir = TempDir::new().unwrap();
        assert!(locate_staged_files(dir.path()).unwrap().is_empty());
    }

    #[test]
    fn files_are_grouped_and_sorted() {
        let dir = TempDir::new().unwrap();
        stage(dir.path(), "202003", "202003-citibike-tripdata.csv");
        stage(dir.path(), "202001", "202001-citibike-tripdata_2.csv");
        stage(dir.path(), "202001", "202001-citibike-tripdata_1.csv");

        let staged = locate_staged_files(dir.path()).unwrap();
        let names: Vec<(String, String)> = staged
            .iter()
            .map(|f| {
                (
                    f.group.clone(),
                    f.path.file_name().unwrap().to_string_lossy().into_owned(),
                )
            })
            .collect();

        assert_eq!(
            names,
            vec![
                ("202001".to_string(), "202001-citibike-tripdata_1.csv".to_string()),
                ("202001".to_string(), "202001-citibike-tripdata_2.csv".to_string()),
                ("202003".to_string(), "202003-citibike-tripdata.csv".to_string()),
            ]
        );
    }

    #[test]
    fn parquet_and_metadata_files_are_skipped() {
        let dir = TempDir::new().unwrap();
        stage(dir.path(), "202001", "202001-citibike-tripdata.csv");
        stage(dir.path(), "202001", "202001-citibike-tripdata.parquet");
        stage(dir.path(), "202001", ".DS_Store");

        let staged = locate_staged_files(dir.path()).unwrap();
        assert_eq!(staged.len(), 1);
        assert!(staged[0].path.ends_with("202001-citibike-tripdata.csv"));
    }

    #[test]
    fn loose_files_at_staging_root_are_not_staged() {
        let dir = TempDir::new().unwrap();
        let staging_root = dir.path().join(STAGING_DIR);
        std::fs::create_dir_all(&staging_root).unwrap();
        std::fs::write(staging_root.join("stray.csv"), b"a,b\n").unwrap();

        assert!(locate_staged_files(dir.path()).unwrap().is_empty());
    }
}
