use std::path::PathBuf;

use thiserror::Error;

/// Failure taxonomy for the ingestion pipeline.
///
/// Every variant keeps the originating error as its source and names the unit
/// of work that was being processed (URL, path, table, or year). Components
/// log at the point of failure and re-raise unchanged; there is no recovery
/// layer above the runner.
#[derive(Debug, Error)]
pub enum IngestError {
    /// The bucket-listing endpoint was unreachable or returned an error status.
    #[error("catalog listing request failed: {url}")]
    Fetch {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The listing response body was not parseable XML.
    #[error("catalog listing is not parseable XML")]
    ListingParse(#[from] quick_xml::Error),

    #[error("cannot resolve listing key against base URL {base}")]
    BadUrl {
        base: String,
        #[source]
        source: url::ParseError,
    },

    /// Network or local-write failure while retrieving one archive.
    #[error("archive download failed: {url}")]
    Download {
        url: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },

    #[error("invalid zip archive: {path}")]
    CorruptZip {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("invalid tar archive: {path}")]
    CorruptTar {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("filesystem operation failed: {path}")]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read tabular file: {path}")]
    CsvRead {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    /// A value in a declared timestamp column did not match any accepted format.
    #[error("column {column} value {value:?} is not a recognized timestamp")]
    Timestamp { column: String, value: String },

    #[error("cannot connect to database {database}")]
    Connect {
        database: String,
        #[source]
        source: sqlx::Error,
    },

    /// Schema creation or chunk append failure against a destination table.
    #[error("load into table {table} failed")]
    Load {
        table: String,
        #[source]
        source: sqlx::Error,
    },

    /// Database creation, existence check, or paging failure during backfill.
    #[error("warehouse backfill failed: {unit}")]
    Backfill {
        unit: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("blob upload failed: {target}")]
    Upload {
        target: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },
}

impl IngestError {
    pub(crate) fn fs(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        IngestError::Filesystem {
            path: path.into(),
            source,
        }
    }
}
