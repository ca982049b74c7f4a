use std::future::Future;

use tracing::{error, info};

use crate::error::IngestError;

/// Run one pipeline stage with start/success/failure logging.
///
/// Every component boundary goes through this wrapper: the log line names the
/// stage and the unit of work (archive URL, table name, or year), the error is
/// re-raised unchanged.
pub async fn stage<T, F>(name: &str, unit: &str, fut: F) -> Result<T, IngestError>
where
    F: Future<Output = Result<T, IngestError>>,
{
    info!(stage = name, unit, "stage started");
    match fut.await {
        Ok(value) => {
            info!(stage = name, unit, "stage complete");
            Ok(value)
        }
        Err(e) => {
            error!(stage = name, unit, error = %e, "stage failed");
            Err(e)
        }
    }
}

/// Events emitted by the pipeline as it makes progress.
#[derive(Debug, Clone)]
pub enum IngestEvent {
    ArchiveFetched,
    /// Conditional download decided the local copy was current.
    ArchiveSkipped,
    FileLoaded {
        rows: u64,
        chunks: u64,
    },
    YearBackfilled {
        rows: u64,
        pages: u64,
    },
    /// Destination table for the year already existed.
    YearSkipped,
}

/// Counters aggregated from pipeline events for the end-of-run summary.
#[derive(Debug, Default, Clone, serde::Serialize)]
pub struct IngestStats {
    pub archives_fetched: usize,
    pub archives_skipped: usize,
    pub files_loaded: usize,
    pub rows_loaded: u64,
    pub chunks_loaded: u64,
    pub years_backfilled: usize,
    pub years_skipped: usize,
    pub rows_backfilled: u64,
}

impl IngestStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, event: &IngestEvent) {
        match event {
            IngestEvent::ArchiveFetched => self.archives_fetched += 1,
            IngestEvent::ArchiveSkipped => self.archives_skipped += 1,
            IngestEvent::FileLoaded { rows, chunks } => {
                self.files_loaded += 1;
                self.rows_loaded += rows;
                self.chunks_loaded += chunks;
            }
            IngestEvent::YearBackfilled { rows, pages: _ } => {
                self.years_backfilled += 1;
                self.rows_backfilled += rows;
            }
            IngestEvent::YearSkipped => self.years_skipped += 1,
        }
    }
}
