//! High-level runner API for the trip-history ingestion pipeline.
//!
//! Sequences the stages end to end: catalog scan, per-archive fetch and
//! extract, staging scan, per-file load, then the optional warehouse backfill.
//! This is the primary API for external users and for the CLI.

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use serde::Serialize;
use uuid::Uuid;

use crate::backfill::{ensure_database, SqlWarehouse, WarehouseBackfill, YearOutcome};
use crate::catalog::CatalogScanner;
use crate::config::{BASE_URL, CONNECT_TIMEOUT};
use crate::db::{ConnectionConfig, Db};
use crate::fetch::{ArchiveFetcher, RemoteArchiveRef};
use crate::loader::SchemaFirstLoader;
use crate::staging::locate_staged_files;
use crate::telemetry::{stage, IngestEvent};
use crate::upload::{upload_blob, BlobProvider};

pub use crate::telemetry::IngestStats;

/// Warehouse backfill configuration. Absent means the backfill stage is
/// skipped entirely.
#[derive(Debug, Clone)]
pub struct BackfillArgs {
    /// Local database the per-year tables land in.
    pub database: String,
    pub start_year: i32,
    pub end_year: i32,
    pub warehouse_dsn: String,
    pub warehouse_table: String,
}

/// Blob upload configuration. Absent means nothing is uploaded.
#[derive(Debug, Clone)]
pub struct UploadArgs {
    pub provider: BlobProvider,
    pub bucket: String,
}

/// Arguments for one pipeline run.
#[derive(Debug, Clone)]
pub struct IngestArgs {
    pub connection: ConnectionConfig,
    /// Database the monthly tables land in.
    pub database: String,
    /// Override destination table name. Only valid when exactly one staged
    /// file is loaded.
    pub table_name: Option<String>,
    /// Single archive URL to ingest instead of scanning the catalog.
    pub url: Option<String>,
    pub download_dir: PathBuf,
    pub chunk_rows: usize,
    pub backfill: Option<BackfillArgs>,
    pub upload: Option<UploadArgs>,

    // Test-only: inject a pre-created database (for SQLite testing)
    #[cfg(test)]
    pub test_db: Option<Db>,
    // Test-only: skip the network stages and load whatever is already staged
    #[cfg(test)]
    pub skip_fetch: bool,
}

/// Result of a completed pipeline run.
#[derive(Debug, Serialize)]
pub struct IngestReport {
    pub job_id: String,
    pub tables_loaded: Vec<String>,
    #[serde(flatten)]
    pub stats: IngestStats,
    pub duration_secs: f64,
}

/// Run the pipeline with the specified arguments.
///
/// Stages run strictly in sequence; the first stage error aborts the run.
pub async fn run_ingest(args: IngestArgs) -> Result<IngestReport> {
    let job_id = Uuid::new_v4().to_string();
    let started = Instant::now();
    let mut stats = IngestStats::new();

    tracing::info!(job_id, download_dir = %args.download_dir.display(), "ingest run starting");

    let http = reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .build()
        .context("failed to build HTTP client")?;

    let db = open_db(&args).await?;

    fetch_archives(&args, &http, &mut stats).await?;

    let staged = locate_staged_files(&args.download_dir)?;
    if args.table_name.is_some() && staged.len() > 1 {
        bail!(
            "--table_name overrides the destination for a single file, but {} staged files were found",
            staged.len()
        );
    }

    let loader = SchemaFirstLoader::new(args.chunk_rows);
    let mut tables_loaded = Vec::new();
    for file in &staged {
        let table = match &args.table_name {
            Some(name) => name.clone(),
            None => SchemaFirstLoader::table_name(&file.group),
        };
        let report = stage("load", &table, loader.load(&db, file, &table)).await?;
        stats.update(&IngestEvent::FileLoaded {
            rows: report.rows,
            chunks: report.chunks,
        });
        tables_loaded.push(report.table);
    }

    if let Some(backfill) = &args.backfill {
        run_backfill(&args.connection, backfill, &mut stats).await?;
    }

    let duration = started.elapsed();
    tracing::info!(
        job_id,
        files = stats.files_loaded,
        rows = stats.rows_loaded,
        duration_secs = duration.as_secs_f64(),
        "ingest run complete"
    );

    Ok(IngestReport {
        job_id,
        tables_loaded,
        stats,
        duration_secs: duration.as_secs_f64(),
    })
}

async fn open_db(args: &IngestArgs) -> Result<Db> {
    #[cfg(test)]
    if let Some(db) = &args.test_db {
        return Ok(db.clone());
    }

    let db = Db::connect(&args.connection, &args.database)
        .await
        .with_context(|| format!("cannot open database {}", args.database))?;
    Ok(db)
}

/// Discover the archive set (full catalog scan, or the single `--url`
/// archive), then fetch and extract each one in listing order. Uploads, when
/// configured, cover only archives actually downloaded this run.
async fn fetch_archives(
    args: &IngestArgs,
    http: &reqwest::Client,
    stats: &mut IngestStats,
) -> Result<()> {
    #[cfg(test)]
    if args.skip_fetch {
        return Ok(());
    }

    let archives = match &args.url {
        Some(url) => vec![RemoteArchiveRef::new(url.clone())],
        None => {
            let scanner = CatalogScanner::new(http.clone(), BASE_URL);
            stage("scan", BASE_URL, scanner.scan()).await?
        }
    };

    let fetcher = ArchiveFetcher::new(http.clone(), &args.download_dir);
    for archive in &archives {
        let outcome = stage("fetch", archive.file_name(), fetcher.fetch(archive)).await?;
        stats.update(if outcome.downloaded {
            &IngestEvent::ArchiveFetched
        } else {
            &IngestEvent::ArchiveSkipped
        });

        if let (Some(upload), true) = (&args.upload, outcome.downloaded) {
            stage(
                "upload",
                archive.file_name(),
                upload_blob(upload.provider, &upload.bucket, &outcome.archive_path),
            )
            .await?;
        }
    }

    Ok(())
}

async fn run_backfill(
    connection: &ConnectionConfig,
    backfill: &BackfillArgs,
    stats: &mut IngestStats,
) -> Result<()> {
    let unit = format!("{}..={}", backfill.start_year, backfill.end_year);
    let outcomes = stage("backfill", &unit, async {
        let db = ensure_database(connection, &backfill.database).await?;
        let warehouse =
            SqlWarehouse::connect(&backfill.warehouse_dsn, &backfill.warehouse_table).await?;
        WarehouseBackfill::new(crate::config::BACKFILL_PAGE_ROWS)
            .run(&db, &warehouse, backfill.start_year, backfill.end_year)
            .await
    })
    .await?;

    for outcome in outcomes {
        match outcome {
            YearOutcome::Backfilled { rows, pages, .. } => {
                stats.update(&IngestEvent::YearBackfilled { rows, pages });
            }
            YearOutcome::Skipped { .. } | YearOutcome::Empty { .. } => {
                stats.update(&IngestEvent::YearSkipped);
            }
        }
    }
    Ok(())
}
