//! Tunable parameters and fixed names used throughout the pipeline.

use std::time::Duration;

// ============================================================================
// Remote source
// ============================================================================

/// Bucket-listing endpoint for the public trip-history archives.
pub const BASE_URL: &str = "https://s3.amazonaws.com/tripdata/";

/// Extension that marks a listing key as a downloadable archive.
pub const ARCHIVE_EXTENSION: &str = ".zip";

pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// Local staging layout
// ============================================================================

/// Subdirectory of the download root holding the raw archives.
pub const ARCHIVE_DIR: &str = "archive_files";

/// Subdirectory of the download root holding extracted tabular files,
/// one directory per archive.
pub const STAGING_DIR: &str = "unzipped_files";

// ============================================================================
// Loading
// ============================================================================

/// Destination tables are named `citibike_<group>`.
pub const TABLE_PREFIX: &str = "citibike";

/// Header columns parsed as timestamps in both the schema pass and the data
/// pass. Both passes must use the same rule so replace-then-append sees
/// consistent column types.
pub const TIMESTAMP_COLUMNS: [&str; 2] = ["started_at", "ended_at"];

/// Rows per chunk when streaming a tabular file into its table.
///
/// Bounds memory use: one chunk of rows is materialized at a time, appended,
/// then dropped before the next is read.
pub const DEFAULT_CHUNK_ROWS: usize = 200_000;

/// Rows per INSERT statement inside a chunk.
///
/// Postgres caps bind parameters at 65535 per statement and SQLite at 32766;
/// 500 rows of a ~15 column file stays well inside both.
pub const INSERT_BATCH_ROWS: usize = 500;

// ============================================================================
// Warehouse backfill
// ============================================================================

/// Administrative database used for existence checks and CREATE DATABASE.
pub const ADMIN_DATABASE: &str = "postgres";

/// Database that receives the backfilled years.
pub const DEFAULT_BACKFILL_DB: &str = "citibikebq";

/// Backfill destination tables are named `citibike_trips_<year>`.
pub const BACKFILL_TABLE_PREFIX: &str = "citibike_trips";

/// Remote analytical table holding the aggregated public trips.
pub const DEFAULT_WAREHOUSE_TABLE: &str = "citibike_trips";

/// Column the year filter is applied to.
pub const WAREHOUSE_START_COLUMN: &str = "starttime";

/// Rows per page when paging the warehouse year filter.
pub const BACKFILL_PAGE_ROWS: u64 = 500_000;

pub const DEFAULT_BACKFILL_START_YEAR: i32 = 2013;
pub const DEFAULT_BACKFILL_END_YEAR: i32 = 2019;
