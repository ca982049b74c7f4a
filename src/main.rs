use std::path::PathBuf;

use citibike_ingest::config::{
    DEFAULT_BACKFILL_DB, DEFAULT_BACKFILL_END_YEAR, DEFAULT_BACKFILL_START_YEAR,
    DEFAULT_CHUNK_ROWS, DEFAULT_WAREHOUSE_TABLE,
};
use citibike_ingest::runner::{run_ingest, BackfillArgs, IngestArgs, UploadArgs};
use citibike_ingest::upload::BlobProvider;
use clap::Parser;

/// Download, extract, and load the public trip-history archives into
/// Postgres, with an optional per-year warehouse backfill.
#[derive(Parser, Clone)]
#[command(name = "citibike-ingest")]
struct Args {
    /// Database username
    #[arg(long, default_value = "postgres")]
    user: String,

    /// Database password
    #[arg(long, default_value = "postgres")]
    password: String,

    /// Database host
    #[arg(long, default_value = "localhost")]
    host: String,

    /// Database port
    #[arg(long, default_value = "5432")]
    port: u16,

    /// Database the monthly tables land in
    #[arg(long, default_value = "citibike")]
    db: String,

    /// Destination table override; valid only when a single file is loaded
    #[arg(long = "table_name")]
    table_name: Option<String>,

    /// Single archive URL to ingest instead of scanning the catalog
    #[arg(long)]
    url: Option<String>,

    /// Root directory for downloaded archives and extracted files
    #[arg(long = "download_dir", default_value = "./data/citibike_data")]
    download_dir: PathBuf,

    /// Rows per chunk when streaming a file into its table
    #[arg(long = "chunk_size", default_value_t = DEFAULT_CHUNK_ROWS)]
    chunk_size: usize,

    /// Warehouse connection string; backfill runs only when this is set
    #[arg(long = "warehouse_dsn")]
    warehouse_dsn: Option<String>,

    /// Warehouse table holding the aggregated trips
    #[arg(long = "warehouse_table", default_value = DEFAULT_WAREHOUSE_TABLE)]
    warehouse_table: String,

    /// Database that receives the backfilled years
    #[arg(long = "backfill_db", default_value = DEFAULT_BACKFILL_DB)]
    backfill_db: String,

    #[arg(long = "backfill_start_year", default_value_t = DEFAULT_BACKFILL_START_YEAR)]
    backfill_start_year: i32,

    #[arg(long = "backfill_end_year", default_value_t = DEFAULT_BACKFILL_END_YEAR)]
    backfill_end_year: i32,

    /// Object-storage provider for the optional archive upload
    #[arg(long = "upload_provider", value_enum, requires = "upload_bucket")]
    upload_provider: Option<BlobProvider>,

    /// Bucket the archives are uploaded to
    #[arg(long = "upload_bucket", requires = "upload_provider")]
    upload_bucket: Option<String>,

    /// Quiet mode - minimal output, only show summary
    #[arg(short, long)]
    quiet: bool,

    /// Print the run summary as JSON
    #[arg(long = "summary_json")]
    summary_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    use tracing_subscriber::{EnvFilter, FmtSubscriber};
    let filter = if args.quiet {
        EnvFilter::new("citibike_ingest=warn,sqlx=off")
    } else {
        EnvFilter::new("citibike_ingest=info,sqlx=off")
    };
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    let _ = tracing::subscriber::set_global_default(subscriber);

    let backfill = args.warehouse_dsn.clone().map(|dsn| BackfillArgs {
        database: args.backfill_db.clone(),
        start_year: args.backfill_start_year,
        end_year: args.backfill_end_year,
        warehouse_dsn: dsn,
        warehouse_table: args.warehouse_table.clone(),
    });

    let upload = match (args.upload_provider, args.upload_bucket.clone()) {
        (Some(provider), Some(bucket)) => Some(UploadArgs { provider, bucket }),
        _ => None,
    };

    let ingest_args = IngestArgs {
        connection: citibike_ingest::db::ConnectionConfig {
            user: args.user.clone(),
            password: args.password.clone(),
            host: args.host.clone(),
            port: args.port,
        },
        database: args.db.clone(),
        table_name: args.table_name.clone(),
        url: args.url.clone(),
        download_dir: args.download_dir.clone(),
        chunk_rows: args.chunk_size,
        backfill,
        upload,
    };

    let report = run_ingest(ingest_args).await?;

    if args.summary_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!();
    println!("Ingest Summary");
    println!("==============");
    println!("Job ID: {}", report.job_id);
    println!(
        "Archives fetched: {} ({} already current)",
        report.stats.archives_fetched, report.stats.archives_skipped
    );
    println!(
        "Files loaded: {} ({} rows in {} chunks)",
        report.stats.files_loaded, report.stats.rows_loaded, report.stats.chunks_loaded
    );
    for table in &report.tables_loaded {
        println!("  {}", table);
    }
    if report.stats.years_backfilled + report.stats.years_skipped > 0 {
        println!(
            "Years backfilled: {} ({} rows, {} skipped)",
            report.stats.years_backfilled, report.stats.rows_backfilled, report.stats.years_skipped
        );
    }
    println!("Duration: {:.2}s", report.duration_secs);

    Ok(())
}
