//! Warehouse backfill: copies historical trip years from an analytical
//! warehouse table into per-year local tables, paging through each year.

use async_trait::async_trait;
use chrono::NaiveDateTime;
use sqlx::postgres::PgPoolOptions;
use tracing::info;

use crate::config::{ADMIN_DATABASE, BACKFILL_TABLE_PREFIX, WAREHOUSE_START_COLUMN};
use crate::db::{ColumnDef, ConnectionConfig, Db, SqlType, SqlValue, TableSchema};
use crate::error::IngestError;

/// Connect to the named database, creating it first if it does not exist.
///
/// The existence check and CREATE DATABASE run against the server's
/// administrative database, then a fresh connection is opened to the target.
pub async fn ensure_database(
    config: &ConnectionConfig,
    name: &str,
) -> Result<Db, IngestError> {
    let admin = Db::connect(config, ADMIN_DATABASE).await?;
    let exists = admin
        .database_exists(name)
        .await
        .map_err(|e| IngestError::Backfill {
            unit: format!("database {name}"),
            source: e,
        })?;

    if !exists {
        // CREATE DATABASE cannot be parameterized; the name comes from
        // operator configuration, not remote data.
        admin
            .execute(&format!("CREATE DATABASE \"{}\"", name))
            .await
            .map_err(|e| IngestError::Backfill {
                unit: format!("database {name}"),
                source: e,
            })?;
        info!(database = name, "created backfill database");
    }

    Db::connect(config, name).await
}

/// One trip row from the warehouse table. The column set is fixed; it is the
/// schema of the public aggregated trips table, and [`trips_schema`] mirrors
/// it for the per-year destination tables.
#[derive(Debug, Clone, Default, sqlx::FromRow)]
pub struct TripRecord {
    pub tripduration: Option<i64>,
    pub starttime: Option<NaiveDateTime>,
    pub stoptime: Option<NaiveDateTime>,
    pub start_station_id: Option<i64>,
    pub start_station_name: Option<String>,
    pub start_station_latitude: Option<f64>,
    pub start_station_longitude: Option<f64>,
    pub end_station_id: Option<i64>,
    pub end_station_name: Option<String>,
    pub end_station_latitude: Option<f64>,
    pub end_station_longitude: Option<f64>,
    pub bikeid: Option<i64>,
    pub usertype: Option<String>,
    pub birth_year: Option<i64>,
    pub gender: Option<String>,
}

impl TripRecord {
    fn into_row(self) -> Vec<SqlValue> {
        fn int(v: Option<i64>) -> SqlValue {
            v.map(SqlValue::Integer).unwrap_or(SqlValue::Null)
        }
        fn ts(v: Option<NaiveDateTime>) -> SqlValue {
            v.map(SqlValue::Timestamp).unwrap_or(SqlValue::Null)
        }
        fn text(v: Option<String>) -> SqlValue {
            v.map(SqlValue::Text).unwrap_or(SqlValue::Null)
        }
        fn real(v: Option<f64>) -> SqlValue {
            v.map(SqlValue::Real).unwrap_or(SqlValue::Null)
        }

        vec![
            int(self.tripduration),
            ts(self.starttime),
            ts(self.stoptime),
            int(self.start_station_id),
            text(self.start_station_name),
            real(self.start_station_latitude),
            real(self.start_station_longitude),
            int(self.end_station_id),
            text(self.end_station_name),
            real(self.end_station_latitude),
            real(self.end_station_longitude),
            int(self.bikeid),
            text(self.usertype),
            int(self.birth_year),
            text(self.gender),
        ]
    }
}

/// Destination schema for the per-year trip tables.
pub fn trips_schema() -> TableSchema {
    fn col(name: &str, sql_type: SqlType) -> ColumnDef {
        ColumnDef {
            name: name.to_string(),
            sql_type,
        }
    }

    TableSchema {
        columns: vec![
            col("tripduration", SqlType::BigInt),
            col("starttime", SqlType::Timestamp),
            col("stoptime", SqlType::Timestamp),
            col("start_station_id", SqlType::BigInt),
            col("start_station_name", SqlType::Text),
            col("start_station_latitude", SqlType::DoublePrecision),
            col("start_station_longitude", SqlType::DoublePrecision),
            col("end_station_id", SqlType::BigInt),
            col("end_station_name", SqlType::Text),
            col("end_station_latitude", SqlType::DoublePrecision),
            col("end_station_longitude", SqlType::DoublePrecision),
            col("bikeid", SqlType::BigInt),
            col("usertype", SqlType::Text),
            col("birth_year", SqlType::BigInt),
            col("gender", SqlType::Text),
        ],
    }
}

/// Read side of the backfill: pages of one calendar year of trips.
#[async_trait]
pub trait Warehouse: Send + Sync {
    async fn fetch_page(
        &self,
        year: i32,
        limit: u64,
        offset: u64,
    ) -> Result<Vec<TripRecord>, IngestError>;
}

/// Warehouse backed by a SQL connection to the aggregated trips table.
pub struct SqlWarehouse {
    pool: sqlx::PgPool,
    table: String,
}

impl SqlWarehouse {
    pub async fn connect(dsn: &str, table: impl Into<String>) -> Result<Self, IngestError> {
        let pool = PgPoolOptions::new()
            .max_connections(2)
            .connect(dsn)
            .await
            .map_err(|e| IngestError::Connect {
                database: "warehouse".to_string(),
                source: e,
            })?;
        Ok(Self {
            pool,
            table: table.into(),
        })
    }
}

#[async_trait]
impl Warehouse for SqlWarehouse {
    async fn fetch_page(
        &self,
        year: i32,
        limit: u64,
        offset: u64,
    ) -> Result<Vec<TripRecord>, IngestError> {
        let sql = format!(
            "SELECT * FROM \"{}\" WHERE EXTRACT(YEAR FROM \"{}\") = $1 LIMIT $2 OFFSET $3",
            self.table, WAREHOUSE_START_COLUMN
        );
        sqlx::query_as::<_, TripRecord>(&sql)
            .bind(year)
            .bind(limit as i64)
            .bind(offset as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| IngestError::Backfill {
                unit: format!("year {year}"),
                source: e,
            })
    }
}

/// Result of backfilling one year.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum YearOutcome {
    /// Destination table already existed; the warehouse was not read.
    Skipped { year: i32 },
    /// The warehouse held no trips for the year; no table was created.
    Empty { year: i32 },
    Backfilled { year: i32, rows: u64, pages: u64 },
}

pub struct WarehouseBackfill {
    page_rows: u64,
}

impl WarehouseBackfill {
    pub fn new(page_rows: u64) -> Self {
        Self { page_rows }
    }

    pub fn table_name(year: i32) -> String {
        format!("{}_{}", BACKFILL_TABLE_PREFIX, year)
    }

    /// Backfill each year in the inclusive range, oldest first.
    pub async fn run(
        &self,
        db: &Db,
        warehouse: &dyn Warehouse,
        start_year: i32,
        end_year: i32,
    ) -> Result<Vec<YearOutcome>, IngestError> {
        let mut outcomes = Vec::new();
        for year in start_year..=end_year {
            outcomes.push(self.run_year(db, warehouse, year).await?);
        }
        Ok(outcomes)
    }

    /// Backfill one year. An existing destination table marks the year done
    /// and costs zero warehouse reads. Otherwise the year is paged through:
    /// the first non-empty page creates the table, every later page appends,
    /// and an empty page ends the year.
    async fn run_year(
        &self,
        db: &Db,
        warehouse: &dyn Warehouse,
        year: i32,
    ) -> Result<YearOutcome, IngestError> {
        let table = Self::table_name(year);
        let exists = db
            .table_exists(&table)
            .await
            .map_err(|e| IngestError::Backfill {
                unit: format!("year {year}"),
                source: e,
            })?;
        if exists {
            info!(year, table, "year already backfilled, skipping");
            return Ok(YearOutcome::Skipped { year });
        }

        let schema = trips_schema();
        let mut offset = 0u64;
        let mut rows = 0u64;
        let mut pages = 0u64;

        // Page until an empty read. The first non-empty page creates the
        // table; later pages append, so every page's rows survive.
        loop {
            let page = warehouse.fetch_page(year, self.page_rows, offset).await?;
            let page_len = page.len() as u64;

            if page_len == 0 {
                if pages == 0 {
                    info!(year, "no trips for year, nothing created");
                    return Ok(YearOutcome::Empty { year });
                }
                break;
            }

            if pages == 0 {
                db.replace_table(&table, &schema)
                    .await
                    .map_err(|e| IngestError::Backfill {
                        unit: format!("year {year}"),
                        source: e,
                    })?;
            }
            let page_rows: Vec<Vec<SqlValue>> =
                page.into_iter().map(TripRecord::into_row).collect();
            db.insert_rows(&table, &schema, &page_rows)
                .await
                .map_err(|e| IngestError::Backfill {
                    unit: format!("year {year}"),
                    source: e,
                })?;
            rows += page_len;
            pages += 1;
            info!(year, table, rows, pages, "page appended");

            offset += self.page_rows;
        }

        info!(year, table, rows, pages, "year backfill complete");
        Ok(YearOutcome::Backfilled { year, rows, pages })
    }
}
