//! Schema-first loader: two passes over each staged file, a zero-row header
//! pass that creates the destination table and a chunked data pass that
//! appends everything.

use tracing::info;

use crate::config::TABLE_PREFIX;
use crate::db::{parse_field, Db, SqlValue, TableSchema};
use crate::error::IngestError;
use crate::staging::StagedFile;

/// What one file load wrote.
#[derive(Debug, Clone)]
pub struct LoadReport {
    pub table: String,
    pub rows: u64,
    pub chunks: u64,
}

pub struct SchemaFirstLoader {
    chunk_rows: usize,
}

impl SchemaFirstLoader {
    pub fn new(chunk_rows: usize) -> Self {
        Self { chunk_rows }
    }

    /// Destination table for a staging group: `citibike_<group>`.
    pub fn table_name(group: &str) -> String {
        format!("{}_{}", TABLE_PREFIX, group)
    }

    /// Load one staged file into `table`, replacing whatever the table held.
    ///
    /// Pass one reads only the header row and recreates the table from it.
    /// Pass two streams the data rows in bounded chunks, so at most
    /// `chunk_rows` parsed rows are in memory at once. A file that fails
    /// mid-load leaves the table partially filled; rerunning the load
    /// replaces it from scratch.
    pub async fn load(
        &self,
        db: &Db,
        file: &StagedFile,
        table: &str,
    ) -> Result<LoadReport, IngestError> {
        let schema = TableSchema::from_csv_header(&file.path)?;
        db.replace_table(table, &schema)
            .await
            .map_err(|e| IngestError::Load {
                table: table.to_string(),
                source: e,
            })?;
        info!(table, path = %file.path.display(), columns = schema.columns.len(), "destination table created");

        let mut reader =
            csv::Reader::from_path(&file.path).map_err(|e| IngestError::CsvRead {
                path: file.path.clone(),
                source: e,
            })?;

        let mut rows = 0u64;
        let mut chunks = 0u64;
        let mut chunk: Vec<Vec<SqlValue>> = Vec::with_capacity(self.chunk_rows);

        for record in reader.records() {
            let record = record.map_err(|e| IngestError::CsvRead {
                path: file.path.clone(),
                source: e,
            })?;

            let mut row = Vec::with_capacity(schema.columns.len());
            for (i, column) in schema.columns.iter().enumerate() {
                row.push(parse_field(column, record.get(i).unwrap_or(""))?);
            }
            chunk.push(row);

            if chunk.len() == self.chunk_rows {
                rows += self.flush(db, table, &schema, &mut chunk).await?;
                chunks += 1;
                info!(table, rows, chunks, "chunk appended");
            }
        }

        if !chunk.is_empty() {
            rows += self.flush(db, table, &schema, &mut chunk).await?;
            chunks += 1;
        }

        info!(table, rows, chunks, "file load complete");
        Ok(LoadReport {
            table: table.to_string(),
            rows,
            chunks,
        })
    }

    async fn flush(
        &self,
        db: &Db,
        table: &str,
        schema: &TableSchema,
        chunk: &mut Vec<Vec<SqlValue>>,
    ) -> Result<u64, IngestError> {
        let written = db
            .insert_rows(table, schema, chunk)
            .await
            .map_err(|e| IngestError::Load {
                table: table.to_string(),
                source: e,
            })?;
        chunk.clear();
        Ok(written)
    }
}
