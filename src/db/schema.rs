use std::path::Path;

use chrono::NaiveDateTime;

use crate::config::TIMESTAMP_COLUMNS;
use crate::error::IngestError;

/// SQL data type for a destination column.
///
/// Header-derived schemas only produce `Text` and `Timestamp`; the numeric
/// types exist for the fixed warehouse trips schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlType {
    Text,
    Timestamp,
    Integer,
    BigInt,
    DoublePrecision,
}

impl SqlType {
    /// Type name used in DDL. Understood by both Postgres and SQLite.
    pub fn type_name(&self) -> &'static str {
        match self {
            SqlType::Text => "TEXT",
            SqlType::Timestamp => "TIMESTAMP",
            SqlType::Integer => "INTEGER",
            SqlType::BigInt => "BIGINT",
            SqlType::DoublePrecision => "DOUBLE PRECISION",
        }
    }
}

/// A column in a destination table.
#[derive(Debug, Clone)]
pub struct ColumnDef {
    pub name: String,
    pub sql_type: SqlType,
}

/// Destination table schema.
#[derive(Debug, Clone)]
pub struct TableSchema {
    pub columns: Vec<ColumnDef>,
}

impl TableSchema {
    /// Derive a schema from the header row of a CSV file, reading zero data
    /// rows. Columns named in [`TIMESTAMP_COLUMNS`] become TIMESTAMP, every
    /// other column becomes TEXT.
    pub fn from_csv_header(path: &Path) -> Result<Self, IngestError> {
        let mut reader = csv::Reader::from_path(path).map_err(|e| IngestError::CsvRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        let headers = reader.headers().map_err(|e| IngestError::CsvRead {
            path: path.to_path_buf(),
            source: e,
        })?;

        let columns = headers
            .iter()
            .map(|name| ColumnDef {
                name: name.to_string(),
                sql_type: if TIMESTAMP_COLUMNS.contains(&name) {
                    SqlType::Timestamp
                } else {
                    SqlType::Text
                },
            })
            .collect();

        Ok(TableSchema { columns })
    }

    /// Generate the CREATE TABLE statement for this schema.
    pub fn create_ddl(&self, table: &str) -> String {
        let column_defs: Vec<String> = self
            .columns
            .iter()
            .map(|col| format!("  \"{}\" {}", col.name, col.sql_type.type_name()))
            .collect();

        format!("CREATE TABLE \"{}\" (\n{}\n)", table, column_defs.join(",\n"))
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }
}

/// A value bound into an INSERT statement.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Text(String),
    Timestamp(NaiveDateTime),
    Integer(i64),
    Real(f64),
}

/// Timestamp formats accepted in declared timestamp columns.
const TIMESTAMP_FORMATS: [&str; 6] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

/// Parse a raw field into a timestamp, trying each accepted format in order.
pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value.trim(), format).ok())
}

/// Convert one raw CSV field to its bound value under the column's type.
///
/// Empty fields become NULL. A non-empty field in a timestamp column that
/// matches no accepted format is an error, not silently stored as text: the
/// header pass already committed the column to TIMESTAMP.
pub fn parse_field(column: &ColumnDef, raw: &str) -> Result<SqlValue, IngestError> {
    if raw.trim().is_empty() {
        return Ok(SqlValue::Null);
    }

    match column.sql_type {
        SqlType::Timestamp => parse_timestamp(raw)
            .map(SqlValue::Timestamp)
            .ok_or_else(|| IngestError::Timestamp {
                column: column.name.clone(),
                value: raw.to_string(),
            }),
        _ => Ok(SqlValue::Text(raw.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;

    #[test]
    fn header_schema_types_timestamp_columns() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "ride_id,rideable_type,started_at,ended_at,member_casual").unwrap();
        writeln!(file, "abc,electric_bike,2020-01-01 00:00:01,2020-01-01 00:10:02,member").unwrap();
        file.flush().unwrap();

        let schema = TableSchema::from_csv_header(file.path()).unwrap();

        let names: Vec<_> = schema.column_names();
        assert_eq!(
            names,
            vec!["ride_id", "rideable_type", "started_at", "ended_at", "member_casual"]
        );
        assert_eq!(schema.columns[0].sql_type, SqlType::Text);
        assert_eq!(schema.columns[2].sql_type, SqlType::Timestamp);
        assert_eq!(schema.columns[3].sql_type, SqlType::Timestamp);
        assert_eq!(schema.columns[4].sql_type, SqlType::Text);
    }

    #[test]
    fn create_ddl_quotes_identifiers() {
        let schema = TableSchema {
            columns: vec![
                ColumnDef {
                    name: "started_at".to_string(),
                    sql_type: SqlType::Timestamp,
                },
                ColumnDef {
                    name: "member_casual".to_string(),
                    sql_type: SqlType::Text,
                },
            ],
        };

        let ddl = schema.create_ddl("citibike_202001");
        assert!(ddl.contains("CREATE TABLE \"citibike_202001\""));
        assert!(ddl.contains("\"started_at\" TIMESTAMP"));
        assert!(ddl.contains("\"member_casual\" TEXT"));
    }

    #[test]
    fn timestamp_formats_accepted() {
        for value in [
            "2020-01-01 12:34:56",
            "2020-01-01T12:34:56",
            "2020-01-01 12:34:56.123",
            "2020-01-01 12:34",
        ] {
            assert!(parse_timestamp(value).is_some(), "rejected {value:?}");
        }

        assert!(parse_timestamp("not a time").is_none());
        assert!(parse_timestamp("2020-13-40 99:99:99").is_none());
    }

    #[test]
    fn parse_field_empty_is_null_and_bad_timestamp_is_error() {
        let ts_col = ColumnDef {
            name: "started_at".to_string(),
            sql_type: SqlType::Timestamp,
        };
        let text_col = ColumnDef {
            name: "member_casual".to_string(),
            sql_type: SqlType::Text,
        };

        assert_eq!(parse_field(&ts_col, "").unwrap(), SqlValue::Null);
        assert_eq!(parse_field(&text_col, "member").unwrap(), SqlValue::Text("member".to_string()));
        assert!(matches!(
            parse_field(&ts_col, "garbage").unwrap_err(),
            IngestError::Timestamp { .. }
        ));

        // Header pass and data pass share this function, so a value the header
        // pass would accept is the same value the data pass accepts.
        assert!(matches!(
            parse_field(&ts_col, "2020-01-01 00:00:01").unwrap(),
            SqlValue::Timestamp(_)
        ));
    }
}
