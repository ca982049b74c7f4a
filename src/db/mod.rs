//! Database layer - connection handling, destination schemas, typed binds.

pub mod pool;
pub mod schema;

pub use pool::{ConnectionConfig, Db};
pub use schema::{parse_field, ColumnDef, SqlType, SqlValue, TableSchema};
