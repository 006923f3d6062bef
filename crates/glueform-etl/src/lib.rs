//! ETL table contract
//!
//! The managed job's script drives an Iceberg table through a catalog
//! session: create-if-absent, insert, update and delete by predicate,
//! partition overwrite, column addition, describe and read-back.
//! [`TableSession`] is an in-memory implementation of that contract. It
//! mirrors Iceberg's schema ids and snapshot log closely enough to check a
//! script's expected effects locally, and returns reads as Arrow batches.

mod arrow_convert;
mod error;
pub mod sample;
pub mod schema;
mod session;
mod table;
pub mod value;

pub use arrow_convert::{to_arrow_schema, FIELD_ID_KEY};
pub use error::{EtlError, Result};
pub use schema::{Column, NestedField, Schema, Type};
pub use session::{ColumnDescription, TableDescription, TableIdent, TableSession};
pub use table::{Operation, Snapshot, SnapshotSummary, TableMetadata};
pub use value::{Predicate, Value};
