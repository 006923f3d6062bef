//! In-memory Iceberg table state: schemas, rows and snapshot log

use crate::schema::Schema;
use crate::value::Value;
use serde::Serialize;
use std::collections::BTreeMap;

/// Row keyed by field id, so renames and added columns never shift data.
pub(crate) type Row = BTreeMap<i32, Value>;

/// Snapshot operation, as recorded in the Iceberg snapshot summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Append,
    Overwrite,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct Snapshot {
    pub snapshot_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_snapshot_id: Option<i64>,
    pub sequence_number: i64,
    pub schema_id: i32,
    pub operation: Operation,
    pub summary: SnapshotSummary,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct SnapshotSummary {
    pub added_records: usize,
    pub deleted_records: usize,
    pub total_records: usize,
}

/// Iceberg-style table metadata, serializable for inspection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct TableMetadata {
    pub format_version: i32,
    pub location: String,
    pub current_schema_id: i32,
    pub schemas: Vec<Schema>,
    /// Identity partition source column, if the table is partitioned
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partition_column: Option<String>,
    pub last_column_id: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_snapshot_id: Option<i64>,
    pub snapshots: Vec<Snapshot>,
}

impl TableMetadata {
    pub fn current_schema(&self) -> Option<&Schema> {
        self.schemas
            .iter()
            .find(|s| s.schema_id == self.current_schema_id)
    }

    pub fn schema_by_id(&self, schema_id: i32) -> Option<&Schema> {
        self.schemas.iter().find(|s| s.schema_id == schema_id)
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Table {
    pub metadata: TableMetadata,
    /// Copy of the current entry in `metadata.schemas`
    schema: Schema,
    pub rows: Vec<Row>,
}

impl Table {
    pub fn new(location: String, schema: Schema, partition_column: Option<String>) -> Self {
        Self {
            metadata: TableMetadata {
                format_version: 2,
                location,
                current_schema_id: schema.schema_id,
                last_column_id: schema.highest_field_id(),
                schemas: vec![schema.clone()],
                partition_column,
                current_snapshot_id: None,
                snapshots: Vec::new(),
            },
            schema,
            rows: Vec::new(),
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn add_schema(&mut self, schema: Schema) {
        self.metadata.current_schema_id = schema.schema_id;
        self.metadata.last_column_id = self.metadata.last_column_id.max(schema.highest_field_id());
        self.metadata.schemas.push(schema.clone());
        self.schema = schema;
    }

    /// Record a snapshot for a committed change and make it current.
    pub fn commit(
        &mut self,
        operation: Operation,
        added: usize,
        deleted: usize,
    ) -> SnapshotSummary {
        let sequence_number = self.metadata.snapshots.len() as i64 + 1;
        let summary = SnapshotSummary {
            added_records: added,
            deleted_records: deleted,
            total_records: self.rows.len(),
        };
        self.metadata.snapshots.push(Snapshot {
            snapshot_id: sequence_number,
            parent_snapshot_id: self.metadata.current_snapshot_id,
            sequence_number,
            schema_id: self.metadata.current_schema_id,
            operation,
            summary,
        });
        self.metadata.current_snapshot_id = Some(sequence_number);
        summary
    }
}
