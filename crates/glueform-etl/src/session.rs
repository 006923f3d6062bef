use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use arrow::record_batch::RecordBatch;
use glueform_config::CatalogConfig;
use serde::Serialize;
use tracing::{debug, info};

use crate::arrow_convert;
use crate::error::{EtlError, Result};
use crate::schema::{Column, NestedField, Schema, Type};
use crate::table::{Operation, Row, Snapshot, SnapshotSummary, Table, TableMetadata};
use crate::value::{Predicate, Value};

/// `catalog.database.table`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TableIdent {
    pub catalog: String,
    pub database: String,
    pub table: String,
}

impl TableIdent {
    pub fn new(
        catalog: impl Into<String>,
        database: impl Into<String>,
        table: impl Into<String>,
    ) -> Self {
        Self {
            catalog: catalog.into(),
            database: database.into(),
            table: table.into(),
        }
    }
}

impl fmt::Display for TableIdent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.catalog, self.database, self.table)
    }
}

impl FromStr for TableIdent {
    type Err = EtlError;

    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split('.').collect();
        match parts.as_slice() {
            [catalog, database, table]
                if !catalog.is_empty() && !database.is_empty() && !table.is_empty() =>
            {
                Ok(Self::new(*catalog, *database, *table))
            }
            _ => Err(EtlError::InvalidIdentifier(s.to_string())),
        }
    }
}

/// One row of `DESCRIBE TABLE` output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnDescription {
    pub col_name: String,
    pub data_type: String,
    pub nullable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableDescription {
    pub table: String,
    pub columns: Vec<ColumnDescription>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partition_column: Option<String>,
}

impl fmt::Display for TableDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self
            .columns
            .iter()
            .map(|c| c.col_name.len())
            .max()
            .unwrap_or(0)
            .max("col_name".len());
        writeln!(f, "{:<width$}  data_type", "col_name")?;
        for column in &self.columns {
            writeln!(f, "{:<width$}  {}", column.col_name, column.data_type)?;
        }
        if let Some(partition) = &self.partition_column {
            writeln!(f, "# Partitioning")?;
            writeln!(f, "{:<width$}  identity({partition})", "Part 0")?;
        }
        Ok(())
    }
}

/// Explicit execution context for the ETL table contract.
///
/// Holds the catalog wiring and every table it has touched. The session is
/// scoped to one job; after [`TableSession::close`] every call fails with
/// [`EtlError::SessionClosed`].
#[derive(Debug)]
pub struct TableSession {
    catalog: CatalogConfig,
    warehouse: String,
    tables: BTreeMap<TableIdent, Table>,
    closed: bool,
}

impl TableSession {
    pub fn open(catalog: &CatalogConfig, warehouse: impl Into<String>) -> Self {
        let warehouse = warehouse.into();
        for (key, value) in catalog.spark_properties(&warehouse) {
            debug!(key = %key, value = %value, "Catalog property");
        }
        info!(catalog = %catalog.name, warehouse = %warehouse, "Opened table session");
        Self {
            catalog: catalog.clone(),
            warehouse,
            tables: BTreeMap::new(),
            closed: false,
        }
    }

    pub fn catalog_name(&self) -> &str {
        &self.catalog.name
    }

    /// Identifier of `database.table` in this session's catalog.
    pub fn ident(&self, database: &str, table: &str) -> TableIdent {
        TableIdent::new(&self.catalog.name, database, table)
    }

    /// Release the session. Later calls fail; closing twice is harmless.
    pub fn close(&mut self) {
        if !self.closed {
            info!(catalog = %self.catalog.name, tables = self.tables.len(), "Closed table session");
        }
        self.closed = true;
        self.tables.clear();
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(EtlError::SessionClosed);
        }
        Ok(())
    }

    fn table(&self, ident: &TableIdent) -> Result<&Table> {
        self.ensure_open()?;
        self.tables
            .get(ident)
            .ok_or_else(|| EtlError::TableNotFound(ident.to_string()))
    }

    fn table_mut(&mut self, ident: &TableIdent) -> Result<&mut Table> {
        self.ensure_open()?;
        self.tables
            .get_mut(ident)
            .ok_or_else(|| EtlError::TableNotFound(ident.to_string()))
    }

    /// `CREATE TABLE IF NOT EXISTS`. Returns whether the table was created.
    ///
    /// An existing table is left untouched even if `columns` differ.
    pub fn create_table_if_absent(
        &mut self,
        ident: &TableIdent,
        columns: Vec<Column>,
        partition_column: Option<&str>,
    ) -> Result<bool> {
        self.ensure_open()?;
        if self.tables.contains_key(ident) {
            debug!(table = %ident, "Table exists; create skipped");
            return Ok(false);
        }
        if columns.is_empty() {
            return Err(EtlError::EmptySchema(ident.to_string()));
        }

        let mut seen = BTreeSet::new();
        for column in &columns {
            if !seen.insert(column.name.as_str()) {
                return Err(EtlError::ColumnExists {
                    table: ident.to_string(),
                    column: column.name.clone(),
                });
            }
        }
        if let Some(partition) = partition_column {
            if !seen.contains(partition) {
                return Err(EtlError::ColumnNotFound {
                    table: ident.to_string(),
                    column: partition.to_string(),
                });
            }
        }

        let location = format!(
            "{}/{}.db/{}",
            self.warehouse.trim_end_matches('/'),
            ident.database,
            ident.table
        );
        let schema = Schema::new(columns);
        info!(table = %ident, location = %location, columns = schema.fields.len(), "Created table");
        self.tables.insert(
            ident.clone(),
            Table::new(location, schema, partition_column.map(str::to_string)),
        );
        Ok(true)
    }

    /// `INSERT INTO ... VALUES`, positional over the current schema.
    pub fn insert(&mut self, ident: &TableIdent, rows: Vec<Vec<Value>>) -> Result<SnapshotSummary> {
        let table = self.table_mut(ident)?;
        let rows = build_rows(ident, table.schema(), rows)?;
        let added = rows.len();
        table.rows.extend(rows);
        let summary = table.commit(Operation::Append, added, 0);
        info!(table = %ident, added, total = summary.total_records, "Appended rows");
        Ok(summary)
    }

    /// `UPDATE ... SET ... WHERE`. Returns the number of rows changed.
    pub fn update(
        &mut self,
        ident: &TableIdent,
        predicate: &Predicate,
        assignments: Vec<(&str, Value)>,
    ) -> Result<usize> {
        let table = self.table_mut(ident)?;
        let schema = table.schema().clone();
        check_columns(ident, &schema, predicate)?;

        let mut resolved = Vec::with_capacity(assignments.len());
        for (name, value) in assignments {
            let field = schema
                .field_by_name(name)
                .ok_or_else(|| EtlError::ColumnNotFound {
                    table: ident.to_string(),
                    column: name.to_string(),
                })?;
            resolved.push((field.id, coerce(field, value)?));
        }

        let mut changed = 0;
        for row in table.rows.iter_mut() {
            if matches(&schema, row, predicate) {
                for (id, value) in &resolved {
                    row.insert(*id, value.clone());
                }
                changed += 1;
            }
        }
        if changed > 0 {
            table.commit(Operation::Overwrite, changed, changed);
        }
        info!(table = %ident, changed, "Updated rows");
        Ok(changed)
    }

    /// `DELETE FROM ... WHERE`. Returns the number of rows removed.
    pub fn delete(&mut self, ident: &TableIdent, predicate: &Predicate) -> Result<usize> {
        let table = self.table_mut(ident)?;
        let schema = table.schema().clone();
        check_columns(ident, &schema, predicate)?;

        let before = table.rows.len();
        table.rows.retain(|row| !matches(&schema, row, predicate));
        let deleted = before - table.rows.len();
        if deleted > 0 {
            table.commit(Operation::Delete, 0, deleted);
        }
        info!(table = %ident, deleted, "Deleted rows");
        Ok(deleted)
    }

    /// Dynamic partition overwrite from a batch of rows.
    ///
    /// Partitions present in the batch are replaced; others are kept. An
    /// unpartitioned table is replaced wholesale.
    pub fn overwrite_partitions(
        &mut self,
        ident: &TableIdent,
        rows: Vec<Vec<Value>>,
    ) -> Result<SnapshotSummary> {
        let table = self.table_mut(ident)?;
        let rows = build_rows(ident, table.schema(), rows)?;

        let partition_id = table
            .metadata
            .partition_column
            .as_deref()
            .and_then(|c| table.schema().field_by_name(c))
            .map(|f| f.id);

        let before = table.rows.len();
        match partition_id {
            Some(id) => {
                let replaced: Vec<Value> = rows
                    .iter()
                    .map(|r| r.get(&id).cloned().unwrap_or(Value::Null))
                    .collect();
                table.rows.retain(|row| {
                    let current = row.get(&id).unwrap_or(&NULL);
                    !replaced.iter().any(|p| p == current)
                });
            }
            None => table.rows.clear(),
        }
        let deleted = before - table.rows.len();
        let added = rows.len();
        table.rows.extend(rows);
        let summary = table.commit(Operation::Overwrite, added, deleted);
        info!(table = %ident, added, deleted, "Overwrote partitions");
        Ok(summary)
    }

    /// `ALTER TABLE ... ADD COLUMN`. New columns are optional; existing
    /// rows read them as NULL.
    pub fn add_column(
        &mut self,
        ident: &TableIdent,
        name: &str,
        field_type: Type,
    ) -> Result<&Schema> {
        let table = self.table_mut(ident)?;
        if table.schema().field_by_name(name).is_some() {
            return Err(EtlError::ColumnExists {
                table: ident.to_string(),
                column: name.to_string(),
            });
        }
        let field_id = table.metadata.last_column_id + 1;
        let schema = table.schema().with_column(field_id, name, field_type);
        info!(table = %ident, column = name, schema_id = schema.schema_id, "Added column");
        table.add_schema(schema);
        Ok(table.schema())
    }

    pub fn schema(&self, ident: &TableIdent) -> Result<&Schema> {
        Ok(self.table(ident)?.schema())
    }

    /// `DESCRIBE TABLE`
    pub fn describe(&self, ident: &TableIdent) -> Result<TableDescription> {
        let table = self.table(ident)?;
        Ok(TableDescription {
            table: ident.to_string(),
            columns: table
                .schema()
                .fields
                .iter()
                .map(|f| ColumnDescription {
                    col_name: f.name.clone(),
                    data_type: f.field_type.sql_name().to_string(),
                    nullable: !f.required,
                })
                .collect(),
            partition_column: table.metadata.partition_column.clone(),
        })
    }

    /// Read the current snapshot under the current schema.
    pub fn read(&self, ident: &TableIdent) -> Result<RecordBatch> {
        let table = self.table(ident)?;
        arrow_convert::rows_to_batch(table.schema(), &table.rows)
    }

    pub fn count(&self, ident: &TableIdent) -> Result<usize> {
        Ok(self.table(ident)?.rows.len())
    }

    pub fn snapshots(&self, ident: &TableIdent) -> Result<&[Snapshot]> {
        Ok(&self.table(ident)?.metadata.snapshots)
    }

    pub fn metadata(&self, ident: &TableIdent) -> Result<&TableMetadata> {
        Ok(&self.table(ident)?.metadata)
    }
}

impl Drop for TableSession {
    fn drop(&mut self) {
        self.close();
    }
}

fn coerce(field: &NestedField, value: Value) -> Result<Value> {
    let found = value.type_name();
    let value = value
        .coerce(field.field_type)
        .ok_or_else(|| EtlError::TypeMismatch {
            column: field.name.clone(),
            expected: field.field_type.sql_name().to_string(),
            found: found.to_string(),
        })?;
    if field.required && value.is_null() {
        return Err(EtlError::NullViolation(field.name.clone()));
    }
    Ok(value)
}

fn build_rows(ident: &TableIdent, schema: &Schema, rows: Vec<Vec<Value>>) -> Result<Vec<Row>> {
    let mut built = Vec::with_capacity(rows.len());
    for values in rows {
        if values.len() != schema.fields.len() {
            return Err(EtlError::ArityMismatch {
                table: ident.to_string(),
                expected: schema.fields.len(),
                found: values.len(),
            });
        }
        let mut row = Row::new();
        for (field, value) in schema.fields.iter().zip(values) {
            row.insert(field.id, coerce(field, value)?);
        }
        built.push(row);
    }
    Ok(built)
}

fn check_columns(ident: &TableIdent, schema: &Schema, predicate: &Predicate) -> Result<()> {
    for column in predicate.columns() {
        if schema.field_by_name(column).is_none() {
            return Err(EtlError::ColumnNotFound {
                table: ident.to_string(),
                column: column.to_string(),
            });
        }
    }
    Ok(())
}

static NULL: Value = Value::Null;

fn matches(schema: &Schema, row: &Row, predicate: &Predicate) -> bool {
    predicate.matches(&|column: &str| {
        schema
            .field_by_name(column)
            .and_then(|f| row.get(&f.id))
            .unwrap_or(&NULL)
    })
}
