//! Iceberg schema and rows to Arrow

use crate::error::Result;
use crate::schema::{Schema, Type};
use crate::table::Row;
use crate::value::Value;
use arrow::array::{
    ArrayRef, BooleanArray, Date32Array, Float64Array, Int32Array, Int64Array, StringArray,
};
use arrow::datatypes::{DataType, Field, Schema as ArrowSchema};
use arrow::record_batch::RecordBatch;
use std::collections::HashMap;
use std::sync::Arc;

/// Field metadata key carrying the Iceberg field id.
pub const FIELD_ID_KEY: &str = "PARQUET:field_id";

static NULL: Value = Value::Null;

fn data_type(field_type: Type) -> DataType {
    match field_type {
        Type::Boolean => DataType::Boolean,
        Type::Int => DataType::Int32,
        Type::Long => DataType::Int64,
        Type::Double => DataType::Float64,
        Type::Date => DataType::Date32,
        Type::String => DataType::Utf8,
    }
}

/// Convert an Iceberg schema to Arrow, keeping field ids in field metadata.
pub fn to_arrow_schema(schema: &Schema) -> ArrowSchema {
    let fields: Vec<Field> = schema
        .fields
        .iter()
        .map(|f| {
            Field::new(&f.name, data_type(f.field_type), !f.required).with_metadata(
                HashMap::from([(FIELD_ID_KEY.to_string(), f.id.to_string())]),
            )
        })
        .collect();
    ArrowSchema::new(fields)
}

/// Materialise rows under `schema`. Fields a row predates read as NULL.
pub(crate) fn rows_to_batch(schema: &Schema, rows: &[Row]) -> Result<RecordBatch> {
    let columns: Vec<ArrayRef> = schema
        .fields
        .iter()
        .map(|field| {
            let cells = rows.iter().map(move |row| row.get(&field.id).unwrap_or(&NULL));
            column(field.field_type, cells)
        })
        .collect();

    Ok(RecordBatch::try_new(
        Arc::new(to_arrow_schema(schema)),
        columns,
    )?)
}

fn column<'a>(field_type: Type, cells: impl Iterator<Item = &'a Value>) -> ArrayRef {
    match field_type {
        Type::Boolean => Arc::new(
            cells
                .map(|v| match v {
                    Value::Boolean(b) => Some(*b),
                    _ => None,
                })
                .collect::<BooleanArray>(),
        ),
        Type::Int => Arc::new(
            cells
                .map(|v| match v {
                    Value::Int(i) => Some(*i),
                    _ => None,
                })
                .collect::<Int32Array>(),
        ),
        Type::Long => Arc::new(
            cells
                .map(|v| match v {
                    Value::Long(l) => Some(*l),
                    _ => None,
                })
                .collect::<Int64Array>(),
        ),
        Type::Double => Arc::new(
            cells
                .map(|v| match v {
                    Value::Double(d) => Some(*d),
                    _ => None,
                })
                .collect::<Float64Array>(),
        ),
        Type::Date => Arc::new(
            cells
                .map(|v| match v {
                    Value::Date(d) => Some(*d),
                    _ => None,
                })
                .collect::<Date32Array>(),
        ),
        Type::String => Arc::new(
            cells
                .map(|v| match v {
                    Value::String(s) => Some(s.as_str()),
                    _ => None,
                })
                .collect::<StringArray>(),
        ),
    }
}
