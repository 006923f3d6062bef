//! Iceberg schema types
//!
//! Primitive subset of the Iceberg v2 schema model: fields carry stable ids,
//! and every evolution produces a new schema with the next schema id.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Iceberg schema definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Schema {
    /// Unique schema identifier
    pub schema_id: i32,
    /// Top-level fields in the schema
    pub fields: Vec<NestedField>,
}

impl Schema {
    /// Build the initial schema, assigning field ids from 1.
    pub fn new(columns: impl IntoIterator<Item = Column>) -> Self {
        let fields = columns
            .into_iter()
            .enumerate()
            .map(|(i, c)| NestedField {
                id: i as i32 + 1,
                name: c.name,
                required: c.required,
                field_type: c.field_type,
                doc: None,
            })
            .collect();
        Self {
            schema_id: 0,
            fields,
        }
    }

    /// Find a field by name
    pub fn field_by_name(&self, name: &str) -> Option<&NestedField> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Find a field by ID
    pub fn field_by_id(&self, id: i32) -> Option<&NestedField> {
        self.fields.iter().find(|f| f.id == id)
    }

    pub fn highest_field_id(&self) -> i32 {
        self.fields.iter().map(|f| f.id).max().unwrap_or(0)
    }

    /// Next schema with an extra optional column appended.
    pub(crate) fn with_column(&self, field_id: i32, name: &str, field_type: Type) -> Self {
        let mut fields = self.fields.clone();
        fields.push(NestedField {
            id: field_id,
            name: name.to_string(),
            required: false,
            field_type,
            doc: None,
        });
        Self {
            schema_id: self.schema_id + 1,
            fields,
        }
    }
}

/// Iceberg nested field definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct NestedField {
    /// Unique field identifier
    pub id: i32,
    pub name: String,
    /// Whether field is required (non-nullable)
    pub required: bool,
    #[serde(rename = "type")]
    pub field_type: Type,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc: Option<String>,
}

/// Column declaration for table creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub field_type: Type,
    pub required: bool,
}

impl Column {
    /// Nullable column, the default for `CREATE TABLE` without `NOT NULL`.
    pub fn optional(name: impl Into<String>, field_type: Type) -> Self {
        Self {
            name: name.into(),
            field_type,
            required: false,
        }
    }

    pub fn required(name: impl Into<String>, field_type: Type) -> Self {
        Self {
            name: name.into(),
            field_type,
            required: true,
        }
    }
}

/// Iceberg primitive types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "type")]
pub enum Type {
    Boolean,
    /// 32-bit signed integer
    Int,
    /// 64-bit signed integer
    Long,
    /// 64-bit IEEE 754 floating point
    Double,
    /// Calendar date (days since epoch)
    Date,
    /// UTF-8 encoded string
    String,
}

impl Type {
    /// Spark SQL name, as shown by `DESCRIBE TABLE`.
    pub fn sql_name(&self) -> &'static str {
        match self {
            Type::Boolean => "boolean",
            Type::Int => "int",
            Type::Long => "bigint",
            Type::Double => "double",
            Type::Date => "date",
            Type::String => "string",
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.sql_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primitive_type_serialization() {
        let type_json = r#"{"type":"int"}"#;
        let typ: Type = serde_json::from_str(type_json).unwrap();
        assert_eq!(typ, Type::Int);
        assert_eq!(serde_json::to_string(&typ).unwrap(), type_json);
    }

    #[test]
    fn test_field_ids_are_assigned_in_order() {
        let schema = Schema::new([
            Column::optional("id", Type::Int),
            Column::optional("name", Type::String),
        ]);
        assert_eq!(schema.schema_id, 0);
        assert_eq!(schema.field_by_name("name").unwrap().id, 2);
        assert_eq!(schema.field_by_id(1).unwrap().name, "id");
        assert_eq!(schema.highest_field_id(), 2);
    }

    #[test]
    fn test_schema_serialization() {
        let schema = Schema::new([Column::required("id", Type::Long)]);
        let json = serde_json::to_string(&schema).unwrap();
        assert_eq!(
            json,
            r#"{"schema-id":0,"fields":[{"id":1,"name":"id","required":true,"type":{"type":"long"}}]}"#
        );
        let back: Schema = serde_json::from_str(&json).unwrap();
        assert_eq!(back, schema);
    }

    #[test]
    fn test_with_column_bumps_schema_id() {
        let schema = Schema::new([Column::optional("id", Type::Int)]);
        let evolved = schema.with_column(2, "email", Type::String);
        assert_eq!(evolved.schema_id, 1);
        assert_eq!(evolved.fields.len(), 2);
        assert!(!evolved.field_by_name("email").unwrap().required);
    }
}
