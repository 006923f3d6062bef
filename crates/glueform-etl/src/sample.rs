//! The bundled `iceberg_etl.py` job, expressed against [`TableSession`]

use crate::error::Result;
use crate::schema::{Column, Type};
use crate::session::{TableIdent, TableSession};
use crate::value::{Predicate, Value};
use tracing::info;

pub const SAMPLE_TABLE: &str = "users_native";

/// Run the sample job's statements in order against `ident`.
///
/// Creates `(id int, name string)`, inserts two rows, updates id 1,
/// deletes id 2, overwrites from the script's DataFrame and finally adds
/// an `email` column.
pub fn run_users_etl(session: &mut TableSession, ident: &TableIdent) -> Result<()> {
    session.create_table_if_absent(
        ident,
        vec![
            Column::optional("id", Type::Int),
            Column::optional("name", Type::String),
        ],
        None,
    )?;

    session.insert(
        ident,
        vec![
            vec![Value::from(3), Value::from("Charlie")],
            vec![Value::from(4), Value::from("Diana")],
        ],
    )?;

    session.update(
        ident,
        &Predicate::eq("id", 1),
        vec![("name", Value::from("Alice Updated"))],
    )?;

    session.delete(ident, &Predicate::eq("id", 2))?;

    // df.writeTo(...).overwritePartitions() with rows Alice and Bob
    session.overwrite_partitions(
        ident,
        vec![
            vec![Value::from(1), Value::from("Alice")],
            vec![Value::from(2), Value::from("Bob")],
        ],
    )?;

    session.add_column(ident, "email", Type::String)?;

    info!(
        table = %ident,
        rows = session.count(ident)?,
        snapshots = session.snapshots(ident)?.len(),
        "Sample ETL finished"
    );
    Ok(())
}
