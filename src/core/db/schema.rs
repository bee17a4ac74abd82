/// Schema Management Module
///
/// Creates, migrates and drops the tables and indexes described by entity
/// mappings, and introspects existing tables through `PRAGMA table_info`.
/// An existing table is never rebuilt: columns the mapping declares but the
/// table lacks are added with `ALTER TABLE ... ADD COLUMN`.
use crate::core::db::session::Session;
use crate::core::{Affinity, OrmError, Result};
use crate::mapping::{quote_ident, ColumnMapping, IndexDescription, TableMapping};
use tracing::{debug, info};

/// Outcome of `create_table`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateTableResult {
    /// The table did not exist and was created
    Created,
    /// The table existed; missing columns (if any) were added
    Migrated,
}

/// Represents a table column as reported by the engine
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnInfo {
    /// Column name
    pub name: String,
    /// Declared type name (e.g., "integer", "varchar(36)")
    pub type_name: String,
    /// Whether the column rejects NULL values
    pub notnull: bool,
    /// Whether this column is part of the primary key
    pub pk: bool,
    /// Default value expression (if any)
    pub dflt_value: Option<String>,
}

/// Columns of `table_name`; empty when the table does not exist.
pub fn table_info(session: &Session<'_>, table_name: &str) -> Result<Vec<ColumnInfo>> {
    let rows = session.query_rows(&format!("PRAGMA table_info({})", quote_ident(table_name)), &[])?;
    rows.iter()
        .map(|row| {
            Ok(ColumnInfo {
                name: row.get("name")?,
                type_name: row.get("type")?,
                notnull: row.get("notnull")?,
                pk: row.get::<i64>("pk")? > 0,
                dflt_value: row.get("dflt_value")?,
            })
        })
        .collect()
}

/// `CREATE TABLE IF NOT EXISTS` statement for `table`.
pub fn create_table_sql(table: &TableMapping) -> Result<String> {
    if table.columns.is_empty() {
        return Err(OrmError::Mapping(format!(
            "cannot create table for '{}': it has no columns",
            table.type_name
        )));
    }
    let keys: Vec<&ColumnMapping> = table.primary_keys().collect();
    let inline_key = keys.len() == 1;
    let mut definitions: Vec<String> = table
        .columns
        .iter()
        .map(|c| c.definition(inline_key))
        .collect();
    if keys.len() > 1 {
        let names: Vec<String> = keys.iter().map(|c| quote_ident(&c.name)).collect();
        definitions.push(format!("primary key ({})", names.join(", ")));
    }
    Ok(format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        table.quoted_name(),
        definitions.join(", ")
    ))
}

// The engine refuses to add a NOT NULL column without a default.
fn added_column_definition(column: &ColumnMapping) -> String {
    let mut decl = column.definition(false);
    if !column.nullable {
        let default = match column.affinity {
            Affinity::Integer | Affinity::Real => "0",
            Affinity::Text => "''",
            Affinity::Blob => "x''",
            Affinity::Null => "NULL",
        };
        decl.push_str(&format!(" default {}", default));
    }
    decl
}

/// `CREATE INDEX IF NOT EXISTS` statement for a declared index.
pub fn create_index_sql(table_name: &str, index: &IndexDescription) -> String {
    let columns: Vec<String> = index.columns.iter().map(|c| quote_ident(c)).collect();
    format!(
        "CREATE {}INDEX IF NOT EXISTS {} ON {} ({})",
        if index.unique { "UNIQUE " } else { "" },
        quote_ident(&index.name),
        quote_ident(table_name),
        columns.join(", ")
    )
}

/// Creates `table` or adds the columns it is missing, then its declared indexes.
pub fn create_table(session: &Session<'_>, table: &TableMapping) -> Result<CreateTableResult> {
    let existing = table_info(session, &table.table_name)?;
    let result = if existing.is_empty() {
        session.execute(&create_table_sql(table)?, &[])?;
        info!("Created table {}", table.table_name);
        CreateTableResult::Created
    } else {
        for column in &table.columns {
            if existing.iter().any(|c| c.name.eq_ignore_ascii_case(&column.name)) {
                continue;
            }
            let sql = format!(
                "ALTER TABLE {} ADD COLUMN {}",
                table.quoted_name(),
                added_column_definition(column)
            );
            session.execute(&sql, &[])?;
            info!("Added column {} to {}", column.name, table.table_name);
        }
        CreateTableResult::Migrated
    };

    for index in table.indexes() {
        debug!("Ensuring index {} on {}", index.name, table.table_name);
        session.execute(&create_index_sql(&table.table_name, &index), &[])?;
    }
    Ok(result)
}

/// Creates an ad-hoc index. Without a name it is called `<table>_<col>_<col>...`.
pub fn create_index(
    session: &Session<'_>,
    table_name: &str,
    index_name: Option<&str>,
    columns: &[&str],
    unique: bool,
) -> Result<()> {
    if columns.is_empty() {
        return Err(OrmError::Mapping(format!(
            "index on '{}' needs at least one column",
            table_name
        )));
    }
    let name = match index_name {
        Some(name) => name.to_string(),
        None => format!("{}_{}", table_name, columns.join("_")),
    };
    let index = IndexDescription {
        name,
        unique,
        columns: columns.iter().map(|c| c.to_string()).collect(),
    };
    session.execute(&create_index_sql(table_name, &index), &[])?;
    Ok(())
}

pub fn drop_table(session: &Session<'_>, table: &TableMapping) -> Result<()> {
    session.execute(&format!("DROP TABLE IF EXISTS {}", table.quoted_name()), &[])?;
    info!("Dropped table {}", table.table_name);
    Ok(())
}
