/// Entity Materializer
///
/// Read path: a `RowPlan` matches a statement's column labels against an
/// entity's mapped columns once, then converts every row through the typed
/// accessors. Columns the entity does not map are ignored and members the
/// statement does not return keep their default value.
///
/// Write path: ordered bindings for insert, update and delete in the
/// mapping's column order. An auto-increment key is left out of a plain
/// insert; the engine's row identifier is assigned back afterwards.
use crate::core::{OrmError, Result, Scalar, Value};
use crate::mapping::{quote_ident, Entity, Mapping, TableMapping};
use crate::query::{col, CompiledCommand, Expr};
use std::sync::Arc;

/// Column-position plan from a statement's columns to an entity's members.
#[derive(Debug, Clone)]
pub struct RowPlan {
    /// Mapping column index per statement column
    targets: Vec<Option<usize>>,
}

impl RowPlan {
    /// Matches statement column labels to mapped column names, ignoring case.
    pub fn new(table: &TableMapping, columns: &[String]) -> Self {
        let targets = columns
            .iter()
            .map(|label| {
                table
                    .columns
                    .iter()
                    .position(|c| c.name.eq_ignore_ascii_case(label))
            })
            .collect();
        RowPlan { targets }
    }

    /// Plan for values laid out exactly in the mapping's column order.
    pub fn positional(table: &TableMapping) -> Self {
        RowPlan {
            targets: (0..table.columns.len()).map(Some).collect(),
        }
    }

    /// Number of statement columns this plan consumes.
    pub fn width(&self) -> usize {
        self.targets.len()
    }

    /// Builds one entity from a row's values.
    pub fn materialize<E: Entity>(&self, mapping: &Mapping<E>, values: Vec<Value>) -> Result<E> {
        let mut entity = E::default();
        for (target, value) in self.targets.iter().zip(values) {
            if let Some(index) = target {
                mapping.accessor(*index).set(&mut entity, value).map_err(|e| match e {
                    OrmError::Mapping(msg) => OrmError::Mapping(format!(
                        "{}.{}: {}",
                        mapping.table.type_name, mapping.table.columns[*index].member, msg
                    )),
                    other => other,
                })?;
            }
        }
        Ok(entity)
    }
}

/// A labelled result row from a projection or a raw query.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<[String]>,
    values: Vec<Value>,
}

impl Row {
    pub fn new(columns: Arc<[String]>, values: Vec<Value>) -> Self {
        Row { columns, values }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Raw value of the column labelled `label`, ignoring case.
    pub fn value(&self, label: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(label))
            .and_then(|i| self.values.get(i))
    }

    /// Typed value of the column labelled `label`.
    pub fn get<T: Scalar>(&self, label: &str) -> Result<T> {
        let value = self
            .value(label)
            .ok_or_else(|| OrmError::Mapping(format!("no column '{}' in row", label)))?;
        T::from_value(value.clone())
    }

    /// Typed value of the column at `index`.
    pub fn get_index<T: Scalar>(&self, index: usize) -> Result<T> {
        let value = self
            .values
            .get(index)
            .ok_or_else(|| OrmError::Mapping(format!("no column at index {} in row", index)))?;
        T::from_value(value.clone())
    }
}

/// How an insert treats an existing row with the same key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertMode {
    /// Fails on conflict; an auto-increment key is generated by the engine
    Plain,
    /// Replaces the conflicting row; every column is bound, keys included
    OrReplace,
}

/// `INSERT` of `entity` with parameters in column order.
pub fn insert_command<E>(mapping: &Mapping<E>, entity: &E, mode: InsertMode) -> CompiledCommand {
    let table = &mapping.table;
    let verb = match mode {
        InsertMode::Plain => "INSERT",
        InsertMode::OrReplace => "INSERT OR REPLACE",
    };

    let mut names = Vec::new();
    let mut params = Vec::new();
    for (i, column) in table.columns.iter().enumerate() {
        if mode == InsertMode::Plain && column.auto_increment {
            continue;
        }
        names.push(quote_ident(&column.name));
        params.push(mapping.accessor(i).get(entity));
    }

    let sql = if names.is_empty() {
        format!("{} INTO {} DEFAULT VALUES", verb, table.quoted_name())
    } else {
        let placeholders = vec!["?"; names.len()].join(", ");
        format!(
            "{} INTO {} ({}) VALUES ({})",
            verb,
            table.quoted_name(),
            names.join(", "),
            placeholders
        )
    };
    CompiledCommand::new(sql, params)
}

fn require_primary_key(table: &TableMapping, op: &str) -> Result<()> {
    if table.primary_keys().next().is_none() {
        return Err(OrmError::Mapping(format!(
            "cannot {} '{}': it has no primary key",
            op, table.type_name
        )));
    }
    Ok(())
}

fn key_clause<E>(mapping: &Mapping<E>, entity: &E, params: &mut Vec<Value>) -> String {
    let mut clauses = Vec::new();
    for (i, column) in mapping.table.columns.iter().enumerate() {
        if column.primary_key {
            clauses.push(format!("{} = ?", quote_ident(&column.name)));
            params.push(mapping.accessor(i).get(entity));
        }
    }
    clauses.join(" AND ")
}

/// `UPDATE` of every non-key column, matched by primary key.
///
/// Returns `None` when the entity has no columns besides its key.
pub fn update_command<E>(mapping: &Mapping<E>, entity: &E) -> Result<Option<CompiledCommand>> {
    let table = &mapping.table;
    require_primary_key(table, "update")?;

    let mut assignments = Vec::new();
    let mut params = Vec::new();
    for (i, column) in table.columns.iter().enumerate() {
        if !column.primary_key {
            assignments.push(format!("{} = ?", quote_ident(&column.name)));
            params.push(mapping.accessor(i).get(entity));
        }
    }
    if assignments.is_empty() {
        return Ok(None);
    }

    let key = key_clause(mapping, entity, &mut params);
    let sql = format!(
        "UPDATE {} SET {} WHERE {}",
        table.quoted_name(),
        assignments.join(", "),
        key
    );
    Ok(Some(CompiledCommand::new(sql, params)))
}

/// `DELETE` of the row sharing `entity`'s primary key.
pub fn delete_command<E>(mapping: &Mapping<E>, entity: &E) -> Result<CompiledCommand> {
    let table = &mapping.table;
    require_primary_key(table, "delete")?;
    let mut params = Vec::new();
    let key = key_clause(mapping, entity, &mut params);
    Ok(CompiledCommand::new(
        format!("DELETE FROM {} WHERE {}", table.quoted_name(), key),
        params,
    ))
}

/// Predicate matching a primary key, one value per key column in column order.
pub fn key_predicate(table: &TableMapping, key: &[Value]) -> Result<Expr> {
    let columns: Vec<_> = table.primary_keys().collect();
    if columns.is_empty() {
        return Err(OrmError::Mapping(format!(
            "'{}' has no primary key",
            table.type_name
        )));
    }
    if columns.len() != key.len() {
        return Err(OrmError::Mapping(format!(
            "'{}' has {} key columns but {} key values were given",
            table.type_name,
            columns.len(),
            key.len()
        )));
    }
    columns
        .iter()
        .zip(key)
        .map(|(column, value)| col(&column.member).eq(Expr::Param(value.clone())))
        .reduce(|acc, next| acc.and(next))
        .ok_or_else(|| OrmError::Mapping("empty primary key".to_string()))
}

/// Writes the engine-generated row identifier onto the auto-increment member.
///
/// Returns `false` when the entity has no auto-increment key.
pub fn assign_generated_key<E>(mapping: &Mapping<E>, entity: &mut E, rowid: i64) -> Result<bool> {
    match mapping
        .table
        .columns
        .iter()
        .position(|c| c.primary_key && c.auto_increment)
    {
        Some(index) => {
            mapping
                .accessor(index)
                .set(entity, Value::Integer(rowid))?;
            Ok(true)
        }
        None => Ok(false),
    }
}
