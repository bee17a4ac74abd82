//! Metadata Mapper
//!
//! Entities declare their columns and associations once through `Describe`;
//! the resulting `Mapping` is cached process-wide by type and never changes
//! afterwards, so it is read concurrently without synchronization.
//!
//! ```
//! use liteorm::mapping::{Describe, Entity};
//!
//! #[derive(Debug, Default, Clone)]
//! struct Category {
//!     category_id: i64,
//!     name: String,
//! }
//!
//! impl Entity for Category {
//!     fn describe(d: &mut Describe<Self>) {
//!         d.column("CategoryID", |c| &c.category_id, |c| &mut c.category_id)
//!             .auto_increment();
//!         d.column("Name", |c| &c.name, |c| &mut c.name).max_length(80);
//!     }
//! }
//!
//! let mapping = liteorm::mapping::mapping::<Category>().unwrap();
//! assert_eq!(mapping.table.table_name, "Categories");
//! assert!(mapping.table.column("CategoryID").unwrap().primary_key);
//! ```

pub mod association;
pub mod naming;

pub use association::{AssociationDecl, AssociationDirection, ResolvedAssociation};

use crate::core::{Affinity, OrmError, Result, Scalar, Value};
use once_cell::sync::Lazy;
use std::any::{Any, TypeId};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, RwLock};
use tracing::debug;

/// An application record type stored in one table.
pub trait Entity: Default + Send + 'static {
    /// Declares the entity's table, columns and associations.
    fn describe(d: &mut Describe<Self>);
}

/// Membership of a column in a named index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexedAttr {
    /// Index name; `None` for an anonymous single-column index
    pub name: Option<String>,
    /// Position of the column inside a composite index
    pub order: u32,
    pub unique: bool,
}

/// Facts about one mapped column.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnMapping {
    /// Member name expressions refer to
    pub member: String,
    /// Column name in the table
    pub name: String,
    pub affinity: Affinity,
    pub decl_type: &'static str,
    pub nullable: bool,
    pub primary_key: bool,
    pub auto_increment: bool,
    pub max_length: Option<u32>,
    pub collation: Option<String>,
    pub indices: Vec<IndexedAttr>,
}

impl ColumnMapping {
    /// Column definition as emitted in `CREATE TABLE` / `ALTER TABLE ADD COLUMN`.
    pub fn definition(&self, inline_primary_key: bool) -> String {
        let mut decl = format!("{} {}", quote_ident(&self.name), self.sql_type());
        if inline_primary_key && self.primary_key {
            decl.push_str(" primary key");
            if self.auto_increment {
                decl.push_str(" autoincrement");
            }
        }
        if !self.nullable {
            decl.push_str(" not null");
        }
        if let Some(collation) = &self.collation {
            decl.push_str(&format!(" collate {}", collation));
        }
        decl
    }

    fn sql_type(&self) -> String {
        match (self.affinity, self.max_length) {
            (Affinity::Text, Some(len)) if self.decl_type == "varchar" => format!("varchar({})", len),
            _ => self.decl_type.to_string(),
        }
    }
}

/// A declared index, grouped from the columns' `IndexedAttr`s.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDescription {
    pub name: String,
    pub unique: bool,
    /// Column names in index order
    pub columns: Vec<String>,
}

/// Immutable schema facts for one entity type.
#[derive(Debug, Clone)]
pub struct TableMapping {
    /// Bare Rust type name
    pub type_name: String,
    pub table_name: String,
    pub columns: Vec<ColumnMapping>,
    pub associations: Vec<AssociationDecl>,
}

impl TableMapping {
    /// Looks a column up by member name, then by column name.
    pub fn column(&self, member: &str) -> Option<&ColumnMapping> {
        self.columns
            .iter()
            .find(|c| c.member == member)
            .or_else(|| self.columns.iter().find(|c| c.name == member))
    }

    /// Looks a column up by its column name, ignoring case (engine column labels).
    pub fn column_by_name(&self, name: &str) -> Option<&ColumnMapping> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Like `column` but a missing member is a mapping error.
    pub fn require_column(&self, member: &str) -> Result<&ColumnMapping> {
        self.column(member).ok_or_else(|| {
            OrmError::Mapping(format!(
                "no column '{}' on table '{}'",
                member, self.table_name
            ))
        })
    }

    pub fn primary_keys(&self) -> impl Iterator<Item = &ColumnMapping> {
        self.columns.iter().filter(|c| c.primary_key)
    }

    pub fn auto_increment_key(&self) -> Option<&ColumnMapping> {
        self.columns.iter().find(|c| c.primary_key && c.auto_increment)
    }

    pub fn quoted_name(&self) -> String {
        quote_ident(&self.table_name)
    }

    /// Declared indexes, composite ones grouped by name and ordered by position.
    pub fn indexes(&self) -> Vec<IndexDescription> {
        let mut grouped: BTreeMap<String, (bool, Vec<(u32, String)>)> = BTreeMap::new();
        for column in &self.columns {
            for attr in &column.indices {
                let name = attr
                    .name
                    .clone()
                    .unwrap_or_else(|| format!("{}_{}", self.table_name, column.name));
                let entry = grouped.entry(name).or_insert((false, Vec::new()));
                entry.0 |= attr.unique;
                entry.1.push((attr.order, column.name.clone()));
            }
        }
        grouped
            .into_iter()
            .map(|(name, (unique, mut columns))| {
                columns.sort_by_key(|(order, _)| *order);
                IndexDescription {
                    name,
                    unique,
                    columns: columns.into_iter().map(|(_, c)| c).collect(),
                }
            })
            .collect()
    }

    /// Resolves the association declared on `member`.
    pub fn association(&self, member: &str) -> Result<ResolvedAssociation> {
        let decl = self
            .associations
            .iter()
            .find(|a| a.member == member)
            .ok_or_else(|| {
                OrmError::Mapping(format!(
                    "no association '{}' on '{}'",
                    member, self.type_name
                ))
            })?;
        decl.resolve(self)
    }
}

/// Quotes an identifier for the engine.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

type Getter<E> = Box<dyn Fn(&E) -> Value + Send + Sync>;
type Setter<E> = Box<dyn Fn(&mut E, Value) -> Result<()> + Send + Sync>;

/// Typed accessors of one column, parallel to `TableMapping::columns`.
pub struct Accessor<E> {
    get: Getter<E>,
    set: Setter<E>,
}

impl<E> Accessor<E> {
    pub fn get(&self, entity: &E) -> Value {
        (self.get)(entity)
    }

    pub fn set(&self, entity: &mut E, value: Value) -> Result<()> {
        (self.set)(entity, value)
    }
}

/// Entity description plus the typed accessors the materializer uses.
pub struct Mapping<E> {
    pub table: Arc<TableMapping>,
    accessors: Vec<Accessor<E>>,
}

impl<E> std::fmt::Debug for Mapping<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mapping").field("table", &self.table).finish()
    }
}

impl<E> Mapping<E> {
    /// Accessor of the column at `index` in `table.columns`.
    pub fn accessor(&self, index: usize) -> &Accessor<E> {
        &self.accessors[index]
    }

    /// Column values of `entity` in column order.
    pub fn values(&self, entity: &E) -> Vec<Value> {
        self.accessors.iter().map(|a| a.get(entity)).collect()
    }
}

/// Builder an entity declares itself through.
pub struct Describe<E> {
    type_name: String,
    table_name: Option<String>,
    columns: Vec<ColumnMapping>,
    accessors: Vec<Accessor<E>>,
    associations: Vec<AssociationDecl>,
}

impl<E: Entity> Describe<E> {
    fn new() -> Self {
        Describe {
            type_name: naming::bare_type_name(std::any::type_name::<E>()).to_string(),
            table_name: None,
            columns: Vec::new(),
            accessors: Vec::new(),
            associations: Vec::new(),
        }
    }

    /// Overrides the table identifier.
    pub fn table(&mut self, name: &str) -> &mut Self {
        self.table_name = Some(name.to_string());
        self
    }

    /// Overrides the type name used for table and identity inference.
    pub fn type_name(&mut self, name: &str) -> &mut Self {
        self.type_name = name.to_string();
        self
    }

    /// Declares a scalar member as a column.
    pub fn column<T: Scalar>(
        &mut self,
        member: &str,
        get: fn(&E) -> &T,
        get_mut: fn(&mut E) -> &mut T,
    ) -> ColumnBuilder<'_> {
        self.columns.push(ColumnMapping {
            member: member.to_string(),
            name: member.to_string(),
            affinity: T::AFFINITY,
            decl_type: T::DECL_TYPE,
            nullable: T::NULLABLE,
            primary_key: false,
            auto_increment: false,
            max_length: None,
            collation: None,
            indices: Vec::new(),
        });
        self.accessors.push(Accessor {
            get: Box::new(move |e| get(e).to_value()),
            set: Box::new(move |e, v| {
                *get_mut(e) = T::from_value(v)?;
                Ok(())
            }),
        });
        let index = self.columns.len() - 1;
        ColumnBuilder {
            column: &mut self.columns[index],
        }
    }

    /// Declares a member holding one related row by key.
    pub fn has_one<R: Entity>(&mut self, member: &str) -> &mut Self {
        self.associations
            .push(AssociationDecl::new::<R>(member, false));
        self
    }

    /// Declares a collection-shaped member holding related rows.
    pub fn has_many<R: Entity>(&mut self, member: &str) -> &mut Self {
        self.associations.push(AssociationDecl::new::<R>(member, true));
        self
    }

    fn build(mut self) -> Result<Mapping<E>> {
        let mut seen = HashSet::new();
        for column in &self.columns {
            if !seen.insert(column.name.to_lowercase()) {
                return Err(OrmError::Mapping(format!(
                    "duplicate column '{}' on '{}'",
                    column.name, self.type_name
                )));
            }
            if column.auto_increment && column.affinity != Affinity::Integer {
                return Err(OrmError::Mapping(format!(
                    "auto-increment column '{}' on '{}' must be an integer",
                    column.name, self.type_name
                )));
            }
        }

        if !self.columns.iter().any(|c| c.primary_key) {
            let type_name = self.type_name.clone();
            for column in &mut self.columns {
                if naming::is_identity_member(&type_name, &column.member) {
                    column.primary_key = true;
                }
            }
        }

        for column in &mut self.columns {
            if column.primary_key {
                column.nullable = false;
            }
        }

        let table_name = self
            .table_name
            .take()
            .unwrap_or_else(|| naming::table_name_for(&self.type_name));

        Ok(Mapping {
            table: Arc::new(TableMapping {
                type_name: self.type_name,
                table_name,
                columns: self.columns,
                associations: self.associations,
            }),
            accessors: self.accessors,
        })
    }
}

/// Options of the column just declared.
pub struct ColumnBuilder<'a> {
    column: &'a mut ColumnMapping,
}

impl ColumnBuilder<'_> {
    /// Overrides the column name; expressions keep using the member name.
    pub fn named(self, name: &str) -> Self {
        self.column.name = name.to_string();
        self
    }

    pub fn primary_key(self) -> Self {
        self.column.primary_key = true;
        self
    }

    /// Engine-generated key. Implies `primary_key`.
    pub fn auto_increment(self) -> Self {
        self.column.primary_key = true;
        self.column.auto_increment = true;
        self
    }

    pub fn not_null(self) -> Self {
        self.column.nullable = false;
        self
    }

    pub fn max_length(self, len: u32) -> Self {
        self.column.max_length = Some(len);
        self
    }

    pub fn collate(self, collation: &str) -> Self {
        self.column.collation = Some(collation.to_string());
        self
    }

    /// Anonymous single-column index.
    pub fn indexed(self) -> Self {
        self.column.indices.push(IndexedAttr {
            name: None,
            order: 0,
            unique: false,
        });
        self
    }

    /// Anonymous single-column unique index.
    pub fn unique(self) -> Self {
        self.column.indices.push(IndexedAttr {
            name: None,
            order: 0,
            unique: true,
        });
        self
    }

    /// Membership in a named, possibly composite, index.
    pub fn indexed_as(self, name: &str, order: u32, unique: bool) -> Self {
        self.column.indices.push(IndexedAttr {
            name: Some(name.to_string()),
            order,
            unique,
        });
        self
    }
}

type CacheEntry = Arc<dyn Any + Send + Sync>;

static MAPPINGS: Lazy<RwLock<HashMap<TypeId, CacheEntry>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

/// Returns the cached mapping for `E`, building it on first use.
pub fn mapping<E: Entity>() -> Result<Arc<Mapping<E>>> {
    let key = TypeId::of::<E>();
    let cached = MAPPINGS
        .read()
        .unwrap_or_else(|p| p.into_inner())
        .get(&key)
        .cloned();
    if let Some(entry) = cached {
        return downcast::<E>(entry);
    }

    let mut describe = Describe::<E>::new();
    E::describe(&mut describe);
    let built: CacheEntry = Arc::new(describe.build()?);
    debug!("Built entity mapping for {}", std::any::type_name::<E>());

    // A racing builder may have won; keep whichever landed first.
    let entry = MAPPINGS
        .write()
        .unwrap_or_else(|p| p.into_inner())
        .entry(key)
        .or_insert(built)
        .clone();
    downcast::<E>(entry)
}

/// The schema half of `mapping::<E>()`.
pub fn table_mapping<E: Entity>() -> Result<Arc<TableMapping>> {
    mapping::<E>().map(|m| Arc::clone(&m.table))
}

fn downcast<E: Entity>(entry: CacheEntry) -> Result<Arc<Mapping<E>>> {
    entry.downcast::<Mapping<E>>().map_err(|_| {
        OrmError::Mapping(format!(
            "cached mapping for {} has the wrong type",
            std::any::type_name::<E>()
        ))
    })
}
