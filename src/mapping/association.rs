//! Association declarations and their key inference.

use super::{table_mapping, Entity, TableMapping};
use crate::core::{OrmError, Result};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Which side of a relationship a member sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssociationDirection {
    /// The owning entity holds the related row's key
    Source,
    /// The related entity holds the back-reference
    Target,
}

/// A declared association, resolved lazily so mutually-referencing entities
/// can be described independently.
#[derive(Clone)]
pub struct AssociationDecl {
    pub member: String,
    /// Whether the member is collection-shaped
    pub collection: bool,
    related: fn() -> Result<Arc<TableMapping>>,
}

impl std::fmt::Debug for AssociationDecl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssociationDecl")
            .field("member", &self.member)
            .field("collection", &self.collection)
            .finish()
    }
}

/// An association with its related table, direction and key pairs.
#[derive(Debug, Clone)]
pub struct ResolvedAssociation {
    pub member: String,
    pub related: Arc<TableMapping>,
    pub direction: AssociationDirection,
    /// (local column, related column) pairs
    pub keys: Vec<(String, String)>,
}

impl AssociationDecl {
    pub(crate) fn new<R: Entity>(member: &str, collection: bool) -> Self {
        AssociationDecl {
            member: member.to_string(),
            collection,
            related: table_mapping::<R>,
        }
    }

    /// Resolves keys by intersecting both tables' column names.
    ///
    /// The shared names, in lexical order, pair up as (local, related) keys.
    /// A collection-shaped member is always the target side. Otherwise the
    /// member is the source when the keys are exactly the related primary
    /// key, and the target when they are exactly the owner's primary key.
    pub fn resolve(&self, owner: &TableMapping) -> Result<ResolvedAssociation> {
        let related = (self.related)()?;
        let keys = common_keys(owner, &related);
        if keys.is_empty() {
            return Err(OrmError::Mapping(format!(
                "association '{}' on '{}' shares no columns with '{}'",
                self.member, owner.type_name, related.type_name
            )));
        }

        let key_set: BTreeSet<&str> = keys.iter().map(|(k, _)| k.as_str()).collect();
        let related_pk: BTreeSet<&str> = related.primary_keys().map(|c| c.name.as_str()).collect();
        let owner_pk: BTreeSet<&str> = owner.primary_keys().map(|c| c.name.as_str()).collect();

        let direction = if self.collection {
            AssociationDirection::Target
        } else if key_set == related_pk {
            AssociationDirection::Source
        } else if key_set == owner_pk {
            AssociationDirection::Target
        } else {
            return Err(OrmError::Mapping(format!(
                "ambiguous keys {:?} for association '{}' on '{}'",
                key_set, self.member, owner.type_name
            )));
        };

        Ok(ResolvedAssociation {
            member: self.member.clone(),
            related,
            direction,
            keys,
        })
    }
}

/// Column names present on both tables, lexically ordered, as key pairs.
pub fn common_keys(left: &TableMapping, right: &TableMapping) -> Vec<(String, String)> {
    let right_names: BTreeSet<&str> = right.columns.iter().map(|c| c.name.as_str()).collect();
    let shared: BTreeSet<&str> = left
        .columns
        .iter()
        .map(|c| c.name.as_str())
        .filter(|name| right_names.contains(name))
        .collect();
    shared
        .into_iter()
        .map(|name| (name.to_string(), name.to_string()))
        .collect()
}
