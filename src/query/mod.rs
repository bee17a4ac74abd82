/// Query Expression Trees
///
/// A `Query` is an immutable tree of tagged nodes. Every composition step
/// returns a new `Query` sharing its input through an `Arc`, so derived
/// queries can reuse a common prefix freely across threads. Trees are turned
/// into SQL text plus positional parameters by the `translate` module.
pub mod expr;
pub mod translate;

pub use expr::{
    abs, avg, coalesce, col, col_of, count, count_distinct, length, lower, max, min, outer,
    subquery, sum, trim, upper, val, AggregateFunc, BinaryOp, Expr, ScalarFunc,
};
pub use translate::CompiledCommand;

use crate::core::Result;
use crate::mapping::{table_mapping, Entity, TableMapping};
use std::sync::Arc;

/// How a joined source is combined with the rows so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    /// Keeps unmatched rows of the left side; used by group joins
    Left,
}

/// One node of a query tree.
#[derive(Debug)]
pub enum QueryNode {
    /// Scan of an entity's table
    Table(Arc<TableMapping>),
    Filter {
        input: Arc<QueryNode>,
        predicate: Expr,
    },
    /// Join of another entity's table under `label`. No condition means every pairing,
    /// to be narrowed by a later filter.
    Join {
        input: Arc<QueryNode>,
        kind: JoinKind,
        table: Arc<TableMapping>,
        label: String,
        on: Option<Expr>,
    },
    /// Projection to labelled expressions
    Project {
        input: Arc<QueryNode>,
        columns: Vec<(String, Expr)>,
    },
    GroupBy {
        input: Arc<QueryNode>,
        keys: Vec<Expr>,
    },
    /// Ordering key. `then` appends to the existing ordering instead of replacing it.
    OrderBy {
        input: Arc<QueryNode>,
        key: Expr,
        descending: bool,
        then: bool,
    },
    Skip {
        input: Arc<QueryNode>,
        count: u64,
    },
    Take {
        input: Arc<QueryNode>,
        count: u64,
    },
    Distinct {
        input: Arc<QueryNode>,
    },
    /// Terminal aggregate yielding a single value
    Aggregate {
        input: Arc<QueryNode>,
        func: AggregateFunc,
        arg: Option<Expr>,
        distinct: bool,
    },
}

/// An immutable, composable query.
#[derive(Debug, Clone)]
pub struct Query {
    root: Arc<QueryNode>,
}

impl PartialEq for Query {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.root, &other.root)
    }
}

impl Query {
    /// A scan of `table`.
    pub fn table(table: Arc<TableMapping>) -> Self {
        Query {
            root: Arc::new(QueryNode::Table(table)),
        }
    }

    /// A scan of `E`'s table.
    pub fn from<E: Entity>() -> Result<Self> {
        Ok(Self::table(table_mapping::<E>()?))
    }

    pub fn root(&self) -> &QueryNode {
        &self.root
    }

    /// The table the query was started from.
    pub fn source_table(&self) -> &Arc<TableMapping> {
        let mut node = &*self.root;
        loop {
            node = match node {
                QueryNode::Table(table) => return table,
                QueryNode::Filter { input, .. }
                | QueryNode::Join { input, .. }
                | QueryNode::Project { input, .. }
                | QueryNode::GroupBy { input, .. }
                | QueryNode::OrderBy { input, .. }
                | QueryNode::Skip { input, .. }
                | QueryNode::Take { input, .. }
                | QueryNode::Distinct { input }
                | QueryNode::Aggregate { input, .. } => &**input,
            };
        }
    }

    fn wrap(&self, node: QueryNode) -> Self {
        Query {
            root: Arc::new(node),
        }
    }

    fn input(&self) -> Arc<QueryNode> {
        Arc::clone(&self.root)
    }

    pub fn filter(&self, predicate: Expr) -> Self {
        self.wrap(QueryNode::Filter {
            input: self.input(),
            predicate,
        })
    }

    /// Joins `table` under `label`.
    pub fn join(&self, kind: JoinKind, label: &str, table: Arc<TableMapping>, on: Option<Expr>) -> Self {
        self.wrap(QueryNode::Join {
            input: self.input(),
            kind,
            table,
            label: label.to_string(),
            on,
        })
    }

    /// Inner join on equality of `(outer member, joined member)` key pairs.
    pub fn join_on(&self, label: &str, table: Arc<TableMapping>, keys: &[(&str, &str)]) -> Self {
        let on = keys
            .iter()
            .map(|(outer, inner)| col(outer).eq(col_of(label, inner)))
            .reduce(|acc, next| acc.and(next));
        self.join(JoinKind::Inner, label, table, on)
    }

    /// Inner join through the association declared on the source entity's `member`.
    pub fn join_association(&self, label: &str, member: &str) -> Result<Self> {
        let assoc = self.source_table().association(member)?;
        let keys: Vec<(&str, &str)> = assoc
            .keys
            .iter()
            .map(|(local, related)| (local.as_str(), related.as_str()))
            .collect();
        Ok(self.join_on(label, Arc::clone(&assoc.related), &keys))
    }

    pub fn project(&self, columns: Vec<(String, Expr)>) -> Self {
        self.wrap(QueryNode::Project {
            input: self.input(),
            columns,
        })
    }

    /// Shorthand for `project` with borrowed labels.
    pub fn select(&self, columns: Vec<(&str, Expr)>) -> Self {
        self.project(
            columns
                .into_iter()
                .map(|(label, e)| (label.to_string(), e))
                .collect(),
        )
    }

    pub fn group_by(&self, keys: Vec<Expr>) -> Self {
        self.wrap(QueryNode::GroupBy {
            input: self.input(),
            keys,
        })
    }

    fn order(&self, key: Expr, descending: bool, then: bool) -> Self {
        self.wrap(QueryNode::OrderBy {
            input: self.input(),
            key,
            descending,
            then,
        })
    }

    pub fn order_by(&self, key: Expr) -> Self {
        self.order(key, false, false)
    }

    pub fn order_by_desc(&self, key: Expr) -> Self {
        self.order(key, true, false)
    }

    pub fn then_by(&self, key: Expr) -> Self {
        self.order(key, false, true)
    }

    pub fn then_by_desc(&self, key: Expr) -> Self {
        self.order(key, true, true)
    }

    pub fn skip(&self, count: u64) -> Self {
        self.wrap(QueryNode::Skip {
            input: self.input(),
            count,
        })
    }

    pub fn take(&self, count: u64) -> Self {
        self.wrap(QueryNode::Take {
            input: self.input(),
            count,
        })
    }

    pub fn distinct(&self) -> Self {
        self.wrap(QueryNode::Distinct { input: self.input() })
    }

    pub fn aggregate(&self, func: AggregateFunc, arg: Option<Expr>, distinct: bool) -> Self {
        self.wrap(QueryNode::Aggregate {
            input: self.input(),
            func,
            arg,
            distinct,
        })
    }

    /// Number of rows the query yields.
    pub fn count(&self) -> Self {
        self.aggregate(AggregateFunc::Count, None, false)
    }

    pub fn sum(&self, arg: Expr) -> Self {
        self.aggregate(AggregateFunc::Sum, Some(arg), false)
    }

    pub fn min(&self, arg: Expr) -> Self {
        self.aggregate(AggregateFunc::Min, Some(arg), false)
    }

    pub fn max(&self, arg: Expr) -> Self {
        self.aggregate(AggregateFunc::Max, Some(arg), false)
    }

    pub fn avg(&self, arg: Expr) -> Self {
        self.aggregate(AggregateFunc::Avg, Some(arg), false)
    }

    /// Compiles the query into a `SELECT`.
    pub fn compile(&self) -> Result<CompiledCommand> {
        translate::compile_select(&self.root)
    }

    /// Compiles a fluent `UPDATE` of the rows this query selects.
    pub fn compile_update(&self, assignments: &[(&str, Expr)]) -> Result<CompiledCommand> {
        translate::compile_update(&self.root, assignments)
    }

    /// Compiles a fluent `DELETE` of the rows this query selects.
    pub fn compile_delete(&self) -> Result<CompiledCommand> {
        translate::compile_delete(&self.root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::Describe;

    #[derive(Debug, Default)]
    struct Gadget {
        gadget_id: i64,
        name: String,
    }

    impl Entity for Gadget {
        fn describe(d: &mut Describe<Self>) {
            d.column("GadgetID", |g| &g.gadget_id, |g| &mut g.gadget_id);
            d.column("Name", |g| &g.name, |g| &mut g.name);
        }
    }

    #[test]
    fn test_composition_shares_prefix() {
        let base = Query::from::<Gadget>().unwrap().filter(col("Name").like("a%"));
        let first = base.take(1);
        let ordered = base.order_by(col("Name"));

        match (first.root(), ordered.root()) {
            (QueryNode::Take { input: a, .. }, QueryNode::OrderBy { input: b, .. }) => {
                assert!(Arc::ptr_eq(a, b));
            }
            other => panic!("Unexpected tree shapes: {:?}", other),
        }
        assert_ne!(first, ordered);
        assert_eq!(base.clone(), base);
    }

    #[test]
    fn test_source_table_walks_to_scan() {
        let q = Query::from::<Gadget>()
            .unwrap()
            .filter(col("GadgetID").gt(1))
            .skip(2)
            .count();
        assert_eq!(q.source_table().table_name, "Gadgets");
    }
}
