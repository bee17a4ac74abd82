//! Scalar and predicate expressions used inside query trees.

use super::Query;
use crate::core::Value;

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Like,
    And,
    Or,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Concat,
}

impl BinaryOp {
    pub fn sql(self) -> &'static str {
        match self {
            BinaryOp::Eq => "=",
            BinaryOp::Ne => "<>",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::Like => "LIKE",
            BinaryOp::And => "AND",
            BinaryOp::Or => "OR",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::Concat => "||",
        }
    }
}

/// Aggregate functions usable as group selectors or terminal operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFunc {
    Count,
    Sum,
    Min,
    Max,
    Avg,
}

impl AggregateFunc {
    pub fn sql(self) -> &'static str {
        match self {
            AggregateFunc::Count => "COUNT",
            AggregateFunc::Sum => "SUM",
            AggregateFunc::Min => "MIN",
            AggregateFunc::Max => "MAX",
            AggregateFunc::Avg => "AVG",
        }
    }
}

/// Scalar functions with a direct engine counterpart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarFunc {
    Lower,
    Upper,
    Length,
    Trim,
    Abs,
    Coalesce,
}

impl ScalarFunc {
    pub fn sql(self) -> &'static str {
        match self {
            ScalarFunc::Lower => "lower",
            ScalarFunc::Upper => "upper",
            ScalarFunc::Length => "length",
            ScalarFunc::Trim => "trim",
            ScalarFunc::Abs => "abs",
            ScalarFunc::Coalesce => "coalesce",
        }
    }
}

/// An expression over columns, constants and bound parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A member of the primary source (`source: None`) or of a joined source by label
    Column { source: Option<String>, member: String },
    /// A member of the enclosing query's primary source, for correlated subqueries
    Outer { member: String },
    /// Row identifier of a table source
    RowId { source: Option<String> },
    /// A positional parameter
    Param(Value),
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Not(Box<Expr>),
    IsNull { expr: Box<Expr>, negated: bool },
    Between {
        expr: Box<Expr>,
        low: Box<Expr>,
        high: Box<Expr>,
    },
    InList {
        expr: Box<Expr>,
        values: Vec<Value>,
        negated: bool,
    },
    /// `None` argument means `COUNT(*)`
    Aggregate {
        func: AggregateFunc,
        arg: Option<Box<Expr>>,
        distinct: bool,
    },
    Function { func: ScalarFunc, args: Vec<Expr> },
    /// A nested query yielding one value per outer row
    Subquery(Box<Query>),
}

/// A member of the query's primary source.
pub fn col(member: &str) -> Expr {
    Expr::Column {
        source: None,
        member: member.to_string(),
    }
}

/// A member of the joined source labelled `source`.
pub fn col_of(source: &str, member: &str) -> Expr {
    Expr::Column {
        source: Some(source.to_string()),
        member: member.to_string(),
    }
}

/// A member of the enclosing query's row, inside a subquery.
pub fn outer(member: &str) -> Expr {
    Expr::Outer {
        member: member.to_string(),
    }
}

/// A bound parameter.
pub fn val(value: impl Into<Value>) -> Expr {
    Expr::Param(value.into())
}

/// `COUNT(*)`.
pub fn count() -> Expr {
    Expr::Aggregate {
        func: AggregateFunc::Count,
        arg: None,
        distinct: false,
    }
}

/// `COUNT(DISTINCT expr)`.
pub fn count_distinct(expr: Expr) -> Expr {
    Expr::Aggregate {
        func: AggregateFunc::Count,
        arg: Some(Box::new(expr)),
        distinct: true,
    }
}

fn aggregate(func: AggregateFunc, expr: Expr) -> Expr {
    Expr::Aggregate {
        func,
        arg: Some(Box::new(expr)),
        distinct: false,
    }
}

pub fn sum(expr: Expr) -> Expr {
    aggregate(AggregateFunc::Sum, expr)
}

pub fn min(expr: Expr) -> Expr {
    aggregate(AggregateFunc::Min, expr)
}

pub fn max(expr: Expr) -> Expr {
    aggregate(AggregateFunc::Max, expr)
}

pub fn avg(expr: Expr) -> Expr {
    aggregate(AggregateFunc::Avg, expr)
}

pub fn lower(expr: Expr) -> Expr {
    Expr::Function {
        func: ScalarFunc::Lower,
        args: vec![expr],
    }
}

pub fn upper(expr: Expr) -> Expr {
    Expr::Function {
        func: ScalarFunc::Upper,
        args: vec![expr],
    }
}

pub fn length(expr: Expr) -> Expr {
    Expr::Function {
        func: ScalarFunc::Length,
        args: vec![expr],
    }
}

pub fn trim(expr: Expr) -> Expr {
    Expr::Function {
        func: ScalarFunc::Trim,
        args: vec![expr],
    }
}

pub fn abs(expr: Expr) -> Expr {
    Expr::Function {
        func: ScalarFunc::Abs,
        args: vec![expr],
    }
}

pub fn coalesce(exprs: Vec<Expr>) -> Expr {
    Expr::Function {
        func: ScalarFunc::Coalesce,
        args: exprs,
    }
}

/// A scalar subquery: an aggregate or single-column projection per outer row.
pub fn subquery(query: Query) -> Expr {
    Expr::Subquery(Box::new(query))
}

impl Expr {
    fn binary(self, op: BinaryOp, right: impl Into<Expr>) -> Expr {
        Expr::Binary {
            op,
            left: Box::new(self),
            right: Box::new(right.into()),
        }
    }

    pub fn eq(self, right: impl Into<Expr>) -> Expr {
        self.binary(BinaryOp::Eq, right)
    }

    pub fn ne(self, right: impl Into<Expr>) -> Expr {
        self.binary(BinaryOp::Ne, right)
    }

    pub fn lt(self, right: impl Into<Expr>) -> Expr {
        self.binary(BinaryOp::Lt, right)
    }

    pub fn le(self, right: impl Into<Expr>) -> Expr {
        self.binary(BinaryOp::Le, right)
    }

    pub fn gt(self, right: impl Into<Expr>) -> Expr {
        self.binary(BinaryOp::Gt, right)
    }

    pub fn ge(self, right: impl Into<Expr>) -> Expr {
        self.binary(BinaryOp::Ge, right)
    }

    pub fn like(self, pattern: impl Into<Expr>) -> Expr {
        self.binary(BinaryOp::Like, pattern)
    }

    pub fn and(self, right: impl Into<Expr>) -> Expr {
        self.binary(BinaryOp::And, right)
    }

    pub fn or(self, right: impl Into<Expr>) -> Expr {
        self.binary(BinaryOp::Or, right)
    }

    pub fn add(self, right: impl Into<Expr>) -> Expr {
        self.binary(BinaryOp::Add, right)
    }

    pub fn sub(self, right: impl Into<Expr>) -> Expr {
        self.binary(BinaryOp::Sub, right)
    }

    pub fn mul(self, right: impl Into<Expr>) -> Expr {
        self.binary(BinaryOp::Mul, right)
    }

    pub fn div(self, right: impl Into<Expr>) -> Expr {
        self.binary(BinaryOp::Div, right)
    }

    pub fn rem(self, right: impl Into<Expr>) -> Expr {
        self.binary(BinaryOp::Rem, right)
    }

    pub fn concat(self, right: impl Into<Expr>) -> Expr {
        self.binary(BinaryOp::Concat, right)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Expr {
        Expr::Not(Box::new(self))
    }

    pub fn is_null(self) -> Expr {
        Expr::IsNull {
            expr: Box::new(self),
            negated: false,
        }
    }

    pub fn is_not_null(self) -> Expr {
        Expr::IsNull {
            expr: Box::new(self),
            negated: true,
        }
    }

    pub fn between(self, low: impl Into<Expr>, high: impl Into<Expr>) -> Expr {
        Expr::Between {
            expr: Box::new(self),
            low: Box::new(low.into()),
            high: Box::new(high.into()),
        }
    }

    /// Set membership against an in-memory collection.
    pub fn in_list<V, I>(self, values: I) -> Expr
    where
        V: Into<Value>,
        I: IntoIterator<Item = V>,
    {
        Expr::InList {
            expr: Box::new(self),
            values: values.into_iter().map(Into::into).collect(),
            negated: false,
        }
    }

    pub fn not_in_list<V, I>(self, values: I) -> Expr
    where
        V: Into<Value>,
        I: IntoIterator<Item = V>,
    {
        Expr::InList {
            expr: Box::new(self),
            values: values.into_iter().map(Into::into).collect(),
            negated: true,
        }
    }

    /// Whether an aggregate occurs outside any nested subquery.
    pub fn contains_aggregate(&self) -> bool {
        match self {
            Expr::Aggregate { .. } => true,
            Expr::Binary { left, right, .. } => left.contains_aggregate() || right.contains_aggregate(),
            Expr::Not(e) | Expr::IsNull { expr: e, .. } | Expr::InList { expr: e, .. } => {
                e.contains_aggregate()
            }
            Expr::Between { expr, low, high } => {
                expr.contains_aggregate() || low.contains_aggregate() || high.contains_aggregate()
            }
            Expr::Function { args, .. } => args.iter().any(Expr::contains_aggregate),
            Expr::Column { .. }
            | Expr::Outer { .. }
            | Expr::RowId { .. }
            | Expr::Param(_)
            | Expr::Subquery(_) => false,
        }
    }
}

macro_rules! expr_from_value {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Expr {
                fn from(v: $ty) -> Self {
                    Expr::Param(v.into())
                }
            }
        )*
    };
}

expr_from_value!(
    bool, i8, i16, i32, i64, u8, u16, u32, f32, f64, String, &str, Vec<u8>, Value,
    uuid::Uuid, chrono::DateTime<chrono::Utc>, chrono::NaiveDate
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builders_produce_tree() {
        let e = col("CategoryID").eq(3);
        assert_eq!(
            e,
            Expr::Binary {
                op: BinaryOp::Eq,
                left: Box::new(col("CategoryID")),
                right: Box::new(Expr::Param(Value::Integer(3))),
            }
        );
    }

    #[test]
    fn test_contains_aggregate() {
        assert!(count().gt(1).contains_aggregate());
        assert!(sum(col("Price")).add(1).contains_aggregate());
        assert!(!col("Price").gt(1).contains_aggregate());
        assert!(!col("Price").in_list([1, 2, 3]).contains_aggregate());
    }
}
