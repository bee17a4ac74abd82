/// Query Translation Module
///
/// A single recursive walk turns a query tree into one `SELECT` (or a fluent
/// `UPDATE`/`DELETE`). Each clause is accumulated as its own fragment with the
/// parameters it introduced, and the fragments are concatenated in the order
/// the clauses appear in the emitted text. Binding is purely positional, so
/// parameter order always follows text order no matter in which order the
/// tree's nodes contributed them.
///
/// When a node cannot be expressed on top of the select built so far (a filter
/// after paging, an ordering over a projection, ...) the current select is
/// wrapped as a derived source `(SELECT ...) AS "tN"` and the node applies to
/// that. All names are resolved through the entity's `TableMapping`.
use super::expr::{AggregateFunc, BinaryOp, Expr};
use super::{JoinKind, QueryNode};
use crate::core::{OrmError, Result, Value};
use crate::mapping::{quote_ident, TableMapping};
use std::fmt;
use std::sync::Arc;
use tracing::trace;

/// SQL text plus its positional parameters, ready for execution.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledCommand {
    pub sql: String,
    pub params: Vec<Value>,
}

impl CompiledCommand {
    pub fn new(sql: impl Into<String>, params: Vec<Value>) -> Self {
        CompiledCommand {
            sql: sql.into(),
            params,
        }
    }
}

impl fmt::Display for CompiledCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.sql)
    }
}

#[derive(Debug, Default, Clone)]
struct Frag {
    sql: String,
    params: Vec<Value>,
}

impl Frag {
    fn text(sql: impl Into<String>) -> Self {
        Frag {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    fn param(value: Value) -> Self {
        Frag {
            sql: "?".to_string(),
            params: vec![value],
        }
    }

    fn push_str(&mut self, sql: &str) {
        self.sql.push_str(sql);
    }

    fn append(&mut self, other: Frag) {
        self.sql.push_str(&other.sql);
        self.params.extend(other.params);
    }

    fn append_list(&mut self, items: Vec<Frag>, separator: &str) {
        for (i, item) in items.into_iter().enumerate() {
            if i > 0 {
                self.push_str(separator);
            }
            self.append(item);
        }
    }
}

enum SourceKind {
    Table(Arc<TableMapping>),
    /// A wrapped select; (member, output column) pairs
    Derived(Vec<(String, String)>),
}

struct Source {
    /// `None` for the primary source
    label: Option<String>,
    alias: String,
    kind: SourceKind,
}

impl Source {
    fn column(&self, member: &str) -> Result<String> {
        let name = match &self.kind {
            SourceKind::Table(table) => table.require_column(member)?.name.clone(),
            SourceKind::Derived(columns) => columns
                .iter()
                .find(|(m, _)| m == member)
                .or_else(|| columns.iter().find(|(_, c)| c.eq_ignore_ascii_case(member)))
                .map(|(_, c)| c.clone())
                .ok_or_else(|| {
                    OrmError::Mapping(format!("no column '{}' on derived source", member))
                })?,
        };
        Ok(format!("{}.{}", quote_ident(&self.alias), quote_ident(&name)))
    }

    fn rowid(&self) -> Result<String> {
        match &self.kind {
            SourceKind::Table(_) => Ok(format!("{}.rowid", quote_ident(&self.alias))),
            SourceKind::Derived(_) => Err(OrmError::Unsupported(
                "row identifier of a derived source".to_string(),
            )),
        }
    }

    fn output_columns(&self) -> Vec<(String, String)> {
        match &self.kind {
            SourceKind::Table(table) => table
                .columns
                .iter()
                .map(|c| (c.member.clone(), c.name.clone()))
                .collect(),
            SourceKind::Derived(columns) => columns.clone(),
        }
    }
}

struct Scope<'s> {
    sources: &'s [Source],
    /// The enclosing select's scope, inside a subquery
    outer: Option<&'s Scope<'s>>,
}

impl Scope<'_> {
    fn source(&self, label: Option<&str>) -> Result<&Source> {
        match label {
            None => self
                .sources
                .first()
                .ok_or_else(|| OrmError::Unsupported("query without a source".to_string())),
            Some(label) => self
                .sources
                .iter()
                .find(|s| s.label.as_deref() == Some(label))
                .ok_or_else(|| OrmError::Mapping(format!("unknown source '{}'", label))),
        }
    }
}

#[derive(Default)]
struct Ctx {
    next_alias: usize,
}

impl Ctx {
    fn alias(&mut self) -> String {
        let alias = format!("t{}", self.next_alias);
        self.next_alias += 1;
        alias
    }
}

struct Select {
    distinct: bool,
    projection: Option<Vec<(String, Frag)>>,
    from: Frag,
    sources: Vec<Source>,
    wheres: Vec<Frag>,
    group_by: Vec<Frag>,
    /// Member name of each grouping key that is a plain column
    group_members: Vec<Option<String>>,
    having: Vec<Frag>,
    order_by: Vec<Frag>,
    limit: Option<u64>,
    offset: Option<u64>,
    grouped: bool,
    aggregate: bool,
    /// Columns rendered after the select list but not exposed when wrapped
    hidden: Vec<(String, Frag)>,
    /// List the derived source's columns instead of `alias.*`
    explicit_columns: bool,
}

impl Select {
    fn over(source: Source, from: Frag) -> Self {
        Select {
            distinct: false,
            projection: None,
            from,
            sources: vec![source],
            wheres: Vec::new(),
            group_by: Vec::new(),
            group_members: Vec::new(),
            having: Vec::new(),
            order_by: Vec::new(),
            limit: None,
            offset: None,
            grouped: false,
            aggregate: false,
            hidden: Vec::new(),
            explicit_columns: false,
        }
    }

    fn scope<'s>(&'s self, outer: Option<&'s Scope<'s>>) -> Scope<'s> {
        Scope {
            sources: &self.sources,
            outer,
        }
    }

    fn paged(&self) -> bool {
        self.limit.is_some() || self.offset.is_some()
    }

    fn group_key_label(i: usize) -> String {
        format!("key{}", i)
    }

    fn output_columns(&self) -> Vec<(String, String)> {
        match &self.projection {
            Some(columns) => columns
                .iter()
                .map(|(label, _)| (label.clone(), label.clone()))
                .collect(),
            None if self.grouped => self
                .group_members
                .iter()
                .enumerate()
                .map(|(i, member)| {
                    let label = Self::group_key_label(i);
                    (member.clone().unwrap_or_else(|| label.clone()), label)
                })
                .collect(),
            None => self.sources[0].output_columns(),
        }
    }

    /// Turns the select built so far into the primary source of a new one.
    fn wrap(self, ctx: &mut Ctx) -> Select {
        let columns = self.output_columns();
        let explicit_columns = !self.hidden.is_empty();
        let alias = ctx.alias();
        let mut from = Frag::text("(");
        from.append(self.render());
        from.push_str(&format!(") AS {}", quote_ident(&alias)));
        let mut wrapped = Select::over(
            Source {
                label: None,
                alias,
                kind: SourceKind::Derived(columns),
            },
            from,
        );
        wrapped.explicit_columns = explicit_columns;
        wrapped
    }

    fn render(self) -> Frag {
        let mut out = Frag::text(if self.distinct {
            "SELECT DISTINCT "
        } else {
            "SELECT "
        });
        match self.projection {
            Some(columns) => {
                for (i, (label, frag)) in columns.into_iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    out.append(frag);
                    out.push_str(&format!(" AS {}", quote_ident(&label)));
                }
            }
            None if self.grouped => {
                for (i, key) in self.group_by.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    out.append(key.clone());
                    out.push_str(&format!(" AS {}", quote_ident(&Self::group_key_label(i))));
                }
            }
            None if self.explicit_columns => {
                let alias = quote_ident(&self.sources[0].alias);
                for (i, (_, column)) in self.sources[0].output_columns().iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    let column = quote_ident(column);
                    out.push_str(&format!("{}.{} AS {}", alias, column, column));
                }
            }
            None => out.push_str(&format!("{}.*", quote_ident(&self.sources[0].alias))),
        }
        for (label, frag) in self.hidden {
            out.push_str(", ");
            out.append(frag);
            out.push_str(&format!(" AS {}", quote_ident(&label)));
        }

        out.push_str(" FROM ");
        out.append(self.from);
        if !self.wheres.is_empty() {
            out.push_str(" WHERE ");
            out.append_list(self.wheres, " AND ");
        }
        if !self.group_by.is_empty() {
            out.push_str(" GROUP BY ");
            out.append_list(self.group_by, ", ");
        }
        if !self.having.is_empty() {
            out.push_str(" HAVING ");
            out.append_list(self.having, " AND ");
        }
        if !self.order_by.is_empty() {
            out.push_str(" ORDER BY ");
            out.append_list(self.order_by, ", ");
        }
        // The engine reads both bounds as signed 64-bit integers.
        let bound = |n: u64| n.min(i64::MAX as u64);
        match (self.limit.map(bound), self.offset.map(bound)) {
            (Some(limit), Some(offset)) => out.push_str(&format!(" LIMIT {} OFFSET {}", limit, offset)),
            (Some(limit), None) => out.push_str(&format!(" LIMIT {}", limit)),
            (None, Some(offset)) => out.push_str(&format!(" LIMIT -1 OFFSET {}", offset)),
            (None, None) => {}
        }
        out
    }
}

fn build(node: &QueryNode, ctx: &mut Ctx, outer: Option<&Scope<'_>>) -> Result<Select> {
    match node {
        QueryNode::Table(table) => {
            let alias = ctx.alias();
            let from = Frag::text(format!("{} AS {}", table.quoted_name(), quote_ident(&alias)));
            Ok(Select::over(
                Source {
                    label: None,
                    alias,
                    kind: SourceKind::Table(Arc::clone(table)),
                },
                from,
            ))
        }

        QueryNode::Filter { input, predicate } => {
            let mut sel = build(input, ctx, outer)?;
            if predicate.contains_aggregate() && (!sel.grouped || sel.projection.is_some()) {
                return Err(OrmError::Unsupported(
                    "aggregate in a filter outside of a grouping".to_string(),
                ));
            }
            if sel.grouped && sel.projection.is_none() {
                if !sel.paged() && !sel.distinct {
                    let frag = render_expr(predicate, &sel.scope(outer), ctx)?;
                    sel.having.push(frag);
                    return Ok(sel);
                }
                if predicate.contains_aggregate() {
                    // Evaluate per group below the paging, test the flag above it.
                    let frag = render_expr(predicate, &sel.scope(outer), ctx)?;
                    let label = format!("having{}", sel.hidden.len());
                    sel.hidden.push((label.clone(), frag));
                    let mut wrapped = sel.wrap(ctx);
                    wrapped.wheres.push(Frag::text(format!(
                        "{}.{}",
                        quote_ident(&wrapped.sources[0].alias),
                        quote_ident(&label)
                    )));
                    return Ok(wrapped);
                }
            }
            if sel.paged() || sel.distinct || sel.aggregate || sel.projection.is_some() || sel.grouped {
                sel = sel.wrap(ctx);
            }
            let frag = render_expr(predicate, &sel.scope(outer), ctx)?;
            sel.wheres.push(frag);
            Ok(sel)
        }

        QueryNode::Join {
            input,
            kind,
            table,
            label,
            on,
        } => {
            let mut sel = build(input, ctx, outer)?;
            if sel.paged() || sel.distinct || sel.aggregate || sel.grouped || sel.projection.is_some() {
                sel = sel.wrap(ctx);
            }
            if sel.sources.iter().any(|s| s.label.as_deref() == Some(label.as_str())) {
                return Err(OrmError::Unsupported(format!(
                    "join label '{}' used twice",
                    label
                )));
            }
            let alias = ctx.alias();
            let keyword = match (kind, on) {
                (JoinKind::Inner, Some(_)) => " INNER JOIN ",
                (JoinKind::Inner, None) => " CROSS JOIN ",
                (JoinKind::Left, _) => " LEFT JOIN ",
            };
            sel.from.push_str(&format!(
                "{}{} AS {}",
                keyword,
                table.quoted_name(),
                quote_ident(&alias)
            ));
            sel.sources.push(Source {
                label: Some(label.clone()),
                alias,
                kind: SourceKind::Table(Arc::clone(table)),
            });
            match on {
                Some(condition) => {
                    let frag = render_expr(condition, &sel.scope(outer), ctx)?;
                    sel.from.push_str(" ON ");
                    sel.from.append(frag);
                }
                None if *kind == JoinKind::Left => sel.from.push_str(" ON 1"),
                None => {}
            }
            Ok(sel)
        }

        QueryNode::Project { input, columns } => {
            let mut sel = build(input, ctx, outer)?;
            let aggregating = columns.iter().any(|(_, e)| e.contains_aggregate());
            // Paging a grouping limits groups, so its aggregates still project in place.
            let paged_rows = sel.paged() && !sel.grouped;
            if sel.projection.is_some() || sel.distinct || sel.aggregate || (aggregating && paged_rows) {
                sel = sel.wrap(ctx);
            }
            let mut frags = Vec::with_capacity(columns.len());
            {
                let scope = sel.scope(outer);
                for (label, e) in columns {
                    frags.push((label.clone(), render_expr(e, &scope, ctx)?));
                }
            }
            sel.projection = Some(frags);
            Ok(sel)
        }

        QueryNode::GroupBy { input, keys } => {
            if keys.is_empty() {
                return Err(OrmError::Unsupported("grouping without keys".to_string()));
            }
            let mut sel = build(input, ctx, outer)?;
            if sel.grouped || sel.projection.is_some() || sel.paged() || sel.distinct || sel.aggregate {
                sel = sel.wrap(ctx);
            }
            let mut frags = Vec::with_capacity(keys.len());
            {
                let scope = sel.scope(outer);
                for key in keys {
                    frags.push(render_expr(key, &scope, ctx)?);
                }
            }
            sel.group_by = frags;
            sel.group_members = keys
                .iter()
                .map(|key| match key {
                    Expr::Column { member, .. } => Some(member.clone()),
                    _ => None,
                })
                .collect();
            sel.grouped = true;
            sel.order_by.clear();
            Ok(sel)
        }

        QueryNode::OrderBy {
            input,
            key,
            descending,
            then,
        } => {
            let mut sel = build(input, ctx, outer)?;
            let needs_wrap = sel.paged() || sel.projection.is_some() || sel.aggregate;
            if *then {
                if sel.order_by.is_empty() {
                    return Err(OrmError::Unsupported(
                        "then_by without a preceding order_by".to_string(),
                    ));
                }
                if needs_wrap {
                    return Err(OrmError::Unsupported(
                        "then_by after paging or projection".to_string(),
                    ));
                }
            } else if needs_wrap {
                sel = sel.wrap(ctx);
            }
            if key.contains_aggregate() && !sel.grouped {
                return Err(OrmError::Unsupported(
                    "aggregate ordering key outside of a grouping".to_string(),
                ));
            }
            let mut frag = render_expr(key, &sel.scope(outer), ctx)?;
            if *descending {
                frag.push_str(" DESC");
            }
            if !*then {
                sel.order_by.clear();
            }
            sel.order_by.push(frag);
            Ok(sel)
        }

        QueryNode::Skip { input, count } => {
            let mut sel = build(input, ctx, outer)?;
            if sel.aggregate {
                sel = sel.wrap(ctx);
            }
            sel.offset = Some(sel.offset.unwrap_or(0).saturating_add(*count));
            if let Some(limit) = sel.limit {
                sel.limit = Some(limit.saturating_sub(*count));
            }
            Ok(sel)
        }

        QueryNode::Take { input, count } => {
            let mut sel = build(input, ctx, outer)?;
            if sel.aggregate {
                sel = sel.wrap(ctx);
            }
            sel.limit = Some(sel.limit.map_or(*count, |limit| limit.min(*count)));
            Ok(sel)
        }

        QueryNode::Distinct { input } => {
            let mut sel = build(input, ctx, outer)?;
            if sel.paged() || sel.aggregate {
                sel = sel.wrap(ctx);
            }
            sel.distinct = true;
            Ok(sel)
        }

        QueryNode::Aggregate {
            input,
            func,
            arg,
            distinct,
        } => {
            let mut sel = build(input, ctx, outer)?;
            if sel.paged() || sel.distinct || sel.grouped || sel.projection.is_some() || sel.aggregate {
                sel = sel.wrap(ctx);
            }
            let call = render_aggregate(*func, arg.as_ref(), *distinct, &sel.scope(outer), ctx)?;
            let value = if *func == AggregateFunc::Sum {
                let mut coalesced = Frag::text("COALESCE(");
                coalesced.append(call);
                coalesced.push_str(", 0)");
                coalesced
            } else {
                call
            };
            sel.projection = Some(vec![("value".to_string(), value)]);
            sel.order_by.clear();
            sel.aggregate = true;
            Ok(sel)
        }
    }
}

fn render_aggregate(
    func: AggregateFunc,
    arg: Option<&Expr>,
    distinct: bool,
    scope: &Scope<'_>,
    ctx: &mut Ctx,
) -> Result<Frag> {
    let mut out = Frag::text(format!("{}(", func.sql()));
    match arg {
        None => out.push_str("*"),
        Some(arg) => {
            if arg.contains_aggregate() {
                return Err(OrmError::Unsupported("nested aggregate".to_string()));
            }
            if distinct {
                out.push_str("DISTINCT ");
            }
            out.append(render_expr(arg, scope, ctx)?);
        }
    }
    out.push_str(")");
    Ok(out)
}

fn render_expr(e: &Expr, scope: &Scope<'_>, ctx: &mut Ctx) -> Result<Frag> {
    match e {
        Expr::Column { source, member } => Ok(Frag::text(
            scope.source(source.as_deref())?.column(member)?,
        )),

        Expr::Outer { member } => {
            let outer = scope.outer.ok_or_else(|| {
                OrmError::Unsupported(format!(
                    "outer member '{}' referenced outside a subquery",
                    member
                ))
            })?;
            Ok(Frag::text(outer.source(None)?.column(member)?))
        }

        Expr::RowId { source } => Ok(Frag::text(scope.source(source.as_deref())?.rowid()?)),

        Expr::Param(value) => Ok(Frag::param(value.clone())),

        Expr::Binary { op, left, right } => {
            if matches!(op, BinaryOp::Eq | BinaryOp::Ne) {
                let tested = match (&**left, &**right) {
                    (_, Expr::Param(Value::Null)) => Some(left),
                    (Expr::Param(Value::Null), _) => Some(right),
                    _ => None,
                };
                if let Some(tested) = tested {
                    let mut out = Frag::text("(");
                    out.append(render_expr(tested, scope, ctx)?);
                    out.push_str(if *op == BinaryOp::Eq {
                        " IS NULL)"
                    } else {
                        " IS NOT NULL)"
                    });
                    return Ok(out);
                }
            }
            let mut out = Frag::text("(");
            out.append(render_expr(left, scope, ctx)?);
            out.push_str(&format!(" {} ", op.sql()));
            out.append(render_expr(right, scope, ctx)?);
            out.push_str(")");
            Ok(out)
        }

        Expr::Not(inner) => {
            let mut out = Frag::text("NOT (");
            out.append(render_expr(inner, scope, ctx)?);
            out.push_str(")");
            Ok(out)
        }

        Expr::IsNull { expr, negated } => {
            let mut out = Frag::text("(");
            out.append(render_expr(expr, scope, ctx)?);
            out.push_str(if *negated { " IS NOT NULL)" } else { " IS NULL)" });
            Ok(out)
        }

        Expr::Between { expr, low, high } => {
            let mut out = Frag::text("(");
            out.append(render_expr(expr, scope, ctx)?);
            out.push_str(" BETWEEN ");
            out.append(render_expr(low, scope, ctx)?);
            out.push_str(" AND ");
            out.append(render_expr(high, scope, ctx)?);
            out.push_str(")");
            Ok(out)
        }

        Expr::InList {
            expr,
            values,
            negated,
        } => {
            let mut out = Frag::text("(");
            out.append(render_expr(expr, scope, ctx)?);
            out.push_str(if *negated { " NOT IN (" } else { " IN (" });
            let items = values.iter().cloned().map(Frag::param).collect();
            out.append_list(items, ", ");
            out.push_str("))");
            Ok(out)
        }

        Expr::Aggregate {
            func,
            arg,
            distinct,
        } => render_aggregate(*func, arg.as_deref(), *distinct, scope, ctx),

        Expr::Function { func, args } => {
            if args.is_empty() {
                return Err(OrmError::Unsupported(format!(
                    "{}() without arguments",
                    func.sql()
                )));
            }
            let mut items = Vec::with_capacity(args.len());
            for arg in args {
                items.push(render_expr(arg, scope, ctx)?);
            }
            let mut out = Frag::text(format!("{}(", func.sql()));
            out.append_list(items, ", ");
            out.push_str(")");
            Ok(out)
        }

        Expr::Subquery(query) => {
            let sub = build(&query.root, ctx, Some(scope))?;
            match &sub.projection {
                Some(columns) if columns.len() == 1 => {}
                _ => {
                    return Err(OrmError::Unsupported(
                        "scalar subquery must yield exactly one column".to_string(),
                    ))
                }
            }
            let mut out = Frag::text("(");
            out.append(sub.render());
            out.push_str(")");
            Ok(out)
        }
    }
}

fn finish(frag: Frag) -> CompiledCommand {
    trace!("Compiled: {} ({} params)", frag.sql, frag.params.len());
    CompiledCommand {
        sql: frag.sql,
        params: frag.params,
    }
}

pub(crate) fn compile_select(root: &QueryNode) -> Result<CompiledCommand> {
    let mut ctx = Ctx::default();
    let select = build(root, &mut ctx, None)?;
    Ok(finish(select.render()))
}

/// Table and filters (in application order) of a fluent write.
fn write_target<'q>(root: &'q QueryNode, op: &str) -> Result<(Arc<TableMapping>, Vec<&'q Expr>)> {
    let mut filters = Vec::new();
    let mut node = root;
    loop {
        let unsupported = match node {
            QueryNode::Table(table) => {
                filters.reverse();
                return Ok((Arc::clone(table), filters));
            }
            QueryNode::Filter { input, predicate } => {
                if predicate.contains_aggregate() {
                    "aggregate filter"
                } else {
                    filters.push(predicate);
                    node = &**input;
                    continue;
                }
            }
            QueryNode::OrderBy { input, .. } => {
                node = &**input;
                continue;
            }
            QueryNode::Join { .. } => "join",
            QueryNode::Skip { .. } | QueryNode::Take { .. } => "paging",
            QueryNode::Project { .. } => "projection",
            QueryNode::GroupBy { .. } => "grouping",
            QueryNode::Distinct { .. } => "distinct",
            QueryNode::Aggregate { .. } => "aggregate",
        };
        return Err(OrmError::Unsupported(format!(
            "{} in a fluent {}",
            unsupported, op
        )));
    }
}

fn write_source(table: &Arc<TableMapping>) -> Source {
    Source {
        label: None,
        alias: table.table_name.clone(),
        kind: SourceKind::Table(Arc::clone(table)),
    }
}

fn append_where(out: &mut Frag, filters: &[&Expr], scope: &Scope<'_>, ctx: &mut Ctx) -> Result<()> {
    let mut items = Vec::with_capacity(filters.len());
    for filter in filters {
        items.push(render_expr(filter, scope, ctx)?);
    }
    if !items.is_empty() {
        out.push_str(" WHERE ");
        out.append_list(items, " AND ");
    }
    Ok(())
}

pub(crate) fn compile_update(root: &QueryNode, assignments: &[(&str, Expr)]) -> Result<CompiledCommand> {
    if assignments.is_empty() {
        return Err(OrmError::Unsupported("update without assignments".to_string()));
    }
    let (table, filters) = write_target(root, "update")?;
    let sources = [write_source(&table)];
    let scope = Scope {
        sources: &sources,
        outer: None,
    };
    let mut ctx = Ctx::default();

    let mut out = Frag::text(format!("UPDATE {} SET ", table.quoted_name()));
    for (i, (member, value)) in assignments.iter().enumerate() {
        let column = table.require_column(member)?;
        if i > 0 {
            out.push_str(", ");
        }
        out.push_str(&format!("{} = ", quote_ident(&column.name)));
        out.append(render_expr(value, &scope, &mut ctx)?);
    }
    append_where(&mut out, &filters, &scope, &mut ctx)?;
    Ok(finish(out))
}

pub(crate) fn compile_delete(root: &QueryNode) -> Result<CompiledCommand> {
    let (table, filters) = write_target(root, "delete")?;
    let sources = [write_source(&table)];
    let scope = Scope {
        sources: &sources,
        outer: None,
    };
    let mut ctx = Ctx::default();

    let mut out = Frag::text(format!("DELETE FROM {}", table.quoted_name()));
    append_where(&mut out, &filters, &scope, &mut ctx)?;
    Ok(finish(out))
}
