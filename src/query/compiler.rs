//! Query compiler
//!
//! Turns a `Query` into SQL text for one dialect. Values never end up in the
//! SQL: each one is bound to a fresh placeholder on the `ValueBinder` passed
//! in, and subqueries share that binder so placeholder numbering stays unique
//! across the whole statement. A subquery's own explicit bindings travel with
//! it into the shared binder.

use super::expression::{Expr, InList, OrderBy, WindowExpression};
use super::value_binder::ValueBinder;
use super::{FromItem, InsertValues, Query, QueryKind, TableSource};
use crate::driver::{Dialect, DriverFeature};
use crate::error::{Error, Result};

/// Largest row count MySQL accepts, used when only an offset is given
const MYSQL_MAX_LIMIT: u64 = 18_446_744_073_709_551_615;

/// Compiles queries into SQL for one dialect
#[derive(Debug, Clone, Copy)]
pub struct QueryCompiler {
    dialect: Dialect,
    quote_identifiers: bool,
}

impl QueryCompiler {
    /// Create a compiler
    pub fn new(dialect: Dialect, quote_identifiers: bool) -> Self {
        Self {
            dialect,
            quote_identifiers,
        }
    }

    /// Compile a query, binding its values on `binder`.
    ///
    /// Explicit bindings of the query (and of every nested query) are merged
    /// into `binder`; bindings already present there win.
    pub fn compile(&self, query: &Query, binder: &mut ValueBinder) -> Result<String> {
        binder.merge(query.value_binder());
        let mut parts = Vec::new();

        if let Some(comment) = &query.comment {
            parts.push(format!("/* {} */", comment));
        }

        match query.kind {
            QueryKind::Select => self.compile_select(query, binder, &mut parts)?,
            QueryKind::Insert => self.compile_insert(query, binder, &mut parts)?,
            QueryKind::Update => self.compile_update(query, binder, &mut parts)?,
            QueryKind::Delete => self.compile_delete(query, binder, &mut parts)?,
        }

        if let Some(epilog) = &query.epilog {
            parts.push(epilog.clone());
        }

        Ok(parts.join(" "))
    }

    fn compile_select(&self, query: &Query, binder: &mut ValueBinder, parts: &mut Vec<String>) -> Result<()> {
        if let Some(with) = self.with_clause(query, binder)? {
            parts.push(with);
        }

        let sqlserver_paging = self.dialect == Dialect::SqlServer;
        let mut select = String::from("SELECT");
        if query.distinct {
            select.push_str(" DISTINCT");
        }
        if sqlserver_paging && query.offset.is_none() {
            if let Some(limit) = query.limit {
                select.push_str(&format!(" TOP {}", limit));
            }
        }
        for modifier in &query.modifiers {
            select.push(' ');
            select.push_str(modifier);
        }

        let fields = if query.select.is_empty() {
            "*".to_string()
        } else {
            query
                .select
                .iter()
                .map(|item| {
                    let sql = self.expr_sql(&item.expr, binder)?;
                    Ok(match &item.alias {
                        Some(alias) => format!("{} AS {}", sql, self.identifier(alias)),
                        None => sql,
                    })
                })
                .collect::<Result<Vec<_>>>()?
                .join(", ")
        };
        parts.push(format!("{} {}", select, fields));

        if !query.from.is_empty() {
            let from = query
                .from
                .iter()
                .map(|item| self.from_item_sql(item, binder))
                .collect::<Result<Vec<_>>>()?;
            parts.push(format!("FROM {}", from.join(", ")));
        }

        for join in &query.joins {
            let mut sql = format!(
                "{} {}",
                join.join_type.as_sql(),
                self.from_item_sql(&join.table, binder)?
            );
            if let Some(on) = &join.conditions {
                let on = self.expr_sql(on, binder)?;
                if !on.is_empty() {
                    sql.push_str(&format!(" ON {}", on));
                }
            }
            parts.push(sql);
        }

        self.where_clause(query, binder, parts)?;

        if !query.group.is_empty() {
            let group = self.expr_list(&query.group, binder)?;
            parts.push(format!("GROUP BY {}", group));
        }

        if let Some(having) = &query.having {
            let having = self.expr_sql(having, binder)?;
            if !having.is_empty() {
                parts.push(format!("HAVING {}", having));
            }
        }

        if !query.windows.is_empty() {
            let windows = query
                .windows
                .iter()
                .map(|(name, window)| {
                    Ok(format!(
                        "{} AS ({})",
                        self.identifier(name),
                        self.window_sql(window, binder)?
                    ))
                })
                .collect::<Result<Vec<_>>>()?;
            parts.push(format!("WINDOW {}", windows.join(", ")));
        }

        if !query.order.is_empty() {
            parts.push(format!("ORDER BY {}", self.order_list(&query.order, binder)?));
        } else if sqlserver_paging && query.offset.is_some() {
            parts.push("ORDER BY (SELECT NULL)".to_string());
        }

        if let Some(paging) = self.paging_sql(query.limit, query.offset) {
            parts.push(paging);
        }

        for union in &query.unions {
            let keyword = if union.all { "UNION ALL" } else { "UNION" };
            parts.push(format!("{} {}", keyword, self.compile(&union.query, binder)?));
        }

        Ok(())
    }

    fn compile_insert(&self, query: &Query, binder: &mut ValueBinder, parts: &mut Vec<String>) -> Result<()> {
        let table = query.table.as_deref().ok_or_else(|| {
            Error::InvalidArgument("An INSERT query requires a target table".to_string())
        })?;
        let values = query.values.as_ref().ok_or_else(|| {
            Error::InvalidArgument("An INSERT query requires values or a source query".to_string())
        })?;

        // MySQL and MariaDB only accept WITH inside INSERT ... SELECT
        let with_after_columns =
            matches!(self.dialect, Dialect::Mysql | Dialect::MariaDb) && !query.with.is_empty();
        if with_after_columns && !matches!(values, InsertValues::Query(_)) {
            return Err(Error::Unsupported {
                dialect: self.dialect.name(),
                feature: "common table expressions in INSERT ... VALUES".to_string(),
            });
        }

        if !with_after_columns {
            if let Some(with) = self.with_clause(query, binder)? {
                parts.push(with);
            }
        }

        let mut insert = String::from("INSERT");
        for modifier in &query.modifiers {
            insert.push(' ');
            insert.push_str(modifier);
        }
        let columns = query
            .columns
            .iter()
            .map(|c| self.identifier(c))
            .collect::<Vec<_>>()
            .join(", ");
        parts.push(format!("{} INTO {} ({})", insert, self.identifier(table), columns));

        if self.dialect == Dialect::SqlServer {
            parts.push("OUTPUT INSERTED.*".to_string());
        }

        if with_after_columns {
            if let Some(with) = self.with_clause(query, binder)? {
                parts.push(with);
            }
        }

        match values {
            InsertValues::Rows(rows) => {
                let rows = rows
                    .iter()
                    .map(|row| Ok(format!("({})", self.expr_list(row, binder)?)))
                    .collect::<Result<Vec<_>>>()?;
                parts.push(format!("VALUES {}", rows.join(", ")));
            }
            InsertValues::Query(source) => parts.push(self.compile(source, binder)?),
        }

        if self.dialect == Dialect::Postgres && query.epilog.is_none() {
            parts.push("RETURNING *".to_string());
        }

        Ok(())
    }

    fn compile_update(&self, query: &Query, binder: &mut ValueBinder, parts: &mut Vec<String>) -> Result<()> {
        self.check_dml_with(query)?;
        let table = query.table.as_deref().ok_or_else(|| {
            Error::InvalidArgument("An UPDATE query requires a target table".to_string())
        })?;
        if query.set.is_empty() {
            return Err(Error::InvalidArgument(
                "An UPDATE query requires at least one assignment".to_string(),
            ));
        }

        if let Some(with) = self.with_clause(query, binder)? {
            parts.push(with);
        }

        let mut update = String::from("UPDATE");
        for modifier in &query.modifiers {
            update.push(' ');
            update.push_str(modifier);
        }
        parts.push(format!("{} {}", update, self.identifier(table)));

        let assignments = query
            .set
            .iter()
            .map(|a| Ok(format!("{} = {}", self.identifier(&a.column), self.expr_sql(&a.value, binder)?)))
            .collect::<Result<Vec<_>>>()?;
        parts.push(format!("SET {}", assignments.join(", ")));

        self.where_clause(query, binder, parts)
    }

    fn compile_delete(&self, query: &Query, binder: &mut ValueBinder, parts: &mut Vec<String>) -> Result<()> {
        self.check_dml_with(query)?;
        if query.from.is_empty() {
            return Err(Error::InvalidArgument(
                "A DELETE query requires a table".to_string(),
            ));
        }

        if let Some(with) = self.with_clause(query, binder)? {
            parts.push(with);
        }

        let mut delete = String::from("DELETE");
        for modifier in &query.modifiers {
            delete.push(' ');
            delete.push_str(modifier);
        }
        parts.push(delete);

        let from = query
            .from
            .iter()
            .map(|item| self.from_item_sql(item, binder))
            .collect::<Result<Vec<_>>>()?;
        parts.push(format!("FROM {}", from.join(", ")));

        self.where_clause(query, binder, parts)
    }

    fn check_dml_with(&self, query: &Query) -> Result<()> {
        if !query.with.is_empty() && !self.dialect.supports(DriverFeature::CteInDml) {
            return Err(Error::Unsupported {
                dialect: self.dialect.name(),
                feature: "common table expressions in UPDATE and DELETE".to_string(),
            });
        }
        Ok(())
    }

    fn with_clause(&self, query: &Query, binder: &mut ValueBinder) -> Result<Option<String>> {
        if query.with.is_empty() {
            return Ok(None);
        }

        let recursive = self.dialect != Dialect::SqlServer && query.with.values().any(|c| c.recursive);

        let mut ctes = Vec::with_capacity(query.with.len());
        for cte in query.with.values() {
            let body = cte.query.as_ref().ok_or_else(|| {
                Error::InvalidArgument(format!(
                    "The common table expression `{}` has no query",
                    cte.name
                ))
            })?;

            let mut sql = self.identifier(&cte.name);
            if !cte.fields.is_empty() {
                let fields = cte
                    .fields
                    .iter()
                    .map(|f| self.identifier(f))
                    .collect::<Vec<_>>()
                    .join(", ");
                sql.push_str(&format!("({})", fields));
            }
            sql.push_str(" AS ");
            for modifier in &cte.modifiers {
                sql.push_str(modifier);
                sql.push(' ');
            }
            sql.push_str(&format!("({})", self.compile(body, binder)?));
            ctes.push(sql);
        }

        let keyword = if recursive { "WITH RECURSIVE" } else { "WITH" };
        Ok(Some(format!("{} {}", keyword, ctes.join(", "))))
    }

    fn where_clause(&self, query: &Query, binder: &mut ValueBinder, parts: &mut Vec<String>) -> Result<()> {
        if let Some(conditions) = &query.conditions {
            let sql = self.expr_sql(conditions, binder)?;
            if !sql.is_empty() {
                parts.push(format!("WHERE {}", sql));
            }
        }
        Ok(())
    }

    fn paging_sql(&self, limit: Option<u64>, offset: Option<u64>) -> Option<String> {
        match self.dialect {
            Dialect::SqlServer => {
                let offset = offset?;
                let mut sql = format!("OFFSET {} ROWS", offset);
                if let Some(limit) = limit {
                    sql.push_str(&format!(" FETCH FIRST {} ROWS ONLY", limit));
                }
                Some(sql)
            }
            Dialect::Sqlite => match (limit, offset) {
                (None, None) => None,
                (Some(l), None) => Some(format!("LIMIT {}", l)),
                (Some(l), Some(o)) => Some(format!("LIMIT {} OFFSET {}", l, o)),
                (None, Some(o)) => Some(format!("LIMIT -1 OFFSET {}", o)),
            },
            Dialect::Mysql | Dialect::MariaDb => match (limit, offset) {
                (None, None) => None,
                (Some(l), None) => Some(format!("LIMIT {}", l)),
                (Some(l), Some(o)) => Some(format!("LIMIT {} OFFSET {}", l, o)),
                (None, Some(o)) => Some(format!("LIMIT {} OFFSET {}", MYSQL_MAX_LIMIT, o)),
            },
            Dialect::Postgres => match (limit, offset) {
                (None, None) => None,
                (Some(l), None) => Some(format!("LIMIT {}", l)),
                (Some(l), Some(o)) => Some(format!("LIMIT {} OFFSET {}", l, o)),
                (None, Some(o)) => Some(format!("OFFSET {}", o)),
            },
        }
    }

    fn from_item_sql(&self, item: &FromItem, binder: &mut ValueBinder) -> Result<String> {
        let source = match &item.source {
            TableSource::Table(table) => self.identifier(table),
            TableSource::Query(query) => format!("({})", self.compile(query, binder)?),
        };
        Ok(match &item.alias {
            Some(alias) => format!("{} {}", source, self.identifier(alias)),
            None => source,
        })
    }

    fn expr_list(&self, exprs: &[Expr], binder: &mut ValueBinder) -> Result<String> {
        Ok(exprs
            .iter()
            .map(|e| self.expr_sql(e, binder))
            .collect::<Result<Vec<_>>>()?
            .join(", "))
    }

    fn order_list(&self, order: &[OrderBy], binder: &mut ValueBinder) -> Result<String> {
        Ok(order
            .iter()
            .map(|o| {
                let sql = self.expr_sql(&o.expr, binder)?;
                Ok(match o.direction {
                    Some(direction) => format!("{} {}", sql, direction.as_sql()),
                    None => sql,
                })
            })
            .collect::<Result<Vec<_>>>()?
            .join(", "))
    }

    fn window_sql(&self, window: &WindowExpression, binder: &mut ValueBinder) -> Result<String> {
        let mut parts = Vec::new();
        if let Some(name) = &window.name {
            parts.push(self.identifier(name));
        }
        if !window.partition.is_empty() {
            parts.push(format!("PARTITION BY {}", self.expr_list(&window.partition, binder)?));
        }
        if !window.order.is_empty() {
            parts.push(format!("ORDER BY {}", self.order_list(&window.order, binder)?));
        }
        if let Some(frame) = &window.frame {
            parts.push(format!(
                "{} BETWEEN {} AND {}",
                frame.units.as_sql(),
                frame.start.to_sql(),
                frame.end.to_sql()
            ));
        }
        Ok(parts.join(" "))
    }

    /// Render an expression, binding any values it holds
    pub fn expr_sql(&self, expr: &Expr, binder: &mut ValueBinder) -> Result<String> {
        match expr {
            Expr::Column(name) => Ok(self.identifier(name)),
            Expr::Value { value, ty } => {
                let token = binder.placeholder("c");
                let ty = ty.as_deref().or_else(|| value.default_type());
                binder.bind(&token, value.clone(), ty);
                Ok(token)
            }
            Expr::Literal(sql) => Ok(sql.clone()),
            Expr::Comparison { left, op, right } => Ok(format!(
                "{} {} {}",
                self.expr_sql(left, binder)?,
                op.as_sql(),
                self.expr_sql(right, binder)?
            )),
            Expr::In { expr, list, negated } => {
                let left = self.expr_sql(expr, binder)?;
                let keyword = if *negated { "NOT IN" } else { "IN" };
                match list {
                    InList::Values(values) if values.is_empty() => {
                        Ok(if *negated { "1=1" } else { "1=0" }.to_string())
                    }
                    InList::Values(values) => Ok(format!(
                        "{} {} ({})",
                        left,
                        keyword,
                        self.expr_list(values, binder)?
                    )),
                    InList::Query(query) => {
                        Ok(format!("{} {} ({})", left, keyword, self.compile(query, binder)?))
                    }
                }
            }
            Expr::IsNull { expr, negated } => {
                let keyword = if *negated { "IS NOT NULL" } else { "IS NULL" };
                Ok(format!("{} {}", self.expr_sql(expr, binder)?, keyword))
            }
            Expr::Between { expr, low, high } => Ok(format!(
                "{} BETWEEN {} AND {}",
                self.expr_sql(expr, binder)?,
                self.expr_sql(low, binder)?,
                self.expr_sql(high, binder)?
            )),
            Expr::Not(inner) => Ok(format!("NOT ({})", self.expr_sql(inner, binder)?)),
            Expr::Conjunction { conjunction, parts } => {
                let rendered = parts
                    .iter()
                    .map(|p| self.expr_sql(p, binder))
                    .collect::<Result<Vec<_>>>()?
                    .into_iter()
                    .filter(|p| !p.is_empty())
                    .collect::<Vec<_>>();
                Ok(match rendered.len() {
                    0 => String::new(),
                    1 => rendered.into_iter().collect(),
                    _ => format!(
                        "({})",
                        rendered.join(&format!(" {} ", conjunction.as_sql()))
                    ),
                })
            }
            Expr::Function { name, args, over } => {
                let mut sql = format!("{}({})", name, self.expr_list(args, binder)?);
                if let Some(window) = over {
                    if window.is_bare_reference() {
                        sql.push_str(&format!(" OVER {}", self.window_sql(window, binder)?));
                    } else {
                        sql.push_str(&format!(" OVER ({})", self.window_sql(window, binder)?));
                    }
                }
                Ok(sql)
            }
            Expr::Subquery(query) => Ok(format!("({})", self.compile(query, binder)?)),
            Expr::Exists(query) => Ok(format!("EXISTS ({})", self.compile(query, binder)?)),
        }
    }

    fn identifier(&self, name: &str) -> String {
        if self.quote_identifiers {
            self.dialect.quote_identifier(name)
        } else {
            name.to_string()
        }
    }
}
