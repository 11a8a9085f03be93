//! Query builder
//!
//! A `Query` is a plain value describing one SELECT, INSERT, UPDATE or DELETE
//! statement. It is turned into SQL by the `QueryCompiler` of a dialect and
//! executed through a `Connection`.
//!
//! ```ignore
//! let query = Query::select(["*"])
//!     .from("articles")
//!     .where_(col("author_id").eq(1));
//! ```

pub mod compiler;
pub mod cte;
pub mod expression;
pub mod value_binder;

use indexmap::IndexMap;

use crate::error::{Error, Result};
use crate::types::{TypeMap, Value};

pub use compiler::QueryCompiler;
pub use cte::CommonTableExpression;
pub use expression::{
    all_of, any_of, avg, col, count, exists, func, lit, max, min, rank, row_number, sum, typed,
    val, Conjunction, Direction, Expr, FrameBound, OrderBy, WindowExpression,
};
pub use value_binder::{Binding, ValueBinder};

/// Statement kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    Select,
    Insert,
    Update,
    Delete,
}

/// Clauses that can be reset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Clause {
    Comment,
    With,
    Modifier,
    Distinct,
    Select,
    From,
    Join,
    Set,
    Values,
    Where,
    Group,
    Having,
    Window,
    Order,
    Limit,
    Offset,
    Union,
    Epilog,
}

/// An item of the select list
#[derive(Debug, Clone)]
pub struct SelectItem {
    pub expr: Expr,
    pub alias: Option<String>,
}

/// Something rows are read from
#[derive(Debug, Clone)]
pub enum TableSource {
    Table(String),
    Query(Box<Query>),
}

/// A FROM (or JOIN) item with its alias
#[derive(Debug, Clone)]
pub struct FromItem {
    pub source: TableSource,
    pub alias: Option<String>,
}

/// Join type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    Inner,
    Left,
    Right,
}

impl JoinType {
    pub fn as_sql(&self) -> &'static str {
        match self {
            JoinType::Inner => "INNER JOIN",
            JoinType::Left => "LEFT JOIN",
            JoinType::Right => "RIGHT JOIN",
        }
    }
}

/// JOIN clause
#[derive(Debug, Clone)]
pub struct Join {
    pub join_type: JoinType,
    pub table: FromItem,
    pub conditions: Option<Expr>,
}

/// UPDATE assignment
#[derive(Debug, Clone)]
pub struct Assignment {
    pub column: String,
    pub value: Expr,
}

/// INSERT source
#[derive(Debug, Clone)]
pub enum InsertValues {
    Rows(Vec<Vec<Expr>>),
    Query(Box<Query>),
}

/// UNION / UNION ALL part
#[derive(Debug, Clone)]
pub struct SetOperation {
    pub all: bool,
    pub query: Box<Query>,
}

/// A SQL query under construction
#[derive(Debug, Clone)]
pub struct Query {
    pub(crate) kind: QueryKind,
    pub(crate) comment: Option<String>,
    pub(crate) with: IndexMap<String, CommonTableExpression>,
    pub(crate) modifiers: Vec<String>,
    pub(crate) distinct: bool,
    pub(crate) select: Vec<SelectItem>,
    pub(crate) from: Vec<FromItem>,
    pub(crate) joins: Vec<Join>,
    /// Target table of INSERT and UPDATE
    pub(crate) table: Option<String>,
    /// Column list of INSERT
    pub(crate) columns: Vec<String>,
    pub(crate) set: Vec<Assignment>,
    pub(crate) values: Option<InsertValues>,
    pub(crate) conditions: Option<Expr>,
    pub(crate) group: Vec<Expr>,
    pub(crate) having: Option<Expr>,
    pub(crate) windows: IndexMap<String, WindowExpression>,
    pub(crate) order: Vec<OrderBy>,
    pub(crate) limit: Option<u64>,
    pub(crate) offset: Option<u64>,
    pub(crate) unions: Vec<SetOperation>,
    pub(crate) epilog: Option<String>,
    type_map: TypeMap,
    select_type_map: TypeMap,
    binder: ValueBinder,
}

impl Query {
    fn new(kind: QueryKind) -> Self {
        Self {
            kind,
            comment: None,
            with: IndexMap::new(),
            modifiers: Vec::new(),
            distinct: false,
            select: Vec::new(),
            from: Vec::new(),
            joins: Vec::new(),
            table: None,
            columns: Vec::new(),
            set: Vec::new(),
            values: None,
            conditions: None,
            group: Vec::new(),
            having: None,
            windows: IndexMap::new(),
            order: Vec::new(),
            limit: None,
            offset: None,
            unions: Vec::new(),
            epilog: None,
            type_map: TypeMap::new(),
            select_type_map: TypeMap::new(),
            binder: ValueBinder::new(),
        }
    }

    /// Start a SELECT of the given columns
    pub fn select<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::new(QueryKind::Select).columns_of(fields)
    }

    /// Start an INSERT into a table
    pub fn insert_into<I, S>(table: &str, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut query = Self::new(QueryKind::Insert);
        query.table = Some(table.to_string());
        query.columns = columns.into_iter().map(Into::into).collect();
        query
    }

    /// Start an UPDATE of a table
    pub fn update(table: &str) -> Self {
        let mut query = Self::new(QueryKind::Update);
        query.table = Some(table.to_string());
        query
    }

    /// Start a DELETE from a table
    pub fn delete(table: &str) -> Self {
        Self::new(QueryKind::Delete).from(table)
    }

    /// Statement kind
    pub fn kind(&self) -> QueryKind {
        self.kind
    }

    // ========== SELECT list ==========

    /// Append columns to the select list
    pub fn columns_of<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for field in fields {
            self.select.push(SelectItem {
                expr: col(field.as_ref()),
                alias: None,
            });
        }
        self
    }

    /// Append an expression to the select list
    pub fn select_expr(mut self, expr: Expr, alias: Option<&str>) -> Self {
        self.select.push(SelectItem {
            expr,
            alias: alias.map(str::to_string),
        });
        self
    }

    /// Append an aliased column to the select list
    pub fn select_as(self, field: &str, alias: &str) -> Self {
        self.select_expr(col(field), Some(alias))
    }

    /// Set DISTINCT
    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    /// Add a modifier placed after the verb (e.g. `SQL_NO_CACHE`, `IGNORE`)
    pub fn modifier(mut self, modifier: impl Into<String>) -> Self {
        self.modifiers.push(modifier.into());
        self
    }

    // ========== FROM / JOIN ==========

    /// Add a table to FROM
    pub fn from(mut self, table: &str) -> Self {
        self.from.push(FromItem {
            source: TableSource::Table(table.to_string()),
            alias: None,
        });
        self
    }

    /// Add an aliased table to FROM
    pub fn from_as(mut self, table: &str, alias: &str) -> Self {
        self.from.push(FromItem {
            source: TableSource::Table(table.to_string()),
            alias: Some(alias.to_string()),
        });
        self
    }

    /// Add a subquery to FROM
    pub fn from_query(mut self, query: Query, alias: &str) -> Self {
        self.from.push(FromItem {
            source: TableSource::Query(Box::new(query)),
            alias: Some(alias.to_string()),
        });
        self
    }

    /// Add a join
    pub fn join(mut self, join_type: JoinType, table: &str, alias: Option<&str>, on: Expr) -> Self {
        self.joins.push(Join {
            join_type,
            table: FromItem {
                source: TableSource::Table(table.to_string()),
                alias: alias.map(str::to_string),
            },
            conditions: Some(on),
        });
        self
    }

    /// Add an INNER JOIN
    pub fn inner_join(self, table: &str, on: Expr) -> Self {
        self.join(JoinType::Inner, table, None, on)
    }

    /// Add a LEFT JOIN
    pub fn left_join(self, table: &str, on: Expr) -> Self {
        self.join(JoinType::Left, table, None, on)
    }

    /// Add a RIGHT JOIN
    pub fn right_join(self, table: &str, on: Expr) -> Self {
        self.join(JoinType::Right, table, None, on)
    }

    // ========== WITH ==========

    /// Attach a common table expression.
    ///
    /// With `overwrite` the WITH clause is cleared first, and `None` only
    /// clears it. Otherwise `None` is rejected and a CTE whose name is already
    /// attached is rejected.
    pub fn with(mut self, cte: impl Into<Option<CommonTableExpression>>, overwrite: bool) -> Result<Self> {
        if overwrite {
            self.with.clear();
        }

        match cte.into() {
            Some(cte) => {
                if self.with.contains_key(&cte.name) {
                    return Err(Error::InvalidArgument(format!(
                        "A common table expression named `{}` is already attached to this query",
                        cte.name
                    )));
                }
                self.with.insert(cte.name.clone(), cte);
                Ok(self)
            }
            None if overwrite => Ok(self),
            None => Err(Error::InvalidArgument(
                "A common table expression is required unless the WITH clause is overwritten"
                    .to_string(),
            )),
        }
    }

    /// Attach `name AS (query)`
    pub fn cte(self, name: &str, query: Query) -> Result<Self> {
        self.with(CommonTableExpression::new(name, query), false)
    }

    /// Attached common table expressions in order
    pub fn ctes(&self) -> impl Iterator<Item = &CommonTableExpression> {
        self.with.values()
    }

    // ========== INSERT / UPDATE ==========

    /// Add a SET assignment; the value binds as the column's mapped type
    pub fn set(mut self, column: &str, value: impl Into<Value>) -> Self {
        let ty = self.type_map.type_for(column).map(str::to_string);
        self.set.push(Assignment {
            column: column.to_string(),
            value: Expr::Value {
                value: value.into(),
                ty,
            },
        });
        self
    }

    /// Add a SET assignment with an arbitrary expression
    pub fn set_expr(mut self, column: &str, mut value: Expr) -> Self {
        if let Expr::Value { ty: ty @ None, .. } = &mut value {
            *ty = self.type_map.type_for(column).map(str::to_string);
        }
        self.set.push(Assignment {
            column: column.to_string(),
            value,
        });
        self
    }

    /// Add a row of values; each value binds as its column's mapped type
    pub fn values<I>(mut self, row: I) -> Result<Self>
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        let row: Vec<Value> = row.into_iter().map(Into::into).collect();
        if row.len() != self.columns.len() {
            return Err(Error::InvalidArgument(format!(
                "Expected {} values for the insert columns, got {}",
                self.columns.len(),
                row.len()
            )));
        }

        let exprs: Vec<Expr> = row
            .into_iter()
            .zip(&self.columns)
            .map(|(value, column)| Expr::Value {
                value,
                ty: self.type_map.type_for(column).map(str::to_string),
            })
            .collect();

        match &mut self.values {
            Some(InsertValues::Rows(rows)) => rows.push(exprs),
            Some(InsertValues::Query(_)) => {
                return Err(Error::InvalidArgument(
                    "Cannot add value rows to an INSERT that selects from a query".to_string(),
                ))
            }
            None => self.values = Some(InsertValues::Rows(vec![exprs])),
        }
        Ok(self)
    }

    /// Insert the rows selected by a query
    pub fn values_query(mut self, query: Query) -> Self {
        self.values = Some(InsertValues::Query(Box::new(query)));
        self
    }

    // ========== WHERE / GROUP / HAVING ==========

    /// Add a condition joined with AND
    pub fn where_(mut self, mut condition: Expr) -> Self {
        condition.apply_types(&self.type_map);
        self.conditions = Some(match self.conditions.take() {
            Some(existing) => existing.combine(Conjunction::And, condition),
            None => condition,
        });
        self
    }

    /// Alias of `where_`
    pub fn and_where(self, condition: Expr) -> Self {
        self.where_(condition)
    }

    /// Join the existing conditions and a new one with OR
    pub fn or_where(mut self, mut condition: Expr) -> Self {
        condition.apply_types(&self.type_map);
        self.conditions = Some(match self.conditions.take() {
            Some(existing) => existing.combine(Conjunction::Or, condition),
            None => condition,
        });
        self
    }

    /// Add GROUP BY columns
    pub fn group_by<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.group.extend(fields.into_iter().map(|f| col(f.as_ref())));
        self
    }

    /// Add a HAVING condition joined with AND
    pub fn having(mut self, mut condition: Expr) -> Self {
        condition.apply_types(&self.type_map);
        self.having = Some(match self.having.take() {
            Some(existing) => existing.combine(Conjunction::And, condition),
            None => condition,
        });
        self
    }

    /// Define a named window
    pub fn window(mut self, name: &str, window: WindowExpression) -> Self {
        self.windows.insert(name.to_string(), window);
        self
    }

    // ========== ORDER / LIMIT ==========

    /// Add an ORDER BY expression
    pub fn order_by(mut self, expr: Expr, direction: Option<Direction>) -> Self {
        self.order.push(OrderBy { expr, direction });
        self
    }

    /// Order ascending by a column
    pub fn order_asc(self, field: &str) -> Self {
        self.order_by(col(field), Some(Direction::Asc))
    }

    /// Order descending by a column
    pub fn order_desc(self, field: &str) -> Self {
        self.order_by(col(field), Some(Direction::Desc))
    }

    /// Set LIMIT
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Set OFFSET
    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Set LIMIT and OFFSET for a 1-based page.
    ///
    /// Pages past `u64::MAX` rows clamp the offset to `u64::MAX`.
    pub fn page(self, page: u64, per_page: u64) -> Self {
        let offset = page.saturating_sub(1).saturating_mul(per_page);
        self.limit(per_page).offset(offset)
    }

    // ========== Set operations / misc ==========

    /// Add a UNION
    pub fn union(mut self, query: Query) -> Self {
        self.unions.push(SetOperation {
            all: false,
            query: Box::new(query),
        });
        self
    }

    /// Add a UNION ALL
    pub fn union_all(mut self, query: Query) -> Self {
        self.unions.push(SetOperation {
            all: true,
            query: Box::new(query),
        });
        self
    }

    /// Set a comment emitted in front of the statement
    pub fn comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// Set raw SQL appended to the statement
    pub fn epilog(mut self, epilog: impl Into<String>) -> Self {
        self.epilog = Some(epilog.into());
        self
    }

    /// Clear a clause
    pub fn reset(mut self, clause: Clause) -> Self {
        match clause {
            Clause::Comment => self.comment = None,
            Clause::With => self.with.clear(),
            Clause::Modifier => self.modifiers.clear(),
            Clause::Distinct => self.distinct = false,
            Clause::Select => self.select.clear(),
            Clause::From => self.from.clear(),
            Clause::Join => self.joins.clear(),
            Clause::Set => self.set.clear(),
            Clause::Values => self.values = None,
            Clause::Where => self.conditions = None,
            Clause::Group => self.group.clear(),
            Clause::Having => self.having = None,
            Clause::Window => self.windows.clear(),
            Clause::Order => self.order.clear(),
            Clause::Limit => self.limit = None,
            Clause::Offset => self.offset = None,
            Clause::Union => self.unions.clear(),
            Clause::Epilog => self.epilog = None,
        }
        self
    }

    // ========== Types and bindings ==========

    /// Add types for columns compared or assigned in this query
    pub fn types<I, K, V>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.type_map.set_types(types);
        self
    }

    /// Replace the type map
    pub fn type_map(mut self, map: TypeMap) -> Self {
        self.type_map = map;
        self
    }

    /// Add types fetched columns are cast to
    pub fn select_types<I, K, V>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.select_type_map.set_types(types);
        self
    }

    /// Bind a value to a placeholder written in literal SQL
    pub fn bind(mut self, param: &str, value: impl Into<Value>, ty: Option<&str>) -> Self {
        self.binder.bind(param, value, ty);
        self
    }

    /// Type map for conditions and assignments
    pub fn get_type_map(&self) -> &TypeMap {
        &self.type_map
    }

    /// Type map for fetched columns
    pub fn get_select_type_map(&self) -> &TypeMap {
        &self.select_type_map
    }

    /// Explicit bindings
    pub fn value_binder(&self) -> &ValueBinder {
        &self.binder
    }

    /// A binder seeded with the explicit bindings and fresh numbering
    pub fn fresh_binder(&self) -> ValueBinder {
        let mut binder = self.binder.clone();
        binder.reset_count();
        binder
    }
}
