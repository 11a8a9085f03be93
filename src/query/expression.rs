//! SQL expression tree
//!
//! Expressions are built with small helpers and combinators:
//!
//! ```ignore
//! col("author_id").eq(1).and(col("published").eq(true))
//! ```

use super::Query;
use crate::types::{TypeMap, Value};

/// A SQL expression
#[derive(Debug, Clone)]
pub enum Expr {
    /// Column or other identifier
    Column(String),
    /// Bound value with an optional type name
    Value { value: Value, ty: Option<String> },
    /// Raw SQL, emitted verbatim
    Literal(String),
    /// Binary comparison
    Comparison {
        left: Box<Expr>,
        op: ComparisonOperator,
        right: Box<Expr>,
    },
    /// IN / NOT IN
    In {
        expr: Box<Expr>,
        list: InList,
        negated: bool,
    },
    /// IS NULL / IS NOT NULL
    IsNull { expr: Box<Expr>, negated: bool },
    /// BETWEEN
    Between {
        expr: Box<Expr>,
        low: Box<Expr>,
        high: Box<Expr>,
    },
    /// NOT
    Not(Box<Expr>),
    /// AND / OR over any number of parts
    Conjunction {
        conjunction: Conjunction,
        parts: Vec<Expr>,
    },
    /// Function call, optionally a window function
    Function {
        name: String,
        args: Vec<Expr>,
        over: Option<WindowExpression>,
    },
    /// Scalar subquery
    Subquery(Box<Query>),
    /// EXISTS
    Exists(Box<Query>),
}

/// Comparison operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOperator {
    Eq,
    NotEq,
    Lt,
    Lte,
    Gt,
    Gte,
    Like,
    NotLike,
}

impl ComparisonOperator {
    /// SQL text of the operator
    pub fn as_sql(&self) -> &'static str {
        match self {
            ComparisonOperator::Eq => "=",
            ComparisonOperator::NotEq => "<>",
            ComparisonOperator::Lt => "<",
            ComparisonOperator::Lte => "<=",
            ComparisonOperator::Gt => ">",
            ComparisonOperator::Gte => ">=",
            ComparisonOperator::Like => "LIKE",
            ComparisonOperator::NotLike => "NOT LIKE",
        }
    }
}

/// Right-hand side of IN
#[derive(Debug, Clone)]
pub enum InList {
    Values(Vec<Expr>),
    Query(Box<Query>),
}

/// Logical connective
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conjunction {
    And,
    Or,
}

impl Conjunction {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Conjunction::And => "AND",
            Conjunction::Or => "OR",
        }
    }
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

impl Direction {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }
}

/// ORDER BY item
#[derive(Debug, Clone)]
pub struct OrderBy {
    pub expr: Expr,
    pub direction: Option<Direction>,
}

impl OrderBy {
    pub fn new(expr: impl Into<Expr>, direction: Option<Direction>) -> Self {
        Self {
            expr: expr.into(),
            direction,
        }
    }
}

/// Window frame units
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameUnits {
    Rows,
    Range,
    Groups,
}

impl FrameUnits {
    pub fn as_sql(&self) -> &'static str {
        match self {
            FrameUnits::Rows => "ROWS",
            FrameUnits::Range => "RANGE",
            FrameUnits::Groups => "GROUPS",
        }
    }
}

/// One end of a window frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameBound {
    UnboundedPreceding,
    Preceding(u64),
    CurrentRow,
    Following(u64),
    UnboundedFollowing,
}

impl FrameBound {
    pub fn to_sql(&self) -> String {
        match self {
            FrameBound::UnboundedPreceding => "UNBOUNDED PRECEDING".to_string(),
            FrameBound::Preceding(n) => format!("{} PRECEDING", n),
            FrameBound::CurrentRow => "CURRENT ROW".to_string(),
            FrameBound::Following(n) => format!("{} FOLLOWING", n),
            FrameBound::UnboundedFollowing => "UNBOUNDED FOLLOWING".to_string(),
        }
    }
}

/// Window frame: `<units> BETWEEN <start> AND <end>`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowFrame {
    pub units: FrameUnits,
    pub start: FrameBound,
    pub end: FrameBound,
}

/// Window specification used by `OVER (...)` and the WINDOW clause
#[derive(Debug, Clone, Default)]
pub struct WindowExpression {
    /// Named window this one extends
    pub name: Option<String>,
    pub partition: Vec<Expr>,
    pub order: Vec<OrderBy>,
    pub frame: Option<WindowFrame>,
}

impl WindowExpression {
    /// Create an empty window
    pub fn new() -> Self {
        Self::default()
    }

    /// Reference a named window
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    /// Add a PARTITION BY column
    pub fn partition(mut self, column: &str) -> Self {
        self.partition.push(col(column));
        self
    }

    /// Add an ORDER BY column
    pub fn order(mut self, column: &str, direction: Direction) -> Self {
        self.order.push(OrderBy::new(col(column), Some(direction)));
        self
    }

    /// Set a ROWS frame
    pub fn rows(self, start: FrameBound, end: FrameBound) -> Self {
        self.frame(FrameUnits::Rows, start, end)
    }

    /// Set a RANGE frame
    pub fn range(self, start: FrameBound, end: FrameBound) -> Self {
        self.frame(FrameUnits::Range, start, end)
    }

    /// Set a GROUPS frame
    pub fn groups(self, start: FrameBound, end: FrameBound) -> Self {
        self.frame(FrameUnits::Groups, start, end)
    }

    fn frame(mut self, units: FrameUnits, start: FrameBound, end: FrameBound) -> Self {
        self.frame = Some(WindowFrame { units, start, end });
        self
    }

    /// Check if nothing but a name is set
    pub fn is_bare_reference(&self) -> bool {
        self.name.is_some()
            && self.partition.is_empty()
            && self.order.is_empty()
            && self.frame.is_none()
    }
}

/// Column reference
pub fn col(name: &str) -> Expr {
    Expr::Column(name.to_string())
}

/// Untyped bound value
pub fn val(value: impl Into<Value>) -> Expr {
    Expr::Value {
        value: value.into(),
        ty: None,
    }
}

/// Bound value with an explicit type
pub fn typed(value: impl Into<Value>, ty: &str) -> Expr {
    Expr::Value {
        value: value.into(),
        ty: Some(ty.to_string()),
    }
}

/// Raw SQL
pub fn lit(sql: &str) -> Expr {
    Expr::Literal(sql.to_string())
}

/// Function call
pub fn func(name: &str, args: Vec<Expr>) -> Expr {
    Expr::Function {
        name: name.to_string(),
        args,
        over: None,
    }
}

/// `COUNT(column)`; `*` counts rows
pub fn count(column: &str) -> Expr {
    let arg = if column == "*" { lit("*") } else { col(column) };
    func("COUNT", vec![arg])
}

/// `SUM(column)`
pub fn sum(column: &str) -> Expr {
    func("SUM", vec![col(column)])
}

/// `AVG(column)`
pub fn avg(column: &str) -> Expr {
    func("AVG", vec![col(column)])
}

/// `MIN(column)`
pub fn min(column: &str) -> Expr {
    func("MIN", vec![col(column)])
}

/// `MAX(column)`
pub fn max(column: &str) -> Expr {
    func("MAX", vec![col(column)])
}

/// `ROW_NUMBER()`
pub fn row_number() -> Expr {
    func("ROW_NUMBER", Vec::new())
}

/// `RANK()`
pub fn rank() -> Expr {
    func("RANK", Vec::new())
}

/// `EXISTS (subquery)`
pub fn exists(query: Query) -> Expr {
    Expr::Exists(Box::new(query))
}

/// AND over all parts
pub fn all_of(parts: Vec<Expr>) -> Expr {
    Expr::Conjunction {
        conjunction: Conjunction::And,
        parts,
    }
}

/// OR over all parts
pub fn any_of(parts: Vec<Expr>) -> Expr {
    Expr::Conjunction {
        conjunction: Conjunction::Or,
        parts,
    }
}

impl Expr {
    fn compare(self, op: ComparisonOperator, right: impl Into<Expr>) -> Expr {
        Expr::Comparison {
            left: Box::new(self),
            op,
            right: Box::new(right.into()),
        }
    }

    pub fn eq(self, right: impl Into<Expr>) -> Expr {
        self.compare(ComparisonOperator::Eq, right)
    }

    pub fn not_eq(self, right: impl Into<Expr>) -> Expr {
        self.compare(ComparisonOperator::NotEq, right)
    }

    pub fn lt(self, right: impl Into<Expr>) -> Expr {
        self.compare(ComparisonOperator::Lt, right)
    }

    pub fn lte(self, right: impl Into<Expr>) -> Expr {
        self.compare(ComparisonOperator::Lte, right)
    }

    pub fn gt(self, right: impl Into<Expr>) -> Expr {
        self.compare(ComparisonOperator::Gt, right)
    }

    pub fn gte(self, right: impl Into<Expr>) -> Expr {
        self.compare(ComparisonOperator::Gte, right)
    }

    pub fn like(self, pattern: impl Into<Expr>) -> Expr {
        self.compare(ComparisonOperator::Like, pattern)
    }

    pub fn not_like(self, pattern: impl Into<Expr>) -> Expr {
        self.compare(ComparisonOperator::NotLike, pattern)
    }

    /// `IN (v1, v2, ...)`
    pub fn in_list<I>(self, values: I) -> Expr
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        Expr::In {
            expr: Box::new(self),
            list: InList::Values(values.into_iter().map(val).collect()),
            negated: false,
        }
    }

    /// `NOT IN (v1, v2, ...)`
    pub fn not_in<I>(self, values: I) -> Expr
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        match self.in_list(values) {
            Expr::In { expr, list, .. } => Expr::In {
                expr,
                list,
                negated: true,
            },
            other => other,
        }
    }

    /// `IN (subquery)`
    pub fn in_query(self, query: Query) -> Expr {
        Expr::In {
            expr: Box::new(self),
            list: InList::Query(Box::new(query)),
            negated: false,
        }
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

    pub fn not(self) -> Expr {
        Expr::Not(Box::new(self))
    }

    /// Combine with AND, flattening into an existing AND
    pub fn and(self, other: impl Into<Expr>) -> Expr {
        self.combine(Conjunction::And, other.into())
    }

    /// Combine with OR, flattening into an existing OR
    pub fn or(self, other: impl Into<Expr>) -> Expr {
        self.combine(Conjunction::Or, other.into())
    }

    pub(crate) fn combine(self, with: Conjunction, other: Expr) -> Expr {
        match self {
            Expr::Conjunction {
                conjunction,
                mut parts,
            } if conjunction == with => {
                parts.push(other);
                Expr::Conjunction { conjunction, parts }
            }
            this => Expr::Conjunction {
                conjunction: with,
                parts: vec![this, other],
            },
        }
    }

    /// Turn a function call into a window function
    pub fn over(self, window: WindowExpression) -> Expr {
        match self {
            Expr::Function { name, args, .. } => Expr::Function {
                name,
                args,
                over: Some(window),
            },
            other => other,
        }
    }

    /// Fill in missing value types from a type map.
    ///
    /// A value compared against a column binds as that column's type unless
    /// it already carries a type.
    pub fn apply_types(&mut self, types: &TypeMap) {
        match self {
            Expr::Comparison { left, right, .. } => {
                if let Expr::Column(column) = left.as_ref() {
                    fill_type(right, types.type_for(column));
                }
                left.apply_types(types);
                right.apply_types(types);
            }
            Expr::In { expr, list, .. } => {
                if let (Expr::Column(column), InList::Values(values)) = (expr.as_ref(), &mut *list) {
                    let ty = types.type_for(column);
                    for value in values.iter_mut() {
                        fill_type(value, ty);
                    }
                }
            }
            Expr::Between { expr, low, high } => {
                if let Expr::Column(column) = expr.as_ref() {
                    let ty = types.type_for(column);
                    fill_type(low, ty);
                    fill_type(high, ty);
                }
            }
            Expr::Not(inner) => inner.apply_types(types),
            Expr::Conjunction { parts, .. } => {
                for part in parts.iter_mut() {
                    part.apply_types(types);
                }
            }
            _ => {}
        }
    }
}

fn fill_type(expr: &mut Expr, ty: Option<&str>) {
    if let (Expr::Value { ty: slot @ None, .. }, Some(ty)) = (expr, ty) {
        *slot = Some(ty.to_string());
    }
}

impl From<Value> for Expr {
    fn from(value: Value) -> Self {
        val(value)
    }
}

impl From<bool> for Expr {
    fn from(value: bool) -> Self {
        val(value)
    }
}

impl From<i32> for Expr {
    fn from(value: i32) -> Self {
        val(value)
    }
}

impl From<i64> for Expr {
    fn from(value: i64) -> Self {
        val(value)
    }
}

impl From<f64> for Expr {
    fn from(value: f64) -> Self {
        val(value)
    }
}

impl From<&str> for Expr {
    fn from(value: &str) -> Self {
        val(value)
    }
}

impl From<String> for Expr {
    fn from(value: String) -> Self {
        val(value)
    }
}

impl From<Query> for Expr {
    fn from(query: Query) -> Self {
        Expr::Subquery(Box::new(query))
    }
}
