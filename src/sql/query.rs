//! Query builder - construct SELECT statements with a fluent API.

use super::dialect::{Dialect, SqlDialect};
use super::expr::{Expr, ExprExt};
use super::token::{Rendered, Token, TokenStream};

// =============================================================================
// Select Expression (column with optional alias)
// =============================================================================

/// A SELECT list item: expression with optional alias.
#[derive(Debug, Clone, PartialEq)]
#[must_use = "builders have no effect until used"]
pub struct SelectExpr {
    pub expr: Expr,
    pub alias: Option<String>,
}

impl SelectExpr {
    pub fn new(expr: Expr) -> Self {
        Self { expr, alias: None }
    }

    pub fn with_alias(mut self, alias: &str) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn to_tokens(&self, dialect: Dialect) -> TokenStream {
        let mut ts = self.expr.to_tokens(dialect);
        if let Some(alias) = &self.alias {
            ts.space()
                .push(Token::As)
                .space()
                .push(Token::Ident(alias.clone()));
        }
        ts
    }
}

impl From<Expr> for SelectExpr {
    fn from(expr: Expr) -> Self {
        SelectExpr::new(expr)
    }
}

// =============================================================================
// Table Reference
// =============================================================================

/// A table reference with optional alias.
#[derive(Debug, Clone, PartialEq)]
#[must_use = "builders have no effect until used"]
pub struct TableRef {
    pub table: String,
    pub alias: Option<String>,
}

impl TableRef {
    pub fn new(table: &str) -> Self {
        Self {
            table: table.into(),
            alias: None,
        }
    }

    pub fn with_alias(mut self, alias: &str) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn to_tokens(&self) -> TokenStream {
        let mut ts = TokenStream::new();
        ts.push(Token::Ident(self.table.clone()));
        if let Some(alias) = &self.alias {
            ts.space()
                .push(Token::As)
                .space()
                .push(Token::Ident(alias.clone()));
        }
        ts
    }
}

/// Source of a FROM clause.
#[derive(Debug, Clone, PartialEq)]
pub enum FromItem {
    Table(TableRef),
    /// `(SELECT ...) AS alias`
    Derived { query: Box<Query>, alias: String },
}

impl FromItem {
    pub fn to_tokens(&self, dialect: Dialect) -> TokenStream {
        match self {
            FromItem::Table(table) => table.to_tokens(),
            FromItem::Derived { query, alias } => {
                let mut ts = TokenStream::new();
                ts.lparen()
                    .append(&query.to_tokens(dialect))
                    .rparen()
                    .space()
                    .push(Token::As)
                    .space()
                    .push(Token::Ident(alias.clone()));
                ts
            }
        }
    }
}

impl From<TableRef> for FromItem {
    fn from(table: TableRef) -> Self {
        FromItem::Table(table)
    }
}

// =============================================================================
// Joins
// =============================================================================

/// Type of join.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JoinType {
    Inner,
    Left,
}

/// A JOIN clause.
#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub join_type: JoinType,
    pub table: TableRef,
    pub on: Expr,
}

impl Join {
    pub fn to_tokens(&self, dialect: Dialect) -> TokenStream {
        let mut ts = TokenStream::new();

        match self.join_type {
            JoinType::Inner => ts.push(Token::Inner),
            JoinType::Left => ts.push(Token::Left).space().push(Token::Outer),
        };

        ts.space().push(Token::Join).space();
        ts.append(&self.table.to_tokens());
        ts.space().push(Token::On).space();
        ts.append(&self.on.to_tokens(dialect));

        ts
    }
}

// =============================================================================
// ORDER BY
// =============================================================================

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDir {
    #[default]
    Asc,
    Desc,
}

/// An ORDER BY expression.
#[derive(Debug, Clone, PartialEq)]
#[must_use = "builders have no effect until used"]
pub struct OrderByExpr {
    pub expr: Expr,
    pub dir: Option<SortDir>,
}

impl OrderByExpr {
    pub fn asc(expr: Expr) -> Self {
        Self {
            expr,
            dir: Some(SortDir::Asc),
        }
    }

    pub fn desc(expr: Expr) -> Self {
        Self {
            expr,
            dir: Some(SortDir::Desc),
        }
    }

    pub fn to_tokens(&self, dialect: Dialect) -> TokenStream {
        let mut ts = self.expr.to_tokens(dialect);

        if let Some(dir) = &self.dir {
            ts.space().push(match dir {
                SortDir::Asc => Token::Asc,
                SortDir::Desc => Token::Desc,
            });
        }

        ts
    }
}

// =============================================================================
// LIMIT / OFFSET
// =============================================================================

/// LIMIT and OFFSET clause.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LimitOffset {
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl LimitOffset {
    /// Delegates to `SqlDialect::emit_limit_offset()` for the actual formatting.
    pub fn to_tokens(&self, dialect: Dialect) -> TokenStream {
        dialect.emit_limit_offset(self.limit, self.offset)
    }
}

// =============================================================================
// Query Builder
// =============================================================================

/// A SELECT query.
#[derive(Debug, Clone, Default, PartialEq)]
#[must_use = "Query has no effect until converted to SQL with render() or to_tokens()"]
pub struct Query {
    pub select: Vec<SelectExpr>,
    pub distinct: bool,
    pub from: Option<FromItem>,
    pub joins: Vec<Join>,
    pub where_clause: Option<Expr>,
    pub group_by: Vec<Expr>,
    pub having: Option<Expr>,
    pub order_by: Vec<OrderByExpr>,
    pub limit_offset: Option<LimitOffset>,
}

impl Query {
    /// Create a new empty query.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the SELECT list.
    pub fn select(mut self, exprs: Vec<impl Into<SelectExpr>>) -> Self {
        self.select = exprs.into_iter().map(|e| e.into()).collect();
        self
    }

    /// Add DISTINCT.
    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    /// Set the FROM source.
    pub fn from(mut self, source: impl Into<FromItem>) -> Self {
        self.from = Some(source.into());
        self
    }

    /// Add a JOIN.
    pub fn join(mut self, join_type: JoinType, table: TableRef, on: Expr) -> Self {
        self.joins.push(Join {
            join_type,
            table,
            on,
        });
        self
    }

    /// Add a WHERE condition (ANDed with existing conditions).
    pub fn filter(mut self, condition: Expr) -> Self {
        self.where_clause = Some(match self.where_clause {
            Some(existing) => existing.and(condition),
            None => condition,
        });
        self
    }

    /// Set the GROUP BY clause.
    pub fn group_by(mut self, exprs: Vec<Expr>) -> Self {
        self.group_by = exprs;
        self
    }

    /// Add a HAVING condition (ANDed with existing conditions).
    pub fn having(mut self, condition: Expr) -> Self {
        self.having = Some(match self.having {
            Some(existing) => existing.and(condition),
            None => condition,
        });
        self
    }

    /// Set the ORDER BY clause.
    pub fn order_by(mut self, exprs: Vec<OrderByExpr>) -> Self {
        self.order_by = exprs;
        self
    }

    /// Set LIMIT.
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit_offset.get_or_insert_with(Default::default).limit = Some(limit);
        self
    }

    /// Set OFFSET.
    pub fn offset(mut self, offset: u64) -> Self {
        self.limit_offset.get_or_insert_with(Default::default).offset = Some(offset);
        self
    }

    /// Convert to token stream for a specific dialect.
    pub fn to_tokens(&self, dialect: Dialect) -> TokenStream {
        let mut ts = TokenStream::new();

        // SELECT
        ts.push(Token::Select);
        if self.distinct {
            ts.space().push(Token::Distinct);
        }

        // Columns
        for (i, select_expr) in self.select.iter().enumerate() {
            if i == 0 {
                ts.space();
            } else {
                ts.comma().space();
            }
            ts.append(&select_expr.to_tokens(dialect));
        }

        // FROM
        if let Some(from) = &self.from {
            ts.newline().push(Token::From).space();
            ts.append(&from.to_tokens(dialect));
        }

        // JOINs
        for join in &self.joins {
            ts.newline();
            ts.append(&join.to_tokens(dialect));
        }

        // WHERE
        if let Some(where_clause) = &self.where_clause {
            ts.newline().push(Token::Where).space();
            ts.append(&where_clause.to_tokens(dialect));
        }

        // GROUP BY
        if !self.group_by.is_empty() {
            ts.newline().push(Token::GroupBy).space();
            for (i, expr) in self.group_by.iter().enumerate() {
                if i > 0 {
                    ts.comma().space();
                }
                ts.append(&expr.to_tokens(dialect));
            }
        }

        // HAVING
        if let Some(having) = &self.having {
            ts.newline().push(Token::Having).space();
            ts.append(&having.to_tokens(dialect));
        }

        // ORDER BY
        // T-SQL needs an ORDER BY for OFFSET FETCH; `(SELECT NULL)` keeps the
        // statement valid without imposing an order.
        let needs_order_by_placeholder = dialect.requires_order_by_for_offset()
            && self.order_by.is_empty()
            && self.limit_offset.is_some();

        if !self.order_by.is_empty() {
            ts.newline().push(Token::OrderBy).space();
            for (i, order_expr) in self.order_by.iter().enumerate() {
                if i > 0 {
                    ts.comma().space();
                }
                ts.append(&order_expr.to_tokens(dialect));
            }
        } else if needs_order_by_placeholder {
            ts.newline()
                .push(Token::OrderBy)
                .space()
                .lparen()
                .push(Token::Select)
                .space()
                .push(Token::Null)
                .rparen();
        }

        // LIMIT / OFFSET
        if let Some(lo) = &self.limit_offset {
            ts.newline();
            ts.append(&lo.to_tokens(dialect));
        }

        ts
    }

    /// Render SQL text and bound parameters for a specific dialect.
    pub fn render(&self, dialect: Dialect) -> Rendered {
        self.to_tokens(dialect).render(dialect)
    }

    /// Generate SQL string for a specific dialect.
    pub fn to_sql(&self, dialect: Dialect) -> String {
        self.render(dialect).sql
    }
}

impl std::fmt::Display for Query {
    /// Formats the query using the default dialect.
    ///
    /// For dialect-specific SQL, use [`Query::to_sql`] instead.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_sql(Dialect::default()))
    }
}

// =============================================================================
// Tests
// =============================================================================
