//! DML (Data Manipulation Language) support.
//!
//! Types and builders for INSERT, UPDATE and DELETE statements across
//! dialects. Column references inside DML are unqualified; anything that
//! needs a join is expressed as a `pk IN (SELECT ...)` filter.
//!
//! # Examples
//!
//! ```ignore
//! use quarry::sql::dml::{Insert, Update, Delete};
//! use quarry::sql::expr::{col, param};
//!
//! let insert = Insert::into("entry")
//!     .columns(["headline", "rating"])
//!     .values([param("hello"), param(5)]);
//!
//! let update = Update::table("entry")
//!     .set("rating", param(1))
//!     .filter(col("id").eq(param(7)));
//!
//! let delete = Delete::from("entry").filter(col("rating").eq(param(0)));
//! ```

use super::dialect::{Dialect, SqlDialect};
use super::expr::{Expr, ExprExt};
use super::token::{Rendered, Token, TokenStream};

// ============================================================================
// INSERT
// ============================================================================

/// Single-row INSERT statement.
#[derive(Debug, Clone)]
#[must_use = "DML statements have no effect until rendered"]
pub struct Insert {
    pub table: String,
    pub columns: Vec<String>,
    pub values: Vec<Expr>,
    pub returning: Vec<String>,
}

impl Insert {
    /// Create a new INSERT statement.
    pub fn into(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            columns: Vec::new(),
            values: Vec::new(),
            returning: Vec::new(),
        }
    }

    /// Set the columns to insert.
    pub fn columns(mut self, cols: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.columns = cols.into_iter().map(|c| c.into()).collect();
        self
    }

    /// Set the row of values.
    pub fn values(mut self, vals: impl IntoIterator<Item = impl Into<Expr>>) -> Self {
        self.values = vals.into_iter().map(|v| v.into()).collect();
        self
    }

    /// Add RETURNING columns. Ignored by dialects without RETURNING.
    pub fn returning(mut self, cols: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.returning = cols.into_iter().map(|c| c.into()).collect();
        self
    }

    pub fn render(&self, dialect: Dialect) -> Rendered {
        self.to_tokens(dialect).render(dialect)
    }

    /// Convert to token stream.
    pub fn to_tokens(&self, dialect: Dialect) -> TokenStream {
        let mut ts = TokenStream::new();

        ts.push(Token::Insert).space().push(Token::Into).space();
        ts.push(Token::Ident(self.table.clone()));

        if self.columns.is_empty() {
            ts.space().push(Token::DefaultValues);
        } else {
            ts.space().lparen();
            for (i, col) in self.columns.iter().enumerate() {
                if i > 0 {
                    ts.comma().space();
                }
                ts.push(Token::Ident(col.clone()));
            }
            ts.rparen();

            ts.space().push(Token::Values).space().lparen();
            for (i, val) in self.values.iter().enumerate() {
                if i > 0 {
                    ts.comma().space();
                }
                ts.append(&val.to_tokens(dialect));
            }
            ts.rparen();
        }

        emit_returning(&mut ts, &self.returning, dialect);
        ts
    }
}

// ============================================================================
// UPDATE
// ============================================================================

/// UPDATE statement.
#[derive(Debug, Clone)]
#[must_use = "DML statements have no effect until rendered"]
pub struct Update {
    pub table: String,
    pub assignments: Vec<(String, Expr)>,
    pub where_clause: Option<Expr>,
}

impl Update {
    /// Create a new UPDATE statement.
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            assignments: Vec::new(),
            where_clause: None,
        }
    }

    /// Add a SET assignment.
    pub fn set(mut self, column: impl Into<String>, value: impl Into<Expr>) -> Self {
        self.assignments.push((column.into(), value.into()));
        self
    }

    /// Add a WHERE condition (ANDed with existing conditions).
    pub fn filter(mut self, expr: Expr) -> Self {
        self.where_clause = Some(match self.where_clause {
            Some(existing) => existing.and(expr),
            None => expr,
        });
        self
    }

    pub fn render(&self, dialect: Dialect) -> Rendered {
        self.to_tokens(dialect).render(dialect)
    }

    /// Convert to token stream.
    pub fn to_tokens(&self, dialect: Dialect) -> TokenStream {
        let mut ts = TokenStream::new();

        ts.push(Token::Update).space();
        ts.push(Token::Ident(self.table.clone()));

        ts.space().push(Token::Set).space();
        for (i, (col, val)) in self.assignments.iter().enumerate() {
            if i > 0 {
                ts.comma().space();
            }
            ts.push(Token::Ident(col.clone()))
                .space()
                .push(Token::Eq)
                .space()
                .append(&val.to_tokens(dialect));
        }

        if let Some(ref where_expr) = self.where_clause {
            ts.space().push(Token::Where).space();
            ts.append(&where_expr.to_tokens(dialect));
        }

        ts
    }
}

// ============================================================================
// DELETE
// ============================================================================

/// DELETE statement.
#[derive(Debug, Clone)]
#[must_use = "DML statements have no effect until rendered"]
pub struct Delete {
    pub table: String,
    pub where_clause: Option<Expr>,
}

impl Delete {
    /// Create a new DELETE statement.
    pub fn from(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            where_clause: None,
        }
    }

    /// Add a WHERE condition (ANDed with existing conditions).
    pub fn filter(mut self, expr: Expr) -> Self {
        self.where_clause = Some(match self.where_clause {
            Some(existing) => existing.and(expr),
            None => expr,
        });
        self
    }

    pub fn render(&self, dialect: Dialect) -> Rendered {
        self.to_tokens(dialect).render(dialect)
    }

    /// Convert to token stream.
    pub fn to_tokens(&self, dialect: Dialect) -> TokenStream {
        let mut ts = TokenStream::new();

        ts.push(Token::Delete).space().push(Token::From).space();
        ts.push(Token::Ident(self.table.clone()));

        if let Some(ref where_expr) = self.where_clause {
            ts.space().push(Token::Where).space();
            ts.append(&where_expr.to_tokens(dialect));
        }

        ts
    }
}

fn emit_returning(ts: &mut TokenStream, cols: &[String], dialect: Dialect) {
    if cols.is_empty() || !dialect.supports_returning() {
        return;
    }
    ts.space().push(Token::Returning).space();
    for (i, col) in cols.iter().enumerate() {
        if i > 0 {
            ts.comma().space();
        }
        ts.push(Token::Ident(col.clone()));
    }
}

// ============================================================================
// Tests
// ============================================================================
