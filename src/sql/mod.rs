//! SQL generation module.
//!
//! A type-safe SQL builder that renders multi-dialect, parameterized SQL:
//!
//! - [`query`] - SELECT query builder
//! - [`expr`] - SQL expression AST
//! - [`dml`] - INSERT, UPDATE, DELETE
//! - [`token`] - Token types and placeholder numbering
//! - [`dialect`] - SQL dialect implementations

pub mod dialect;
pub mod dml;
pub mod expr;
pub mod query;
pub mod token;

#[cfg(test)]
pub mod test_utils;

pub use dialect::{Dialect, SqlDialect};
pub use dml::{Delete, Insert, Update};
pub use expr::{BinaryOperator, Expr, ExprExt, UnaryOperator};
pub use query::{FromItem, Join, JoinType, LimitOffset, OrderByExpr, Query, SelectExpr, SortDir, TableRef};
pub use token::{Rendered, Token, TokenStream};
