//! T-SQL (SQL Server / Azure SQL) dialect.
//!
//! T-SQL differences from ANSI:
//! - Square bracket identifier quoting (`[name]`)
//! - Named placeholders (`@p1`, `@p2`, ...)
//! - OFFSET FETCH for pagination (requires ORDER BY)
//! - OUTPUT instead of RETURNING
//! - String concatenation with `+`

use super::helpers;
use super::SqlDialect;
use crate::sql::token::TokenStream;

/// T-SQL (SQL Server) dialect.
#[derive(Debug, Clone, Copy)]
pub struct TSql;

impl SqlDialect for TSql {
    fn name(&self) -> &'static str {
        "tsql"
    }

    fn quote_identifier(&self, ident: &str) -> String {
        helpers::quote_bracket(ident)
    }

    fn format_bool(&self, b: bool) -> &'static str {
        helpers::format_bool_numeric(b)
    }

    fn placeholder(&self, n: usize) -> String {
        helpers::placeholder_named(n)
    }

    fn emit_limit_offset(&self, limit: Option<u64>, offset: Option<u64>) -> TokenStream {
        helpers::emit_limit_offset_tsql(limit, offset)
    }

    fn requires_order_by_for_offset(&self) -> bool {
        true
    }

    fn concat_operator(&self) -> &'static str {
        "+"
    }

    fn supports_returning(&self) -> bool {
        false
    }
}
