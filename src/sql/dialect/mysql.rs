//! MySQL SQL dialect.
//!
//! MySQL differences from ANSI:
//! - Backtick identifier quoting (`` `name` ``)
//! - Boolean is TINYINT(1), returns 1/0
//! - `||` is logical OR by default (use CONCAT())
//! - OFFSET requires a LIMIT
//! - No RETURNING clause

use super::helpers;
use super::SqlDialect;
use crate::sql::token::{Token, TokenStream};

/// MySQL SQL dialect.
#[derive(Debug, Clone, Copy)]
pub struct MySql;

impl SqlDialect for MySql {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn quote_identifier(&self, ident: &str) -> String {
        helpers::quote_backtick(ident)
    }

    fn format_bool(&self, b: bool) -> &'static str {
        helpers::format_bool_numeric(b)
    }

    fn emit_limit_offset(&self, limit: Option<u64>, offset: Option<u64>) -> TokenStream {
        // MySQL's documented idiom for "all remaining rows".
        helpers::emit_limit_offset_required_limit(limit, offset, Token::LitUInt(u64::MAX))
    }

    fn supports_concat_operator(&self) -> bool {
        false
    }

    fn supports_returning(&self) -> bool {
        false
    }
}
