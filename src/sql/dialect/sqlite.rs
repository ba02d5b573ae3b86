//! SQLite dialect.
//!
//! SQLite differences from ANSI:
//! - Booleans are integers (1/0)
//! - OFFSET is only valid after LIMIT (`LIMIT -1` means unbounded)
//! - RETURNING supported since 3.35

use super::helpers;
use super::SqlDialect;
use crate::sql::token::{Token, TokenStream};

/// SQLite dialect.
#[derive(Debug, Clone, Copy)]
pub struct Sqlite;

impl SqlDialect for Sqlite {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn quote_identifier(&self, ident: &str) -> String {
        helpers::quote_double(ident)
    }

    fn format_bool(&self, b: bool) -> &'static str {
        helpers::format_bool_numeric(b)
    }

    fn emit_limit_offset(&self, limit: Option<u64>, offset: Option<u64>) -> TokenStream {
        helpers::emit_limit_offset_required_limit(limit, offset, Token::LitInt(-1))
    }
}
