//! Shared helper functions for SQL dialect implementations.
//!
//! Dialects compose these building blocks to implement `SqlDialect`
//! with minimal duplication.

use super::super::token::{Token, TokenStream};

// =============================================================================
// Identifier Quoting
// =============================================================================

/// Quote identifier with double quotes (ANSI style).
/// Used by: SQLite, Postgres, DuckDB
pub fn quote_double(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Quote identifier with backticks.
/// Used by: MySQL
pub fn quote_backtick(ident: &str) -> String {
    format!("`{}`", ident.replace('`', "``"))
}

/// Quote identifier with square brackets.
/// Used by: T-SQL
pub fn quote_bracket(ident: &str) -> String {
    format!("[{}]", ident.replace(']', "]]"))
}

// =============================================================================
// Boolean Formatting
// =============================================================================

/// Format boolean as literal true/false.
/// Used by: Postgres, DuckDB
pub fn format_bool_literal(b: bool) -> &'static str {
    if b {
        "true"
    } else {
        "false"
    }
}

/// Format boolean as numeric 1/0.
/// Used by: SQLite, T-SQL, MySQL
pub fn format_bool_numeric(b: bool) -> &'static str {
    if b {
        "1"
    } else {
        "0"
    }
}

// =============================================================================
// Placeholders
// =============================================================================

/// `$1`, `$2`, ...
pub fn placeholder_dollar(n: usize) -> String {
    format!("${}", n)
}

/// `@p1`, `@p2`, ...
pub fn placeholder_named(n: usize) -> String {
    format!("@p{}", n)
}

// =============================================================================
// Pagination
// =============================================================================

/// Emit LIMIT ... OFFSET ... (standard SQL).
/// Used by: Postgres, DuckDB
pub fn emit_limit_offset_standard(limit: Option<u64>, offset: Option<u64>) -> TokenStream {
    let mut ts = TokenStream::new();

    if let Some(lim) = limit {
        ts.push(Token::Limit)
            .space()
            .push(Token::LitInt(lim as i64));
    }

    if let Some(off) = offset {
        if limit.is_some() {
            ts.space();
        }
        ts.push(Token::Offset)
            .space()
            .push(Token::LitInt(off as i64));
    }

    ts
}

/// Emit LIMIT/OFFSET for engines whose grammar only accepts OFFSET after a
/// LIMIT. A bare offset gets `sentinel` as its limit.
/// Used by: SQLite (`-1`), MySQL (max u64)
pub fn emit_limit_offset_required_limit(
    limit: Option<u64>,
    offset: Option<u64>,
    sentinel: Token,
) -> TokenStream {
    let mut ts = TokenStream::new();
    match (limit, offset) {
        (None, Some(off)) => {
            ts.push(Token::Limit)
                .space()
                .push(sentinel)
                .space()
                .push(Token::Offset)
                .space()
                .push(Token::LitInt(off as i64));
        }
        (limit, offset) => {
            ts.append(&emit_limit_offset_standard(limit, offset));
        }
    }
    ts
}

/// Emit OFFSET ... ROWS FETCH NEXT ... ROWS ONLY (T-SQL style).
/// Note: Requires ORDER BY clause in T-SQL
pub fn emit_limit_offset_tsql(limit: Option<u64>, offset: Option<u64>) -> TokenStream {
    let mut ts = TokenStream::new();

    let off = offset.unwrap_or(0);
    ts.push(Token::Offset)
        .space()
        .push(Token::LitInt(off as i64))
        .space()
        .push(Token::Rows);

    if let Some(lim) = limit {
        ts.space()
            .push(Token::Fetch)
            .space()
            .push(Token::Next)
            .space()
            .push(Token::LitInt(lim as i64))
            .space()
            .push(Token::Rows)
            .space()
            .push(Token::Only);
    }

    ts
}
