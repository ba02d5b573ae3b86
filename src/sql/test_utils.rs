//! Test utilities for SQL emission validation.
//!
//! Validates emitted SQL with sqlparser-rs so every statement the compiler
//! produces is known to parse in its target dialect.

use sqlparser::dialect::{
    DuckDbDialect, MsSqlDialect, MySqlDialect, PostgreSqlDialect, SQLiteDialect,
};
use sqlparser::parser::Parser;

use super::dialect::Dialect;

/// Validates that a SQL string is syntactically valid for the given dialect.
///
/// ```ignore
/// use quarry::sql::test_utils::validate_sql;
/// use quarry::sql::dialect::Dialect;
///
/// validate_sql("SELECT * FROM entry", Dialect::Postgres).unwrap();
/// ```
pub fn validate_sql(sql: &str, dialect: Dialect) -> Result<(), String> {
    let parser_dialect: Box<dyn sqlparser::dialect::Dialect> = match dialect {
        Dialect::Sqlite => Box::new(SQLiteDialect {}),
        Dialect::Postgres => Box::new(PostgreSqlDialect {}),
        Dialect::DuckDb => Box::new(DuckDbDialect {}),
        Dialect::MySql => Box::new(MySqlDialect {}),
        Dialect::TSql => Box::new(MsSqlDialect {}),
    };

    Parser::parse_sql(&*parser_dialect, sql)
        .map(|_| ())
        .map_err(|e| format!("Invalid SQL for {:?}: {}\nSQL: {}", dialect, e, sql))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_valid_sql() {
        validate_sql("SELECT * FROM entry", Dialect::Postgres).unwrap();
        validate_sql("SELECT * FROM entry WHERE id = ?", Dialect::Sqlite).unwrap();
        validate_sql("SELECT * FROM entry", Dialect::DuckDb).unwrap();
    }

    #[test]
    fn test_validate_invalid_sql() {
        let result = validate_sql("SELEC * FORM entry", Dialect::Postgres);
        assert!(result.is_err());
    }
}
