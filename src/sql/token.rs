//! SQL Tokens - the atomic units of SQL output.
//!
//! Tokens are dialect-agnostic representations that serialize
//! to dialect-specific strings. Bound values travel through the stream as
//! [`Token::Param`] so placeholder numbering always follows textual order.

use super::dialect::{Dialect, SqlDialect};
use crate::expr::Value;

/// SQL Token - every possible element in a SQL statement.
///
/// Adding a new variant here will cause compile errors everywhere
/// it needs to be handled (exhaustive matching).
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // === Keywords ===
    Select,
    From,
    Where,
    And,
    Or,
    Not,
    As,
    On,
    Join,
    Inner,
    Left,
    Outer,
    GroupBy,
    Having,
    OrderBy,
    Asc,
    Desc,
    Limit,
    Offset,
    Fetch,
    Next,
    Rows,
    Only,
    Case,
    When,
    Then,
    Else,
    End,
    In,
    Like,
    IsNull,
    IsNotNull,
    Exists,
    Distinct,
    Null,

    // === DML Keywords ===
    Insert,
    Into,
    Values,
    DefaultValues,
    Update,
    Set,
    Delete,
    Returning,

    // === Punctuation ===
    Comma,
    Dot,
    Star,
    LParen,
    RParen,

    // === Operators ===
    Eq,
    Ne,
    Lt,
    Gt,
    Lte,
    Gte,
    Plus,
    Minus,
    Mul,
    Div,
    Concat,

    // === Whitespace / Formatting ===
    Space,
    Newline,

    // === Dynamic Content ===
    /// Simple identifier (table, column, alias)
    Ident(String),
    /// Integer literal
    LitInt(i64),
    /// Unsigned integer literal (pagination bounds beyond i64)
    LitUInt(u64),
    /// Boolean literal
    LitBool(bool),
    /// Bound parameter. Rendered as the dialect's positional placeholder.
    Param(Value),

    /// Function name, rendered upper-case.
    FunctionName(String),
}

impl Token {
    /// Serialize this token to a string for the given dialect.
    ///
    /// A standalone [`Token::Param`] renders as the first placeholder; use
    /// [`TokenStream::render`] to number parameters across a statement.
    pub fn serialize(&self, dialect: Dialect) -> String {
        match self {
            // Keywords
            Token::Select => "SELECT".into(),
            Token::From => "FROM".into(),
            Token::Where => "WHERE".into(),
            Token::And => "AND".into(),
            Token::Or => "OR".into(),
            Token::Not => "NOT".into(),
            Token::As => "AS".into(),
            Token::On => "ON".into(),
            Token::Join => "JOIN".into(),
            Token::Inner => "INNER".into(),
            Token::Left => "LEFT".into(),
            Token::Outer => "OUTER".into(),
            Token::GroupBy => "GROUP BY".into(),
            Token::Having => "HAVING".into(),
            Token::OrderBy => "ORDER BY".into(),
            Token::Asc => "ASC".into(),
            Token::Desc => "DESC".into(),
            Token::Limit => "LIMIT".into(),
            Token::Offset => "OFFSET".into(),
            Token::Fetch => "FETCH".into(),
            Token::Next => "NEXT".into(),
            Token::Rows => "ROWS".into(),
            Token::Only => "ONLY".into(),
            Token::Case => "CASE".into(),
            Token::When => "WHEN".into(),
            Token::Then => "THEN".into(),
            Token::Else => "ELSE".into(),
            Token::End => "END".into(),
            Token::In => "IN".into(),
            Token::Like => "LIKE".into(),
            Token::IsNull => "IS NULL".into(),
            Token::IsNotNull => "IS NOT NULL".into(),
            Token::Exists => "EXISTS".into(),
            Token::Distinct => "DISTINCT".into(),
            Token::Null => "NULL".into(),

            // DML keywords
            Token::Insert => "INSERT".into(),
            Token::Into => "INTO".into(),
            Token::Values => "VALUES".into(),
            Token::DefaultValues => "DEFAULT VALUES".into(),
            Token::Update => "UPDATE".into(),
            Token::Set => "SET".into(),
            Token::Delete => "DELETE".into(),
            Token::Returning => "RETURNING".into(),

            // Punctuation
            Token::Comma => ",".into(),
            Token::Dot => ".".into(),
            Token::Star => "*".into(),
            Token::LParen => "(".into(),
            Token::RParen => ")".into(),

            // Operators
            Token::Eq => "=".into(),
            Token::Ne => "<>".into(),
            Token::Lt => "<".into(),
            Token::Gt => ">".into(),
            Token::Lte => "<=".into(),
            Token::Gte => ">=".into(),
            Token::Plus => "+".into(),
            Token::Minus => "-".into(),
            Token::Mul => "*".into(),
            Token::Div => "/".into(),
            Token::Concat => dialect.concat_operator().into(),

            // Whitespace
            Token::Space => " ".into(),
            Token::Newline => "\n".into(),

            // Dynamic - dialect-specific formatting
            Token::Ident(name) => dialect.quote_identifier(name),
            Token::LitInt(n) => n.to_string(),
            Token::LitUInt(n) => n.to_string(),
            Token::LitBool(b) => dialect.format_bool(*b).into(),
            Token::Param(_) => dialect.placeholder(1),

            Token::FunctionName(name) => name.to_uppercase(),
        }
    }
}

/// Statement text plus the values bound to its placeholders, in order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Rendered {
    pub sql: String,
    pub params: Vec<Value>,
}

/// A stream of tokens that can be serialized to SQL.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TokenStream {
    tokens: Vec<Token>,
}

impl TokenStream {
    /// Create an empty token stream.
    pub fn new() -> Self {
        Self { tokens: vec![] }
    }

    /// Push a single token.
    pub fn push(&mut self, token: Token) -> &mut Self {
        self.tokens.push(token);
        self
    }

    /// Extend with multiple tokens.
    pub fn extend(&mut self, tokens: impl IntoIterator<Item = Token>) -> &mut Self {
        self.tokens.extend(tokens);
        self
    }

    /// Append another token stream.
    pub fn append(&mut self, other: &TokenStream) -> &mut Self {
        self.tokens.extend(other.tokens.iter().cloned());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Render to SQL text, numbering placeholders left to right and
    /// collecting their values in the same order.
    pub fn render(&self, dialect: Dialect) -> Rendered {
        let mut sql = String::new();
        let mut params = Vec::new();
        for token in &self.tokens {
            match token {
                Token::Param(value) => {
                    params.push(value.clone());
                    sql.push_str(&dialect.placeholder(params.len()));
                }
                other => sql.push_str(&other.serialize(dialect)),
            }
        }
        Rendered { sql, params }
    }

    /// Serialize all tokens to a SQL string.
    pub fn serialize(&self, dialect: Dialect) -> String {
        self.render(dialect).sql
    }

    // Convenience methods for common tokens
    pub fn space(&mut self) -> &mut Self {
        self.push(Token::Space)
    }
    pub fn newline(&mut self) -> &mut Self {
        self.push(Token::Newline)
    }
    pub fn comma(&mut self) -> &mut Self {
        self.push(Token::Comma)
    }
    pub fn lparen(&mut self) -> &mut Self {
        self.push(Token::LParen)
    }
    pub fn rparen(&mut self) -> &mut Self {
        self.push(Token::RParen)
    }
}
