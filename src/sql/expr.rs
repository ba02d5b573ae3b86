//! SQL expression AST - the target of expression compilation.
//!
//! This is a strongly-typed SQL expression tree with exhaustive pattern
//! matching enforced by the compiler. Values that come from user code are
//! carried as [`Expr::Param`] and never inlined into the statement text.

use super::dialect::{Dialect, SqlDialect};
use super::query::Query;
use super::token::{Token, TokenStream};
use crate::expr::Value;

// =============================================================================
// Expression AST
// =============================================================================

/// A SQL expression.
///
/// Every variant must be handled in `to_tokens()` - the compiler enforces this.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Column reference: optional_table.column
    Column {
        table: Option<String>,
        column: String,
    },

    /// Compiler-generated integer constant, rendered inline.
    Int(i64),

    /// Bound parameter.
    Param(Value),

    /// Binary operation: left op right
    BinaryOp {
        left: Box<Expr>,
        op: BinaryOperator,
        right: Box<Expr>,
    },

    /// Unary operation: op expr
    UnaryOp { op: UnaryOperator, expr: Box<Expr> },

    /// Function call: name(args...)
    Function {
        name: String,
        args: Vec<Expr>,
        distinct: bool,
    },

    /// CASE WHEN... THEN... ELSE... END
    Case {
        when_clauses: Vec<(Expr, Expr)>,
        else_clause: Option<Box<Expr>>,
    },

    /// Scalar subquery: (SELECT ...)
    Subquery(Box<Query>),

    /// EXISTS (SELECT ...)
    Exists { subquery: Box<Query>, negated: bool },

    /// IN: expr IN (values...)
    In {
        expr: Box<Expr>,
        values: Vec<Expr>,
        negated: bool,
    },

    /// IN subquery: expr IN (SELECT ...)
    InSubquery {
        expr: Box<Expr>,
        subquery: Box<Query>,
        negated: bool,
    },

    /// IS NULL / IS NOT NULL
    IsNull { expr: Box<Expr>, negated: bool },

    /// Wildcard: * or table.*
    Star { table: Option<String> },

    /// Parenthesized expression
    Paren(Box<Expr>),
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    // Comparison
    Eq,
    Ne,
    Lt,
    Gt,
    Lte,
    Gte,
    // Logical
    And,
    Or,
    // Arithmetic
    Plus,
    Minus,
    Mul,
    Div,
    // String
    Concat,
    Like,
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    Not,
}

// =============================================================================
// Expression to Tokens
// =============================================================================

impl Expr {
    /// Whether this expression needs parentheses when nested as an operand.
    fn is_compound(&self) -> bool {
        matches!(
            self,
            Expr::BinaryOp { .. } | Expr::In { .. } | Expr::InSubquery { .. } | Expr::IsNull { .. }
        )
    }

    fn operand_tokens(&self, dialect: Dialect) -> TokenStream {
        if self.is_compound() {
            let mut ts = TokenStream::new();
            ts.lparen().append(&self.to_tokens(dialect)).rparen();
            ts
        } else {
            self.to_tokens(dialect)
        }
    }

    /// Convert this expression to a token stream for a specific dialect.
    pub fn to_tokens(&self, dialect: Dialect) -> TokenStream {
        let mut ts = TokenStream::new();

        match self {
            Expr::Column { table, column } => {
                if let Some(t) = table {
                    ts.push(Token::Ident(t.clone()));
                    ts.push(Token::Dot);
                }
                ts.push(Token::Ident(column.clone()));
            }

            Expr::Int(n) => {
                ts.push(Token::LitInt(*n));
            }

            Expr::Param(Value::Null) => {
                ts.push(Token::Null);
            }

            Expr::Param(value) => {
                ts.push(Token::Param(value.clone()));
            }

            Expr::BinaryOp { left, op, right } => {
                // Dialects without `||` get CONCAT(left, right)
                if *op == BinaryOperator::Concat && !dialect.supports_concat_operator() {
                    ts.push(Token::FunctionName("CONCAT".into()));
                    ts.lparen();
                    ts.append(&left.to_tokens(dialect));
                    ts.comma().space();
                    ts.append(&right.to_tokens(dialect));
                    ts.rparen();
                } else {
                    ts.append(&left.operand_tokens(dialect));
                    ts.space();
                    ts.push(binary_op_to_token(*op));
                    ts.space();
                    ts.append(&right.operand_tokens(dialect));
                }
            }

            Expr::UnaryOp { op, expr } => {
                match op {
                    UnaryOperator::Not => ts.push(Token::Not).space(),
                };
                ts.append(&expr.operand_tokens(dialect));
            }

            Expr::Function {
                name,
                args,
                distinct,
            } => {
                ts.push(Token::FunctionName(name.clone()));
                ts.lparen();
                if *distinct {
                    ts.push(Token::Distinct).space();
                }
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        ts.comma().space();
                    }
                    ts.append(&arg.to_tokens(dialect));
                }
                ts.rparen();
            }

            Expr::Case {
                when_clauses,
                else_clause,
            } => {
                ts.push(Token::Case);
                for (when, then) in when_clauses {
                    ts.space().push(Token::When).space();
                    ts.append(&when.to_tokens(dialect));
                    ts.space().push(Token::Then).space();
                    ts.append(&then.to_tokens(dialect));
                }
                if let Some(else_expr) = else_clause {
                    ts.space().push(Token::Else).space();
                    ts.append(&else_expr.to_tokens(dialect));
                }
                ts.space().push(Token::End);
            }

            Expr::Subquery(query) => {
                ts.lparen();
                ts.append(&query.to_tokens(dialect));
                ts.rparen();
            }

            Expr::Exists { subquery, negated } => {
                if *negated {
                    ts.push(Token::Not).space();
                }
                ts.push(Token::Exists).space().lparen();
                ts.append(&subquery.to_tokens(dialect));
                ts.rparen();
            }

            Expr::In {
                expr,
                values,
                negated,
            } => {
                // "x IN ()" is invalid SQL: it is FALSE, and "x NOT IN ()" is TRUE
                if values.is_empty() {
                    ts.push(Token::LitBool(*negated));
                    ts.space()
                        .push(Token::Eq)
                        .space()
                        .push(Token::LitBool(true));
                } else {
                    ts.append(&expr.operand_tokens(dialect));
                    if *negated {
                        ts.space().push(Token::Not);
                    }
                    ts.space().push(Token::In).space().lparen();
                    for (i, val) in values.iter().enumerate() {
                        if i > 0 {
                            ts.comma().space();
                        }
                        ts.append(&val.to_tokens(dialect));
                    }
                    ts.rparen();
                }
            }

            Expr::InSubquery {
                expr,
                subquery,
                negated,
            } => {
                ts.append(&expr.operand_tokens(dialect));
                if *negated {
                    ts.space().push(Token::Not);
                }
                ts.space().push(Token::In).space().lparen();
                ts.append(&subquery.to_tokens(dialect));
                ts.rparen();
            }

            Expr::IsNull { expr, negated } => {
                ts.append(&expr.operand_tokens(dialect));
                ts.space();
                ts.push(if *negated {
                    Token::IsNotNull
                } else {
                    Token::IsNull
                });
            }

            Expr::Star { table } => {
                if let Some(t) = table {
                    ts.push(Token::Ident(t.clone()));
                    ts.push(Token::Dot);
                }
                ts.push(Token::Star);
            }

            Expr::Paren(inner) => {
                ts.lparen();
                ts.append(&inner.to_tokens(dialect));
                ts.rparen();
            }
        }

        ts
    }
}

fn binary_op_to_token(op: BinaryOperator) -> Token {
    match op {
        BinaryOperator::Eq => Token::Eq,
        BinaryOperator::Ne => Token::Ne,
        BinaryOperator::Lt => Token::Lt,
        BinaryOperator::Gt => Token::Gt,
        BinaryOperator::Lte => Token::Lte,
        BinaryOperator::Gte => Token::Gte,
        BinaryOperator::And => Token::And,
        BinaryOperator::Or => Token::Or,
        BinaryOperator::Plus => Token::Plus,
        BinaryOperator::Minus => Token::Minus,
        BinaryOperator::Mul => Token::Mul,
        BinaryOperator::Div => Token::Div,
        BinaryOperator::Concat => Token::Concat,
        BinaryOperator::Like => Token::Like,
    }
}

// =============================================================================
// Expression Constructors
// =============================================================================

/// Create a column reference.
pub fn col(name: &str) -> Expr {
    Expr::Column {
        table: None,
        column: name.into(),
    }
}

/// Create a qualified column reference (table.column).
pub fn table_col(table: &str, column: &str) -> Expr {
    Expr::Column {
        table: Some(table.into()),
        column: column.into(),
    }
}

/// Create an integer literal.
pub fn lit_int(n: i64) -> Expr {
    Expr::Int(n)
}

/// Create a bound parameter.
pub fn param(value: impl Into<Value>) -> Expr {
    Expr::Param(value.into())
}

/// Create a star (*) expression.
pub fn star() -> Expr {
    Expr::Star { table: None }
}

/// COUNT(*)
pub fn count_star() -> Expr {
    func("COUNT", vec![star()])
}

/// Generic function call.
pub fn func(name: &str, args: Vec<Expr>) -> Expr {
    Expr::Function {
        name: name.into(),
        args,
        distinct: false,
    }
}

// =============================================================================
// Expression Builder Trait
// =============================================================================

/// Extension trait for building expressions fluently.
pub trait ExprExt: Sized {
    fn into_expr(self) -> Expr;

    fn binary(self, op: BinaryOperator, other: impl Into<Expr>) -> Expr {
        Expr::BinaryOp {
            left: Box::new(self.into_expr()),
            op,
            right: Box::new(other.into()),
        }
    }

    fn eq(self, other: impl Into<Expr>) -> Expr {
        self.binary(BinaryOperator::Eq, other)
    }

    fn and(self, other: impl Into<Expr>) -> Expr {
        self.binary(BinaryOperator::And, other)
    }

    fn or(self, other: impl Into<Expr>) -> Expr {
        self.binary(BinaryOperator::Or, other)
    }

    fn not(self) -> Expr {
        Expr::UnaryOp {
            op: UnaryOperator::Not,
            expr: Box::new(self.into_expr()),
        }
    }

    #[allow(clippy::wrong_self_convention)]
    fn is_null(self) -> Expr {
        Expr::IsNull {
            expr: Box::new(self.into_expr()),
            negated: false,
        }
    }

    fn in_list(self, values: Vec<Expr>) -> Expr {
        Expr::In {
            expr: Box::new(self.into_expr()),
            values,
            negated: false,
        }
    }

    fn in_subquery(self, subquery: Query) -> Expr {
        Expr::InSubquery {
            expr: Box::new(self.into_expr()),
            subquery: Box::new(subquery),
            negated: false,
        }
    }
}

impl ExprExt for Expr {
    fn into_expr(self) -> Expr {
        self
    }
}

// =============================================================================
// Conversions
// =============================================================================

impl From<i64> for Expr {
    fn from(n: i64) -> Self {
        lit_int(n)
    }
}

impl From<Value> for Expr {
    fn from(v: Value) -> Self {
        Expr::Param(v)
    }
}
