//! The expression and query language: tokenizer, AST, Pratt parser, SQL query parser,
//! and the stringer that renders expressions back to source text (spec.md §4.6-§4.7).

mod ast;
mod json;
mod parser;
mod stringer;
mod token;

pub use ast::{DatasetRef, Expr, InfixOp, Literal, PrefixOp, Query};
pub use json::{expr_list_from_json, expr_list_to_json};
pub use parser::{parse_expression, parse_expression_list, parse_query, Parser};
pub use stringer::{stringify_expr, stringify_query};
pub use token::{tokenize, Token, Tokenizer};
