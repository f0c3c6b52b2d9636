//! Front end for a small kaleidoscope-style language: a pull-based lexer,
//! an operator precedence table, a precedence-climbing parser producing an
//! owned AST, and a tree-walking evaluator that consumes it.

pub mod ast;
pub mod driver;
pub mod eval;
pub mod lexer;
pub mod parser;
pub mod precedence;

pub use ast::{ASTNode, Describe, Expression, Function, Prototype};
pub use parser::{parse_str, Parser, ParserError};
