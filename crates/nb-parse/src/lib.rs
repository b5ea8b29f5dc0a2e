pub mod ast;
pub mod parser;
pub mod time_ast;
pub mod time_parser;
pub mod tokenizer;

pub use ast::{Assertion, CellExpr, PlanStmt, RuleKind, Statement};
pub use parser::{Parser, parse_statement};
pub use time_ast::TimeExpr;
pub use tokenizer::{Token, TokenKind, Tokenizer, TokenizerError};

pub use nb_common::{NbError, NbErrorKind, SourceLocation, Value};
