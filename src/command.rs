//! The mention command DSL: operation types and the text parser.

pub mod ops;
pub mod parser;

pub use ops::Operation;
pub use parser::parse_command;
