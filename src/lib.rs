//! Core library for the Corvid scripting language: a dynamically typed,
//! class-based language with overloaded functions, multiple inheritance,
//! operator overloading and exceptions, run by a tree-walking interpreter.

pub mod ast;
pub mod class;
pub mod config;
pub mod diagnostics;
pub mod enumerator;
pub mod foreign;
pub mod function;
pub mod json5;
pub mod lexer;
mod operators;
pub mod parser;
pub mod repl;
pub mod runtime;
pub mod scope;
pub mod stdlib;
pub mod value;

pub use config::InterpreterConfig;
pub use diagnostics::{CorvidError, Diagnostic, DiagnosticKind, ErrorKind, SourceSpan};
pub use foreign::{ForeignClass, ForeignObject};
pub use repl::Repl;
pub use runtime::Interpreter;
pub use value::Value;
