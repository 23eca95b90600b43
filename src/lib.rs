//! Crate root: wires together the compilation pipeline.
//!
//! Compilation is a single forward pass with no intermediate representation:
//! - `tokenizer` pulls tokens from the source text on demand.
//! - `parser` walks the grammar, type checks every production and drives
//!   code generation as it goes.
//! - `codegen` emits x86-64 AT&T assembly for a stack machine on top of the
//!   System V calling convention.
//! - `ty`, `symbols` and `target` hold the type rules, the global symbol
//!   table and the platform's symbol mangling.
//! - `error` centralises reporting utilities shared by the other modules.
//!
//! All mutable compilation state lives in one [`Parser`] value, so
//! independent compilations never share anything.

pub mod codegen;
pub mod error;
pub mod parser;
pub mod symbols;
pub mod target;
pub mod tokenizer;
pub mod ty;

pub use error::{CompileError, CompileResult, ErrorKind};
pub use parser::Parser;
pub use target::Target;
pub use tokenizer::{Token, TokenSource, Tokenizer};

/// Compile a source string into AT&T assembly for `target`.
pub fn compile(source: &str, target: Target) -> CompileResult<String> {
  compile_tokens(Tokenizer::new(source), target)
}

/// Compile from any token source.
pub fn compile_tokens<S: TokenSource>(tokens: S, target: Target) -> CompileResult<String> {
  Parser::new(tokens, target)?.parse_program()
}
