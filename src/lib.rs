//! Compiler front end for flint, a tiny expression language where every
//! value is a double, a function body is a single expression, and `extern`
//! names outside symbols.
//!
//! The pipeline is conventional: [`lexer`] turns source text into tokens,
//! [`parser`] builds the AST with a precedence-climbing expression grammar,
//! and [`codegen`] lowers items through the [`ir::IrBuilder`] interface.
//! [`ir::Module`] is the bundled in-memory backend with a textual dump.

pub mod ast;
pub mod codegen;
pub mod ir;
pub mod lexer;
pub mod parser;

pub use codegen::{Codegen, CodegenError};
pub use ir::{IrBuilder, Module};
pub use lexer::{Lexer, Token};
pub use parser::{Parser, ParserError};

#[derive(Debug, PartialEq, Clone, thiserror::Error)]
pub enum CompileError {
    #[error(transparent)]
    Parse(#[from] ParserError),
    #[error(transparent)]
    Codegen(#[from] CodegenError),
}

/// Compile a whole source string into a fresh [`Module`], stopping at the
/// first error. Interactive use wants the driver loop instead, which
/// recovers and carries on.
pub fn compile(source: &str) -> Result<Module, CompileError> {
    let mut parser = Parser::new(source);
    let mut codegen = Codegen::new(Module::new("flint"));
    while let Some(item) = parser.parse_statement()? {
        codegen.lower(&item)?;
    }
    Ok(codegen.module)
}
