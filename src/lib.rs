//! Purr Compiler
//!
//! An ahead-of-time compiler for Purr, a small bracketed, Lisp-like
//! language. The compiler parses S-expression syntax into an AST, infers
//! and checks types, lays out structs and growable arrays/strings in
//! memory, resolves operator overloads, and emits a textual IR module for
//! an external optimizing backend.
//!
//! # Architecture
//!
//! ```text
//! Source (.purr)
//!       │
//!       ▼
//! ┌──────────────┐
//! │ Preprocessor │  → comments stripped, !define / !import expanded
//! └──────────────┘
//!       │
//!       ▼
//! ┌──────────────┐
//! │ Lexer/Parser │  → Particle tree (Atoms and Molecules)
//! └──────────────┘
//!       │
//!       ▼
//! ┌──────────────┐
//! │  Type passes │  → type check, struct collection, variable hoisting
//! └──────────────┘
//!       │
//!       ▼
//! ┌──────────────┐
//! │   Code gen   │  → Purr IR (verified, printed for the backend)
//! └──────────────┘
//! ```

pub mod ast;
pub mod codegen;
pub mod diag;
pub mod ir;
pub mod lexer;
pub mod parser;
pub mod preprocess;
pub mod span;
pub mod token;
pub mod typeck;

// Re-exports for convenience
pub use lexer::Lexer;
pub use span::Span;
pub use token::{Token, TokenKind};

/// Compiler version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// File extension for Purr source files
pub const FILE_EXTENSION: &str = "purr";

/// Compile one preprocessed source string into an IR module. Parse
/// truncation is recorded on the returned context's diagnostics alongside
/// everything later passes find.
pub fn compile_source(module_name: &str, source: &str) -> (ir::Module, typeck::Context) {
    let (root, parse_errors) = parser::parse(source);

    let mut compiler = codegen::Compiler::new(module_name);
    for error in &parse_errors {
        compiler
            .ctx
            .diags
            .error(diag::DiagKind::ParseTruncation, Some(error.span()));
    }

    compiler.compile_program(&root)
}
