//! Purr Compiler CLI
//!
//! The `purrc` command is the entry point for the Purr compiler.

use clap::{Parser, Subcommand};
use purr::{codegen, diag, ir, lexer, parser, preprocess};
use std::fs;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "purrc")]
#[command(version = purr::VERSION)]
#[command(about = "The Purr compiler", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a Purr source file to an IR module
    Build {
        /// Input file to compile
        #[arg(value_name = "FILE")]
        input: PathBuf,

        /// Output file (defaults to the input with an .ir extension)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Emit the AST (for debugging)
        #[arg(long)]
        emit_ast: bool,

        /// Print the IR module to stdout as well
        #[arg(long)]
        emit_ir: bool,
    },

    /// Check a file for errors without emitting anything
    Check {
        /// Input file to check
        #[arg(value_name = "FILE")]
        input: PathBuf,
    },

    /// Parse a file and print the tree
    Parse {
        /// Input file to parse
        #[arg(value_name = "FILE")]
        input: PathBuf,
    },

    /// Tokenize a file and print the tokens
    Tokenize {
        /// Input file to tokenize
        #[arg(value_name = "FILE")]
        input: PathBuf,
    },
}

/// Read and fully preprocess one source file, resolving imports relative
/// to its directory.
fn load_source(input: &PathBuf) -> miette::Result<String> {
    let source = fs::read_to_string(input)
        .map_err(|e| miette::miette!("failed to read {}: {}", input.display(), e))?;

    let base = input
        .parent()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    let mut loader = |name: &str| {
        let path = base.join(name);
        match fs::read_to_string(&path) {
            Ok(contents) => Some(contents),
            Err(e) => {
                eprintln!("warning: could not open import {}: {}", path.display(), e);
                None
            }
        }
    };

    Ok(preprocess::preprocess_with_imports(&source, &mut loader))
}

fn main() -> miette::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Build {
            input,
            output,
            emit_ast,
            emit_ir,
        } => {
            let source = load_source(&input)?;
            let module_name = input
                .file_stem()
                .unwrap_or_default()
                .to_string_lossy()
                .to_string();

            let (root, parse_errors) = parser::parse(&source);

            if emit_ast {
                println!("=== AST ===");
                println!("{:#?}", root);
            }

            let mut compiler = codegen::Compiler::new(module_name);
            for error in &parse_errors {
                compiler
                    .ctx
                    .diags
                    .error(diag::DiagKind::ParseTruncation, Some(error.span()));
            }
            let (module, ctx) = compiler.compile_program(&root);

            for d in ctx.diags.iter() {
                eprintln!("{}", d);
            }
            if ctx.diags.has_errors() {
                return Err(miette::miette!(
                    "compilation finished with {} diagnostic(s)",
                    ctx.diags.len()
                ));
            }

            // The one unconditionally fatal condition: a structurally
            // invalid module means a compiler bug, not a user error
            if let Err(errors) = ir::verify_module(&module) {
                for e in &errors {
                    eprintln!("verifier: {}", e);
                }
                return Err(miette::miette!(
                    "module verification failed ({} error(s))",
                    errors.len()
                ));
            }

            let text = ir::print_module(&module);
            if emit_ir {
                println!("{}", text);
            }

            let out_path = output.unwrap_or_else(|| input.with_extension("ir"));
            fs::write(&out_path, text)
                .map_err(|e| miette::miette!("failed to write {}: {}", out_path.display(), e))?;
            println!("wrote {}", out_path.display());
            Ok(())
        }

        Commands::Check { input } => {
            let source = load_source(&input)?;
            let module_name = input
                .file_stem()
                .unwrap_or_default()
                .to_string_lossy()
                .to_string();

            let (_, ctx) = purr::compile_source(&module_name, &source);

            for d in ctx.diags.iter() {
                eprintln!("{}", d);
            }
            if ctx.diags.has_errors() {
                return Err(miette::miette!("found {} diagnostic(s)", ctx.diags.len()));
            }
            println!("no errors found");
            Ok(())
        }

        Commands::Parse { input } => {
            let source = load_source(&input)?;
            let (root, errors) = parser::parse(&source);
            println!("{:#?}", root);
            for error in &errors {
                eprintln!("parse error at {}: {}", error.span(), error);
            }
            Ok(())
        }

        Commands::Tokenize { input } => {
            let source = load_source(&input)?;
            let (tokens, errors) = lexer::lex(&source);
            for token in &tokens {
                println!(
                    "{:>4}..{:<4} {:12} {:?}",
                    token.span.start,
                    token.span.end,
                    format!("{:?}", token.kind),
                    token.text(&source)
                );
            }
            for error in &errors {
                eprintln!("lexer error: {}", error);
            }
            Ok(())
        }
    }
}
