use std::fs;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser as CliParser;

use flintc::ast::Item;
use flintc::codegen::Codegen;
use flintc::ir::Module;
use flintc::parser::Parser;

/// Compiler front end for the flint language.
#[derive(CliParser, Debug)]
#[command(version, about, long_about = None)]
struct Config {
    /// Source file to compile; omit it for an interactive session
    file: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    let config = Config::parse();

    let mut codegen = Codegen::new(Module::new("flint"));

    match &config.file {
        Some(path) => {
            let source = fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            run_source(&source, &mut codegen, false);
        }
        None => repl(&mut codegen)?,
    }

    // final state of the module, successful definitions only
    print!("{}", codegen.module.print_to_string());
    Ok(())
}

fn repl(codegen: &mut Codegen<Module>) -> anyhow::Result<()> {
    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    let mut pending = String::new();
    loop {
        eprint!("flint> ");
        io::stderr().flush()?;
        let line = match lines.next() {
            Some(line) => line?,
            None => break,
        };
        pending.push_str(&line);
        pending.push('\n');
        // statements may span lines; run once the terminator has arrived
        if statement_ready(&pending) {
            run_source(&pending, codegen, true);
            pending.clear();
        }
    }
    // end of input closes the last statement, terminator or not
    if !pending.trim().is_empty() {
        run_source(&pending, codegen, true);
    }
    Ok(())
}

/// A buffered chunk is ready once its last non-whitespace character is
/// the statement terminator.
fn statement_ready(pending: &str) -> bool {
    pending.trim_end().ends_with(';')
}

/// Feed one chunk of source through parse and lowering. Errors are
/// reported and the loop carries on with the next statement, so one bad
/// definition never takes down the session.
fn run_source(source: &str, codegen: &mut Codegen<Module>, interactive: bool) {
    let mut parser = Parser::new(source);
    loop {
        match parser.parse_statement() {
            Ok(None) => break,
            Ok(Some(item)) => {
                let label = match &item {
                    Item::Extern(_) => "extern",
                    Item::Function(function) if function.proto.is_anonymous() => {
                        "top-level expression"
                    }
                    Item::Function(_) => "function definition",
                };
                match codegen.lower(&item) {
                    Ok(func) => {
                        if interactive {
                            eprintln!("Read {}:", label);
                            print!("{}", codegen.module.print_function(func));
                        }
                    }
                    Err(err) => eprintln!("error: {}", err),
                }
            }
            Err(err) => {
                eprintln!("error: {}", err);
                // skip the offending token and try again
                parser.advance();
            }
        }
    }
}
