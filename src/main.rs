mod asm;
mod compile;
mod control;
mod errors;
mod expr;
mod function;
mod lexer;
mod scanner;
mod state;
mod symtab;
#[cfg(test)]
mod tests;

use std::path::PathBuf;

use clap::Parser;
use miette::{IntoDiagnostic, WrapErr};
use tracing::{Level, info};

use crate::compile::{Options, compile};

/// Compiles a small C-like language into assembly for a stack machine.
#[derive(Parser, Debug)]
#[command(name = "jalac", version)]
struct Args {
    /// Source file to compile.
    input: PathBuf,
    /// Where to write the assembly. Defaults to the input path with `.asm` appended.
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// Interleave each source line as a comment above its code.
    #[arg(short, long)]
    annotate: bool,
    /// Log more; repeat for more detail.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> miette::Result<()> {
    let args = Args::parse();
    let level = match args.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt().with_max_level(level).with_writer(std::io::stderr).init();

    let src = std::fs::read_to_string(&args.input)
        .into_diagnostic()
        .wrap_err_with(|| format!("failed to read {}", args.input.display()))?;
    let asm = compile(&args.input.display().to_string(), &src, Options { annotate: args.annotate })?;

    let output = args.output.unwrap_or_else(|| {
        let mut path = args.input.clone().into_os_string();
        path.push(".asm");
        path.into()
    });
    std::fs::write(&output, asm)
        .into_diagnostic()
        .wrap_err_with(|| format!("failed to write {}", output.display()))?;
    info!(output = %output.display(), "wrote assembly");
    Ok(())
}
