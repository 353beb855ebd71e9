//! Kiln Compiler - resolves and type-checks Kiln stack programs
//!
//! Usage: kilnc [OPTIONS] <input>

use anyhow::Context;
use clap::Parser as ClapParser;
use kiln_compiler::common::DiagnosticReporter;
use kiln_compiler::driver::{CompileOptions, Pipeline};
use std::fs;
use std::path::PathBuf;
use std::process;

#[derive(ClapParser, Debug)]
#[command(name = "kilnc")]
#[command(author = "Kiln Team")]
#[command(version)]
#[command(about = "Resolver and stack-effect checker for the Kiln language", long_about = None)]
struct Args {
    /// Input source file (.kln)
    #[arg(required = true)]
    input: PathBuf,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Dump tokens (for debugging)
    #[arg(long)]
    dump_tokens: bool,

    /// Dump the resolved operation stream
    #[arg(long)]
    dump_ops: bool,

    /// Dump inferred block contracts
    #[arg(long)]
    dump_contracts: bool,

    /// Render errors with source snippets instead of one line per message
    #[arg(long)]
    pretty: bool,
}

fn main() {
    let args = Args::parse();

    match run(&args) {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(e) => {
            eprintln!("error: {:#}", e);
            process::exit(1);
        }
    }
}

/// Returns `Ok(false)` when the program was read but failed to compile;
/// the diagnostic has already been printed.
fn run(args: &Args) -> anyhow::Result<bool> {
    let source = fs::read_to_string(&args.input)
        .with_context(|| format!("cannot read {}", args.input.display()))?;
    let filename = args.input.display().to_string();

    let options = CompileOptions {
        verbose: args.verbose,
        dump_tokens: args.dump_tokens,
        dump_ops: args.dump_ops,
        dump_contracts: args.dump_contracts,
    };

    if args.verbose {
        eprintln!("Checking {}", args.input.display());
    }

    let checked = match Pipeline::with_options(options).run(&source, &filename) {
        Ok(checked) => checked,
        Err(e) => {
            if args.pretty {
                let mut reporter = DiagnosticReporter::new();
                reporter.add_file(&filename, &source);
                reporter.report_error(&e);
            } else {
                eprintln!("{}", e.render());
            }
            return Ok(false);
        }
    };

    if args.verbose {
        eprintln!(
            "Checked {} procedures, {} operations, {} block contracts",
            checked.program.symbols.procs.len(),
            checked.program.ops.len(),
            checked.contracts.len()
        );
    }
    Ok(true)
}
