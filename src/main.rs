use clap::Parser;
use lc3as::assembler::{self, Context, Unit};
use lc3as::{linker, logging, objfile};
use std::path::PathBuf;
use std::process::ExitCode;

/// An assembler and linker for the LC-3 architecture
#[derive(Parser, Debug)]
#[command(name = "lc3as", version)]
struct Cli {
    /// Assemble only; write one object file per input
    #[arg(short = 'a')]
    assemble_only: bool,

    /// Write the symbol table instead of an executable
    #[arg(short = 's')]
    symbols_only: bool,

    /// Embed original source text (excluding indentation) in the output
    #[arg(short = 'g')]
    debug: bool,

    /// Embed original source text (including indentation); implies -g
    #[arg(short = 'G')]
    debug_indent: bool,

    /// Place the output into this file
    #[arg(short = 'o', value_name = "FILE")]
    output: Option<PathBuf>,

    /// Input source or object files
    #[arg(value_name = "FILE")]
    inputs: Vec<PathBuf>,
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let code = if err.use_stderr() { 1 } else { 0 };
            let _ = err.print();
            return ExitCode::from(code);
        }
    };

    if cli.inputs.is_empty() {
        logging::fatal("no input files");
        return ExitCode::from(1);
    }
    if cli.assemble_only && cli.output.is_some() && cli.inputs.len() > 1 {
        logging::fatal("cannot specify '-o' with '-a' with multiple files");
        return ExitCode::from(1);
    }

    let ctx = Context::new(
        cli.output.clone(),
        cli.debug || cli.debug_indent,
        cli.debug_indent,
    );

    let mut units: Vec<Unit> = cli.inputs.iter().cloned().map(Unit::new).collect();
    assembler::assemble_units(&mut units, &ctx);

    if !ctx.has_error() && !cli.assemble_only {
        linker::link_units(&mut units, &ctx);
    }

    if !ctx.has_error() {
        write_output(&cli, &units, &ctx);
    }

    if ctx.has_error() {
        ExitCode::from(1)
    } else {
        ExitCode::SUCCESS
    }
}

fn write_output(cli: &Cli, units: &[Unit], ctx: &Context) {
    if cli.assemble_only {
        for unit in units {
            let path = match (&ctx.output, units.len()) {
                (Some(output), 1) => output.clone(),
                _ => unit.filename.with_extension("obj"),
            };
            if objfile::write_object_file(&path, unit, ctx).is_err() {
                unit.simple_error(ctx, "failed to write object file");
            }
        }
        return;
    }

    if cli.symbols_only {
        let path = ctx.output.clone().unwrap_or_else(|| PathBuf::from("out.symb"));
        if objfile::write_symbol_file(&path, units, ctx).is_err() {
            logging::simple_error(&path.display().to_string(), "failed to write symbol table");
            ctx.flag_error();
        }
        return;
    }

    let path = ctx.output.clone().unwrap_or_else(|| PathBuf::from("out.lc3"));
    if objfile::write_executable_file(&path, units, ctx).is_err() {
        logging::simple_error(&path.display().to_string(), "failed to write executable");
        ctx.flag_error();
    }
}
