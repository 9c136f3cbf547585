use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use reg_machine::{DEFAULT_STEP_LIMIT, Machine, MachineConfig, Program};
use tracing::info;

mod logger;
mod render;

#[derive(Parser, Debug)]
#[clap(author, version, about = "Run a register machine program and print its final state", long_about = None)]
struct Args {
    /// Program file. Reads stdin when missing or `-`.
    path: Option<PathBuf>,

    /// Steps allowed before the run is stopped, zero or less for no limit.
    #[clap(short, long, env = "REG_STEP_LIMIT", default_value_t = DEFAULT_STEP_LIMIT, allow_negative_numbers = true)]
    step_limit: i64,

    #[clap(short, long, value_enum, default_value_t = Format::Text)]
    format: Format,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Format {
    Text,
    Json,
}

fn main() -> ExitCode {
    logger::setup_logger();
    let args = Args::parse();

    match run(&args) {
        Ok(machine) if machine.is_halted() => ExitCode::SUCCESS,
        Ok(_) => ExitCode::from(1),
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::from(2)
        }
    }
}

fn run(args: &Args) -> Result<Machine> {
    let source = read_source(args.path.as_deref())?;
    let program = Program::parse(&source);
    let config = MachineConfig::default().with_step_limit(args.step_limit);
    info!(lines = program.len(), step_limit = args.step_limit, "running program");

    let mut machine = Machine::new(program, config);
    machine.run();
    info!(steps = machine.steps(), status = ?machine.status().kind(), "run finished");

    let output = match args.format {
        Format::Text => render::text(&machine),
        Format::Json => render::json(&machine.report())?,
    };
    let mut stdout = io::stdout().lock();
    writeln!(stdout, "{output}").context("writing result")?;
    Ok(machine)
}

fn read_source(path: Option<&Path>) -> Result<String> {
    match path {
        Some(path) if path != Path::new("-") => fs::read_to_string(path)
            .with_context(|| format!("reading program from {}", path.display())),
        _ => {
            let mut source = String::new();
            io::stdin()
                .read_to_string(&mut source)
                .context("reading program from stdin")?;
            Ok(source)
        }
    }
}

#[cfg(test)]
mod test;
