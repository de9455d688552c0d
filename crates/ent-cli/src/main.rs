use std::error::Error;
use std::fs;
use std::path::Path;

use clap::{Parser, Subcommand};
use commands::{
    analyze::{self, AnalyzeArgs},
    capacity::{self, CapacityArgs},
    group::{self, GroupArgs},
    impedance::{self, ImpedanceArgs},
    profile::{self, ProfileArgs},
};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser, Debug)]
#[command(name = "ent", about = "Battery entropy profiling CLI")]
struct Cli {
    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(long, short, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fit the relaxation models of catalog experiments and export entropy tables.
    Analyze(AnalyzeArgs),
    /// Report RPT capacities of catalog batteries.
    Capacity(CapacityArgs),
    /// Extract characteristic resistances from EIS spectra.
    Impedance(ImpedanceArgs),
    /// Capacity spread, mean impedance and capacity-mass regression of a group.
    Group(GroupArgs),
    /// Write the programmed temperature profile of an experiment.
    Profile(ProfileArgs),
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    match cli.command {
        Command::Analyze(args) => analyze::run(&args),
        Command::Capacity(args) => capacity::run(&args),
        Command::Impedance(args) => impedance::run(&args),
        Command::Group(args) => group::run(&args),
        Command::Profile(args) => profile::run(&args),
    }
}

pub(crate) fn write_json<P: AsRef<Path>, T: Serialize>(path: P, value: &T) -> Result<(), Box<dyn Error>> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, serde_json::to_vec_pretty(value)?)?;
    Ok(())
}

/// Prints `value` to stdout, or writes it to `out` when given.
pub(crate) fn emit_json<T: Serialize>(out: Option<&Path>, value: &T) -> Result<(), Box<dyn Error>> {
    match out {
        Some(path) => write_json(path, value),
        None => {
            println!("{}", serde_json::to_string_pretty(value)?);
            Ok(())
        }
    }
}
