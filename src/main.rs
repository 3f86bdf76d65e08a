//! Binary entrypoint: initialize logging, parse arguments, dispatch to the
//! selected subcommand

use read_break_cli::Args;
use std::process::ExitCode;
use tracing_subscriber::{filter::EnvFilter, prelude::*};

fn main() -> ExitCode {
    initialize_tracing();
    let args = Args::parse();
    match args.subcommand.execute() {
        Ok(code) => code,
        Err(error) => {
            eprintln!("{error:#}");
            ExitCode::FAILURE
        }
    }
}

/// Set up tracing to stderr, filtered by `RUST_LOG`
fn initialize_tracing() {
    let subscriber = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(EnvFilter::from_default_env());
    tracing_subscriber::registry().with(subscriber).init();
}
