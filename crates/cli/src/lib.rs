//! Command line interface for read-break.
//!
//! **This crate is not semver compliant**. The version is locked to the root
//! `read-break` crate version.

mod commands;

use crate::commands::{check::CheckCommand, clip::ClipCommand};
use clap::Parser;
use std::process::ExitCode;

const COMMAND_NAME: &str = "read-break";

/// Parse and clip paired-end FASTQ reads using a declarative YAML pipeline
#[derive(Debug, Parser)]
#[clap(author, version, about, name = COMMAND_NAME)]
pub struct Args {
    #[command(subcommand)]
    pub subcommand: CliCommand,
}

impl Args {
    /// Alias for [clap::Parser::parse]
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }
}

/// A CLI subcommand
#[derive(Clone, Debug, clap::Subcommand)]
pub enum CliCommand {
    Clip(ClipCommand),
    Check(CheckCommand),
}

impl CliCommand {
    /// Execute this CLI subcommand
    pub fn execute(self) -> anyhow::Result<ExitCode> {
        match self {
            Self::Clip(command) => command.execute(),
            Self::Check(command) => command.execute(),
        }
    }
}

/// An executable subcommand. This trait isn't strictly necessary because we
/// do static dispatch via the command enum, but it's helpful to enforce a
/// consistent interface for each subcommand.
trait Subcommand {
    /// Execute the subcommand
    fn execute(self) -> anyhow::Result<ExitCode>;
}

#[cfg(test)]
mod tests {
    use super::*;

    /// The clap derive tree is internally consistent
    #[test]
    fn test_cli_definition() {
        use clap::CommandFactory;
        Args::command().debug_assert();
    }

    #[test]
    fn test_parse_clip_args() {
        let args = <Args as clap::Parser>::try_parse_from([
            "read-break",
            "clip",
            "--config",
            "pipeline.yml",
            "--r1",
            "in.R1.fastq.gz",
            "--r2",
            "in.R2.fastq.gz",
            "--out",
            "out_dir",
        ])
        .unwrap();
        assert!(matches!(args.subcommand, CliCommand::Clip(_)));
    }
}
