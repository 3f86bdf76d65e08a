//! `read-break check`: validate a pipeline spec without running it

use crate::{Subcommand, commands::compile_spec};
use clap::Parser;
use std::{path::PathBuf, process::ExitCode};

/// Compile a pipeline spec and print its step table. Exits non-zero if the
/// spec has configuration errors (unknown operations or metrics, bad
/// templates, unresolvable globals, invalid regex patterns).
#[derive(Clone, Debug, Parser)]
pub struct CheckCommand {
    /// YAML pipeline spec file
    #[clap(long)]
    config: PathBuf,
}

impl Subcommand for CheckCommand {
    fn execute(self) -> anyhow::Result<ExitCode> {
        let pipeline = compile_spec(&self.config)?;
        print!("{pipeline}");
        Ok(ExitCode::SUCCESS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_check_valid_spec() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.yml");
        let mut file = std::fs::File::create(&path).unwrap();
        write!(
            file,
            "
pipeline:
  - id: sanity
    op: test
    expression: 'true'
"
        )
        .unwrap();
        drop(file);

        CheckCommand { config: path }.execute().unwrap();
    }

    #[test]
    fn test_check_invalid_spec() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.yml");
        std::fs::write(&path, "pipeline: [{op: warp, read: 1}]").unwrap();

        assert!(CheckCommand { config: path }.execute().is_err());
    }
}
