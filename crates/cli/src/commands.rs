//! Subcommand implementations

pub mod check;
pub mod clip;

use read_break_core::{
    config::PipelineConfig,
    pipeline::{CompileOptions, Pipeline},
};
use std::path::Path;

/// Load and compile a pipeline spec. Whitelist paths inside the spec are
/// resolved relative to the spec file's directory.
fn compile_spec(path: &Path) -> anyhow::Result<Pipeline> {
    let config = PipelineConfig::load(path)?;
    let options = CompileOptions {
        base_dir: path.parent().map(Path::to_owned),
        ..Default::default()
    };
    Ok(Pipeline::compile(config, options)?)
}
