//! Install command: hash-pinned pip install of one package.

use std::path::PathBuf;

use anyhow::{Context, Result};
use wheelwright_core::install::{self, InstallRequest};

/// Install arguments, passed through from the command line.
#[derive(Debug)]
pub struct Args {
    pub input: String,
    pub output: PathBuf,
    pub files: String,
    pub python_version: Option<String>,
    pub platforms: Vec<String>,
    pub indexes: Vec<String>,
    pub source_urls: Vec<String>,
    pub cc_toolchain: Option<String>,
    pub entry_points: Option<PathBuf>,
    pub python: Option<PathBuf>,
}

/// Run one installation job.
pub fn install(args: Args) -> Result<()> {
    let files = serde_json::from_str(&args.files)
        .context("files must be a JSON object of file name to hash")?;

    install::install(&InstallRequest {
        spec: args.input,
        output: args.output,
        files,
        python_version: args.python_version,
        platforms: args.platforms,
        indexes: args.indexes,
        source_urls: args.source_urls,
        cc_toolchain: args.cc_toolchain,
        entry_points: args.entry_points,
        python: args.python,
    })?;
    Ok(())
}
