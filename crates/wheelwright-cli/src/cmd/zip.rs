//! Zip command: reproducible archive creation.

use std::path::Path;

use anyhow::{Context, Result};
use wheelwright_core::archive::{CompressOptions, compress};

/// Create the archive, appending entries listed in the manifest file to the
/// positional ones.
pub fn zip(
    command: &str,
    output: &Path,
    dir: &Path,
    manifest: Option<&Path>,
    mut files: Vec<String>,
) -> Result<()> {
    if let Some(manifest) = manifest {
        let listing = std::fs::read_to_string(manifest)
            .with_context(|| format!("cannot read manifest {}", manifest.display()))?;
        files.extend(listing.lines().filter(|line| !line.is_empty()).map(String::from));
    }

    let options = CompressOptions::parse(command)?;
    compress(options, dir, output, &files)?;
    Ok(())
}
