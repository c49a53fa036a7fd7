//! Venv command: link installed package trees into one environment.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use anyhow::Result;
use wheelwright_core::venv::populate_symlink_tree;

/// Populate the environment from each package path in turn. The pip
/// requirements file is bookkeeping, not package content.
pub fn venv(target: &Path, paths: &[PathBuf]) -> Result<()> {
    let skip_set: BTreeSet<PathBuf> = [PathBuf::from("requirements.txt")].into();
    for path in paths {
        populate_symlink_tree(path, target, &skip_set)?;
    }
    Ok(())
}
