//! Virtual-environment assembly by symlinking installed package trees.
//!
//! Several packages may land in one environment, so collisions are expected:
//! an existing link with identical contents is left alone, a conflicting one
//! is skipped with a warning rather than clobbered.

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use thiserror::Error;
use tracing::warn;
use walkdir::WalkDir;

/// Errors raised while populating a symlink tree.
#[derive(Error, Debug)]
pub enum VenvError {
    /// The source package directory is missing.
    #[error("required Python package directory {0} does not exist")]
    MissingSource(PathBuf),

    /// Filesystem traversal failed.
    #[error("walk error: {0}")]
    Walk(#[from] walkdir::Error),

    /// Filesystem operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Compute the relative path from `base` to `path` without touching the
/// filesystem. Both inputs must be in the same form (both absolute or both
/// relative to the same root).
pub(crate) fn relative_path(base: &Path, path: &Path) -> PathBuf {
    let base_components: Vec<Component> = base.components().collect();
    let path_components: Vec<Component> = path.components().collect();

    let shared = base_components
        .iter()
        .zip(&path_components)
        .take_while(|(a, b)| a == b)
        .count();

    let mut relative = PathBuf::new();
    for _ in shared..base_components.len() {
        relative.push("..");
    }
    for component in &path_components[shared..] {
        relative.push(component);
    }
    if relative.as_os_str().is_empty() {
        relative.push(".");
    }
    relative
}

fn files_match(a: &Path, b: &Path) -> bool {
    match (fs::read(a), fs::read(b)) {
        (Ok(left), Ok(right)) => left == right,
        _ => false,
    }
}

#[cfg(unix)]
fn symlink(original: &Path, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(original, link)
}

#[cfg(windows)]
fn symlink(original: &Path, link: &Path) -> io::Result<()> {
    std::os::windows::fs::symlink_file(original, link)
}

/// Mirror `source` into `target` as a directory tree of symlinks, skipping
/// paths (relative to `source`) listed in `skip_set`.
///
/// # Errors
///
/// Returns [`VenvError`] when `source` is not a directory or filesystem
/// operations fail. Content conflicts are not errors.
pub fn populate_symlink_tree(
    source: &Path,
    target: &Path,
    skip_set: &BTreeSet<PathBuf>,
) -> Result<(), VenvError> {
    if !source.is_dir() {
        return Err(VenvError::MissingSource(source.to_path_buf()));
    }

    for entry in WalkDir::new(source) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let in_package_path = entry
            .path()
            .strip_prefix(source)
            .expect("walked path is under source");
        if skip_set.contains(in_package_path) {
            continue;
        }

        let link_path = target.join(in_package_path);
        if let Some(parent) = link_path.parent() {
            fs::create_dir_all(parent)?;
        }

        // Absolute sources get absolute link targets; relative sources get
        // links relative to the link's own directory so the tree stays
        // relocatable.
        let link_target = if source.is_absolute() {
            entry.path().to_path_buf()
        } else {
            let link_directory = link_path.parent().unwrap_or(Path::new("."));
            relative_path(link_directory, entry.path())
        };

        if link_path.exists() {
            if !files_match(&link_path, entry.path()) {
                warn!(
                    "{} already exists, skipping {} which seems to have different contents",
                    link_path.display(),
                    link_target.display()
                );
            }
            continue;
        }

        symlink(&link_target, &link_path)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(path: &Path, contents: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    #[test]
    fn test_relative_path() {
        assert_eq!(
            relative_path(Path::new("/a/b/c"), Path::new("/a/d/e")),
            Path::new("../../d/e")
        );
        assert_eq!(
            relative_path(Path::new("/a/b"), Path::new("/a/b/c")),
            Path::new("c")
        );
        assert_eq!(
            relative_path(Path::new("/a/b"), Path::new("/a/b")),
            Path::new(".")
        );
    }

    #[test]
    fn test_populate_symlink_tree() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("site-packages");
        write(&source.join("pkg/__init__.py"), "x = 1\n");
        write(&source.join("pkg/sub/mod.py"), "y = 2\n");
        write(&source.join("requirements.txt"), "pkg==1.0\n");

        let target = dir.path().join("venv");
        let skip: BTreeSet<PathBuf> = [PathBuf::from("requirements.txt")].into();
        populate_symlink_tree(&source, &target, &skip).unwrap();

        let link = target.join("pkg/sub/mod.py");
        assert!(link.symlink_metadata().unwrap().file_type().is_symlink());
        assert_eq!(fs::read_to_string(&link).unwrap(), "y = 2\n");
        assert!(!target.join("requirements.txt").exists());
    }

    #[test]
    fn test_conflicting_file_is_left_alone() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("pkg-a");
        write(&source.join("shared.py"), "a\n");

        let target = dir.path().join("venv");
        write(&target.join("shared.py"), "b\n");
        populate_symlink_tree(&source, &target, &BTreeSet::new()).unwrap();

        assert_eq!(fs::read_to_string(target.join("shared.py")).unwrap(), "b\n");
    }

    #[test]
    fn test_missing_source_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = populate_symlink_tree(
            &dir.path().join("nope"),
            &dir.path().join("venv"),
            &BTreeSet::new(),
        )
        .unwrap_err();
        assert!(matches!(err, VenvError::MissingSource(_)));
    }
}
