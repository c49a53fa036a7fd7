//! Deterministic zip archive creation.
//!
//! Builds archives whose bytes depend only on the input contents: entries
//! are written in sorted order, timestamps stay at the zip epoch, and
//! permissions collapse to owner read/write plus the file's own execute
//! bit. Two runs over the same tree produce identical archives.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Errors raised during archive creation.
#[derive(Error, Debug)]
pub enum ArchiveError {
    /// Filesystem operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Zip encoding failed.
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// Filesystem traversal failed.
    #[error("walk error: {0}")]
    Walk(#[from] walkdir::Error),

    /// The options string does not describe a create operation.
    #[error("command {0} is not supported")]
    UnsupportedCommand(String),
}

/// Parsed create-options string: `c` (required) creates, `C` compresses,
/// `f` flattens single-file entry names.
#[derive(Debug, Clone, Copy)]
pub struct CompressOptions {
    compress: bool,
    flatten: bool,
}

impl CompressOptions {
    /// Parse the options string, rejecting anything that is not a create
    /// command.
    pub fn parse(command: &str) -> Result<Self, ArchiveError> {
        if !command.starts_with('c') {
            return Err(ArchiveError::UnsupportedCommand(command.to_string()));
        }
        Ok(Self {
            compress: command.contains('C'),
            flatten: command.contains('f'),
        })
    }

    fn entry_options(self, mode: u32) -> SimpleFileOptions {
        let method = if self.compress {
            CompressionMethod::Deflated
        } else {
            CompressionMethod::Stored
        };
        SimpleFileOptions::default()
            .compression_method(method)
            .unix_permissions(mode)
    }
}

/// Owner read/write plus the path's own execute bit. Group/other bits and
/// setuid-style bits never reach the archive.
fn entry_mode(path: &Path) -> io::Result<u32> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;
        Ok(0o600 | (path.metadata()?.mode() & 0o100))
    }
    #[cfg(not(unix))]
    {
        let _ = path;
        Ok(0o600)
    }
}

/// Split a `[zip_path=]file_path` spec. Only a single `=` separates the
/// pair; anything else is one literal path used for both sides.
fn split_spec(spec: &str) -> (&str, &str) {
    match spec.split_once('=') {
        Some((zip_path, file_path)) if !file_path.contains('=') => (zip_path, file_path),
        _ => (spec, spec),
    }
}

fn directory_entries(dir: &Path) -> Result<Vec<PathBuf>, ArchiveError> {
    let mut entries = Vec::new();
    for entry in WalkDir::new(dir) {
        let entry = entry?;
        if entry.file_type().is_dir() {
            continue;
        }
        if entry
            .path()
            .components()
            .any(|component| component.as_os_str() == "__pycache__")
        {
            continue;
        }
        entries.push(entry.path().to_path_buf());
    }
    entries.sort();
    Ok(entries)
}

/// Create the archive at `output` from `[zip_path=]file_path` specs resolved
/// against `dir`. Directory specs expand recursively; an empty file path
/// produces an empty entry under the zip path.
///
/// # Errors
///
/// Returns [`ArchiveError`] when inputs cannot be read or the archive cannot
/// be written.
pub fn compress(
    options: CompressOptions,
    dir: &Path,
    output: &Path,
    file_specs: &[String],
) -> Result<(), ArchiveError> {
    let mut specs = file_specs.to_vec();
    specs.sort();

    let mut writer = ZipWriter::new(fs::File::create(output)?);
    for spec in &specs {
        let (zip_path, file_path) = split_spec(spec);
        let source = dir.join(file_path);

        if source.is_dir() {
            for file in directory_entries(&source)? {
                let suffix = file
                    .to_string_lossy()
                    .strip_prefix(&*source.to_string_lossy())
                    .unwrap_or_default()
                    .to_string();
                let entry_name = format!("{zip_path}{suffix}");
                writer.start_file(entry_name, options.entry_options(entry_mode(&file)?))?;
                writer.write_all(&fs::read(&file)?)?;
            }
        } else {
            let entry_name = if options.flatten {
                Path::new(zip_path)
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_else(|| zip_path.to_string())
            } else {
                zip_path.to_string()
            };
            let data = if file_path.is_empty() {
                Vec::new()
            } else {
                fs::read(&source)?
            };
            writer.start_file(entry_name, options.entry_options(entry_mode(&source)?))?;
            writer.write_all(&data)?;
        }
    }
    writer.finish()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use zip::ZipArchive;

    fn write(path: &Path, contents: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    fn entry_names(archive_path: &Path) -> Vec<String> {
        let archive = ZipArchive::new(fs::File::open(archive_path).unwrap()).unwrap();
        archive.file_names().map(String::from).collect()
    }

    #[test]
    fn test_options_parse() {
        assert!(CompressOptions::parse("c").is_ok());
        assert!(CompressOptions::parse("cCf").unwrap().compress);
        assert!(matches!(
            CompressOptions::parse("x"),
            Err(ArchiveError::UnsupportedCommand(_))
        ));
    }

    #[test]
    fn test_directory_expansion_skips_pycache() {
        let dir = tempfile::tempdir().unwrap();
        write(&dir.path().join("pkg/mod.py"), "x\n");
        write(&dir.path().join("pkg/__pycache__/mod.cpython-312.pyc"), "c\n");
        write(&dir.path().join("pkg/sub/other.py"), "y\n");

        let output = dir.path().join("out.zip");
        compress(
            CompressOptions::parse("c").unwrap(),
            dir.path(),
            &output,
            &["lib=pkg".to_string()],
        )
        .unwrap();

        assert_eq!(entry_names(&output), ["lib/mod.py", "lib/sub/other.py"]);
    }

    #[test]
    fn test_flatten_and_empty_entries() {
        let dir = tempfile::tempdir().unwrap();
        write(&dir.path().join("deep/nested/tool.py"), "t\n");

        let output = dir.path().join("out.zip");
        compress(
            CompressOptions::parse("cf").unwrap(),
            dir.path(),
            &output,
            &[
                "deep/nested/tool.py".to_string(),
                "placeholder/__init__.py=".to_string(),
            ],
        )
        .unwrap();

        let names = entry_names(&output);
        assert!(names.contains(&"tool.py".to_string()));
        assert!(names.contains(&"__init__.py".to_string()));

        let mut archive = ZipArchive::new(fs::File::open(&output).unwrap()).unwrap();
        assert_eq!(archive.by_name("__init__.py").unwrap().size(), 0);
    }

    #[cfg(unix)]
    #[test]
    fn test_permissions_collapse() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("run.sh");
        write(&script, "#!/bin/sh\n");
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();

        let output = dir.path().join("out.zip");
        compress(
            CompressOptions::parse("c").unwrap(),
            dir.path(),
            &output,
            &["run.sh".to_string()],
        )
        .unwrap();

        let mut archive = ZipArchive::new(fs::File::open(&output).unwrap()).unwrap();
        let mode = archive.by_name("run.sh").unwrap().unix_mode().unwrap();
        assert_eq!(mode & 0o777, 0o700);
    }

    #[test]
    fn test_byte_identical_across_runs() {
        let dir = tempfile::tempdir().unwrap();
        write(&dir.path().join("pkg/a.py"), "a\n");
        write(&dir.path().join("pkg/b.py"), "b\n");

        let first = dir.path().join("first.zip");
        let second = dir.path().join("second.zip");
        // Input order must not matter.
        compress(
            CompressOptions::parse("cC").unwrap(),
            dir.path(),
            &first,
            &["pkg/b.py".to_string(), "pkg/a.py".to_string()],
        )
        .unwrap();
        compress(
            CompressOptions::parse("cC").unwrap(),
            dir.path(),
            &second,
            &["pkg/a.py".to_string(), "pkg/b.py".to_string()],
        )
        .unwrap();

        assert_eq!(fs::read(first).unwrap(), fs::read(second).unwrap());
    }
}
