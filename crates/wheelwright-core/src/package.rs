//! The common locked-package entity and the per-dialect lock-file loaders.
//!
//! Both dialects (poetry and uv) are translated into the same [`Package`]
//! shape in one explicit pass per dialect; the rest of the pipeline never
//! looks at raw lock-file records. Loaders never perform network I/O.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

use wheelwright_schema::{Semver, normalize_basename, normalize_target_name};

use crate::source::{Source, SourceKind};

/// Errors that can occur when loading a lock file.
#[derive(Error, Debug)]
pub enum LockError {
    /// An I/O error occurred while reading the lock file.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The TOML content could not be deserialized.
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// A source record does not match any known shape.
    #[error(
        "unsupported source {0}; please open an issue at https://github.com/wheelwright-build/wheelwright/issues/new to add support"
    )]
    UnsupportedSource(String),
}

/// Attributes carried on a dependency edge.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dependency {
    /// Environment-marker expression guarding the edge, when present.
    pub markers: Option<String>,
}

impl Dependency {
    /// An edge guarded by the given marker; empty markers collapse to none.
    pub fn with_markers(markers: &str) -> Self {
        Self {
            markers: (!markers.is_empty()).then(|| markers.to_string()),
        }
    }
}

/// A locked dependency.
///
/// Constructed once by a loader, mutated in place only by the graph
/// processor, immutable during rendering. `dependencies` keys are always
/// normalized before storage so edge lookups never miss on spelling
/// variance. All maps are ordered so iteration is deterministic.
#[derive(Debug, Clone, Default)]
pub struct Package {
    /// Original package name as spelled in the lock file.
    pub name: String,
    /// Locked version; absent only for synthetic/meta entries.
    pub version: Option<String>,
    /// Human-readable summary.
    pub description: String,
    /// Normalized artifact basename → sha256 content hash.
    pub files: BTreeMap<String, String>,
    /// sha256 content hash → download URL, when the lock format embeds URLs.
    pub urls: BTreeMap<String, String>,
    /// Environment-marker expression guarding the whole package.
    pub markers: String,
    /// Normalized dependency name → edge attributes.
    pub dependencies: BTreeMap<String, Dependency>,
    /// Externally injected dependency target labels, rendered verbatim.
    pub extra_dependencies: Vec<String>,
    /// Extras group name → raw dependency specifiers.
    pub extras: BTreeMap<String, Vec<String>>,
    /// Provenance, when the package does not come from the default index.
    pub source: Option<Source>,
    /// Local-editable flag.
    pub develop: bool,
}

impl Package {
    /// The package version parsed permissively; `0.0.0.0` when absent or
    /// unparsable.
    pub fn semver(&self) -> Semver {
        self.version.as_deref().map(Semver::parse).unwrap_or_default()
    }

    /// Prebuilt artifacts: wheel basename without extension → hash.
    pub fn wheels(&self) -> BTreeMap<String, String> {
        self.files
            .iter()
            .filter_map(|(name, hash)| {
                name.strip_suffix(".whl")
                    .map(|stem| (stem.to_string(), hash.clone()))
            })
            .collect()
    }

    /// Source archives: sdist basename without extension → hash.
    pub fn sdist(&self) -> BTreeMap<String, String> {
        self.files
            .iter()
            .filter_map(|(name, hash)| {
                name.strip_suffix(".tar.gz")
                    .map(|stem| (stem.to_string(), hash.clone()))
            })
            .collect()
    }
}

/// Strip the `sha256:` prefix from a lock-file hash, or drop the entry with
/// a warning when the algorithm is not one we can verify downstream.
fn sha256_digest(context: &str, hash: &str) -> Option<String> {
    match hash.strip_prefix("sha256:") {
        Some(digest) => Some(digest.to_string()),
        None => {
            warn!("dropping {context}: unknown hash algorithm in {hash:?}");
            None
        }
    }
}

// ============================================================================
// Poetry dialect
// ============================================================================

#[derive(Debug, Deserialize)]
struct PoetryLock {
    #[serde(default)]
    package: Vec<PoetryPackage>,
}

#[derive(Debug, Deserialize)]
struct PoetryPackage {
    name: String,
    version: Option<String>,
    #[serde(default)]
    description: String,
    #[serde(default)]
    files: Vec<PoetryFile>,
    #[serde(default)]
    dependencies: BTreeMap<String, toml::Value>,
    #[serde(default)]
    markers: String,
    #[serde(default)]
    extras: BTreeMap<String, Vec<String>>,
    source: Option<PoetrySource>,
    #[serde(default)]
    develop: bool,
}

#[derive(Debug, Deserialize)]
struct PoetryFile {
    file: String,
    hash: String,
}

#[derive(Debug, Deserialize)]
struct PoetrySource {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    url: String,
    reference: Option<String>,
    resolved_reference: Option<String>,
    subdirectory: Option<String>,
}

impl PoetryPackage {
    fn into_package(self, project_root: &Path) -> Result<Package, LockError> {
        // Optional dependencies are extras material and are not edges of the
        // locked graph. A plain version-string or multi-constraint value is
        // always a real edge.
        let dependencies = self
            .dependencies
            .into_iter()
            .filter_map(|(name, attr)| {
                let dependency = match &attr {
                    toml::Value::Table(table) => {
                        if table.get("optional").and_then(toml::Value::as_bool) == Some(true) {
                            return None;
                        }
                        let markers = table
                            .get("markers")
                            .or_else(|| table.get("marker"))
                            .and_then(toml::Value::as_str)
                            .unwrap_or_default();
                        Dependency::with_markers(markers)
                    }
                    _ => Dependency::default(),
                };
                Some((normalize_target_name(&name), dependency))
            })
            .collect();

        let source = match self.source {
            Some(record) => {
                let kind = SourceKind::parse(&record.kind)
                    .ok_or_else(|| LockError::UnsupportedSource(record.kind.clone()))?;
                Some(Source::from_poetry(
                    project_root,
                    kind,
                    record.url,
                    record.reference,
                    record.resolved_reference,
                    record.subdirectory,
                ))
            }
            None => None,
        };

        let files = self
            .files
            .into_iter()
            .filter_map(|entry| {
                sha256_digest(&entry.file, &entry.hash)
                    .map(|digest| (normalize_basename(&entry.file), digest))
            })
            .collect();

        Ok(Package {
            name: self.name,
            version: self.version,
            description: self.description,
            files,
            urls: BTreeMap::new(),
            markers: self.markers,
            dependencies,
            extra_dependencies: Vec::new(),
            extras: self.extras,
            source,
            develop: self.develop,
        })
    }
}

/// Load packages from a poetry lock file.
///
/// # Errors
///
/// Returns [`LockError`] if the file cannot be read, is not valid TOML, or
/// carries a source record of an unknown kind.
pub fn load_poetry_lock(lock_file: &Path, project_root: &Path) -> Result<Vec<Package>, LockError> {
    let content = fs::read_to_string(lock_file)?;
    let lock: PoetryLock = toml::from_str(&content)?;
    lock.package
        .into_iter()
        .map(|package| package.into_package(project_root))
        .collect()
}

// ============================================================================
// uv dialect
// ============================================================================

#[derive(Debug, Deserialize)]
struct UvLock {
    #[serde(default)]
    package: Vec<UvPackage>,
}

#[derive(Debug, Deserialize)]
struct UvPackage {
    name: String,
    version: Option<String>,
    #[serde(default)]
    dependencies: Vec<UvDependency>,
    source: Option<UvSource>,
    sdist: Option<UvFile>,
    #[serde(default)]
    wheels: Vec<UvFile>,
}

#[derive(Debug, Deserialize)]
struct UvDependency {
    name: String,
    marker: Option<String>,
}

/// The uv lock source table has one distinguishing key per shape.
#[derive(Debug, Deserialize)]
struct UvSource {
    url: Option<String>,
    registry: Option<String>,
    git: Option<String>,
    editable: Option<String>,
    #[serde(rename = "virtual")]
    virtual_: Option<String>,
    path: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UvFile {
    url: Option<String>,
    hash: Option<String>,
}

impl UvSource {
    fn into_source(self, project_root: &Path) -> Result<Source, LockError> {
        if let Some(url) = self.url {
            Ok(Source::from_url(SourceKind::Url, &url))
        } else if let Some(url) = self.registry {
            Ok(Source::from_url(SourceKind::Legacy, &url))
        } else if let Some(url) = self.git {
            Ok(Source::from_uv_git(&url))
        } else if let Some(path) = self.editable.or(self.virtual_) {
            Ok(Source::from_uv_path(project_root, SourceKind::Directory, &path))
        } else if let Some(path) = self.path {
            Ok(Source::from_uv_path(project_root, SourceKind::File, &path))
        } else {
            Err(LockError::UnsupportedSource("empty uv source table".to_string()))
        }
    }
}

impl UvPackage {
    fn into_package(self, project_root: &Path) -> Result<Package, LockError> {
        let dependencies = self
            .dependencies
            .into_iter()
            .map(|dep| {
                let markers = dep.marker.unwrap_or_default();
                (normalize_target_name(&dep.name), Dependency::with_markers(&markers))
            })
            .collect();

        let source = self
            .source
            .map(|record| record.into_source(project_root))
            .transpose()?;

        // The uv dialect embeds artifact URLs directly; entries without
        // their own URL inherit the source URL.
        let default_url = source.as_ref().map(|source| source.url.clone());
        let mut urls = BTreeMap::new();
        for entry in self.wheels.into_iter().chain(self.sdist) {
            let Some(url) = entry.url.or_else(|| default_url.clone()) else {
                continue;
            };
            let Some(hash) = entry.hash else { continue };
            if let Some(digest) = sha256_digest(&url, &hash) {
                urls.insert(digest, url);
            }
        }

        let files = urls
            .iter()
            .map(|(digest, url)| (normalize_basename(url), digest.clone()))
            .collect();

        Ok(Package {
            name: self.name,
            version: self.version,
            dependencies,
            source,
            urls,
            files,
            ..Package::default()
        })
    }
}

/// Load packages from a uv lock file.
///
/// # Errors
///
/// Returns [`LockError`] if the file cannot be read, is not valid TOML, or
/// carries a source record of an unknown shape.
pub fn load_uv_lock(lock_file: &Path, project_root: &Path) -> Result<Vec<Package>, LockError> {
    let content = fs::read_to_string(lock_file)?;
    let lock: UvLock = toml::from_str(&content)?;
    lock.package
        .into_iter()
        .map(|package| package.into_package(project_root))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const POETRY_LOCK: &str = r#"
[[package]]
name = "cffi"
version = "1.17.1"
description = "Foreign Function Interface for Python calling C code."
files = [
    {file = "cffi-1.17.1-cp312-cp312-manylinux_2_17_x86_64.manylinux2014_x86_64.whl", hash = "sha256:1111111111111111111111111111111111111111111111111111111111111111"},
    {file = "cffi-1.17.1.tar.gz", hash = "sha256:2222222222222222222222222222222222222222222222222222222222222222"},
    {file = "cffi-1.17.1-unverifiable.whl", hash = "md5:d41d8cd98f00b204e9800998ecf8427e"},
]

[package.dependencies]
pycparser = "*"

[[package]]
name = "charset-normalizer"
version = "3.4.0"
description = ""
files = []

[package.dependencies]
Typing_Extensions = {version = ">=4.0", markers = "python_version < \"3.11\""}
unused = {version = "*", optional = true}
"#;

    const UV_LOCK: &str = r#"
version = 1

[[package]]
name = "idna"
version = "3.10"
source = { registry = "https://pypi.org/simple" }
sdist = { url = "https://files.example.org/packages/idna-3.10.tar.gz", hash = "sha256:3333333333333333333333333333333333333333333333333333333333333333", size = 190490 }
wheels = [
    { url = "https://files.example.org/packages/idna-3.10-py3-none-any.whl", hash = "sha256:4444444444444444444444444444444444444444444444444444444444444444", size = 70442 },
]

[[package]]
name = "anyio"
version = "4.6.0"
source = { registry = "https://pypi.org/simple" }
dependencies = [
    { name = "idna", marker = "python_version >= \"3.9\"" },
]

[[package]]
name = "local-pkg"
version = "0.1.0"
source = { editable = "pkgs/local" }
"#;

    fn write_lock(content: &str, name: &str) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(name);
        fs::write(&path, content).unwrap();
        (dir, path)
    }

    #[test]
    fn test_poetry_loader_files_and_deps() {
        let (_dir, path) = write_lock(POETRY_LOCK, "poetry.lock");
        let packages = load_poetry_lock(&path, Path::new("/project")).unwrap();
        assert_eq!(packages.len(), 2);

        let cffi = &packages[0];
        assert_eq!(cffi.name, "cffi");
        assert_eq!(cffi.version.as_deref(), Some("1.17.1"));
        // md5 entry is dropped
        assert_eq!(cffi.files.len(), 2);
        assert_eq!(cffi.wheels().len(), 1);
        assert_eq!(cffi.sdist().len(), 1);
        assert!(cffi.dependencies.contains_key("pycparser"));

        let charset = &packages[1];
        // normalized key, optional dependency dropped
        let dep = charset.dependencies.get("typing-extensions").unwrap();
        assert_eq!(dep.markers.as_deref(), Some("python_version < \"3.11\""));
        assert!(!charset.dependencies.contains_key("unused"));
    }

    #[test]
    fn test_uv_loader_urls_and_source() {
        let (_dir, path) = write_lock(UV_LOCK, "uv.lock");
        let packages = load_uv_lock(&path, Path::new("/project")).unwrap();
        assert_eq!(packages.len(), 3);

        let idna = &packages[0];
        assert_eq!(idna.urls.len(), 2);
        assert_eq!(
            idna.files.get("idna-3.10-py3-none-any.whl").unwrap(),
            "4444444444444444444444444444444444444444444444444444444444444444"
        );
        assert_eq!(idna.source.as_ref().unwrap().kind, SourceKind::Legacy);

        let anyio = &packages[1];
        let dep = anyio.dependencies.get("idna").unwrap();
        assert!(dep.markers.as_deref().unwrap().contains("python_version"));

        let local = &packages[2];
        let source = local.source.as_ref().unwrap();
        assert_eq!(source.kind, SourceKind::Directory);
        assert_eq!(source.url, "/project/pkgs/local");
    }

    #[test]
    fn test_semver_view() {
        let package = Package {
            version: Some("2.7.0+cu118".to_string()),
            ..Package::default()
        };
        assert_eq!(package.semver().as_tuple(), (2, 7, 0, 0));
        assert_eq!(Package::default().semver().as_tuple(), (0, 0, 0, 0));
    }
}
