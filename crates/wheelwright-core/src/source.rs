//! Package provenance.
//!
//! Each locked package may carry a source record describing where it comes
//! from. Path-type sources are resolved to absolute form at load time so the
//! generated declarations never depend on the caller's working directory.

use std::path::Path;

/// Where a locked package comes from.
///
/// Closed set so every consumption site matches exhaustively; adding a new
/// source kind is a compile-time-checked change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// A local directory (editable installs, path dependencies).
    Directory,
    /// A local archive or wheel file.
    File,
    /// A git repository.
    Git,
    /// A mercurial repository.
    Hg,
    /// A PEP 503 style package index.
    Legacy,
    /// A direct download URL.
    Url,
}

impl SourceKind {
    /// Parse the poetry lock `source.type` field.
    pub fn parse(kind: &str) -> Option<Self> {
        match kind {
            "directory" => Some(Self::Directory),
            "file" => Some(Self::File),
            "git" => Some(Self::Git),
            "hg" => Some(Self::Hg),
            "legacy" => Some(Self::Legacy),
            "url" => Some(Self::Url),
            _ => None,
        }
    }
}

/// Provenance of a locked package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source {
    /// The source kind.
    pub kind: SourceKind,
    /// Location: a URL, or an absolute filesystem path for path-type kinds.
    pub url: String,
    /// Version-control reference (branch, tag) as written in the lock file.
    pub reference: Option<String>,
    /// Fully resolved version-control revision.
    pub resolved_reference: Option<String>,
    /// Subdirectory within the source holding the package.
    pub subdirectory: Option<String>,
}

impl Source {
    /// Whether this source points at a prebuilt wheel.
    pub fn is_whl(&self) -> bool {
        self.kind == SourceKind::File && self.url.ends_with(".whl")
    }

    /// Build a source from poetry lock fields, resolving path-type URLs
    /// against the project root.
    pub fn from_poetry(
        project_root: &Path,
        kind: SourceKind,
        url: String,
        reference: Option<String>,
        resolved_reference: Option<String>,
        subdirectory: Option<String>,
    ) -> Self {
        let url = match kind {
            SourceKind::Directory | SourceKind::File => absolutize(project_root, &url),
            _ => url,
        };
        Self {
            kind,
            url,
            reference,
            resolved_reference,
            subdirectory,
        }
    }

    /// Build a git source from a uv lock URL, splitting off the `#commit`
    /// fragment into the resolved reference.
    pub fn from_uv_git(url: &str) -> Self {
        let (url, fragment) = match url.split_once('#') {
            Some((url, fragment)) => (url, Some(fragment.to_string())),
            None => (url, None),
        };
        Self {
            kind: SourceKind::Git,
            url: url.to_string(),
            reference: None,
            resolved_reference: fragment,
            subdirectory: None,
        }
    }

    /// Build a path-type source from a uv lock field, resolved against the
    /// project root.
    pub fn from_uv_path(project_root: &Path, kind: SourceKind, path: &str) -> Self {
        Self {
            kind,
            url: absolutize(project_root, path),
            reference: None,
            resolved_reference: None,
            subdirectory: None,
        }
    }

    /// A non-path source identified only by its URL (registry or direct).
    pub fn from_url(kind: SourceKind, url: &str) -> Self {
        Self {
            kind,
            url: url.to_string(),
            reference: None,
            resolved_reference: None,
            subdirectory: None,
        }
    }
}

/// Join a possibly-relative path onto the project root and normalize it,
/// without touching the filesystem.
fn absolutize(project_root: &Path, url: &str) -> String {
    let joined = project_root.join(url);
    std::path::absolute(&joined)
        .unwrap_or(joined)
        .to_string_lossy()
        .into_owned()
}
