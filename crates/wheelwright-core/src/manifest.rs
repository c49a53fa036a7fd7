//! Acquisition-manifest generation.
//!
//! Maps each locked package onto the external repository declarations a
//! build system needs to fetch it: pinned `http_archive` entries for wheels
//! and sdists, `local_repository` for path dependencies, `git_repository`
//! for VCS pins. Artifacts without an explicit URL are resolved through the
//! package index.

use std::collections::BTreeMap;

use futures::future::try_join_all;
use serde::Serialize;
use thiserror::Error;
use wheelwright_schema::normalize_basename;

use crate::index::{self, IndexError};
use crate::package::Package;
use crate::source::SourceKind;
use crate::NEW_ISSUE_URL;

/// Default index queried for packages without an explicit source.
pub const DEFAULT_INDEX_URL: &str = "https://pypi.org/simple";

/// Errors raised while assembling the manifest.
#[derive(Error, Debug)]
pub enum ManifestError {
    /// Index lookup failed.
    #[error(transparent)]
    Index(#[from] IndexError),

    /// A locked artifact's digest has no matching download URL.
    #[error("no download URL found for {name} artifact with sha256 {sha256}")]
    MissingUrl {
        /// Package name.
        name: String,
        /// Digest of the artifact without a URL.
        sha256: String,
    },

    /// The lock file uses a source kind the manifest cannot express.
    #[error(
        "{kind:?} source for {name} is not supported yet, please report it at {NEW_ISSUE_URL}"
    )]
    UnsupportedSource {
        /// Package name.
        name: String,
        /// Offending source kind.
        kind: SourceKind,
    },

    /// Manifest serialization failed.
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// One external repository declaration. Serialized shape is consumed by the
/// build-system glue, so field names and the `kind` tag are part of the
/// output contract.
#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Repository {
    /// A fetched-and-verified archive, wheel or sdist.
    HttpArchive {
        name: String,
        url: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        sha256: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        strip_prefix: Option<String>,
        build_file: String,
        #[serde(skip_serializing_if = "Option::is_none", rename = "type")]
        archive_type: Option<String>,
    },
    /// A directory dependency used in place.
    LocalRepository {
        name: String,
        path: String,
        build_file: String,
    },
    /// A VCS dependency pinned to a commit.
    GitRepository {
        name: String,
        remote: String,
        commit: String,
        build_file: String,
    },
}

fn build_file(kind: &str) -> String {
    format!(
        r#"package(default_visibility = ["//visibility:public"])
filegroup(
    name="{kind}",
    srcs = glob(["**/*"], exclude = ["target/**", "tests/**", "**/__pycache__/**", "*.egg-info/**"]),
)"#
    )
}

fn url_for(
    package: &Package,
    urls: &BTreeMap<String, String>,
    sha256: &str,
) -> Result<String, ManifestError> {
    urls.get(sha256)
        .cloned()
        .ok_or_else(|| ManifestError::MissingUrl {
            name: package.name.clone(),
            sha256: sha256.to_string(),
        })
}

/// Produce the repository declarations for one package.
///
/// # Errors
///
/// Returns [`ManifestError`] on unsupported source kinds, failed index
/// lookups, or digests without a download URL.
pub async fn package_repositories(
    client: &reqwest::Client,
    package: &Package,
) -> Result<Vec<Repository>, ManifestError> {
    let mut index_url = DEFAULT_INDEX_URL.to_string();
    let mut urls = BTreeMap::new();

    if let Some(source) = &package.source {
        match source.kind {
            SourceKind::File => {
                return Ok(vec![Repository::HttpArchive {
                    name: package.name.clone(),
                    url: format!("file://{}", source.url),
                    // TODO: pick up the sha256 recorded in the lock file
                    sha256: None,
                    strip_prefix: None,
                    build_file: build_file(if source.is_whl() { "whl" } else { "pkg" }),
                    archive_type: None,
                }]);
            }
            SourceKind::Directory => {
                return Ok(vec![Repository::LocalRepository {
                    name: package.name.clone(),
                    path: source.url.clone(),
                    build_file: build_file("pkg"),
                }]);
            }
            SourceKind::Git => {
                let commit = source
                    .resolved_reference
                    .as_deref()
                    .or(source.reference.as_deref())
                    .unwrap_or_default();
                return Ok(vec![Repository::GitRepository {
                    name: package.name.clone(),
                    remote: source.url.clone(),
                    commit: commit.to_string(),
                    build_file: build_file("pkg"),
                }]);
            }
            SourceKind::Url => {
                let basename = normalize_basename(&source.url);
                let sha256 = package.files.get(&basename).cloned().ok_or_else(|| {
                    ManifestError::MissingUrl {
                        name: package.name.clone(),
                        sha256: basename,
                    }
                })?;
                urls.insert(sha256, source.url.clone());
            }
            SourceKind::Legacy => index_url = source.url.clone(),
            SourceKind::Hg => {
                return Err(ManifestError::UnsupportedSource {
                    name: package.name.clone(),
                    kind: source.kind,
                });
            }
        }
    }

    // Pinned URLs from the lock file win; otherwise ask the index.
    if urls.is_empty() {
        urls = package.urls.clone();
    }
    if urls.is_empty() {
        urls = index::simple_index(client, &package.name, &index_url).await?;
    }

    let mut repositories = Vec::new();
    for (name, sha256) in package.wheels() {
        repositories.push(Repository::HttpArchive {
            url: url_for(package, &urls, &sha256)?,
            name,
            sha256: Some(sha256),
            strip_prefix: None,
            build_file: build_file("whl"),
            // Wheels are zip archives (PEP 427).
            archive_type: Some("zip".to_string()),
        });
    }
    for (name, sha256) in package.sdist() {
        repositories.push(Repository::HttpArchive {
            url: url_for(package, &urls, &sha256)?,
            strip_prefix: Some(name.clone()),
            name,
            sha256: Some(sha256),
            build_file: build_file("sdist"),
            archive_type: None,
        });
    }
    Ok(repositories)
}

/// Resolve every package concurrently and serialize the flattened repository
/// list as pretty-printed JSON.
///
/// # Errors
///
/// Returns [`ManifestError`] when any package fails to resolve.
pub async fn generate_files(packages: &[Package]) -> Result<String, ManifestError> {
    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(60))
        .build()
        .map_err(IndexError::Http)?;

    let results = try_join_all(
        packages
            .iter()
            .map(|package| package_repositories(&client, package)),
    )
    .await?;

    let repositories: Vec<Repository> = results.into_iter().flatten().collect();
    Ok(serde_json::to_string_pretty(&repositories)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::Source;
    use mockito::Server;

    const SHA256_WHL: &str = "872f880de3fc3a5bdc88a11b39c9710c3497a547cfa9320bc3c5e62fbf272e79";
    const SHA256_SDIST: &str = "86c0d0b93306b961d58d62a4db4879f27fe25513d4b969df351abdddb3c30e01";

    fn locked(name: &str) -> Package {
        Package {
            name: name.to_string(),
            version: Some("1.0".to_string()),
            ..Package::default()
        }
    }

    #[tokio::test]
    async fn test_directory_source_becomes_local_repository() {
        let mut pkg = locked("mylib");
        pkg.source = Some(Source::from_url(SourceKind::Directory, "/workspace/mylib"));

        let client = reqwest::Client::new();
        let repos = package_repositories(&client, &pkg).await.unwrap();
        assert_eq!(
            repos,
            [Repository::LocalRepository {
                name: "mylib".to_string(),
                path: "/workspace/mylib".to_string(),
                build_file: build_file("pkg"),
            }]
        );
    }

    #[tokio::test]
    async fn test_git_source_prefers_resolved_reference() {
        let mut pkg = locked("tools");
        let mut source = Source::from_url(SourceKind::Git, "https://github.com/example/tools.git");
        source.reference = Some("main".to_string());
        source.resolved_reference = Some("0123abc".to_string());
        pkg.source = Some(source);

        let client = reqwest::Client::new();
        let repos = package_repositories(&client, &pkg).await.unwrap();
        let Repository::GitRepository { commit, .. } = &repos[0] else {
            panic!("expected git repository, got {repos:?}");
        };
        assert_eq!(commit, "0123abc");
    }

    #[tokio::test]
    async fn test_url_source_pins_from_lock_files() {
        let mut pkg = locked("pins");
        let url = "https://files.example.org/pins-1.0-py3-none-any.whl";
        pkg.source = Some(Source::from_url(SourceKind::Url, url));
        pkg.files
            .insert("pins-1.0-py3-none-any.whl".to_string(), SHA256_WHL.to_string());

        let client = reqwest::Client::new();
        let repos = package_repositories(&client, &pkg).await.unwrap();
        assert_eq!(repos.len(), 1);
        let Repository::HttpArchive {
            url: repo_url,
            sha256,
            archive_type,
            ..
        } = &repos[0]
        else {
            panic!("expected http archive, got {repos:?}");
        };
        assert_eq!(repo_url, url);
        assert_eq!(sha256.as_deref(), Some(SHA256_WHL));
        assert_eq!(archive_type.as_deref(), Some("zip"));
    }

    #[tokio::test]
    async fn test_legacy_source_resolves_via_index() {
        let mut server = Server::new_async().await;
        let body = format!(
            r#"{{"files": [
                {{"url": "https://mirror.example.org/demo-1.0-py3-none-any.whl", "hashes": {{"sha256": "{SHA256_WHL}"}}}},
                {{"url": "https://mirror.example.org/demo-1.0.tar.gz", "hashes": {{"sha256": "{SHA256_SDIST}"}}}}
            ]}}"#
        );
        let _m = server
            .mock("GET", "/simple/demo/")
            .with_status(200)
            .with_header("content-type", index::PYPI_SIMPLE_MIME_TYPE)
            .with_body(body)
            .create_async()
            .await;

        let mut pkg = locked("demo");
        pkg.source = Some(Source::from_url(
            SourceKind::Legacy,
            &format!("{}/simple", server.url()),
        ));
        pkg.files
            .insert("demo-1.0-py3-none-any.whl".to_string(), SHA256_WHL.to_string());
        pkg.files
            .insert("demo-1.0.tar.gz".to_string(), SHA256_SDIST.to_string());

        let client = reqwest::Client::new();
        let repos = package_repositories(&client, &pkg).await.unwrap();
        assert_eq!(repos.len(), 2);

        let Repository::HttpArchive { strip_prefix, .. } = &repos[1] else {
            panic!("expected http archive");
        };
        assert_eq!(strip_prefix.as_deref(), Some("demo-1.0"));
    }

    #[tokio::test]
    async fn test_missing_url_for_digest_is_fatal() {
        let mut pkg = locked("orphan");
        pkg.urls.insert(
            "0".repeat(64),
            "https://files.example.org/other.whl".to_string(),
        );
        pkg.files
            .insert("orphan-1.0-py3-none-any.whl".to_string(), SHA256_WHL.to_string());

        let client = reqwest::Client::new();
        let err = package_repositories(&client, &pkg).await.unwrap_err();
        assert!(matches!(err, ManifestError::MissingUrl { .. }));
    }

    #[test]
    fn test_manifest_serialization_shape() {
        let repo = Repository::HttpArchive {
            name: "demo-1.0-py3-none-any".to_string(),
            url: "https://files.example.org/demo-1.0-py3-none-any.whl".to_string(),
            sha256: Some(SHA256_WHL.to_string()),
            strip_prefix: None,
            build_file: build_file("whl"),
            archive_type: Some("zip".to_string()),
        };
        let encoded = serde_json::to_string(&repo).unwrap();
        assert!(encoded.starts_with(r#"{"kind":"http_archive","name":"demo-1.0-py3-none-any""#));
        assert!(encoded.contains(r#""type":"zip""#));
        assert!(!encoded.contains("strip_prefix"));
    }
}
