//! Remote package-index lookups.
//!
//! Resolves artifact hashes to download URLs against a PEP 503 / PEP 691
//! simple index, first attempting the structured JSON response and falling
//! back to parsing the hyperlink-based HTML form.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use thiserror::Error;
use url::Url;

/// MIME type of the JSON-based simple index (PEP 691).
pub const PYPI_SIMPLE_MIME_TYPE: &str = "application/vnd.pypi.simple.v1+json";

static HREF_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"href\s*=\s*(?:"([^"]+)"|'([^']+)')"#).expect("href regex is valid")
});

static SHA256_FRAGMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"#sha256=([0-9a-fA-F]{64})").expect("fragment regex is valid"));

/// Errors raised during index resolution. All are fatal for the overall
/// manifest generation: an incomplete manifest is worse than a clear
/// failure.
#[derive(Error, Debug)]
pub enum IndexError {
    /// The HTTP request failed or timed out.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The index answered with a non-200 status.
    #[error("unexpected status code {status} for {url}")]
    Status {
        /// Queried index URL.
        url: String,
        /// Response status code.
        status: u16,
    },

    /// A relative link in the HTML response could not be resolved.
    #[error("invalid URL in index response: {0}")]
    Url(#[from] url::ParseError),
}

#[derive(Debug, Deserialize)]
struct SimpleIndex {
    #[serde(default)]
    files: Vec<SimpleIndexFile>,
}

#[derive(Debug, Deserialize)]
struct SimpleIndexFile {
    url: Option<String>,
    #[serde(default)]
    hashes: BTreeMap<String, String>,
}

fn parse_html_index(base: &Url, body: &str) -> Result<BTreeMap<String, String>, IndexError> {
    let mut urls = BTreeMap::new();
    for captures in HREF_RE.captures_iter(body) {
        let href = captures
            .get(1)
            .or_else(|| captures.get(2))
            .map(|m| m.as_str())
            .unwrap_or_default();
        if let Some(fragment) = SHA256_FRAGMENT_RE.captures(href) {
            urls.insert(fragment[1].to_string(), base.join(href)?.to_string());
        }
    }
    Ok(urls)
}

/// Query the simple index for one package, returning a sha256 → URL map of
/// its published files.
///
/// # Errors
///
/// Returns [`IndexError`] on network failure, a non-200 response, or
/// unresolvable links.
pub async fn simple_index(
    client: &reqwest::Client,
    name: &str,
    index_url: &str,
) -> Result<BTreeMap<String, String>, IndexError> {
    let package_index_url = format!("{index_url}/{name}/");
    let response = client
        .get(&package_index_url)
        .header(
            reqwest::header::ACCEPT,
            format!("{PYPI_SIMPLE_MIME_TYPE}, text/html"),
        )
        .header(reqwest::header::USER_AGENT, crate::USER_AGENT)
        .send()
        .await?;

    if response.status() != reqwest::StatusCode::OK {
        return Err(IndexError::Status {
            url: package_index_url,
            status: response.status().as_u16(),
        });
    }

    let is_json = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with(PYPI_SIMPLE_MIME_TYPE));

    if is_json {
        let index: SimpleIndex = response.json().await?;
        return Ok(index
            .files
            .into_iter()
            .filter_map(|file| {
                let sha256 = file.hashes.get("sha256")?.clone();
                Some((sha256, file.url?))
            })
            .collect());
    }

    // Fallback to the hyperlink-based HTML index.
    let base = response.url().clone();
    let body = response.text().await?;
    parse_html_index(&base, &body)
}
