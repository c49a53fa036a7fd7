//! Package and artifact name normalization.

use std::sync::LazyLock;

use percent_encoding::percent_decode_str;
use regex::Regex;

static UNSAFE_CHARS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9._-]").expect("charset regex is valid"));

/// Normalize an artifact basename: take the last path/URL segment,
/// percent-decode it, and replace every character outside `[A-Za-z0-9._-]`
/// with `-` so the result is safe as a build target name.
pub fn normalize_basename(name: &str) -> String {
    let basename = name.rsplit('/').next().unwrap_or(name);
    let decoded = percent_decode_str(basename).decode_utf8_lossy();
    UNSAFE_CHARS_RE.replace_all(&decoded, "-").into_owned()
}

/// Normalize a dependency/target name: trim whitespace and quotes, map `_`
/// and `.` to `-`, and lower-case. Dependency-edge keys are always stored
/// normalized so lookups never miss on spelling variance.
pub fn normalize_target_name(name: &str) -> String {
    name.trim()
        .trim_matches(|c| c == '"' || c == '\'')
        .replace(['_', '.'], "-")
        .to_lowercase()
}
