//! Platform-tag matching and per-package artifact selection.
//!
//! Maps parsed platform tags to normalized selection conditions, picks the
//! best artifact when several compatibility aliases group under the same
//! condition, and renders the per-package platform-conditional selection
//! expression.

use std::collections::{BTreeMap, BTreeSet};

use thiserror::Error;

use wheelwright_schema::{LinuxTag, MACOSX_VERSIONS, MacosTag, OsArchTag, WheelName, cpu_alias};

use crate::package::Package;
use crate::source::SourceKind;

/// glibc version the default target platforms are built against.
pub const GLIBC_BASELINE: (u32, u32) = (2, 31);

/// musl version the default target platforms are built against.
pub const MUSL_BASELINE: (u32, u32) = (1, 1);

/// Errors raised while matching artifacts to platforms. All of these are
/// fatal: wrong targets silently corrupt downstream builds, so no guess is
/// ever emitted.
#[derive(Error, Debug)]
pub enum PlatformError {
    /// A group of candidate platform tags matches no known family (or mixes
    /// musllinux and manylinux tags under one condition).
    #[error(
        "unsupported wheel platform tags {tags:?}; please open an issue at https://github.com/wheelwright-build/wheelwright/issues/new to add support"
    )]
    UnsupportedTags {
        /// The offending candidate tag strings.
        tags: Vec<String>,
    },

    /// A package has neither a usable wheel nor a source distribution.
    #[error(
        "no installable artifact for package {0:?}; please open an issue at https://github.com/wheelwright-build/wheelwright/issues/new to add support"
    )]
    NoArtifact(String),
}

/// Normalized selection condition for a parsed wheel name.
///
/// glibc- and musl-linux tags collapse to
/// `{python}-{abi}-linux-{cpu}-{glibc|musl}` with CPU aliases applied; every
/// other platform keeps its tag verbatim as `{python}-{abi}-{platform}`.
/// Pure function of the tag; used both as grouping key and as the
/// platform-constraint label suffix.
pub fn select_condition(wheel: &WheelName) -> String {
    if let Some(tag) = OsArchTag::parse(&wheel.platform) {
        let cpu = cpu_alias(&tag.arch);
        match tag.os.as_str() {
            "linux" | "manylinux" => {
                return format!(
                    "{}-{}-linux-{}-glibc",
                    wheel.python_tag, wheel.abi_tag, cpu
                );
            }
            "musllinux" => {
                return format!("{}-{}-linux-{}-musl", wheel.python_tag, wheel.abi_tag, cpu);
            }
            _ => {}
        }
    }

    format!(
        "{}-{}-{}",
        wheel.python_tag, wheel.abi_tag, wheel.platform
    )
}

/// Parse every dot-joined alias of every candidate with one tag family,
/// producing `(libc version, target)` pairs. `None` when any alias falls
/// outside the family or the candidates span several architectures.
fn family_versions(
    candidates: &BTreeMap<String, String>,
    parse: fn(&str) -> Option<LinuxTag>,
) -> Option<Vec<((u32, u32), String)>> {
    let mut versions = Vec::new();
    let mut arches = BTreeSet::new();
    for (platforms, target) in candidates {
        for platform in platforms.split('.') {
            let tag = parse(platform)?;
            arches.insert(tag.arch);
            versions.push((tag.libc, target.clone()));
        }
    }
    (arches.len() == 1).then_some(versions)
}

/// Pick the highest-versioned target whose minimum libc version does not
/// exceed the baseline; when none qualify, fall back to the lowest-versioned
/// candidate (oldest, most compatible) rather than failing. The fallback is
/// deliberate leniency so builds stay usable on older baselines by default.
fn best_of_family(mut versions: Vec<((u32, u32), String)>, baseline: (u32, u32)) -> String {
    versions.sort();
    versions
        .iter()
        .filter(|(version, _)| baseline >= *version)
        .next_back()
        .unwrap_or(&versions[0])
        .1
        .clone()
}

/// Choose the single best target when multiple artifact platform strings
/// group under one selection condition.
///
/// Candidates must be all-musllinux or all-manylinux; an artifact tagged
/// with several dot-joined aliases competes with the lowest libc version any
/// alias claims.
///
/// # Errors
///
/// Returns [`PlatformError::UnsupportedTags`] for mixed or unrecognized
/// candidate families.
pub fn best_match(
    candidates: &BTreeMap<String, String>,
    glibc: (u32, u32),
    musl: (u32, u32),
) -> Result<String, PlatformError> {
    if let Some(versions) = family_versions(candidates, LinuxTag::parse_musllinux) {
        return Ok(best_of_family(versions, musl));
    }

    if let Some(versions) = family_versions(candidates, LinuxTag::parse_manylinux) {
        return Ok(best_of_family(versions, glibc));
    }

    Err(PlatformError::UnsupportedTags {
        tags: candidates.keys().cloned().collect(),
    })
}

impl Package {
    /// Render the artifact selection for this package as declaration lines:
    /// either a single unconditional target or a platform-conditional
    /// `select({...})` expression.
    ///
    /// # Errors
    ///
    /// Returns [`PlatformError`] when a candidate group cannot be matched or
    /// the package has no installable artifact at all.
    pub fn select(&self) -> Result<Vec<String>, PlatformError> {
        // Explicit non-index sources short-circuit to one fixed target.
        if let Some(source) = &self.source {
            if !matches!(source.kind, SourceKind::Legacy | SourceKind::Url) {
                let kind = if source.is_whl() { "whl" } else { "pkg" };
                return Ok(vec![format!("\"@{}//:{}\"", self.name, kind)]);
            }
        }

        // Collect candidate wheels: (condition, parsed name, target label),
        // restricted to CPython-3-compatible python tags, ordered by
        // condition then target so grouping is stable under input order.
        let mut candidates: Vec<(String, WheelName, String)> = self
            .wheels()
            .keys()
            .filter_map(|stem| {
                let wheel = WheelName::parse(stem)?;
                wheel.is_cpython3_compatible().then(|| {
                    let condition = select_condition(&wheel);
                    (condition, wheel, format!("\"@{stem}//:whl\""))
                })
            })
            .collect();
        candidates.sort_by(|a, b| (&a.0, &a.2).cmp(&(&b.0, &b.2)));

        let mut selected: BTreeMap<String, String> = BTreeMap::new();
        for group in candidates.chunk_by(|a, b| a.0 == b.0) {
            if let [(condition, wheel, target)] = group {
                if let Some(mac) = MacosTag::parse(&wheel.platform) {
                    // A wheel built for an older macOS release is valid on
                    // every newer one; register it under each release at or
                    // above its declared minimum so newer targets resolve.
                    for (major, minor) in MACOSX_VERSIONS {
                        if (major, minor) >= (mac.major, mac.minor) {
                            let back_compatible = format!(
                                "{}-{}-macosx_{}_{}_{}",
                                wheel.python_tag, wheel.abi_tag, major, minor, mac.arch
                            );
                            selected.insert(back_compatible, target.clone());
                        }
                    }
                } else {
                    selected.insert(condition.clone(), target.clone());
                }
            } else {
                let group_candidates: BTreeMap<String, String> = group
                    .iter()
                    .map(|(_, wheel, target)| (wheel.platform.clone(), target.clone()))
                    .collect();
                selected.insert(
                    group[0].0.clone(),
                    best_match(&group_candidates, GLIBC_BASELINE, MUSL_BASELINE)?,
                );
            }
        }

        // A universal artifact needs no platform split.
        if let Some(target) = selected
            .iter()
            .find_map(|(condition, target)| condition.ends_with("any").then_some(target))
        {
            return Ok(vec![target.clone()]);
        }

        let sdist = self.sdist().keys().next().cloned();
        if selected.is_empty() && sdist.is_none() {
            return Err(PlatformError::NoArtifact(self.name.clone()));
        }

        let mut conditions: Vec<(String, Option<String>)> = selected
            .into_iter()
            .map(|(condition, target)| {
                (
                    format!("\"@wheelwright//python/platforms:{condition}\""),
                    Some(target),
                )
            })
            .collect();
        conditions.push((
            "\"//conditions:default\"".to_string(),
            sdist.map(|stem| format!("\"@{stem}//:sdist\"")),
        ));

        if let [(_, target)] = conditions.as_slice() {
            // Only the default branch remains: a single unconditional sdist.
            return Ok(vec![target.clone().unwrap_or_else(|| "None".to_string())]);
        }

        let mut lines = vec!["select({".to_string()];
        for (condition, target) in conditions {
            let target = target.unwrap_or_else(|| "None".to_string());
            lines.push(format!("  {condition}: {target},"));
        }
        lines.push("})".to_string());
        Ok(lines)
    }
}
