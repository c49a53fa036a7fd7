//! Permissive semantic-version parsing.
//!
//! Lock files carry version strings that are close to, but not always,
//! valid semver (`2.7.0+cu118`, `1.2.3rc1`, `24.1`). Ordering among them is
//! advisory (grouping and display), so parsing never fails: anything the
//! grammar does not recognize degrades to `0.0.0.0`.

use std::sync::LazyLock;

use regex::Regex;

static SEMVER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?P<major>\d+)(?:\.(?P<minor>\d+))?(?:\.(?P<patch>\d+))?(?:\.(?P<rev>\d+))?(?:(?P<pre>[0-9A-Za-z\-.]+))?(?:\+(?P<build>[0-9A-Za-z\-.]+))?$",
    )
    .expect("semver regex is valid")
});

/// A four-component version, parsed permissively.
///
/// Non-numeric trailing components (pre-release, local build tags) are
/// ignored and missing numeric components default to zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Semver {
    /// Major version component.
    pub major: u32,
    /// Minor version component, zero when absent.
    pub minor: u32,
    /// Patch version component, zero when absent.
    pub patch: u32,
    /// Fourth (post/revision) component, zero when absent.
    pub rev: u32,
}

impl Semver {
    /// Parse a version string, degrading to `0.0.0.0` on any mismatch.
    pub fn parse(version: &str) -> Self {
        let Some(caps) = SEMVER_RE.captures(version) else {
            return Self::default();
        };

        let component = |name: &str| {
            caps.name(name)
                .and_then(|m| m.as_str().parse().ok())
                .unwrap_or(0)
        };

        Self {
            major: component("major"),
            minor: component("minor"),
            patch: component("patch"),
            rev: component("rev"),
        }
    }

    /// The version as a `(major, minor, patch, rev)` tuple.
    pub fn as_tuple(&self) -> (u32, u32, u32, u32) {
        (self.major, self.minor, self.patch, self.rev)
    }
}

impl std::fmt::Display for Semver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.major, self.minor, self.patch, self.rev
        )
    }
}

impl From<&str> for Semver {
    fn from(s: &str) -> Self {
        Self::parse(s)
    }
}
