//! Wheel filename and platform-tag grammars.
//!
//! References:
//! - Binary distribution format file name convention
//!   (`{distribution}-{version}[-{build_tag}]-{python_tag}-{abi_tag}-{platform}`)
//! - PEP 425 – Compatibility Tags for Built Distributions
//! - PEP 427 – The Wheel Binary Package Format 1.0

use std::sync::LazyLock;

use regex::Regex;

static WHEEL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?P<distribution>[^-]+)-(?P<version>[^-]+)(?:-(?P<build_tag>[^-]+))?-(?P<python_tag>[^-]+)-(?P<abi_tag>[^-]+)-(?P<platform>.+)$",
    )
    .expect("wheel regex is valid")
});

static MACOSX_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^macosx_(?P<major>\d+)_(?P<minor>\d+)_(?P<arch>.+)$").expect("macosx regex is valid")
});

static MUSLLINUX_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^musllinux_(?P<major>\d+)_(?P<minor>\d+)_(?P<arch>.+)$")
        .expect("musllinux regex is valid")
});

static MANYLINUX_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^manylinux(?:(?P<legacy>\d+))?(?:_(?P<major>\d+)_(?P<minor>\d+))?_(?P<arch>[^.]+)$")
        .expect("manylinux regex is valid")
});

static OS_ARCH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?P<os>linux|manylinux|musllinux|macosx|ios|win)(?P<version>.+)(?P<arch>aarch(?:32|64)|arm(?:64(?:_32|e)?|v[0-9]l?)?|cortex-r(?:52|82)|i[36]86|mips64|ppc(?:32|64(?:[bl]e)?)?|riscv(?:32|64)|s390x|x86_(?:32|64))$",
    )
    .expect("platform regex is valid")
});

/// A parsed wheel filename (without the `.whl` extension).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WheelName {
    /// Distribution name as spelled in the filename.
    pub distribution: String,
    /// Version component of the filename.
    pub version: String,
    /// Optional build tag.
    pub build_tag: Option<String>,
    /// Python interpreter tag, possibly dot-joined (`py2.py3`).
    pub python_tag: String,
    /// ABI tag.
    pub abi_tag: String,
    /// Platform tag, possibly dot-joined over compatibility aliases.
    pub platform: String,
}

impl WheelName {
    /// Parse a wheel filename stem into its components, or `None` when the
    /// string does not follow the wheel naming convention.
    pub fn parse(stem: &str) -> Option<Self> {
        let caps = WHEEL_RE.captures(stem)?;
        Some(Self {
            distribution: caps["distribution"].to_string(),
            version: caps["version"].to_string(),
            build_tag: caps.name("build_tag").map(|m| m.as_str().to_string()),
            python_tag: caps["python_tag"].to_string(),
            abi_tag: caps["abi_tag"].to_string(),
            platform: caps["platform"].to_string(),
        })
    }

    /// Whether the python tag is usable for CPython 3: either a CPython
    /// C-extension tag (`cp…`) or the generic `py3` tag.
    pub fn is_cpython3_compatible(&self) -> bool {
        self.python_tag.starts_with("cp") || self.python_tag.split('.').any(|tag| tag == "py3")
    }
}

/// A `macosx_{major}_{minor}_{arch}` platform tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacosTag {
    /// Minimum supported macOS major version.
    pub major: u32,
    /// Minimum supported macOS minor version.
    pub minor: u32,
    /// CPU architecture (`x86_64`, `arm64`, `universal2`, …).
    pub arch: String,
}

impl MacosTag {
    /// Parse a macOS platform tag.
    pub fn parse(platform: &str) -> Option<Self> {
        let caps = MACOSX_RE.captures(platform)?;
        Some(Self {
            major: caps["major"].parse().ok()?,
            minor: caps["minor"].parse().ok()?,
            arch: caps["arch"].to_string(),
        })
    }
}

/// A parsed `musllinux_{major}_{minor}_{arch}` or
/// `manylinux…_{arch}` tag, normalized to its minimum libc baseline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinuxTag {
    /// Minimum required libc version (glibc or musl depending on family).
    pub libc: (u32, u32),
    /// CPU architecture.
    pub arch: String,
}

impl LinuxTag {
    /// Parse a musllinux tag into its musl baseline.
    pub fn parse_musllinux(platform: &str) -> Option<Self> {
        let caps = MUSLLINUX_RE.captures(platform)?;
        Some(Self {
            libc: (caps["major"].parse().ok()?, caps["minor"].parse().ok()?),
            arch: caps["arch"].to_string(),
        })
    }

    /// Parse a manylinux tag into its glibc baseline. Legacy aliases map to
    /// fixed baselines: unlabeled/`1` → glibc 2.5, `2010` → 2.12,
    /// `2014` → 2.17.
    pub fn parse_manylinux(platform: &str) -> Option<Self> {
        let caps = MANYLINUX_RE.captures(platform)?;
        let libc = match caps.name("legacy").map(|m| m.as_str()) {
            Some("2010") => (2, 12),
            Some("2014") => (2, 17),
            Some(_) => (2, 5),
            None => (
                caps.name("major")?.as_str().parse().ok()?,
                caps.name("minor")?.as_str().parse().ok()?,
            ),
        };
        Some(Self {
            libc,
            arch: caps["arch"].to_string(),
        })
    }
}

/// Residual `{os}{version}{arch}` platform shape covering every operating
/// system the catch-all grammar knows about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OsArchTag {
    /// Operating system prefix (`linux`, `manylinux`, `musllinux`,
    /// `macosx`, `ios`, `win`).
    pub os: String,
    /// Version fragment between the OS prefix and the architecture.
    pub version: String,
    /// CPU architecture, one of the closed alternation of known names.
    pub arch: String,
}

impl OsArchTag {
    /// Parse the catch-all platform shape.
    pub fn parse(platform: &str) -> Option<Self> {
        let caps = OS_ARCH_RE.captures(platform)?;
        Some(Self {
            os: caps["os"].to_string(),
            version: caps["version"].to_string(),
            arch: caps["arch"].to_string(),
        })
    }
}

/// Map architecture spellings used in platform tags to toolchain CPU names.
pub fn cpu_alias(arch: &str) -> &str {
    match arch {
        "armv7l" => "armv7",
        "i686" => "x86_32",
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_wheel_with_build_tag() {
        let wheel = WheelName::parse("dist-1.0-2-cp312-cp312-linux_x86_64").unwrap();
        assert_eq!(wheel.distribution, "dist");
        assert_eq!(wheel.version, "1.0");
        assert_eq!(wheel.build_tag.as_deref(), Some("2"));
        assert_eq!(wheel.python_tag, "cp312");
        assert_eq!(wheel.abi_tag, "cp312");
        assert_eq!(wheel.platform, "linux_x86_64");
    }

    #[test]
    fn test_parse_wheel_without_build_tag() {
        let wheel = WheelName::parse("sphinx-7.2.6-py3-none-any").unwrap();
        assert_eq!(wheel.build_tag, None);
        assert_eq!(wheel.python_tag, "py3");
        assert_eq!(wheel.abi_tag, "none");
        assert_eq!(wheel.platform, "any");
    }

    #[test]
    fn test_parse_wheel_dotted_platform() {
        let wheel = WheelName::parse(
            "zstandard-0.23.0-cp312-cp312-manylinux_2_5_i686.manylinux1_i686.manylinux_2_17_i686",
        )
        .unwrap();
        assert_eq!(wheel.platform.split('.').count(), 3);
    }

    #[test]
    fn test_parse_wheel_rejects_short_names() {
        assert!(WheelName::parse("only-three-parts").is_none());
    }

    #[test]
    fn test_cpython3_tag_filter() {
        let cases = [
            ("a-1-cp310-cp310-any", true),
            ("a-1-py2.py3-none-any", true),
            ("a-1-py3-none-any", true),
            ("a-1-py2-none-any", false),
            ("a-1-jy27-none-any", false),
        ];
        for (stem, expected) in cases {
            let wheel = WheelName::parse(stem).unwrap();
            assert_eq!(wheel.is_cpython3_compatible(), expected, "{stem}");
        }
    }

    #[test]
    fn test_macosx_tag() {
        let tag = MacosTag::parse("macosx_10_9_universal2").unwrap();
        assert_eq!((tag.major, tag.minor), (10, 9));
        assert_eq!(tag.arch, "universal2");
        assert!(MacosTag::parse("manylinux1_x86_64").is_none());
    }

    #[test]
    fn test_musllinux_tag() {
        let tag = LinuxTag::parse_musllinux("musllinux_1_2_aarch64").unwrap();
        assert_eq!(tag.libc, (1, 2));
        assert_eq!(tag.arch, "aarch64");
    }

    #[test]
    fn test_manylinux_legacy_baselines() {
        let cases = [
            ("manylinux1_x86_64", (2, 5)),
            ("manylinux2010_i686", (2, 12)),
            ("manylinux2014_aarch64", (2, 17)),
            ("manylinux_2_28_x86_64", (2, 28)),
        ];
        for (platform, libc) in cases {
            let tag = LinuxTag::parse_manylinux(platform).unwrap();
            assert_eq!(tag.libc, libc, "{platform}");
        }
    }

    #[test]
    fn test_os_arch_catch_all() {
        let tag = OsArchTag::parse("linux_armv7l").unwrap();
        assert_eq!((tag.os.as_str(), tag.arch.as_str()), ("linux", "armv7l"));

        let tag = OsArchTag::parse("manylinux1_x86_64").unwrap();
        assert_eq!(tag.os, "manylinux");

        let tag = OsArchTag::parse("ios_13_0_arm64_iphoneos");
        assert!(tag.is_none(), "iphoneos suffix is not a known arch");

        assert!(OsArchTag::parse("win32").is_none());
        assert!(OsArchTag::parse("solaris_sparc64").is_none());
    }

    #[test]
    fn test_cpu_alias() {
        assert_eq!(cpu_alias("armv7l"), "armv7");
        assert_eq!(cpu_alias("i686"), "x86_32");
        assert_eq!(cpu_alias("x86_64"), "x86_64");
    }
}
