//! Hermetic wheel installation through pip.
//!
//! Builds a hash-pinned requirements file and drives `python -m pip install`
//! with flags that keep the result reproducible: no dependency resolution,
//! no bytecode compilation, explicit platform and python-version tags, and a
//! post-install scrub of metadata that records absolute download paths.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;
use wheelwright_schema::{normalize_basename, WheelName};

use crate::venv::{self, VenvError};

static CXX_INCLUDE_DIRECTORY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^-[iI].*/c\+\+/").expect("include-dir regex is valid"));

/// Errors raised during installation.
#[derive(Error, Debug)]
pub enum InstallError {
    /// Filesystem operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The cc toolchain description is not valid JSON.
    #[error("invalid cc toolchain description: {0}")]
    Toolchain(#[from] serde_json::Error),

    /// More than one artifact URL survived platform filtering.
    #[error("expected a single source URL but received {}", .0.join(", "))]
    AmbiguousSources(Vec<String>),

    /// No python interpreter was given or found on PATH.
    #[error("python interpreter not found: {0}")]
    MissingInterpreter(#[from] which::Error),

    /// pip exited with a failure status.
    #[error("pip install returned {0}")]
    Pip(i32),

    /// Symlink-tree population failed.
    #[error(transparent)]
    Venv(#[from] VenvError),
}

/// One installation job, mirroring the command-line surface.
#[derive(Debug, Default)]
pub struct InstallRequest {
    /// Version-constraint requirement line, e.g. `requests==2.32.3`.
    pub spec: String,
    /// Directory the package is installed into.
    pub output: PathBuf,
    /// Artifact basename to hash-pin map from the lock file.
    pub files: BTreeMap<String, String>,
    /// Target python version for cross-installs.
    pub python_version: Option<String>,
    /// Accepted platform tags.
    pub platforms: Vec<String>,
    /// Extra index URLs.
    pub indexes: Vec<String>,
    /// Explicit artifact URLs, bypassing the index.
    pub source_urls: Vec<String>,
    /// JSON description of the C/C++ toolchain for building native code.
    pub cc_toolchain: Option<String>,
    /// Where to link the installed package's `entry_points.txt`.
    pub entry_points: Option<PathBuf>,
    /// Interpreter to run pip under; falls back to `python3` on PATH.
    pub python: Option<PathBuf>,
}

/// `--platform` and `--python-version` flags for a cross-platform install.
/// The bare `3` version pin is meaningless to pip and omitted.
fn platform_args(platforms: &[String], python_version: Option<&str>) -> Vec<String> {
    let mut args: Vec<String> = platforms
        .iter()
        .map(|platform| format!("--platform={platform}"))
        .collect();
    if let Some(version) = python_version {
        if version != "3" {
            args.push(format!("--python-version={version}"));
        }
    }
    args
}

/// Keep the artifact URLs whose wheel platform tags intersect the accepted
/// platform set. Compound tags are dot-joined alternatives, any one of which
/// suffices, and `any` always matches. URLs that do not parse as wheel names
/// (sdists) are kept.
fn filter_source_urls(urls: &[String], platforms: &[String]) -> Vec<String> {
    urls.iter()
        .filter(|url| {
            let basename = normalize_basename(url);
            let Some(stem) = basename.strip_suffix(".whl") else {
                return true;
            };
            let Some(wheel) = WheelName::parse(stem) else {
                return true;
            };
            wheel
                .platform
                .split('.')
                .any(|tag| tag == "any" || platforms.iter().any(|platform| platform == tag))
        })
        .cloned()
        .collect()
}

fn bazel_cpu_cflags(compiler: Option<&str>, cpu: Option<&str>) -> &'static [&'static str] {
    match (compiler, cpu) {
        (Some("clang"), Some("darwin_arm64")) => &["-arch arm64"],
        (Some("clang"), Some("darwin_x86_64")) => &["-arch x86_64"],
        (Some("clang"), Some("darwin_arm64e")) => &["-arch arm64e"],
        _ => &[],
    }
}

fn cmake_cpu_args(cpu: Option<&str>) -> &'static [&'static str] {
    match cpu {
        Some("darwin_arm64") => &["-DCMAKE_SYSTEM_NAME=Darwin", "-DCMAKE_SYSTEM_PROCESSOR=arm64"],
        Some("darwin_x86_64") => &[
            "-DCMAKE_SYSTEM_NAME=Darwin",
            "-DCMAKE_SYSTEM_PROCESSOR=x86_64",
        ],
        Some("darwin_arm64e") => &[
            "-DCMAKE_SYSTEM_NAME=Darwin",
            "-DCMAKE_SYSTEM_PROCESSOR=arm64e",
        ],
        _ => &[],
    }
}

fn join_flags<'a>(flags: impl IntoIterator<Item = &'a str>) -> String {
    flags
        .into_iter()
        .filter(|flag| !flag.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// C++ standard-library include directories leak into CFLAGS through the
/// toolchain description and break plain C compiles; drop them.
fn filter_cxx_builtin_include_directories(flags: &[String]) -> Vec<&str> {
    flags
        .iter()
        .map(String::as_str)
        .filter(|flag| !CXX_INCLUDE_DIRECTORY_RE.is_match(flag))
        .collect()
}

#[derive(Debug, Default, Deserialize)]
struct CcToolchain {
    compiler: Option<String>,
    cpu: Option<String>,
    #[serde(default, rename = "ASFLAGS")]
    asflags: Vec<String>,
    #[serde(default, rename = "CFLAGS")]
    cflags: Vec<String>,
    #[serde(default, rename = "CXXFLAGS")]
    cxxflags: Vec<String>,
    #[serde(default, rename = "LDFLAGS")]
    ldflags: Vec<String>,
    #[serde(default)]
    dynamic_runtime_solib_dir: String,
    #[serde(rename = "AS")]
    r#as: Option<PathBuf>,
    #[serde(rename = "CC")]
    cc: Option<PathBuf>,
    #[serde(rename = "CXX")]
    cxx: Option<PathBuf>,
    #[serde(rename = "LD")]
    ld: Option<PathBuf>,
    ar_executable: Option<PathBuf>,
    preprocessor_executable: Option<PathBuf>,
    gcov_executable: Option<PathBuf>,
    nm_executable: Option<PathBuf>,
    objcopy_executable: Option<PathBuf>,
    objdump_executable: Option<PathBuf>,
    strip_executable: Option<PathBuf>,
}

/// Environment variables exporting the toolchain to build backends (distutils,
/// cmake, meson all read these).
fn toolchain_env(cc: &CcToolchain) -> BTreeMap<String, String> {
    let cpu_flags = bazel_cpu_cflags(cc.compiler.as_deref(), cc.cpu.as_deref());
    let asflags = join_flags(
        cpu_flags
            .iter()
            .copied()
            .chain(cc.asflags.iter().map(String::as_str)),
    );
    let cflags = join_flags(
        cpu_flags
            .iter()
            .copied()
            .chain(filter_cxx_builtin_include_directories(&cc.cflags)),
    );
    let cxxflags = join_flags(
        cpu_flags
            .iter()
            .copied()
            .chain(cc.cxxflags.iter().map(String::as_str)),
    );
    let rpath = format!("-Wl,-rpath,{}", cc.dynamic_runtime_solib_dir);
    let ldflags = join_flags(
        std::iter::once(rpath.as_str()).chain(cc.ldflags.iter().map(String::as_str)),
    );
    let cmake_args = join_flags(
        cmake_cpu_args(cc.cpu.as_deref())
            .iter()
            .copied()
            .chain(["-DCMAKE_VERBOSE_MAKEFILE=ON"]),
    );

    let mut env = BTreeMap::new();
    env.insert("ASMFLAGS".to_string(), asflags.clone());
    env.insert("ASFLAGS".to_string(), asflags);
    env.insert("CFLAGS".to_string(), cflags);
    env.insert("CXXFLAGS".to_string(), cxxflags);
    env.insert("LDFLAGS".to_string(), ldflags);
    env.insert("CMAKE_ARGS".to_string(), cmake_args);

    let tools = [
        ("AS", &cc.r#as),
        ("CC", &cc.cc),
        ("CXX", &cc.cxx),
        ("LD", &cc.ld),
        ("AR", &cc.ar_executable),
        ("CPP", &cc.preprocessor_executable),
        ("GCOV", &cc.gcov_executable),
        ("NM", &cc.nm_executable),
        ("OBJCOPY", &cc.objcopy_executable),
        ("OBJDUMP", &cc.objdump_executable),
        ("STRIP", &cc.strip_executable),
    ];
    for (name, path) in tools {
        if let Some(path) = path {
            let resolved = std::path::absolute(path).unwrap_or_else(|_| path.clone());
            env.insert(name.to_string(), resolved.to_string_lossy().into_owned());
        }
    }
    env
}

/// Pip's default cache location, used only when writable.
fn pip_cache_dir() -> Option<PathBuf> {
    let cache = std::env::var_os("XDG_CACHE_HOME")
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".cache")))?
        .join("pip");
    let probe = cache.metadata().ok()?;
    (!probe.permissions().readonly()).then_some(cache)
}

fn write_requirements(request: &InstallRequest, urls: &[String]) -> Result<PathBuf, InstallError> {
    let requirements_file = request.output.join("requirements.txt");
    let mut contents = String::new();
    for index in &request.indexes {
        contents.push_str(&format!("--extra-index-url={index}\n"));
    }

    let mut lines: Vec<String> = if urls.is_empty() {
        vec![request.spec.clone()]
    } else {
        urls.to_vec()
    };
    lines.extend(request.files.values().map(|hash| format!(" --hash={hash}")));
    contents.push_str(&lines.join(" \\\n"));

    fs::write(&requirements_file, contents)?;
    Ok(requirements_file)
}

/// Delete `direct_url.json` metadata, which records the absolute download
/// location, and drop its line from the dist-info RECORD.
fn scrub_direct_url_metadata(output: &Path) -> io::Result<()> {
    for entry in fs::read_dir(output)? {
        let entry = entry?;
        if !entry
            .file_name()
            .to_string_lossy()
            .ends_with(".dist-info")
        {
            continue;
        }

        let direct_url_path = entry.path().join("direct_url.json");
        if !direct_url_path.exists() {
            continue;
        }
        fs::remove_file(&direct_url_path)?;

        let record_path = entry.path().join("RECORD");
        if record_path.exists() {
            let direct_url_line = format!(
                "{}/direct_url.json,",
                entry.file_name().to_string_lossy()
            );
            let records = fs::read_to_string(&record_path)?;
            let kept: String = records
                .lines()
                .filter(|record| !record.starts_with(&direct_url_line))
                .map(|record| format!("{record}\n"))
                .collect();
            fs::write(&record_path, kept)?;
        }
    }
    Ok(())
}

fn link_entry_points(output: &Path, entry_points: &Path) -> Result<(), InstallError> {
    if let Some(parent) = entry_points.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut found = None;
    for entry in fs::read_dir(output)? {
        let entry = entry?;
        let candidate = entry.path().join("entry_points.txt");
        if entry
            .file_name()
            .to_string_lossy()
            .ends_with(".dist-info")
            && candidate.exists()
        {
            found = Some(candidate);
            break;
        }
    }

    match found {
        Some(source) => {
            let base = entry_points.parent().unwrap_or(Path::new("."));
            let relative = venv::relative_path(base, &source);
            #[cfg(unix)]
            std::os::unix::fs::symlink(&relative, entry_points)?;
            #[cfg(windows)]
            std::os::windows::fs::symlink_file(&relative, entry_points)?;
        }
        None => {
            fs::File::create(entry_points)?;
        }
    }
    Ok(())
}

/// Run one installation job.
///
/// # Errors
///
/// Returns [`InstallError`] on ambiguous artifact sets, pip failure, or
/// filesystem problems.
pub fn install(request: &InstallRequest) -> Result<(), InstallError> {
    // Absolute local directory source: link it into place, no pip involved.
    // Used when debugging against a working copy of the package.
    if let Some(first) = request.source_urls.first() {
        let local = Path::new(first);
        if local.is_absolute() && local.is_dir() {
            let name = local.file_name().unwrap_or_default();
            venv::populate_symlink_tree(
                local,
                &request.output.join(name),
                &BTreeSet::new(),
            )?;
            return Ok(());
        }
    }

    let source_urls = filter_source_urls(&request.source_urls, &request.platforms);
    if source_urls.len() >= 2 {
        return Err(InstallError::AmbiguousSources(source_urls));
    }

    fs::create_dir_all(&request.output)?;
    let requirements_file = write_requirements(request, &source_urls)?;

    let python = match &request.python {
        Some(python) => python.clone(),
        None => which::which("python3")?,
    };

    let mut command = Command::new(&python);
    command
        .arg("-m")
        .arg("pip")
        .arg("install")
        .arg("-r")
        .arg(&requirements_file);
    match pip_cache_dir() {
        Some(cache) => command.arg(format!("--cache-dir={}", cache.display())),
        None => command.arg("--no-cache-dir"),
    };
    command
        .arg(format!("--target={}", request.output.display()))
        .arg("--prefer-binary")
        .arg("--no-compile")
        .arg("--no-dependencies")
        .arg("--disable-pip-version-check")
        .arg("--use-pep517")
        .arg("--quiet")
        .args(platform_args(
            &request.platforms,
            request.python_version.as_deref(),
        ));

    if let Some(toolchain) = &request.cc_toolchain {
        let cc: CcToolchain = serde_json::from_str(toolchain)?;
        command.envs(toolchain_env(&cc));
    }

    debug!("running {command:?}");
    let status = command.status()?;
    if !status.success() {
        return Err(InstallError::Pip(status.code().unwrap_or(-1)));
    }

    scrub_direct_url_metadata(&request.output)?;

    if let Some(entry_points) = &request.entry_points {
        link_entry_points(&request.output, entry_points)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_args() {
        let platforms = vec!["manylinux_2_31_x86_64".to_string(), "any".to_string()];
        assert_eq!(
            platform_args(&platforms, Some("3.12")),
            [
                "--platform=manylinux_2_31_x86_64",
                "--platform=any",
                "--python-version=3.12"
            ]
        );
        // A bare major version is not a pin.
        assert_eq!(
            platform_args(&platforms[..1], Some("3")),
            ["--platform=manylinux_2_31_x86_64"]
        );
    }

    #[test]
    fn test_filter_source_urls() {
        let urls = vec![
            "https://example.org/pkg-1.0-cp312-cp312-manylinux_2_17_x86_64.manylinux2014_x86_64.whl"
                .to_string(),
            "https://example.org/pkg-1.0-cp312-cp312-macosx_11_0_arm64.whl".to_string(),
            "https://example.org/universal-1.0-py3-none-any.whl".to_string(),
            "https://example.org/pkg-1.0.tar.gz".to_string(),
        ];
        let platforms = vec!["manylinux2014_x86_64".to_string()];
        let kept = filter_source_urls(&urls, &platforms);

        // The matching wheel, the universal wheel, and the unparseable sdist.
        assert_eq!(kept.len(), 3);
        assert!(!kept.iter().any(|url| url.contains("macosx")));
    }

    #[test]
    fn test_toolchain_env_darwin_cross() {
        let cc: CcToolchain = serde_json::from_str(
            r#"{
                "compiler": "clang",
                "cpu": "darwin_arm64",
                "CFLAGS": ["-O2", "-iwithsysroot/usr/include/c++/v1", "-g"],
                "LDFLAGS": ["-lm"],
                "dynamic_runtime_solib_dir": "_solib_darwin_arm64",
                "CC": "wrappers/clang"
            }"#,
        )
        .unwrap();
        let env = toolchain_env(&cc);

        assert_eq!(env["CFLAGS"], "-arch arm64 -O2 -g");
        assert_eq!(env["LDFLAGS"], "-Wl,-rpath,_solib_darwin_arm64 -lm");
        assert!(env["CMAKE_ARGS"].contains("-DCMAKE_SYSTEM_PROCESSOR=arm64"));
        assert!(env["CC"].ends_with("wrappers/clang"));
        assert!(Path::new(&env["CC"]).is_absolute());
    }

    #[test]
    fn test_write_requirements_hash_pinned() {
        let dir = tempfile::tempdir().unwrap();
        let request = InstallRequest {
            spec: "requests==2.32.3".to_string(),
            output: dir.path().to_path_buf(),
            files: [
                (
                    "requests-2.32.3-py3-none-any.whl".to_string(),
                    "sha256:aaaa".to_string(),
                ),
                (
                    "requests-2.32.3.tar.gz".to_string(),
                    "sha256:bbbb".to_string(),
                ),
            ]
            .into(),
            indexes: vec!["https://mirror.example.org/simple".to_string()],
            ..InstallRequest::default()
        };
        let path = write_requirements(&request, &[]).unwrap();
        let contents = fs::read_to_string(path).unwrap();
        assert_eq!(
            contents,
            "--extra-index-url=https://mirror.example.org/simple\n\
             requests==2.32.3 \\\n --hash=sha256:aaaa \\\n --hash=sha256:bbbb"
        );
    }

    #[test]
    fn test_scrub_direct_url_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let dist_info = dir.path().join("pkg-1.0.dist-info");
        fs::create_dir_all(&dist_info).unwrap();
        fs::write(dist_info.join("direct_url.json"), "{}").unwrap();
        fs::write(
            dist_info.join("RECORD"),
            "pkg/__init__.py,sha256=xxx,10\npkg-1.0.dist-info/direct_url.json,sha256=yyy,2\n",
        )
        .unwrap();

        scrub_direct_url_metadata(dir.path()).unwrap();

        assert!(!dist_info.join("direct_url.json").exists());
        let record = fs::read_to_string(dist_info.join("RECORD")).unwrap();
        assert_eq!(record, "pkg/__init__.py,sha256=xxx,10\n");
    }

    #[test]
    fn test_link_entry_points_touches_without_dist_info() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("site-packages");
        fs::create_dir_all(&output).unwrap();

        let entry_points = dir.path().join("bin/entry_points.txt");
        link_entry_points(&output, &entry_points).unwrap();
        assert!(entry_points.exists());
        assert_eq!(fs::read_to_string(&entry_points).unwrap(), "");
    }

    #[cfg(unix)]
    #[test]
    fn test_link_entry_points_symlinks_relative() {
        let dir = tempfile::tempdir().unwrap();
        let dist_info = dir.path().join("out/pkg-1.0.dist-info");
        fs::create_dir_all(&dist_info).unwrap();
        fs::write(dist_info.join("entry_points.txt"), "[console_scripts]\n").unwrap();

        let entry_points = dir.path().join("links/entry_points.txt");
        link_entry_points(&dir.path().join("out"), &entry_points).unwrap();

        let target = fs::read_link(&entry_points).unwrap();
        assert!(target.is_relative());
        assert_eq!(
            fs::read_to_string(&entry_points).unwrap(),
            "[console_scripts]\n"
        );
    }
}
