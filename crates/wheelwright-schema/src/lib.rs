//! Shared grammar types for wheelwright.
//!
//! Leaf crate with no I/O: permissive semantic-version parsing, the wheel
//! filename and platform-tag grammars, package/file name normalization, and
//! the known macOS release table.

pub mod macos;
pub mod names;
pub mod version;
pub mod wheel;

pub use macos::MACOSX_VERSIONS;
pub use names::{normalize_basename, normalize_target_name};
pub use version::Semver;
pub use wheel::{LinuxTag, MacosTag, OsArchTag, WheelName, cpu_alias};
