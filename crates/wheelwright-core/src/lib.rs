//! wheelwright-core - lock-file interpretation and target-graph synthesis.
//!
//! Turns a resolved Python lock file (poetry or uv dialect) into build-graph
//! target declarations or an acquisition manifest. The pipeline is:
//! load lock file → [`package::Package`] entities → [`graph`] processing
//! (cycle removal, disambiguation, synthetic targets) → [`emit`] rendering,
//! with [`platform`] deciding which artifact applies to which platform.
//!
//! The collaborator utilities the generated targets depend on at build time
//! live here too: the pip [`install`] glue, the [`venv`] symlink-tree
//! builder, and the deterministic [`archive`] zip writer.

pub mod archive;
pub mod emit;
pub mod graph;
pub mod index;
pub mod install;
pub mod manifest;
pub mod package;
pub mod platform;
pub mod source;
pub mod venv;

pub use package::{LockError, Package, load_poetry_lock, load_uv_lock};
pub use source::{Source, SourceKind};

/// Where to send reports about lock-file shapes the tool does not handle.
pub const NEW_ISSUE_URL: &str = "https://github.com/wheelwright-build/wheelwright/issues/new";

/// User Agent string for index requests
pub const USER_AGENT: &str = concat!("wheelwright/", env!("CARGO_PKG_VERSION"));
