//! Subcommand implementations.

pub mod install;
pub mod lock;
pub mod venv;
pub mod zip;
