//! wheelwright - lock files in, build targets out.
//!
//! Four subcommands cover the lifecycle of a locked Python dependency inside
//! a hermetic build:
//!
//! - `lock` reads a resolved lock file and prints either target
//!   declarations or an acquisition manifest,
//! - `install` places one package into a directory via pip, hash-pinned,
//! - `venv` assembles an environment by symlinking installed packages,
//! - `zip` packs the result into a reproducible archive.

pub mod cmd;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Debug, Parser)]
#[command(name = "wheelwright")]
#[command(author, version, about = "Convert Python lock files into build targets")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// What the `lock` subcommand prints.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LockOutput {
    /// Target declarations for every locked package.
    #[default]
    Packages,
    /// JSON manifest of external repositories to fetch.
    Files,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Parse a lock file and generate packages
    Lock {
        /// Path to the lock file (poetry.lock or uv.lock)
        input_file: PathBuf,
        /// JSON object mapping artifact conditions to platform constraints
        platforms: Option<String>,
        /// JSON object of extra dependencies per package
        #[arg(long)]
        deps: Option<String>,
        /// Emit per-extra library targets
        #[arg(long, overrides_with = "no_generate_extras")]
        generate_extras: bool,
        /// Do not emit per-extra library targets
        #[arg(long = "no-generate-extras")]
        no_generate_extras: bool,
        /// Project definition file; relative lock paths resolve against its directory
        #[arg(long)]
        project_file: Option<PathBuf>,
        /// What to print
        #[arg(long, value_enum, default_value = "packages")]
        output: LockOutput,
    },
    /// Download and install one locked package
    Install {
        /// Version-constraint requirement, e.g. requests==2.32.3
        input: String,
        /// Package output directory
        output: PathBuf,
        /// JSON object of artifact file names to hash pins
        #[arg(long, default_value = "{}")]
        files: String,
        /// Target python version
        #[arg(long)]
        python_version: Option<String>,
        /// Accepted platform tags
        #[arg(long = "platform")]
        platforms: Vec<String>,
        /// Extra index URLs
        #[arg(long = "index")]
        indexes: Vec<String>,
        /// Explicit artifact URLs bypassing the index
        #[arg(long = "source-url")]
        source_urls: Vec<String>,
        /// JSON description of the C/C++ toolchain
        #[arg(long)]
        cc_toolchain: Option<String>,
        /// Link the installed entry_points.txt here
        #[arg(long)]
        entry_points: Option<PathBuf>,
        /// Interpreter to run pip under
        #[arg(long)]
        python: Option<PathBuf>,
    },
    /// Symlink installed packages into a virtual environment directory
    Venv {
        /// Output virtual environment directory
        target: PathBuf,
        /// Installed package directories to link
        paths: Vec<PathBuf>,
    },
    /// Create a reproducible zip archive
    Zip {
        /// Create options string: c[Cf]
        command: String,
        /// Output archive path
        zip: PathBuf,
        /// Input directory prepended to file paths
        #[arg(short, long, default_value = ".")]
        dir: PathBuf,
        /// Manifest file listing additional entries, one per line
        #[arg(short)]
        manifest: Option<PathBuf>,
        /// Entries in [zip_path=]file_path form
        files: Vec<String>,
    },
}
