//! wheelwright - lock files in, build targets out

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use wheelwright_cli::cmd;
use wheelwright_cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Lock {
            input_file,
            platforms,
            deps,
            generate_extras,
            no_generate_extras: _,
            project_file,
            output,
        } => {
            cmd::lock::lock(
                &input_file,
                platforms.as_deref(),
                deps.as_deref(),
                generate_extras,
                project_file.as_deref(),
                output,
            )
            .await
        }
        Commands::Install {
            input,
            output,
            files,
            python_version,
            platforms,
            indexes,
            source_urls,
            cc_toolchain,
            entry_points,
            python,
        } => cmd::install::install(cmd::install::Args {
            input,
            output,
            files,
            python_version,
            platforms,
            indexes,
            source_urls,
            cc_toolchain,
            entry_points,
            python,
        }),
        Commands::Venv { target, paths } => cmd::venv::venv(&target, &paths),
        Commands::Zip {
            command,
            zip,
            dir,
            manifest,
            files,
        } => cmd::zip::zip(&command, &zip, &dir, manifest.as_deref(), files),
    }
}
