//! Lock command: lock file in, declarations or manifest out.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result, bail};
use wheelwright_core::graph::ExtraDeps;
use wheelwright_core::{emit, manifest, package};

use crate::LockOutput;

/// Parse the lock file and print the requested output to stdout.
pub async fn lock(
    input_file: &Path,
    platforms: Option<&str>,
    deps: Option<&str>,
    generate_extras: bool,
    project_file: Option<&Path>,
    output: LockOutput,
) -> Result<()> {
    let project_root = match project_file {
        Some(project_file) => std::path::absolute(project_file)
            .with_context(|| format!("cannot resolve {}", project_file.display()))?
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default(),
        None => std::path::PathBuf::new(),
    };

    let packages = match input_file.file_name().and_then(|name| name.to_str()) {
        Some("poetry.lock") => package::load_poetry_lock(input_file, &project_root)?,
        Some("uv.lock") => package::load_uv_lock(input_file, &project_root)?,
        _ => bail!("unknown input type {}", input_file.display()),
    };

    let rendered = match output {
        LockOutput::Files => manifest::generate_files(&packages).await?,
        LockOutput::Packages => {
            let platforms: BTreeMap<String, String> = match platforms {
                Some(platforms) => serde_json::from_str(platforms)
                    .context("platforms must be a JSON object of condition to constraint")?,
                None => BTreeMap::new(),
            };
            let extra_deps: BTreeMap<String, ExtraDeps> = match deps {
                Some(deps) => serde_json::from_str(deps)
                    .context("deps must be a JSON object of package to extra dependencies")?,
                None => BTreeMap::new(),
            };
            emit::generate_packages(packages, &platforms, generate_extras, &extra_deps)?
        }
    };

    print!("{rendered}");
    Ok(())
}
