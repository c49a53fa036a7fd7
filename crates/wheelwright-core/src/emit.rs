//! Deterministic rendering of packages into build-target declarations.
//!
//! Attributes are emitted only when non-empty, dependency lists are sorted
//! and de-duplicated, and marker maps are JSON-encoded then quote-escaped
//! for embedding, so output is byte-stable across runs and platforms.

use std::collections::{BTreeMap, BTreeSet};

use wheelwright_schema::normalize_target_name;

use crate::graph::{self, ExtraDeps};
use crate::package::Package;
use crate::platform::PlatformError;

/// Escape embedded quotes a second time so the JSON survives being placed
/// inside a triple-quoted attribute string.
fn escape(s: &str) -> String {
    s.replace("\\\"", "\\\\\\\"")
}

/// Render the `py_library` declarations for a package's extras groups. Each
/// extra depends on the base package plus the extra's own dependencies,
/// normalized, de-duplicated, and sorted.
fn render_extras(package: &Package) -> String {
    package
        .extras
        .iter()
        .filter_map(|(extra, specifiers)| {
            let names: BTreeSet<String> = specifiers
                .iter()
                .filter_map(|specifier| specifier.split(' ').next())
                .map(normalize_target_name)
                .collect();
            if names.is_empty() {
                return None;
            }
            let deps = names
                .iter()
                .map(|name| format!("\":{name}\""))
                .collect::<Vec<_>>()
                .join(", ");
            Some(format!(
                "\npy_library(\n  name = \"{}[{}]\",\n  deps = [\":{}\", {}],\n  visibility = [\"//visibility:public\"],\n)\n",
                package.name, extra, package.name, deps
            ))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Render one package into its declaration block.
///
/// # Errors
///
/// Returns [`PlatformError`] when the package's artifact selection cannot be
/// resolved.
pub fn render(
    package: &Package,
    platforms: &BTreeMap<String, String>,
    generate_extras: bool,
) -> Result<String, PlatformError> {
    let sep = "\n  ";

    let markers: BTreeMap<&str, &str> = package
        .dependencies
        .iter()
        .filter_map(|(name, dependency)| {
            dependency
                .markers
                .as_deref()
                .map(|markers| (name.as_str(), markers))
        })
        .collect();

    let dependencies: Vec<String> = package
        .dependencies
        .keys()
        .map(|name| format!(":{name}"))
        .chain(
            package
                .extra_dependencies
                .iter()
                .cloned()
                .collect::<BTreeSet<_>>(),
        )
        .collect();

    let mut attrs: Vec<(&str, Vec<String>)> = Vec::new();
    if !package.description.is_empty() {
        attrs.push((
            "description",
            vec![format!("\"\"\"{}\"\"\"", package.description)],
        ));
    }
    if package.version.is_some() {
        attrs.push(("package", package.select()?));
    }
    if !dependencies.is_empty() {
        let mut lines = vec!["[".to_string()];
        lines.extend(dependencies.iter().map(|name| format!("  \"{name}\",")));
        lines.push("]".to_string());
        attrs.push(("deps", lines));
    }
    if !markers.is_empty() {
        let encoded = serde_json::to_string(&markers).expect("string map serializes");
        attrs.push(("markers", vec![format!("\"\"\"{}\"\"\"", escape(&encoded))]));
    }
    if !platforms.is_empty() {
        let mut lines = vec!["{".to_string()];
        lines.extend(
            platforms
                .iter()
                .map(|(name, value)| format!("  \"{name}\": '''{value}''',")),
        );
        lines.push("}".to_string());
        attrs.push(("platforms", lines));
    }
    if package.develop {
        attrs.push(("develop", vec!["True".to_string()]));
    }
    attrs.push(("visibility", vec!["[\"//visibility:public\"]".to_string()]));

    let body = attrs
        .iter()
        .map(|(attr, value)| format!("{attr} = {}", value.join(sep)))
        .collect::<Vec<_>>()
        .join(&format!(",{sep}"));

    let extras = if generate_extras && !package.extras.is_empty() {
        render_extras(package)
    } else {
        String::new()
    };

    Ok(format!(
        "\npackage(\n  name = \"{}\",\n  {},\n)\n{}\n",
        package.name, body, extras
    ))
}

/// Process the loaded packages through the graph pipeline and render every
/// entity, in order, into one declaration document.
///
/// # Errors
///
/// Returns [`PlatformError`] when any package's artifact selection cannot be
/// resolved.
pub fn generate_packages(
    packages: Vec<Package>,
    platforms: &BTreeMap<String, String>,
    generate_extras: bool,
    extra_deps: &BTreeMap<String, ExtraDeps>,
) -> Result<String, PlatformError> {
    graph::process(packages, extra_deps)
        .iter()
        .map(|package| render(package, platforms, generate_extras))
        .collect()
}
