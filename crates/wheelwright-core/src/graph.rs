//! Dependency-graph processing between loading and rendering.
//!
//! Order matters: duplicate-name disambiguation first, then cycle removal,
//! then externally forced dependencies, type-stub auto-linking, and finally
//! the synthetic aggregate target.

use std::collections::{BTreeMap, BTreeSet};

use serde::Deserialize;
use tracing::debug;

use crate::package::{Dependency, Package};

/// Extra forced dependencies for one package, as supplied on the command
/// line: either a single target label or a list of them.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ExtraDeps {
    /// A single extra dependency label.
    One(String),
    /// Several extra dependency labels.
    Many(Vec<String>),
}

impl ExtraDeps {
    fn labels(&self) -> &[String] {
        match self {
            Self::One(label) => std::slice::from_ref(label),
            Self::Many(labels) => labels,
        }
    }
}

/// Find a name that collides with nothing in `names`, prefixing underscores
/// onto `suffix` until it is unique.
pub fn find_unique_name<'a>(names: impl IntoIterator<Item = &'a str>, suffix: &str) -> String {
    let possible_collisions: BTreeSet<&str> = names
        .into_iter()
        .filter(|name| name.ends_with(suffix))
        .collect();
    let mut name = suffix.to_string();
    while possible_collisions.contains(name.as_str()) {
        name.insert(0, '_');
    }
    name
}

/// Rename same-named-but-different-version packages to `name@version` and
/// synthesize one meta-package per such name whose dependencies are exactly
/// that version set. Edges onto the meta-package carry each version's own
/// marker expression so consumers can still select by environment.
fn disambiguate(packages: Vec<Package>) -> Vec<Package> {
    let mut groups: BTreeMap<String, Vec<Package>> = BTreeMap::new();
    for package in packages {
        groups.entry(package.name.clone()).or_default().push(package);
    }

    let mut result = Vec::new();
    for (name, mut group) in groups {
        if group.len() == 1 {
            result.append(&mut group);
            continue;
        }

        debug!("disambiguating {} versions of {name}", group.len());
        let mut meta_dependencies = BTreeMap::new();
        for package in &mut group {
            package.name = format!(
                "{}@{}",
                package.name,
                package.version.as_deref().unwrap_or_default()
            );
            meta_dependencies.insert(
                package.name.clone(),
                Dependency::with_markers(&package.markers),
            );
        }
        result.append(&mut group);
        result.push(Package {
            name,
            dependencies: meta_dependencies,
            ..Package::default()
        });
    }
    result
}

/// Depth-first walk recording back edges (edges onto a node already on the
/// current path). Recorded edges are skipped on rediscovery, so each edge is
/// classified once.
fn record_back_edges(
    graph: &BTreeMap<String, Vec<String>>,
    path: &mut Vec<String>,
    node: &str,
    removed: &mut BTreeMap<String, BTreeSet<String>>,
) {
    let Some(dependencies) = graph.get(node) else {
        return;
    };
    for dependency in dependencies {
        if removed
            .get(node)
            .is_some_and(|edges| edges.contains(dependency))
        {
            continue;
        }
        if path.iter().any(|ancestor| ancestor == dependency) {
            debug!("removing back edge {node} -> {dependency}");
            removed
                .entry(node.to_string())
                .or_default()
                .insert(dependency.clone());
        } else {
            path.push(node.to_string());
            record_back_edges(graph, path, dependency, removed);
            path.pop();
        }
    }
}

/// Delete a heuristic feedback arc set so the rendered graph is acyclic.
///
/// The graph is built once as an explicit adjacency map; removals accumulate
/// in a separate per-node set during traversal and are applied as a final
/// pass. This is DFS back-edge removal, not a minimum feedback arc set, and
/// it is idempotent: re-running it on its own output removes nothing.
fn remove_cycles(packages: &mut [Package]) {
    let graph: BTreeMap<String, Vec<String>> = packages
        .iter()
        .map(|package| {
            (
                package.name.clone(),
                package.dependencies.keys().cloned().collect(),
            )
        })
        .collect();

    let mut removed: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for start in graph.keys() {
        record_back_edges(&graph, &mut Vec::new(), start, &mut removed);
    }

    for package in packages {
        if let Some(edges) = removed.get(&package.name) {
            package
                .dependencies
                .retain(|dependency, _| !edges.contains(dependency));
        }
    }
}

/// Run the full graph pipeline over loaded packages, returning the entity
/// set ready for rendering (original packages, possibly renamed, plus
/// synthetic meta and aggregate targets).
pub fn process(
    packages: Vec<Package>,
    extra_deps: &BTreeMap<String, ExtraDeps>,
) -> Vec<Package> {
    let mut packages = disambiguate(packages);
    remove_cycles(&mut packages);

    let names: BTreeSet<String> = packages.iter().map(|package| package.name.clone()).collect();
    for package in &mut packages {
        if let Some(extra) = extra_deps.get(&package.name) {
            package
                .extra_dependencies
                .extend(extra.labels().iter().cloned());
        }

        // A types-{name} stub package in the lock is always pulled in with
        // its base package.
        let type_shadow = format!("types-{}", package.name);
        if names.contains(&type_shadow) {
            package
                .dependencies
                .insert(type_shadow, Dependency::default());
        }
    }

    // Aggregate target: depends on every non-versioned package name, so
    // "build everything" does not enumerate exploded version variants.
    let all_packages: Vec<String> = packages
        .iter()
        .filter(|package| !package.name.contains('@'))
        .map(|package| package.name.clone())
        .collect();
    let aggregate = Package {
        name: find_unique_name(all_packages.iter().map(String::as_str), "all"),
        dependencies: all_packages
            .iter()
            .map(|name| (name.clone(), Dependency::default()))
            .collect(),
        ..Package::default()
    };
    packages.push(aggregate);

    packages
}
