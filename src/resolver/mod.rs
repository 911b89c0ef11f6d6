// src/resolver/mod.rs

//! Dependency resolution into a nested installation plan
//!
//! Walks the manifest's dependency map depth-first, asking the registry for
//! each `(name, specifier)` pair and placing every resolved package in the
//! scope of the package that required it. Duplicate requests are collapsed
//! per scope only, so incompatible versions of one package coexist in
//! different `node_modules` directories.
//!
//! Resolution never touches the filesystem. Lookup failures are collected
//! per package and never stop the walk.

mod plan;

pub use plan::{InstallScope, InstallationPlan, NODE_MODULES, PackageFailure, PlanEntry, Resolution};

use crate::error::Error;
use crate::registry::{DependencySpec, RegistryClient};
use std::collections::{HashMap, HashSet};
use tracing::{debug, error, info};

/// Deepest scope a package may be placed in by default
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// State of one resolution run
#[derive(Default)]
struct Walk {
    /// `name@specifier` identifiers already placed, per scope
    processed: HashMap<InstallScope, HashSet<String>>,
    /// `name@version` of the packages on the current recursion path
    ancestors: Vec<String>,
    resolution: Resolution,
}

impl Walk {
    fn is_processed(&self, scope: &InstallScope, identifier: &str) -> bool {
        self.processed
            .get(scope)
            .is_some_and(|seen| seen.contains(identifier))
    }

    fn fail(&mut self, package: String, scope: &InstallScope, error: Error) {
        error!("Failed to resolve {} in {}: {}", package, scope, error);
        self.resolution.failures.push(plan::PackageFailure {
            package,
            scope: scope.clone(),
            error,
        });
    }
}

/// Builds an `InstallationPlan` from a top-level dependency map
pub struct Resolver<R> {
    registry: R,
    /// Forced specifiers, applied before dedup and lookup
    overrides: HashMap<String, String>,
    max_depth: usize,
}

impl<R: RegistryClient> Resolver<R> {
    pub fn new(registry: R) -> Self {
        Self {
            registry,
            overrides: HashMap::new(),
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    /// Always request `specifier` for `name`, whatever the manifests ask for
    pub fn with_override(mut self, name: impl Into<String>, specifier: impl Into<String>) -> Self {
        self.overrides.insert(name.into(), specifier.into());
        self
    }

    pub fn with_overrides<I>(mut self, overrides: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        self.overrides.extend(overrides);
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Resolve `top_level` and every transitive dependency
    pub fn resolve(&self, top_level: &DependencySpec) -> Resolution {
        info!("Resolving {} top-level dependencies", top_level.len());

        let mut walk = Walk::default();
        self.resolve_scope(top_level, &InstallScope::root(), &mut walk);

        info!(
            "Resolution produced {} plan entries ({} failures)",
            walk.resolution.plan.len(),
            walk.resolution.failures.len()
        );
        walk.resolution
    }

    fn specifier_for<'a>(&'a self, name: &str, requested: &'a str) -> &'a str {
        match self.overrides.get(name) {
            Some(forced) => {
                if forced != requested {
                    debug!("Overriding {}@{} with {}", name, requested, forced);
                }
                forced
            }
            None => requested,
        }
    }

    fn resolve_scope(&self, dependencies: &DependencySpec, scope: &InstallScope, walk: &mut Walk) {
        for (name, requested) in dependencies {
            let specifier = self.specifier_for(name, requested);
            let identifier = format!("{}@{}", name, specifier);

            if walk.is_processed(scope, &identifier) {
                debug!("{} already satisfied in {}", identifier, scope);
                continue;
            }

            if scope.depth() > self.max_depth {
                let depth = scope.depth();
                walk.fail(
                    identifier.clone(),
                    scope,
                    Error::DepthExceeded {
                        package: identifier,
                        depth,
                    },
                );
                continue;
            }

            let resolved = match self.registry.lookup(name, specifier) {
                Ok(resolved) => resolved,
                Err(e) => {
                    walk.fail(identifier, scope, e);
                    continue;
                }
            };

            debug!("Placing {} in {}", resolved.id(), scope);
            walk.resolution.plan.push(PlanEntry {
                name: resolved.name.clone(),
                version: resolved.version.clone(),
                scope: scope.clone(),
            });
            walk.processed
                .entry(scope.clone())
                .or_default()
                .insert(identifier);

            if resolved.dependencies.is_empty() {
                continue;
            }

            let id = resolved.id();
            if walk.ancestors.contains(&id) {
                debug!("Dependency cycle through {}, not expanding again", id);
                continue;
            }

            walk.ancestors.push(id);
            self.resolve_scope(&resolved.dependencies, &scope.child(&resolved.name), walk);
            walk.ancestors.pop();
        }
    }
}
