// src/resolver/plan.rs

//! Installation plan data structures
//!
//! Contains the result types for dependency resolution: where each package
//! goes (`InstallScope`), what goes there (`PlanEntry`), and the ordered
//! plan handed to the installer.

use crate::error::Error;
use std::fmt;
use std::path::{Path, PathBuf};

/// Directory that holds the packages of one scope
pub const NODE_MODULES: &str = "node_modules";

/// Nesting location of an installed package
///
/// The root scope is the install root itself. A package's dependencies live
/// in the child scope named after it, rendered on disk as
/// `<package>/node_modules` below the parent scope.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct InstallScope {
    segments: Vec<String>,
}

impl InstallScope {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Scope holding the dependencies of `package` installed in this scope
    pub fn child(&self, package: &str) -> Self {
        let mut segments = self.segments.clone();
        segments.push(package.to_string());
        Self { segments }
    }

    /// Number of packages between the install root and this scope
    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Path of this scope relative to the install root
    pub fn relative_path(&self) -> PathBuf {
        let mut path = PathBuf::new();
        for segment in &self.segments {
            path.push(segment);
            path.push(NODE_MODULES);
        }
        path
    }
}

impl fmt::Display for InstallScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            write!(f, "<root>")
        } else {
            write!(f, "{}", self.segments.join(" > "))
        }
    }
}

/// Install this exact version of this package under this scope
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanEntry {
    pub name: String,
    pub version: String,
    pub scope: InstallScope,
}

impl PlanEntry {
    pub fn id(&self) -> String {
        format!("{}@{}", self.name, self.version)
    }

    /// Directory that receives the package, i.e. the scope directory
    pub fn scope_dir(&self, install_root: &Path) -> PathBuf {
        install_root.join(self.scope.relative_path())
    }

    /// Final location of the package contents
    pub fn destination(&self, install_root: &Path) -> PathBuf {
        self.scope_dir(install_root).join(&self.name)
    }
}

impl fmt::Display for PlanEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{} in {}", self.name, self.version, self.scope)
    }
}

/// Ordered list of placements in discovery order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallationPlan {
    entries: Vec<PlanEntry>,
}

impl InstallationPlan {
    pub(crate) fn push(&mut self, entry: PlanEntry) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[PlanEntry] {
        &self.entries
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PlanEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl From<Vec<PlanEntry>> for InstallationPlan {
    fn from(entries: Vec<PlanEntry>) -> Self {
        Self { entries }
    }
}

impl<'a> IntoIterator for &'a InstallationPlan {
    type Item = &'a PlanEntry;
    type IntoIter = std::slice::Iter<'a, PlanEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// A package that could not be resolved or installed
#[derive(Debug)]
pub struct PackageFailure {
    /// `name@specifier` (resolution) or `name@version` (installation)
    pub package: String,
    pub scope: InstallScope,
    pub error: Error,
}

impl fmt::Display for PackageFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} in {}: {}", self.package, self.scope, self.error)
    }
}

/// Output of one resolution run
#[derive(Debug, Default)]
pub struct Resolution {
    pub plan: InstallationPlan,
    pub failures: Vec<PackageFailure>,
}

impl Resolution {
    /// True when every requested package resolved
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}
