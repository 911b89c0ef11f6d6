// src/registry.rs

//! Registry metadata lookup
//!
//! Resolves a package name plus version specifier into the concrete version,
//! its direct dependencies, and the tarball download descriptor. The resolver
//! and installer only see the `RegistryClient` trait; `HttpRegistry` talks to
//! an npm-compatible registry and `StaticRegistry` serves preloaded documents.

use crate::error::{Error, Result};
use indexmap::IndexMap;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info};

/// Default npm registry
pub const DEFAULT_REGISTRY: &str = "https://registry.npmjs.org";

/// Default timeout for HTTP requests (30 seconds)
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Ordered map of package name to version specifier
pub type DependencySpec = IndexMap<String, String>;

/// Download descriptor for a resolved package
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dist {
    /// URL of the gzipped tarball
    pub tarball: String,

    /// Subresource integrity string, e.g. `sha512-<base64>`
    #[serde(default)]
    pub integrity: Option<String>,

    /// Legacy hex SHA-1 of the tarball
    #[serde(default)]
    pub shasum: Option<String>,
}

/// Registry answer for one `(name, specifier)` query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedPackage {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub dependencies: DependencySpec,
    pub dist: Dist,
}

impl ResolvedPackage {
    /// `name@version` identifier
    pub fn id(&self) -> String {
        format!("{}@{}", self.name, self.version)
    }
}

/// Source of package metadata
pub trait RegistryClient {
    /// Resolve `specifier` for `name` to concrete package metadata
    fn lookup(&self, name: &str, specifier: &str) -> Result<ResolvedPackage>;
}

impl<T: RegistryClient + ?Sized> RegistryClient for &T {
    fn lookup(&self, name: &str, specifier: &str) -> Result<ResolvedPackage> {
        (**self).lookup(name, specifier)
    }
}

/// Reject registry answers whose version is a range or otherwise not concrete
fn validate(package: ResolvedPackage, requested: &str) -> Result<ResolvedPackage> {
    semver::Version::parse(&package.version).map_err(|e| Error::Lookup {
        package: requested.to_string(),
        reason: format!("registry returned non-concrete version '{}': {}", package.version, e),
    })?;
    Ok(package)
}

/// npm-compatible HTTP registry client
pub struct HttpRegistry {
    client: Client,
    base_url: String,
}

impl HttpRegistry {
    /// Create a client for the registry at `base_url`
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::Download(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// URL of the version document for `name` at `specifier`
    ///
    /// Scoped names keep their `@` but have the slash escaped, the way the
    /// npm registry expects (`@types/node` becomes `@types%2Fnode`).
    pub fn package_url(&self, name: &str, specifier: &str) -> String {
        format!("{}/{}/{}", self.base_url, name.replace('/', "%2F"), specifier)
    }
}

impl RegistryClient for HttpRegistry {
    fn lookup(&self, name: &str, specifier: &str) -> Result<ResolvedPackage> {
        let url = self.package_url(name, specifier);
        let requested = format!("{}@{}", name, specifier);
        debug!("Fetching package info from {}", url);

        let lookup_error = |reason: String| Error::Lookup {
            package: requested.clone(),
            reason,
        };

        let response = self
            .client
            .get(&url)
            .send()
            .map_err(|e| lookup_error(e.to_string()))?;

        if !response.status().is_success() {
            return Err(lookup_error(format!("HTTP {} from {}", response.status(), url)));
        }

        let package: ResolvedPackage = response
            .json()
            .map_err(|e| lookup_error(format!("Failed to parse package document: {}", e)))?;

        info!("Resolved {} to {}", requested, package.version);
        validate(package, &requested)
    }
}

/// Registry backed by documents loaded up front
///
/// Answers are keyed on the exact `(name, specifier)` pair. The installer
/// re-queries with the concrete version, so every stored package also
/// answers for its own version.
#[derive(Debug, Default)]
pub struct StaticRegistry {
    packages: HashMap<(String, String), ResolvedPackage>,
}

impl StaticRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `package` as the answer for `name@specifier`
    pub fn insert(&mut self, specifier: &str, package: ResolvedPackage) {
        self.packages.insert(
            (package.name.clone(), package.version.clone()),
            package.clone(),
        );
        self.packages
            .insert((package.name.clone(), specifier.to_string()), package);
    }

    /// Parse a JSON array of version documents, each answering for its own version
    pub fn from_json(json: &str) -> Result<Self> {
        let documents: Vec<ResolvedPackage> = serde_json::from_str(json)?;
        let mut registry = Self::new();
        for package in documents {
            let version = package.version.clone();
            registry.insert(&version, package);
        }
        Ok(registry)
    }
}

impl RegistryClient for StaticRegistry {
    fn lookup(&self, name: &str, specifier: &str) -> Result<ResolvedPackage> {
        let requested = format!("{}@{}", name, specifier);
        let package = self
            .packages
            .get(&(name.to_string(), specifier.to_string()))
            .cloned()
            .ok_or_else(|| Error::Lookup {
                package: requested.clone(),
                reason: "not found in registry".to_string(),
            })?;
        validate(package, &requested)
    }
}
