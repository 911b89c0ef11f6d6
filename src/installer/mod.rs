// src/installer/mod.rs

//! Plan execution
//!
//! Walks an `InstallationPlan` in order. For each entry the scope directory
//! is created, the exact version is looked up again for its tarball
//! descriptor, the tarball is fetched and extracted, and the extracted root
//! is moved to `<scope>/<name>`. A failing package is recorded in the
//! report and the next entry proceeds.

mod relocate;

pub use relocate::{
    FsRelocator, MoveOutcome, MoveState, Relocator, RetryPolicy, RetryingMove, is_transient,
    relocate,
};

use crate::error::Result;
use crate::fetcher::ArchiveFetcher;
use crate::registry::RegistryClient;
use crate::resolver::{InstallationPlan, PackageFailure, PlanEntry};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

/// What happened to each plan entry
#[derive(Debug, Default)]
pub struct InstallReport {
    pub installed: Vec<PlanEntry>,
    /// Destination already occupied; not an error
    pub skipped: Vec<PlanEntry>,
    pub failures: Vec<PackageFailure>,
}

impl InstallReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Executes installation plans below one install root
pub struct Installer<R, F, M = FsRelocator> {
    install_root: PathBuf,
    registry: R,
    fetcher: F,
    relocator: M,
    policy: RetryPolicy,
}

impl<R: RegistryClient, F: ArchiveFetcher> Installer<R, F> {
    /// Create an installer for `install_root` (a project's `node_modules`)
    pub fn new(install_root: impl Into<PathBuf>, registry: R, fetcher: F) -> Self {
        Self {
            install_root: install_root.into(),
            registry,
            fetcher,
            relocator: FsRelocator,
            policy: RetryPolicy::default(),
        }
    }
}

impl<R: RegistryClient, F: ArchiveFetcher, M: Relocator> Installer<R, F, M> {
    pub fn with_relocator<M2: Relocator>(self, relocator: M2) -> Installer<R, F, M2> {
        Installer {
            install_root: self.install_root,
            registry: self.registry,
            fetcher: self.fetcher,
            relocator,
            policy: self.policy,
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn install_root(&self) -> &Path {
        &self.install_root
    }

    /// Create the install root, wiping any previous contents when `clean`
    pub fn prepare(&self, clean: bool) -> Result<()> {
        if clean && self.install_root.exists() {
            info!("Removing existing {}", self.install_root.display());
            fs::remove_dir_all(&self.install_root)?;
        }
        fs::create_dir_all(&self.install_root)?;
        Ok(())
    }

    /// Install every entry of `plan`, in order
    pub fn install(&self, plan: &InstallationPlan) -> InstallReport {
        info!(
            "Installing {} packages into {}",
            plan.len(),
            self.install_root.display()
        );

        let mut report = InstallReport::default();
        for entry in plan {
            match self.install_entry(entry) {
                Ok(MoveOutcome::Moved { attempts }) => {
                    debug!("{} placed after {} attempt(s)", entry, attempts);
                    report.installed.push(entry.clone());
                }
                Ok(MoveOutcome::SkippedExists) => report.skipped.push(entry.clone()),
                Err(e) => {
                    error!("Error installing package {}: {}", entry, e);
                    report.failures.push(PackageFailure {
                        package: entry.id(),
                        scope: entry.scope.clone(),
                        error: e,
                    });
                }
            }
        }

        info!(
            "Installed {} packages ({} skipped, {} failed)",
            report.installed.len(),
            report.skipped.len(),
            report.failures.len()
        );
        report
    }

    fn install_entry(&self, entry: &PlanEntry) -> Result<MoveOutcome> {
        info!("Installing {}...", entry);

        fs::create_dir_all(entry.scope_dir(&self.install_root))?;

        let package = self.registry.lookup(&entry.name, &entry.version)?;
        let extracted = self.fetcher.fetch(&package)?;

        let destination = entry.destination(&self.install_root);
        // Scoped names (`@scope/pkg`) need their `@scope` directory
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent)?;
        }

        relocate(&self.relocator, self.policy, extracted.path(), &destination)
    }
}
