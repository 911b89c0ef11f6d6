// src/installer/relocate.rs

//! Retrying move of an extracted package into its destination
//!
//! Renames can fail briefly while another process (an indexer, a virus
//! scanner, an editor watching `node_modules`) holds the source open. Those
//! failures are retried with a fixed backoff; anything else fails at once.
//! An existing destination is never overwritten: the first package placed
//! there wins.

use crate::error::{Error, Result};
use std::fs;
use std::io;
use std::path::Path;
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Filesystem operations used by the retrying move
pub trait Relocator {
    fn exists(&self, path: &Path) -> bool;
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;
}

/// Real filesystem
#[derive(Debug, Default, Clone, Copy)]
pub struct FsRelocator;

impl Relocator for FsRelocator {
    fn exists(&self, path: &Path) -> bool {
        // A dangling symlink still occupies the destination
        fs::symlink_metadata(path).is_ok()
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        fs::rename(from, to)
    }
}

/// Bounds on the retrying move
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Wait between attempts
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff: Duration::from_secs(1),
        }
    }
}

/// Errors worth retrying: lock or permission contention from concurrent
/// filesystem activity
pub fn is_transient(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::PermissionDenied | io::ErrorKind::ResourceBusy
    )
}

/// States of the retrying move
#[derive(Debug)]
pub enum MoveState {
    /// About to make attempt number `n` (1-based)
    Attempting(u32),
    Succeeded { attempts: u32 },
    SkippedExists,
    Failed { attempts: u32, error: io::Error },
}

impl MoveState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Attempting(_))
    }
}

/// Terminal, non-error result of a move
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveOutcome {
    Moved { attempts: u32 },
    SkippedExists,
}

/// One move of `from` to `to` under a retry policy
pub struct RetryingMove<'a, R: ?Sized> {
    relocator: &'a R,
    policy: RetryPolicy,
    from: &'a Path,
    to: &'a Path,
}

impl<'a, R: Relocator + ?Sized> RetryingMove<'a, R> {
    pub fn new(relocator: &'a R, policy: RetryPolicy, from: &'a Path, to: &'a Path) -> Self {
        Self {
            relocator,
            policy,
            from,
            to,
        }
    }

    /// Make attempt number `attempt` and return the next state
    pub fn step(&self, attempt: u32) -> MoveState {
        if self.relocator.exists(self.to) {
            warn!(
                "Destination path {} already exists, skipping rename",
                self.to.display()
            );
            return MoveState::SkippedExists;
        }

        match self.relocator.rename(self.from, self.to) {
            Ok(()) => {
                debug!("Renamed {} to {}", self.from.display(), self.to.display());
                MoveState::Succeeded { attempts: attempt }
            }
            Err(e) if is_transient(&e) && attempt < self.policy.max_attempts => {
                warn!(
                    "Rename failed (attempt {}/{}): {}, retrying in {:?}",
                    attempt, self.policy.max_attempts, e, self.policy.backoff
                );
                MoveState::Attempting(attempt + 1)
            }
            Err(e) => MoveState::Failed {
                attempts: attempt,
                error: e,
            },
        }
    }

    /// Drive the state machine until it settles
    pub fn run(&self) -> Result<MoveOutcome> {
        let mut attempt = 1;
        loop {
            match self.step(attempt) {
                MoveState::Attempting(next) => {
                    thread::sleep(self.policy.backoff);
                    attempt = next;
                }
                MoveState::Succeeded { attempts } => {
                    info!("Moved {} into {}", self.from.display(), self.to.display());
                    return Ok(MoveOutcome::Moved { attempts });
                }
                MoveState::SkippedExists => return Ok(MoveOutcome::SkippedExists),
                MoveState::Failed { attempts, error } => {
                    error!(
                        "Failed to rename {} to {}: {}",
                        self.from.display(),
                        self.to.display(),
                        error
                    );
                    return Err(Error::Placement {
                        from: self.from.to_path_buf(),
                        to: self.to.to_path_buf(),
                        attempts,
                        source: error,
                    });
                }
            }
        }
    }
}

/// Move `from` to `to`, retrying transient failures
pub fn relocate<R: Relocator + ?Sized>(
    relocator: &R,
    policy: RetryPolicy,
    from: &Path,
    to: &Path,
) -> Result<MoveOutcome> {
    RetryingMove::new(relocator, policy, from, to).run()
}
