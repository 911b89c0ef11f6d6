// src/lib.rs

//! nestpm Package Manager
//!
//! Minimal npm-style package manager that installs every resolved version
//! in its own nested `node_modules` directory instead of solving for a
//! single shared version.
//!
//! # Architecture
//!
//! - Two phases: the whole plan is resolved before anything is downloaded
//! - Scopes: each package's dependencies live in `<package>/node_modules`
//! - Isolation: one broken package is reported, never fatal to the run
//! - Safe placement: extracted packages are renamed into place with retries

mod error;
pub mod fetcher;
pub mod installer;
pub mod manifest;
pub mod registry;
pub mod resolver;

pub use error::{Error, Result};
