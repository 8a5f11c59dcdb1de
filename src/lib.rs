//! offcache - offline cache manager for a web origin.
//!
//! Precaches an application shell, evicts stale cache generations, routes
//! each request network-first or cache-first, keeps failed message writes
//! for background replay, and renders push notifications. The worker is
//! [`core::worker::CacheWorker`]; the CLI hosts it as a local HTTP proxy.

// Note: deny (not forbid) to allow #[allow(unsafe_code)] in test helpers for env var manipulation
#![deny(unsafe_code)]
#![warn(clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod core;
pub mod error;
pub mod render;
pub mod storage;

/// Test utilities module - included in test builds or when test-utils feature is enabled.
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use error::{ExitCode, OffcacheError, Result};

// Re-export test utilities for external test crates
#[cfg(any(test, feature = "test-utils"))]
pub use test_utils::*;
