//! Common utilities for integration tests.
//!
//! # Modules
//!
//! - `logger`: Per-test structured logging with phases and durations

pub mod logger;
