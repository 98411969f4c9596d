//! switchyard - budget-aware operation router for multi-provider AI
//! backends.
//!
//! One `route` call validates a request, picks a provider under cost and
//! health constraints, reserves against a per-identity daily budget, gates
//! expensive or sensitive operations on approval, writes a tamper-evident
//! audit record *before* invoking anything, and fails over across backends
//! on transient errors.

#![deny(unsafe_code)]
#![warn(clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod audit;
pub mod cli;
pub mod core;
pub mod error;
pub mod providers;
pub mod storage;
pub mod util;

/// Test utilities module - included in test builds or when the test-utils
/// feature is enabled.
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use error::{ExitCode, Result, RouteErrorKind, SwitchyardError};
