//! Common test utilities for the generation-flow integration tests.
//!
//! This module provides:
//! - Fixtures (pipelines, registries, wired-up services)
//! - Custom assertions over collected event streams
//! - Helper functions for draining subscriptions

pub mod assertions;
pub mod fixtures;

pub use assertions::*;
pub use fixtures::*;
