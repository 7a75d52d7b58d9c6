//! # pg-protocol
//!
//! Core protocol definitions and data models for the project generation
//! pipeline.
//!
//! This crate defines all shared data structures used for:
//! - Submission input and validated generation requests
//! - Pipeline definitions (stages, dependencies, topological order)
//! - Progress events pushed to subscribed observers
//!
//! ## Modules
//!
//! - [`request_models`]: Submission input and request lifecycle state
//! - [`pipeline_models`]: Stage definitions and the pipeline DAG
//! - [`events`]: Progress events delivered through the subscription hub
//!
//! ## Design Principles
//!
//! - Minimal dependencies: serde, ts-rs, uuid, chrono
//! - TypeScript generation: All types derive `TS` for client compatibility
//! - Independent compilation: No dependencies on other workspace crates

pub mod events;
pub mod pipeline_models;
pub mod request_models;

// Re-export all public types for convenience
pub use events::*;
pub use pipeline_models::*;
pub use request_models::*;
