//! # pg-core
//!
//! Orchestration core for the project generation pipeline.
//!
//! This crate provides:
//! - Agent capability abstraction and the built-in analysis capabilities
//! - A durable in-memory request queue with lifecycle tracking
//! - The pipeline executor (bounded worker pool, per-stage timeout,
//!   cooperative cancellation, per-request fault isolation)
//! - A subscription hub that fans progress events out to observers with a
//!   bounded replay buffer for late or reconnecting subscribers
//!
//! ## Modules
//!
//! - [`capabilities`]: Agent capability trait, registry and implementations
//! - [`queue`]: Request queue and submission validation
//! - [`executor`]: Stage-sequencing executor and worker loop
//! - [`hub`]: Publish/subscribe registry for progress events
//! - [`service`]: Facade wiring queue, executor and hub together
//! - [`archive`]: Fire-and-forget persistence boundary
//! - [`config`]: Service configuration and TOML loading

pub mod archive;
pub mod capabilities;
pub mod config;
pub mod executor;
pub mod hub;
pub mod queue;
pub mod service;
