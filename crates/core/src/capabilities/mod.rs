//! Agent capability trait, registry and supporting types.
//!
//! A capability is an opaque, non-preemptible unit of work: given the
//! project brief plus the artifacts of its declared dependencies, it either
//! returns a structured artifact or fails with a typed error. The executor
//! never branches on what a capability does, only on the pipeline's
//! dependency graph.

use async_trait::async_trait;
use pg_protocol::request_models::Methodology;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

pub mod builtin;
pub mod mock;

/// Input handed to a capability when its stage runs.
#[derive(Debug, Clone)]
pub struct StageInput {
    /// The caller's project description.
    pub description: String,

    /// The caller's methodology choice.
    pub methodology: Methodology,

    /// Artifacts of this stage's declared dependencies, keyed by stage name.
    ///
    /// The executor guarantees every declared dependency is present here
    /// before invoking the capability.
    pub artifacts: HashMap<String, serde_json::Value>,
}

impl StageInput {
    pub fn new(description: String, methodology: Methodology) -> Self {
        Self {
            description,
            methodology,
            artifacts: HashMap::new(),
        }
    }
}

/// Errors surfaced from stage execution.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StageError {
    /// No capability registered under the requested name.
    #[error("no capability registered under '{0}'")]
    NotRegistered(String),

    /// The capability itself reported a failure.
    #[error("analysis failed: {0}")]
    Analysis(String),

    /// The capability did not return within the configured budget.
    #[error("stage timed out after {seconds}s")]
    Timeout { seconds: u64 },

    /// A declared dependency's artifact was missing at invocation time.
    ///
    /// The fixed topological order makes this unreachable in a correct
    /// build; it is a programming-invariant failure, logged and contained
    /// to the offending request.
    #[error("stage '{stage}' invoked without dependency '{dependency}'")]
    DependencyMissing { stage: String, dependency: String },
}

/// A single analysis/planning capability.
#[async_trait]
pub trait AgentCapability: Send + Sync {
    /// Produce this stage's artifact or fail.
    ///
    /// Implementations must not retry internally forever: the executor
    /// converts a hang into [`StageError::Timeout`] at its own boundary.
    async fn invoke(&self, input: &StageInput) -> Result<serde_json::Value, StageError>;
}

/// Registry of capabilities, keyed by the name stages reference.
///
/// Populated once at startup; lookups are cheap `Arc` clones so workers can
/// hold a capability across an await without borrowing the registry.
#[derive(Default)]
pub struct CapabilityRegistry {
    capabilities: HashMap<String, Arc<dyn AgentCapability>>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-loaded with the eight production analyzers.
    pub fn with_builtin_capabilities() -> Self {
        let mut registry = Self::new();
        for (name, capability) in builtin::all() {
            registry.register(name, capability);
        }
        registry
    }

    /// Register a capability under the given name, replacing any previous
    /// entry with that name.
    pub fn register(&mut self, name: &str, capability: Arc<dyn AgentCapability>) {
        self.capabilities.insert(name.to_string(), capability);
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn AgentCapability>, StageError> {
        self.capabilities
            .get(name)
            .cloned()
            .ok_or_else(|| StageError::NotRegistered(name.to_string()))
    }

    pub fn has(&self, name: &str) -> bool {
        self.capabilities.contains_key(name)
    }

    pub fn list(&self) -> Vec<String> {
        self.capabilities.keys().cloned().collect()
    }
}
