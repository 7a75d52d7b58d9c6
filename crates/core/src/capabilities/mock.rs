//! Mock capability implementations for testing.

use async_trait::async_trait;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Notify};

use super::{AgentCapability, StageError, StageInput};

enum Behavior {
    Success(serde_json::Value),
    Fail(String),
    Delay(Duration, serde_json::Value),
    /// Signals `entered` when invoked, then blocks until `release` fires.
    Gated {
        entered: mpsc::UnboundedSender<()>,
        release: Arc<Notify>,
    },
}

/// A scriptable capability that also counts its invocations, so tests can
/// assert that stages after a failure or cancellation never ran.
pub struct MockCapability {
    behavior: Behavior,
    invocations: AtomicUsize,
}

impl MockCapability {
    fn with_behavior(behavior: Behavior) -> Self {
        Self {
            behavior,
            invocations: AtomicUsize::new(0),
        }
    }

    pub fn success() -> Self {
        Self::success_with(json!({"status": "ok"}))
    }

    pub fn success_with(artifact: serde_json::Value) -> Self {
        Self::with_behavior(Behavior::Success(artifact))
    }

    pub fn failing(reason: &str) -> Self {
        Self::with_behavior(Behavior::Fail(reason.to_string()))
    }

    /// Succeeds after sleeping; used to exercise the stage timeout.
    pub fn delayed(delay: Duration) -> Self {
        Self::with_behavior(Behavior::Delay(delay, json!({"status": "slow"})))
    }

    /// Sends on `entered` when invoked, then waits for `release` before
    /// returning. Lets a test act while a stage is mid-flight and decide
    /// exactly when it finishes.
    pub fn gated(entered: mpsc::UnboundedSender<()>, release: Arc<Notify>) -> Self {
        Self::with_behavior(Behavior::Gated { entered, release })
    }

    /// How many times this capability has been invoked.
    pub fn invocation_count(&self) -> usize {
        self.invocations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AgentCapability for MockCapability {
    async fn invoke(&self, _input: &StageInput) -> Result<serde_json::Value, StageError> {
        self.invocations.fetch_add(1, Ordering::SeqCst);

        match &self.behavior {
            Behavior::Success(artifact) => Ok(artifact.clone()),
            Behavior::Fail(reason) => Err(StageError::Analysis(reason.clone())),
            Behavior::Delay(delay, artifact) => {
                tokio::time::sleep(*delay).await;
                Ok(artifact.clone())
            }
            Behavior::Gated { entered, release } => {
                let _ = entered.send(());
                release.notified().await;
                Ok(json!({"status": "released"}))
            }
        }
    }
}

/// Tracks how many invocations overlap in time. Used to verify that the
/// worker pool honors its concurrency limit.
pub struct GaugeCapability {
    current: AtomicUsize,
    max_seen: Arc<AtomicUsize>,
    hold: Duration,
}

impl GaugeCapability {
    pub fn new(max_seen: Arc<AtomicUsize>, hold: Duration) -> Self {
        Self {
            current: AtomicUsize::new(0),
            max_seen,
            hold,
        }
    }
}

#[async_trait]
impl AgentCapability for GaugeCapability {
    async fn invoke(&self, _input: &StageInput) -> Result<serde_json::Value, StageError> {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_seen.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.hold).await;
        self.current.fetch_sub(1, Ordering::SeqCst);
        Ok(json!({"status": "ok"}))
    }
}
