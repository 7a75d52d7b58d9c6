//! Generation request models.
//!
//! This module defines the structures for tracking a single project
//! generation request from submission through its terminal state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use ts_rs::TS;
use uuid::Uuid;

/// Project management methodology requested by the caller.
///
/// The recognized set is fixed; submissions naming anything else are
/// rejected before a request is created.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, TS)]
#[serde(rename_all = "lowercase")]
pub enum Methodology {
    Agile,
    Waterfall,
    Hybrid,
}

/// Error returned when a methodology string is not in the recognized set.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown methodology '{0}', expected one of: agile, waterfall, hybrid")]
pub struct UnknownMethodology(pub String);

impl FromStr for Methodology {
    type Err = UnknownMethodology;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "agile" => Ok(Methodology::Agile),
            "waterfall" => Ok(Methodology::Waterfall),
            "hybrid" => Ok(Methodology::Hybrid),
            _ => Err(UnknownMethodology(s.to_string())),
        }
    }
}

impl fmt::Display for Methodology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Methodology::Agile => write!(f, "agile"),
            Methodology::Waterfall => write!(f, "waterfall"),
            Methodology::Hybrid => write!(f, "hybrid"),
        }
    }
}

/// Raw submission payload as received from a client.
///
/// Nothing here is trusted: the queue validates it and converts it into a
/// [`ProjectBrief`] before a request is created.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, TS)]
pub struct SubmissionInput {
    /// Natural-language description of the project to generate.
    pub description: String,

    /// Requested methodology; must parse as a [`Methodology`].
    pub methodology: String,
}

impl SubmissionInput {
    pub fn new(description: impl Into<String>, methodology: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            methodology: methodology.into(),
        }
    }
}

/// Validated, immutable input carried by a generation request.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, TS)]
pub struct ProjectBrief {
    pub description: String,
    pub methodology: Methodology,
}

/// Lifecycle state of a generation request.
///
/// Transitions are monotonic and forward-only:
/// Queued -> Running -> Completed | Failed. No state is ever revisited.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, TS)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestState {
    /// Accepted and waiting in the backlog.
    Queued,

    /// Owned by a worker, stages executing.
    Running,

    /// All stages produced an artifact.
    Completed,

    /// A stage failed, the request was cancelled, or an invariant broke.
    Failed,
}

impl RequestState {
    /// Whether this state is terminal (no further transitions occur).
    pub fn is_terminal(self) -> bool {
        matches!(self, RequestState::Completed | RequestState::Failed)
    }
}

/// A single stage's artifact, recorded in pipeline order.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, TS)]
pub struct StageResult {
    /// Name of the stage that produced the artifact.
    pub stage: String,

    /// The structured artifact the capability returned.
    #[ts(type = "any")]
    pub artifact: serde_json::Value,
}

/// Identifies why a request failed, and in which stage when one failed.
///
/// `stage` is `None` for failures that are not tied to a stage, such as
/// cancellation between stages or before execution began.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, TS)]
pub struct StageFailure {
    pub stage: Option<String>,
    pub reason: String,
}

impl StageFailure {
    pub fn in_stage(stage: &str, reason: impl Into<String>) -> Self {
        Self {
            stage: Some(stage.to_string()),
            reason: reason.into(),
        }
    }

    pub fn cancelled(reason: impl Into<String>) -> Self {
        Self {
            stage: None,
            reason: reason.into(),
        }
    }
}

/// Tracked state of one generation request.
///
/// Created by the request queue at submission time, mutated exclusively by
/// the worker that dequeued it, and immutable once terminal. `stage_results`
/// is append-only; entries are never overwritten, so a failed request keeps
/// the artifacts of the stages that did succeed as a partial audit trail.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, TS)]
pub struct GenerationRequest {
    /// Unique identifier, assigned at enqueue time.
    #[ts(type = "string")]
    pub id: Uuid,

    /// Validated caller input, immutable after creation.
    pub input: ProjectBrief,

    /// Current lifecycle state.
    pub state: RequestState,

    /// Ordinal into the pipeline definition; advances only while Running.
    pub current_stage_index: usize,

    /// Artifacts recorded so far, in the pipeline's topological order.
    pub stage_results: Vec<StageResult>,

    /// Set when `state == Failed`.
    pub failure: Option<StageFailure>,

    /// Cooperative cancellation flag, checked by the executor between stages.
    pub cancel_requested: bool,

    /// When the request was accepted.
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,

    /// When the request reached a terminal state.
    #[ts(type = "string | null")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl GenerationRequest {
    /// Create a freshly queued request for the given brief.
    pub fn queued(input: ProjectBrief) -> Self {
        Self {
            id: Uuid::new_v4(),
            input,
            state: RequestState::Queued,
            current_stage_index: 0,
            stage_results: Vec::new(),
            failure: None,
            cancel_requested: false,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Look up a recorded artifact by stage name.
    pub fn artifact(&self, stage: &str) -> Option<&serde_json::Value> {
        self.stage_results
            .iter()
            .find(|r| r.stage == stage)
            .map(|r| &r.artifact)
    }

    /// Derived completion percentage, rounded half-up to a whole percent.
    ///
    /// `total_stages == 0` reports 100 so an empty pipeline reads as done.
    pub fn progress_percentage(&self, total_stages: usize) -> u8 {
        progress_percentage(self.stage_results.len(), total_stages)
    }
}

/// Shared rounding convention for progress reporting.
pub fn progress_percentage(completed: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    let completed = completed.min(total);
    ((completed * 100 + total / 2) / total) as u8
}
