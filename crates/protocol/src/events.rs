//! Progress events pushed from the executor to subscribed observers.
//!
//! Events follow a tagged payload pattern so the web client can switch on
//! `type` without inspecting the payload shape:
//!
//! ```json
//! {
//!   "type": "stageCompleted",
//!   "payload": {
//!     "stage": "requirements",
//!     "artifact": { "requirements": ["..."] },
//!     "progress": 25
//!   }
//! }
//! ```
//!
//! Delivery contract: for a given request, each observer sees events in
//! non-decreasing `sequence` order starting at 0. Duplicates are permitted
//! (at-least-once delivery); reordering is not. Exactly one terminal event
//! (`completed` or `failed`) closes every accepted request's stream.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

use crate::request_models::StageResult;

/// Payload of a progress event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, TS)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum ProgressEventKind {
    /// The request left the backlog and began executing.
    Started {
        /// Name of the pipeline being run.
        pipeline: String,
        /// Number of stages the pipeline will execute.
        total_stages: usize,
    },

    /// A stage produced its artifact.
    StageCompleted {
        stage: String,
        #[ts(type = "any")]
        artifact: serde_json::Value,
        /// Derived completion percentage (completed stages / total stages).
        progress: u8,
    },

    /// A stage's capability failed; a terminal `Failed` event follows.
    StageFailed { stage: String, reason: String },

    /// Terminal: every stage succeeded.
    Completed { results: Vec<StageResult> },

    /// Terminal: the request failed or was cancelled.
    Failed { reason: String },
}

impl ProgressEventKind {
    /// Whether this event closes the request's stream.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProgressEventKind::Completed { .. } | ProgressEventKind::Failed { .. }
        )
    }
}

/// A single progress notification for one generation request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, TS)]
pub struct ProgressEvent {
    /// The request this event belongs to.
    #[ts(type = "string")]
    pub request_id: Uuid,

    /// Monotonically increasing per request, starting at 0.
    pub sequence: u64,

    /// When the event was published.
    #[ts(type = "string")]
    pub timestamp: DateTime<Utc>,

    pub kind: ProgressEventKind,
}

impl ProgressEvent {
    pub fn new(request_id: Uuid, sequence: u64, kind: ProgressEventKind) -> Self {
        Self {
            request_id,
            sequence,
            timestamp: Utc::now(),
            kind,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.kind.is_terminal()
    }
}
