//! Request queue with per-request lifecycle tracking.
//!
//! The queue owns the only two mutable shared structures in the system: the
//! FIFO backlog and the id -> request map. Everything else reads cloned
//! snapshots. Mutation after dequeue goes through the `mark_*` /
//! `record_stage_result` methods, which only the worker currently owning a
//! request may call (single-writer-per-request invariant); the mutex here
//! protects the collections themselves, not individual request fields.

use pg_protocol::request_models::{
    GenerationRequest, ProjectBrief, RequestState, StageFailure, StageResult, SubmissionInput,
};
use std::collections::{HashMap, VecDeque};
use thiserror::Error;
use tokio::sync::{Mutex, Notify};
use tracing::debug;
use uuid::Uuid;

/// Maximum accepted description length, matching the public API contract.
const MAX_DESCRIPTION_LEN: usize = 1000;

/// Errors surfaced by queue operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    /// Malformed submission; rejected synchronously, no request created.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Lookup on an unknown request id.
    #[error("request {0} not found")]
    NotFound(Uuid),
}

/// What a cancellation request actually did.
#[derive(Debug, Clone, PartialEq)]
pub enum CancelOutcome {
    /// The request was still in the backlog; it is now terminally Failed
    /// and the caller must publish the synthetic terminal event.
    Cancelled(TerminalTransition),

    /// The request is owned by a worker; the flag is set and the executor
    /// will stop between stages.
    CancelRequested,

    /// Already Completed or Failed; nothing to do.
    AlreadyTerminal,
}

/// Result of a transition into a terminal state.
///
/// Carries the final snapshot plus any older terminal records that fell out
/// of the bounded retention ring, so the caller can retire their replay
/// state as well.
#[derive(Debug, Clone, PartialEq)]
pub struct TerminalTransition {
    pub snapshot: GenerationRequest,
    pub evicted: Vec<Uuid>,
}

#[derive(Default)]
struct QueueInner {
    backlog: VecDeque<Uuid>,
    requests: HashMap<Uuid, GenerationRequest>,
    /// Terminal request ids, oldest first, for bounded retention.
    terminal_order: VecDeque<Uuid>,
}

impl QueueInner {
    /// Record `id` as terminal and evict beyond the retention cap.
    fn retire_terminal(&mut self, id: Uuid, cap: usize) -> Vec<Uuid> {
        self.terminal_order.push_back(id);

        let mut evicted = Vec::new();
        while self.terminal_order.len() > cap {
            if let Some(old) = self.terminal_order.pop_front() {
                self.requests.remove(&old);
                evicted.push(old);
            }
        }
        evicted
    }
}

/// FIFO queue of generation requests with bounded terminal retention.
pub struct RequestQueue {
    inner: Mutex<QueueInner>,
    work_available: Notify,
    max_retained_terminal: usize,
}

impl RequestQueue {
    pub fn new(max_retained_terminal: usize) -> Self {
        Self {
            inner: Mutex::new(QueueInner::default()),
            work_available: Notify::new(),
            max_retained_terminal,
        }
    }

    /// Validate a submission and enqueue it.
    ///
    /// Returns the new request id immediately; processing happens
    /// asynchronously. On validation failure nothing is mutated.
    ///
    /// # Errors
    ///
    /// `QueueError::InvalidInput` if the description is empty or too long,
    /// or the methodology is not in the recognized set.
    pub async fn submit(&self, input: SubmissionInput) -> Result<Uuid, QueueError> {
        let brief = validate(&input)?;

        let request = GenerationRequest::queued(brief);
        let id = request.id;

        let mut inner = self.inner.lock().await;
        inner.requests.insert(id, request);
        inner.backlog.push_back(id);
        drop(inner);

        debug!(request_id = %id, "request enqueued");
        self.work_available.notify_one();
        Ok(id)
    }

    /// Remove and return the oldest queued request, or `None` if the
    /// backlog is empty. Safe to call from multiple workers concurrently
    /// with `submit`; a request is handed to exactly one caller.
    pub async fn dequeue_next(&self) -> Option<GenerationRequest> {
        let mut inner = self.inner.lock().await;
        let id = inner.backlog.pop_front()?;
        inner.requests.get(&id).cloned()
    }

    /// Read-only snapshot of a request's current state.
    pub async fn get_status(&self, id: Uuid) -> Result<GenerationRequest, QueueError> {
        let inner = self.inner.lock().await;
        inner.requests.get(&id).cloned().ok_or(QueueError::NotFound(id))
    }

    /// Whether the id is known at all (terminal records included).
    pub async fn contains(&self, id: Uuid) -> bool {
        self.inner.lock().await.requests.contains_key(&id)
    }

    /// Ids of requests currently Queued or Running (diagnostic).
    pub async fn list_in_flight(&self) -> Vec<Uuid> {
        let inner = self.inner.lock().await;
        inner
            .requests
            .values()
            .filter(|r| !r.state.is_terminal())
            .map(|r| r.id)
            .collect()
    }

    /// Ask for a request to be cancelled.
    ///
    /// A backlog request is failed immediately; a request owned by a worker
    /// is flagged and stops after its current stage (capability calls are
    /// non-preemptible).
    pub async fn request_cancel(&self, id: Uuid) -> Result<CancelOutcome, QueueError> {
        let mut inner = self.inner.lock().await;

        if !inner.requests.contains_key(&id) {
            return Err(QueueError::NotFound(id));
        }

        // Only a request still in the backlog can be failed here. A request
        // already handed to a worker (even if still formally Queued for a
        // moment) belongs to that worker; we may only set the flag.
        let in_backlog = inner.backlog.iter().any(|queued| *queued == id);
        if in_backlog {
            inner.backlog.retain(|queued| *queued != id);
            let snapshot = match inner.requests.get_mut(&id) {
                Some(request) => {
                    request.state = RequestState::Failed;
                    request.failure = Some(StageFailure::cancelled("cancelled before execution"));
                    request.completed_at = Some(chrono::Utc::now());
                    request.clone()
                }
                None => return Err(QueueError::NotFound(id)),
            };
            let evicted = inner.retire_terminal(id, self.max_retained_terminal);
            return Ok(CancelOutcome::Cancelled(TerminalTransition {
                snapshot,
                evicted,
            }));
        }

        let request = inner.requests.get_mut(&id).ok_or(QueueError::NotFound(id))?;
        if request.state.is_terminal() {
            return Ok(CancelOutcome::AlreadyTerminal);
        }
        request.cancel_requested = true;
        Ok(CancelOutcome::CancelRequested)
    }

    /// Suspend until `submit` signals new work. Callers should re-check the
    /// backlog after waking; wake-ups may be spurious or coalesced.
    pub async fn wait_for_work(&self) {
        self.work_available.notified().await;
    }

    // --- executor-only mutation path (single writer per request) ---

    /// Transition a dequeued request to Running.
    pub async fn mark_running(&self, id: Uuid) -> Result<GenerationRequest, QueueError> {
        let mut inner = self.inner.lock().await;
        let request = inner.requests.get_mut(&id).ok_or(QueueError::NotFound(id))?;
        request.state = RequestState::Running;
        Ok(request.clone())
    }

    /// Append a stage artifact and advance the stage cursor.
    pub async fn record_stage_result(
        &self,
        id: Uuid,
        stage: &str,
        artifact: serde_json::Value,
    ) -> Result<GenerationRequest, QueueError> {
        let mut inner = self.inner.lock().await;
        let request = inner.requests.get_mut(&id).ok_or(QueueError::NotFound(id))?;
        request.stage_results.push(StageResult {
            stage: stage.to_string(),
            artifact,
        });
        request.current_stage_index += 1;
        Ok(request.clone())
    }

    /// Whether cancellation was requested for a running request.
    pub async fn cancel_requested(&self, id: Uuid) -> Result<bool, QueueError> {
        let inner = self.inner.lock().await;
        inner
            .requests
            .get(&id)
            .map(|r| r.cancel_requested)
            .ok_or(QueueError::NotFound(id))
    }

    /// Transition to Completed and apply terminal retention.
    pub async fn mark_completed(&self, id: Uuid) -> Result<TerminalTransition, QueueError> {
        self.mark_terminal(id, RequestState::Completed, None).await
    }

    /// Transition to Failed with the given failure record.
    pub async fn mark_failed(
        &self,
        id: Uuid,
        failure: StageFailure,
    ) -> Result<TerminalTransition, QueueError> {
        self.mark_terminal(id, RequestState::Failed, Some(failure)).await
    }

    async fn mark_terminal(
        &self,
        id: Uuid,
        state: RequestState,
        failure: Option<StageFailure>,
    ) -> Result<TerminalTransition, QueueError> {
        let mut inner = self.inner.lock().await;
        let snapshot = {
            let request = inner.requests.get_mut(&id).ok_or(QueueError::NotFound(id))?;
            request.state = state;
            request.failure = failure;
            request.completed_at = Some(chrono::Utc::now());
            request.clone()
        };
        let evicted = inner.retire_terminal(id, self.max_retained_terminal);
        Ok(TerminalTransition { snapshot, evicted })
    }
}

/// Validate raw caller input into an immutable brief.
fn validate(input: &SubmissionInput) -> Result<ProjectBrief, QueueError> {
    let description = input.description.trim();
    if description.is_empty() {
        return Err(QueueError::InvalidInput(
            "description must not be empty".to_string(),
        ));
    }
    if description.len() > MAX_DESCRIPTION_LEN {
        return Err(QueueError::InvalidInput(format!(
            "description must be at most {MAX_DESCRIPTION_LEN} characters"
        )));
    }

    let methodology = input
        .methodology
        .parse()
        .map_err(|e: pg_protocol::request_models::UnknownMethodology| {
            QueueError::InvalidInput(e.to_string())
        })?;

    Ok(ProjectBrief {
        description: description.to_string(),
        methodology,
    })
}
