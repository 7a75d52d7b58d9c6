//! Pipeline executor: the worker loop that turns queued requests into
//! terminal records.
//!
//! Each worker owns exactly one request at a time and runs its stages
//! strictly in the pipeline's fixed topological order. Concurrency exists
//! only across requests (one worker per in-flight request), never within
//! one, which is what keeps the single-writer-per-request invariant on the
//! queue trivially true.

use crate::archive::Archiver;
use crate::capabilities::{CapabilityRegistry, StageError, StageInput};
use crate::hub::SubscriptionHub;
use crate::queue::{QueueError, RequestQueue, TerminalTransition};
use pg_protocol::events::ProgressEventKind;
use pg_protocol::pipeline_models::{PipelineDefinition, StageDefinition};
use pg_protocol::request_models::{GenerationRequest, StageFailure};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

/// Drives queued requests through the pipeline.
///
/// Cheap to clone behind an [`Arc`]; the service spawns one
/// [`run_worker`](Self::run_worker) task per configured worker.
pub struct PipelineExecutor {
    pipeline: Arc<PipelineDefinition>,
    registry: Arc<CapabilityRegistry>,
    queue: Arc<RequestQueue>,
    hub: Arc<SubscriptionHub>,
    archiver: Arc<dyn Archiver>,
    stage_timeout: Duration,
    poll_interval: Duration,
}

impl PipelineExecutor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pipeline: Arc<PipelineDefinition>,
        registry: Arc<CapabilityRegistry>,
        queue: Arc<RequestQueue>,
        hub: Arc<SubscriptionHub>,
        archiver: Arc<dyn Archiver>,
        stage_timeout: Duration,
        poll_interval: Duration,
    ) -> Self {
        Self {
            pipeline,
            registry,
            queue,
            hub,
            archiver,
            stage_timeout,
            poll_interval,
        }
    }

    /// Worker loop: dequeue, process, repeat.
    ///
    /// Sleeps on the queue's notification when the backlog is empty, with a
    /// poll-interval fallback because `Notify` wake-ups can coalesce when
    /// several submissions land while all workers are busy.
    pub async fn run_worker(self: Arc<Self>, worker_id: usize) {
        info!(worker_id, "worker started");
        loop {
            match self.queue.dequeue_next().await {
                Some(request) => {
                    let request_id = request.id;
                    if let Err(e) = self.process_request(request).await {
                        // Fault isolation: a broken request never takes the
                        // worker down with it.
                        error!(worker_id, %request_id, error = %e, "request processing aborted");
                    }
                }
                None => {
                    tokio::select! {
                        _ = self.queue.wait_for_work() => {}
                        _ = tokio::time::sleep(self.poll_interval) => {}
                    }
                }
            }
        }
    }

    /// Run one dequeued request to its terminal state.
    ///
    /// Publishes `Started`, then one event per stage outcome, then exactly
    /// one terminal event, and finally hands the terminal snapshot to the
    /// archiver.
    ///
    /// # Errors
    ///
    /// `QueueError` only when the request record itself is gone, which
    /// means the bookkeeping invariants are broken; stage failures are
    /// handled internally and do not surface here.
    pub async fn process_request(&self, request: GenerationRequest) -> Result<(), QueueError> {
        let id = request.id;
        let total_stages = self.pipeline.total_stages();

        let mut snapshot = self.queue.mark_running(id).await?;
        info!(request_id = %id, pipeline = self.pipeline.name(), "request started");
        self.hub
            .publish(
                id,
                ProgressEventKind::Started {
                    pipeline: self.pipeline.name().to_string(),
                    total_stages,
                },
            )
            .await;

        for stage in self.pipeline.stages() {
            // Cancellation is cooperative and checked between stages only;
            // a capability call is never preempted mid-flight.
            if self.queue.cancel_requested(id).await? {
                info!(request_id = %id, stage = %stage.name, "cancelled before stage");
                let failure = StageFailure::cancelled("cancelled during execution");
                return self.fail(id, failure, None).await;
            }

            match self.run_stage(&snapshot, stage).await {
                Ok(artifact) => {
                    snapshot = self
                        .queue
                        .record_stage_result(id, &stage.name, artifact.clone())
                        .await?;
                    let progress = snapshot.progress_percentage(total_stages);
                    debug!(request_id = %id, stage = %stage.name, progress, "stage completed");
                    self.hub
                        .publish(
                            id,
                            ProgressEventKind::StageCompleted {
                                stage: stage.name.clone(),
                                artifact,
                                progress,
                            },
                        )
                        .await;
                }
                Err(stage_error) => {
                    warn!(request_id = %id, stage = %stage.name, error = %stage_error, "stage failed");
                    let failure = StageFailure::in_stage(&stage.name, stage_error.to_string());
                    return self.fail(id, failure, Some(&stage.name)).await;
                }
            }
        }

        let transition = self.queue.mark_completed(id).await?;
        info!(request_id = %id, stages = total_stages, "request completed");
        self.hub
            .publish(
                id,
                ProgressEventKind::Completed {
                    results: transition.snapshot.stage_results.clone(),
                },
            )
            .await;

        self.finalize(transition).await;
        Ok(())
    }

    /// Execute one stage: assemble dependency artifacts, look up the
    /// capability and invoke it under the stage timeout.
    async fn run_stage(
        &self,
        request: &GenerationRequest,
        stage: &StageDefinition,
    ) -> Result<serde_json::Value, StageError> {
        let mut input = StageInput::new(
            request.input.description.clone(),
            request.input.methodology,
        );
        for dependency in &stage.depends_on {
            match request.artifact(dependency) {
                Some(artifact) => {
                    input
                        .artifacts
                        .insert(dependency.clone(), artifact.clone());
                }
                None => {
                    // The fixed topological order makes this unreachable in
                    // a correct build; treat it as a contained invariant
                    // failure of this request.
                    error!(
                        request_id = %request.id,
                        stage = %stage.name,
                        dependency = %dependency,
                        "dependency artifact missing despite topological order"
                    );
                    return Err(StageError::DependencyMissing {
                        stage: stage.name.clone(),
                        dependency: dependency.clone(),
                    });
                }
            }
        }

        let capability = self.registry.get(&stage.capability)?;

        match timeout(self.stage_timeout, capability.invoke(&input)).await {
            Ok(result) => result,
            Err(_) => Err(StageError::Timeout {
                seconds: self.stage_timeout.as_secs(),
            }),
        }
    }

    /// Fail the request, publish `StageFailed` (when a stage is at fault)
    /// followed by the terminal `Failed`, and finalize.
    async fn fail(
        &self,
        id: uuid::Uuid,
        failure: StageFailure,
        stage: Option<&str>,
    ) -> Result<(), QueueError> {
        let reason = failure.reason.clone();
        let transition = self.queue.mark_failed(id, failure).await?;

        if let Some(stage) = stage {
            self.hub
                .publish(
                    id,
                    ProgressEventKind::StageFailed {
                        stage: stage.to_string(),
                        reason: reason.clone(),
                    },
                )
                .await;
        }
        self.hub
            .publish(id, ProgressEventKind::Failed { reason })
            .await;

        self.finalize(transition).await;
        Ok(())
    }

    /// Archive the terminal snapshot off the worker path and retire hub
    /// state for any terminal records the retention ring evicted.
    async fn finalize(&self, transition: TerminalTransition) {
        let archiver = Arc::clone(&self.archiver);
        let snapshot = transition.snapshot;
        tokio::spawn(async move {
            archiver.archive(snapshot).await;
        });

        for evicted in transition.evicted {
            self.hub.retire(evicted).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::recording::RecordingArchiver;
    use crate::capabilities::mock::MockCapability;
    use pg_protocol::request_models::{RequestState, SubmissionInput};
    use serde_json::json;

    struct Harness {
        executor: PipelineExecutor,
        queue: Arc<RequestQueue>,
        hub: Arc<SubscriptionHub>,
        archiver: Arc<RecordingArchiver>,
    }

    fn harness(pipeline: PipelineDefinition, registry: CapabilityRegistry) -> Harness {
        let queue = Arc::new(RequestQueue::new(64));
        let hub = Arc::new(SubscriptionHub::new(64, 32));
        let archiver = Arc::new(RecordingArchiver::new());
        let executor = PipelineExecutor::new(
            Arc::new(pipeline),
            Arc::new(registry),
            Arc::clone(&queue),
            Arc::clone(&hub),
            Arc::clone(&archiver) as Arc<dyn Archiver>,
            Duration::from_secs(5),
            Duration::from_millis(50),
        );
        Harness {
            executor,
            queue,
            hub,
            archiver,
        }
    }

    fn three_stage_pipeline() -> PipelineDefinition {
        PipelineDefinition::new(
            "test",
            vec![
                StageDefinition::new("first", "first", &[]),
                StageDefinition::new("second", "second", &["first"]),
                StageDefinition::new("third", "third", &["second"]),
            ],
        )
        .unwrap()
    }

    async fn submit_and_dequeue(queue: &RequestQueue) -> GenerationRequest {
        queue
            .submit(SubmissionInput::new("A test project", "agile"))
            .await
            .expect("submit");
        queue.dequeue_next().await.expect("dequeue")
    }

    #[tokio::test]
    async fn test_happy_path_runs_all_stages_in_order() {
        let mut registry = CapabilityRegistry::new();
        for name in ["first", "second", "third"] {
            registry.register(
                name,
                Arc::new(MockCapability::success_with(json!({"stage": name}))),
            );
        }
        let h = harness(three_stage_pipeline(), registry);

        let request = submit_and_dequeue(&h.queue).await;
        let id = request.id;
        h.executor.process_request(request).await.expect("process");

        let status = h.queue.get_status(id).await.expect("status");
        assert_eq!(status.state, RequestState::Completed);
        assert!(status.completed_at.is_some());

        let stages: Vec<&str> = status
            .stage_results
            .iter()
            .map(|r| r.stage.as_str())
            .collect();
        assert_eq!(stages, vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn test_dependency_artifacts_are_passed_through() {
        // The second stage sees the first stage's artifact as input; a
        // capability that inspects its input proves the plumbing.
        struct EchoDeps;

        #[async_trait::async_trait]
        impl crate::capabilities::AgentCapability for EchoDeps {
            async fn invoke(&self, input: &StageInput) -> Result<serde_json::Value, StageError> {
                Ok(json!({"saw": input.artifacts.keys().cloned().collect::<Vec<_>>()}))
            }
        }

        let mut registry = CapabilityRegistry::new();
        registry.register("first", Arc::new(MockCapability::success_with(json!({"n": 1}))));
        registry.register("second", Arc::new(EchoDeps));
        registry.register("third", Arc::new(MockCapability::success()));
        let h = harness(three_stage_pipeline(), registry);

        let request = submit_and_dequeue(&h.queue).await;
        let id = request.id;
        h.executor.process_request(request).await.expect("process");

        let status = h.queue.get_status(id).await.expect("status");
        assert_eq!(
            status.artifact("second"),
            Some(&json!({"saw": ["first"]}))
        );
    }

    #[tokio::test]
    async fn test_stage_failure_stops_pipeline_and_keeps_partial_results() {
        let mut registry = CapabilityRegistry::new();
        registry.register("first", Arc::new(MockCapability::success()));
        registry.register("second", Arc::new(MockCapability::failing("model unreachable")));
        let third = Arc::new(MockCapability::success());
        registry.register("third", Arc::clone(&third) as Arc<dyn crate::capabilities::AgentCapability>);
        let h = harness(three_stage_pipeline(), registry);

        let request = submit_and_dequeue(&h.queue).await;
        let id = request.id;
        h.executor.process_request(request).await.expect("process");

        let status = h.queue.get_status(id).await.expect("status");
        assert_eq!(status.state, RequestState::Failed);
        assert_eq!(
            status.failure.as_ref().and_then(|f| f.stage.as_deref()),
            Some("second")
        );
        assert_eq!(status.stage_results.len(), 1);
        assert_eq!(third.invocation_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_capability_fails_the_request() {
        // "second" never registered.
        let mut registry = CapabilityRegistry::new();
        registry.register("first", Arc::new(MockCapability::success()));
        registry.register("third", Arc::new(MockCapability::success()));
        let h = harness(three_stage_pipeline(), registry);

        let request = submit_and_dequeue(&h.queue).await;
        let id = request.id;
        h.executor.process_request(request).await.expect("process");

        let status = h.queue.get_status(id).await.expect("status");
        assert_eq!(status.state, RequestState::Failed);
        let reason = status.failure.as_ref().map(|f| f.reason.as_str());
        assert!(reason.is_some_and(|r| r.contains("second")));
    }

    #[tokio::test]
    async fn test_hanging_stage_times_out() {
        let mut registry = CapabilityRegistry::new();
        registry.register(
            "first",
            Arc::new(MockCapability::delayed(Duration::from_secs(60))),
        );
        registry.register("second", Arc::new(MockCapability::success()));
        registry.register("third", Arc::new(MockCapability::success()));

        let queue = Arc::new(RequestQueue::new(64));
        let hub = Arc::new(SubscriptionHub::new(64, 32));
        let executor = PipelineExecutor::new(
            Arc::new(three_stage_pipeline()),
            Arc::new(registry),
            Arc::clone(&queue),
            Arc::clone(&hub),
            Arc::new(crate::archive::NoopArchiver),
            Duration::from_millis(50),
            Duration::from_millis(50),
        );

        let request = submit_and_dequeue(&queue).await;
        let id = request.id;
        executor.process_request(request).await.expect("process");

        let status = queue.get_status(id).await.expect("status");
        assert_eq!(status.state, RequestState::Failed);
        let reason = status.failure.as_ref().map(|f| f.reason.as_str());
        assert!(reason.is_some_and(|r| r.contains("timed out")));
    }

    #[tokio::test]
    async fn test_events_carry_monotonic_sequences_and_one_terminal() {
        let mut registry = CapabilityRegistry::new();
        for name in ["first", "second", "third"] {
            registry.register(name, Arc::new(MockCapability::success()));
        }
        let h = harness(three_stage_pipeline(), registry);

        let request = submit_and_dequeue(&h.queue).await;
        let id = request.id;
        let mut subscription = h.hub.subscribe(id).await;
        h.executor.process_request(request).await.expect("process");

        let mut events = Vec::new();
        while let Ok(event) = subscription.events.try_recv() {
            events.push(event);
        }

        // Started + 3 StageCompleted + Completed.
        assert_eq!(events.len(), 5);
        for (expected, event) in events.iter().enumerate() {
            assert_eq!(event.sequence, expected as u64);
        }
        let terminal_count = events.iter().filter(|e| e.is_terminal()).count();
        assert_eq!(terminal_count, 1);
        assert!(events.last().is_some_and(|e| e.is_terminal()));
    }

    #[tokio::test]
    async fn test_progress_reported_per_completed_stage() {
        let mut registry = CapabilityRegistry::new();
        for name in ["first", "second", "third"] {
            registry.register(name, Arc::new(MockCapability::success()));
        }
        let h = harness(three_stage_pipeline(), registry);

        let request = submit_and_dequeue(&h.queue).await;
        let id = request.id;
        let mut subscription = h.hub.subscribe(id).await;
        h.executor.process_request(request).await.expect("process");

        let mut progress = Vec::new();
        while let Ok(event) = subscription.events.try_recv() {
            if let ProgressEventKind::StageCompleted { progress: p, .. } = event.kind {
                progress.push(p);
            }
        }
        assert_eq!(progress, vec![33, 67, 100]);
    }

    #[tokio::test]
    async fn test_terminal_snapshot_reaches_archiver() {
        let mut registry = CapabilityRegistry::new();
        for name in ["first", "second", "third"] {
            registry.register(name, Arc::new(MockCapability::success()));
        }
        let h = harness(three_stage_pipeline(), registry);

        let request = submit_and_dequeue(&h.queue).await;
        let id = request.id;
        h.executor.process_request(request).await.expect("process");

        // Archiving is spawned; give it a moment.
        tokio::time::sleep(Duration::from_millis(50)).await;
        let archived = h.archiver.archived().await;
        assert_eq!(archived.len(), 1);
        assert_eq!(archived[0].id, id);
        assert_eq!(archived[0].state, RequestState::Completed);
    }
}
