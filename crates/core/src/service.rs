//! Generation service facade.
//!
//! One object wires the queue, executor, hub and archiver together and
//! exposes the public surface a transport layer (HTTP handler, websocket
//! connection, CLI) talks to. Callers never touch the inner components
//! directly.

use crate::archive::Archiver;
use crate::capabilities::CapabilityRegistry;
use crate::config::ServiceConfig;
use crate::executor::PipelineExecutor;
use crate::hub::{Subscription, SubscriptionHandle, SubscriptionHub};
use crate::queue::{CancelOutcome, QueueError, RequestQueue};
use pg_protocol::events::ProgressEventKind;
use pg_protocol::pipeline_models::PipelineDefinition;
use pg_protocol::request_models::{GenerationRequest, SubmissionInput};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::info;
use uuid::Uuid;

/// Owns the worker pool and all shared pipeline state.
pub struct GenerationService {
    config: ServiceConfig,
    queue: Arc<RequestQueue>,
    hub: Arc<SubscriptionHub>,
    executor: Arc<PipelineExecutor>,
    archiver: Arc<dyn Archiver>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl GenerationService {
    pub fn new(
        config: ServiceConfig,
        pipeline: PipelineDefinition,
        registry: CapabilityRegistry,
        archiver: Arc<dyn Archiver>,
    ) -> Self {
        let queue = Arc::new(RequestQueue::new(config.max_retained_terminal));
        let hub = Arc::new(SubscriptionHub::new(
            config.replay_buffer_capacity,
            config.observer_buffer_capacity,
        ));
        let executor = Arc::new(PipelineExecutor::new(
            Arc::new(pipeline),
            Arc::new(registry),
            Arc::clone(&queue),
            Arc::clone(&hub),
            Arc::clone(&archiver),
            config.stage_timeout(),
            config.poll_interval(),
        ));

        Self {
            config,
            queue,
            hub,
            executor,
            archiver,
            workers: Mutex::new(Vec::new()),
        }
    }

    /// Production wiring: default configuration, the eight-stage generation
    /// pipeline, the built-in analyzers, and no persistence.
    pub fn with_defaults() -> Self {
        Self::new(
            ServiceConfig::default(),
            pg_protocol::pipeline_models::default_generation_pipeline(),
            CapabilityRegistry::with_builtin_capabilities(),
            Arc::new(crate::archive::NoopArchiver),
        )
    }

    /// Spawn the worker pool. Idempotent: a second call is a no-op while
    /// workers are already running.
    pub async fn start(&self) {
        let mut workers = self.workers.lock().await;
        if !workers.is_empty() {
            return;
        }
        for worker_id in 0..self.config.worker_concurrency {
            let executor = Arc::clone(&self.executor);
            workers.push(tokio::spawn(executor.run_worker(worker_id)));
        }
        info!(workers = self.config.worker_concurrency, "service started");
    }

    /// Abort all workers. In-flight capability calls are dropped at the
    /// next await point; queued requests stay queued.
    pub async fn shutdown(&self) {
        let mut workers = self.workers.lock().await;
        for worker in workers.drain(..) {
            worker.abort();
        }
        info!("service stopped");
    }

    /// Validate and enqueue a submission, returning its request id.
    ///
    /// # Errors
    ///
    /// `QueueError::InvalidInput` on a malformed submission; nothing is
    /// enqueued in that case.
    pub async fn submit(&self, input: SubmissionInput) -> Result<Uuid, QueueError> {
        self.queue.submit(input).await
    }

    /// Snapshot of a request's current state.
    pub async fn status(&self, id: Uuid) -> Result<GenerationRequest, QueueError> {
        self.queue.get_status(id).await
    }

    /// Ids of requests not yet terminal.
    pub async fn list_in_flight(&self) -> Vec<Uuid> {
        self.queue.list_in_flight().await
    }

    /// Observe a request's progress events.
    ///
    /// Already-buffered events (the terminal ones included) are replayed
    /// into the subscription first.
    ///
    /// # Errors
    ///
    /// `QueueError::NotFound` for an unknown or already-evicted id.
    pub async fn subscribe(&self, id: Uuid) -> Result<Subscription, QueueError> {
        if !self.queue.contains(id).await {
            return Err(QueueError::NotFound(id));
        }
        Ok(self.hub.subscribe(id).await)
    }

    /// Drop an observer registration. Idempotent.
    pub async fn unsubscribe(&self, handle: SubscriptionHandle) {
        self.hub.unsubscribe(handle).await;
    }

    /// Cancel a request.
    ///
    /// A request still in the backlog fails immediately and its terminal
    /// event is published here; a running request is flagged and stops
    /// after its current stage.
    ///
    /// # Errors
    ///
    /// `QueueError::NotFound` for an unknown id.
    pub async fn cancel(&self, id: Uuid) -> Result<CancelOutcome, QueueError> {
        let outcome = self.queue.request_cancel(id).await?;

        if let CancelOutcome::Cancelled(transition) = &outcome {
            // The request never reached a worker, so the terminal event is
            // published on its behalf.
            let reason = transition
                .snapshot
                .failure
                .as_ref()
                .map(|f| f.reason.clone())
                .unwrap_or_else(|| "cancelled".to_string());
            self.hub
                .publish(id, ProgressEventKind::Failed { reason })
                .await;

            let archiver = Arc::clone(&self.archiver);
            let snapshot = transition.snapshot.clone();
            tokio::spawn(async move {
                archiver.archive(snapshot).await;
            });
            for evicted in &transition.evicted {
                self.hub.retire(*evicted).await;
            }
        }

        Ok(outcome)
    }
}
