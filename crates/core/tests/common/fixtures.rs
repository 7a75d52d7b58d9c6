//! Fixtures for wiring up a service with scripted capabilities.

use async_trait::async_trait;
use pg_core::archive::recording::RecordingArchiver;
use pg_core::capabilities::{AgentCapability, CapabilityRegistry, StageError, StageInput};
use pg_core::config::ServiceConfig;
use pg_core::service::GenerationService;
use pg_protocol::pipeline_models::{PipelineDefinition, StageDefinition};
use pg_protocol::request_models::{GenerationRequest, SubmissionInput};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// The standard submission used across the happy-path tests.
pub fn sample_submission() -> SubmissionInput {
    SubmissionInput::new(
        "Create a React TypeScript project with authentication",
        "agile",
    )
}

/// Test configuration with short poll intervals so tests settle quickly.
pub fn fast_config() -> ServiceConfig {
    ServiceConfig {
        poll_interval_ms: 20,
        stage_timeout_secs: 5,
        ..ServiceConfig::default()
    }
}

/// A linear pipeline `s1 -> s2 -> ... -> sN`, one capability per stage.
pub fn linear_pipeline(stage_count: usize) -> PipelineDefinition {
    let names: Vec<String> = (1..=stage_count).map(|i| format!("s{i}")).collect();
    let stages: Vec<StageDefinition> = names
        .iter()
        .enumerate()
        .map(|(i, name)| {
            if i == 0 {
                StageDefinition::new(name, name, &[])
            } else {
                StageDefinition::new(name, name, &[names[i - 1].as_str()])
            }
        })
        .collect();
    PipelineDefinition::new("linear", stages).expect("linear pipeline is a valid DAG")
}

/// A capability that fails whenever the project description contains a
/// marker string, and succeeds otherwise. Lets one registry drive both
/// outcomes so fault-isolation tests can mix passing and failing requests.
pub struct FailOnMarker {
    marker: String,
}

impl FailOnMarker {
    pub fn new(marker: &str) -> Self {
        Self {
            marker: marker.to_string(),
        }
    }
}

#[async_trait]
impl AgentCapability for FailOnMarker {
    async fn invoke(&self, input: &StageInput) -> Result<serde_json::Value, StageError> {
        if input.description.contains(&self.marker) {
            Err(StageError::Analysis(format!(
                "refusing project mentioning '{}'",
                self.marker
            )))
        } else {
            Ok(serde_json::json!({"status": "ok"}))
        }
    }
}

/// A fully wired service plus the archiver it reports into.
pub struct TestService {
    pub service: GenerationService,
    pub archiver: Arc<RecordingArchiver>,
}

/// Build a service around the given pipeline and registry with test-speed
/// configuration. Workers are not started; call `service.start()` when the
/// test wants processing to begin.
pub fn build_service(pipeline: PipelineDefinition, registry: CapabilityRegistry) -> TestService {
    build_service_with_config(fast_config(), pipeline, registry)
}

pub fn build_service_with_config(
    config: ServiceConfig,
    pipeline: PipelineDefinition,
    registry: CapabilityRegistry,
) -> TestService {
    let archiver = Arc::new(RecordingArchiver::new());
    let service = GenerationService::new(
        config,
        pipeline,
        registry,
        Arc::clone(&archiver) as Arc<dyn pg_core::archive::Archiver>,
    );
    TestService { service, archiver }
}

/// Poll the service until the request reaches a terminal state.
pub async fn wait_for_terminal(service: &GenerationService, id: Uuid) -> GenerationRequest {
    for _ in 0..250 {
        let status = service.status(id).await.expect("status");
        if status.state.is_terminal() {
            return status;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("request {id} never reached a terminal state");
}
