use pg_protocol::*;
use uuid::Uuid;

#[test]
fn test_methodology_serialization() {
    let json = serde_json::to_value(Methodology::Agile).expect("Failed to serialize Methodology");
    assert_eq!(json, "agile");

    let deserialized: Methodology =
        serde_json::from_value(serde_json::json!("waterfall")).expect("Failed to deserialize");
    assert_eq!(deserialized, Methodology::Waterfall);
}

#[test]
fn test_request_state_serialization() {
    let json = serde_json::to_value(RequestState::Running).expect("Failed to serialize");
    assert_eq!(json, "RUNNING");

    let deserialized: RequestState =
        serde_json::from_value(serde_json::json!("COMPLETED")).expect("Failed to deserialize");
    assert_eq!(deserialized, RequestState::Completed);
}

#[test]
fn test_generation_request_round_trip() {
    let brief = ProjectBrief {
        description: "Create a React TypeScript project with authentication".to_string(),
        methodology: Methodology::Agile,
    };
    let mut request = GenerationRequest::queued(brief);
    request.stage_results.push(StageResult {
        stage: "business-case".to_string(),
        artifact: serde_json::json!({"recommendations": ["Focus on core business value"]}),
    });

    let json = serde_json::to_string(&request).expect("Failed to serialize GenerationRequest");
    let deserialized: GenerationRequest =
        serde_json::from_str(&json).expect("Failed to deserialize GenerationRequest");

    assert_eq!(deserialized.id, request.id);
    assert_eq!(deserialized.state, RequestState::Queued);
    assert_eq!(deserialized.stage_results.len(), 1);
    assert_eq!(deserialized.stage_results[0].stage, "business-case");
}

#[test]
fn test_progress_event_tagged_shape() {
    let event = ProgressEvent::new(
        Uuid::new_v4(),
        1,
        ProgressEventKind::StageCompleted {
            stage: "requirements".to_string(),
            artifact: serde_json::json!({"requirements": ["auth"]}),
            progress: 25,
        },
    );

    let json = serde_json::to_value(&event).expect("Failed to serialize ProgressEvent");

    // Tagged enum: { "type": "...", "payload": { ... } }
    assert_eq!(json["kind"]["type"], "stageCompleted");
    assert_eq!(json["kind"]["payload"]["stage"], "requirements");
    assert_eq!(json["kind"]["payload"]["progress"], 25);
    assert_eq!(json["sequence"], 1);

    let back: ProgressEvent = serde_json::from_value(json).expect("Failed to deserialize");
    assert_eq!(back, event);
}

#[test]
fn test_terminal_event_serialization() {
    let event = ProgressEvent::new(
        Uuid::new_v4(),
        9,
        ProgressEventKind::Failed {
            reason: "cancelled".to_string(),
        },
    );

    let json = serde_json::to_value(&event).expect("Failed to serialize");
    assert_eq!(json["kind"]["type"], "failed");
    assert_eq!(json["kind"]["payload"]["reason"], "cancelled");
    assert!(event.is_terminal());
}

#[test]
fn test_pipeline_definition_round_trip() {
    let pipeline = default_generation_pipeline();

    let json = serde_json::to_string(&pipeline).expect("Failed to serialize PipelineDefinition");
    let deserialized: PipelineDefinition =
        serde_json::from_str(&json).expect("Failed to deserialize PipelineDefinition");

    assert_eq!(deserialized.name(), pipeline.name());
    assert_eq!(deserialized.total_stages(), 8);
    assert_eq!(deserialized.stages()[0].name, "business-case");
}
