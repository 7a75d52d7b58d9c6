//! Custom assertion helpers over collected event streams.

use pg_core::hub::Subscription;
use pg_protocol::events::{ProgressEvent, ProgressEventKind};
use std::time::Duration;

/// Drain a subscription until a terminal event arrives or the deadline
/// passes. Returns everything received, terminal event included.
pub async fn collect_events_until_terminal(
    subscription: &mut Subscription,
    deadline: Duration,
) -> Vec<ProgressEvent> {
    let mut events = Vec::new();
    let start = tokio::time::Instant::now();

    while start.elapsed() < deadline {
        match tokio::time::timeout(Duration::from_millis(100), subscription.events.recv()).await {
            Ok(Some(event)) => {
                let terminal = event.is_terminal();
                events.push(event);
                if terminal {
                    break;
                }
            }
            Ok(None) => break,  // Channel closed
            Err(_) => continue, // Timeout slice, keep waiting
        }
    }

    events
}

/// Sequences must be strictly increasing within one collected stream.
pub fn assert_sequences_strictly_increasing(events: &[ProgressEvent]) {
    for window in events.windows(2) {
        assert!(
            window[1].sequence > window[0].sequence,
            "sequence went from {} to {}",
            window[0].sequence,
            window[1].sequence
        );
    }
}

/// Exactly one terminal event, and it comes last.
pub fn assert_single_trailing_terminal(events: &[ProgressEvent]) {
    let terminal_count = events.iter().filter(|e| e.is_terminal()).count();
    assert_eq!(terminal_count, 1, "expected exactly one terminal event");
    assert!(
        events.last().is_some_and(|e| e.is_terminal()),
        "terminal event must close the stream"
    );
}

/// Names of the stages that completed, in stream order.
pub fn completed_stage_names(events: &[ProgressEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match &e.kind {
            ProgressEventKind::StageCompleted { stage, .. } => Some(stage.clone()),
            _ => None,
        })
        .collect()
}

/// The stream opens with `Started` announcing the expected stage count.
pub fn assert_started_with_total(events: &[ProgressEvent], expected_total: usize) {
    match events.first().map(|e| &e.kind) {
        Some(ProgressEventKind::Started { total_stages, .. }) => {
            assert_eq!(*total_stages, expected_total);
        }
        other => panic!("first event should be Started, got {other:?}"),
    }
}
