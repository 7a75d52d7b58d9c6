//! Terminal-record persistence boundary.
//!
//! Archiving is fire-and-forget: the executor hands the terminal snapshot
//! to the archiver on a spawned task and moves on. A slow or failing
//! archiver never delays the worker loop or the terminal event.

use async_trait::async_trait;
use pg_protocol::request_models::GenerationRequest;
use tracing::debug;

/// Receives the final snapshot of every request that reaches a terminal
/// state. Implementations decide where it goes (database, object store,
/// nowhere).
#[async_trait]
pub trait Archiver: Send + Sync {
    async fn archive(&self, request: GenerationRequest);
}

/// Discards every snapshot. The default when no persistence is wired up.
pub struct NoopArchiver;

#[async_trait]
impl Archiver for NoopArchiver {
    async fn archive(&self, request: GenerationRequest) {
        debug!(request_id = %request.id, state = ?request.state, "discarding terminal snapshot");
    }
}

pub mod recording {
    //! Archiver that records what it was handed, for assertions in tests.

    use super::*;
    use tokio::sync::Mutex;

    #[derive(Default)]
    pub struct RecordingArchiver {
        archived: Mutex<Vec<GenerationRequest>>,
    }

    impl RecordingArchiver {
        pub fn new() -> Self {
            Self::default()
        }

        pub async fn archived(&self) -> Vec<GenerationRequest> {
            self.archived.lock().await.clone()
        }
    }

    #[async_trait]
    impl Archiver for RecordingArchiver {
        async fn archive(&self, request: GenerationRequest) {
            self.archived.lock().await.push(request);
        }
    }
}
