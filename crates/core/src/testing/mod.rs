//! Testing utilities and mock implementations.
//!
//! This module provides mock implementations of every backend trait the
//! transport consumes, so its behavior can be tested without a server.
//!
//! # Example
//!
//! ```rust,ignore
//! use posegen_core::testing::{fixtures, MockRealtimeConnector, ScriptedConnect, ScriptedEvent};
//!
//! let connector = MockRealtimeConnector::new();
//! connector.push(ScriptedConnect::Open(vec![
//!     ScriptedEvent::Frame(fixtures::progress_frame(&fixtures::processing("t1", 50))),
//!     ScriptedEvent::Close(1006),
//! ])).await;
//! ```

mod mock_credentials;
mod mock_realtime;
mod mock_status_source;
mod mock_submitter;

pub use mock_credentials::MockCredentials;
pub use mock_realtime::{MockRealtimeConnector, RecordedConnect, ScriptedConnect, ScriptedEvent};
pub use mock_status_source::{MockStatusSource, RecordedPoll};
pub use mock_submitter::MockJobSubmitter;

/// Test fixtures and helper functions.
pub mod fixtures {
    use crate::client::{GenerationRequest, SchemaImage};
    use crate::realtime::ServerFrame;
    use crate::task::{AnalyzedMuscle, Snapshot, TaskStatus};

    /// A generation request with a small PNG schema.
    pub fn request() -> GenerationRequest {
        GenerationRequest {
            pose_id: Some(42),
            schema_image: Some(SchemaImage {
                file_name: "warrior.png".to_string(),
                content_type: "image/png".to_string(),
                bytes: b"\x89PNG\r\n\x1a\n".to_vec(),
            }),
            additional_prompt: Some("studio lighting".to_string()),
            generate_muscles: true,
        }
    }

    pub fn processing(task_id: &str, progress: u32) -> Snapshot {
        Snapshot::new(task_id, TaskStatus::Processing).with_progress(progress)
    }

    pub fn completed(task_id: &str) -> Snapshot {
        Snapshot::new(task_id, TaskStatus::Completed)
            .with_progress(100)
            .with_photo_url(format!("/generated/{}.png", task_id))
            .with_muscles_url(format!("/generated/{}_muscles.png", task_id))
            .with_analyzed_muscles(vec![AnalyzedMuscle {
                name: "quadriceps".to_string(),
                activation_level: 0.9,
            }])
    }

    /// Serialize a snapshot as a realtime `progress_update` frame.
    pub fn progress_frame(snapshot: &Snapshot) -> String {
        serde_json::to_string(&ServerFrame::ProgressUpdate(snapshot.clone()))
            .unwrap_or_default()
    }
}
