//! Types and traits for the backend services the transport consumes.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use crate::auth::Credential;
use crate::task::Snapshot;

/// Input for a generation job.
#[derive(Debug, Clone, Default)]
pub struct GenerationRequest {
    /// Pose the generated images are attached to.
    pub pose_id: Option<i64>,
    /// Schematic drawing the image is generated from.
    pub schema_image: Option<SchemaImage>,
    /// Free-text instructions appended to the generation prompt.
    pub additional_prompt: Option<String>,
    /// Also produce the muscle-overlay image.
    pub generate_muscles: bool,
}

/// An image uploaded with a generation request.
#[derive(Debug, Clone)]
pub struct SchemaImage {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl SchemaImage {
    /// Read an image from disk, guessing the content type from its extension.
    pub async fn load(path: &Path) -> std::io::Result<Self> {
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "schema".to_string());
        let content_type = match path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .as_deref()
        {
            Some("png") => "image/png",
            Some("jpg") | Some("jpeg") => "image/jpeg",
            Some("webp") => "image/webp",
            Some("gif") => "image/gif",
            _ => "application/octet-stream",
        };

        Ok(Self {
            file_name,
            content_type: content_type.to_string(),
            bytes,
        })
    }
}

/// Response of a successful job submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmittedTask {
    pub task_id: String,
}

/// Errors returned by job submission.
#[derive(Debug, Clone, Error)]
pub enum SubmitError {
    #[error("Invalid generation request: {0}")]
    Validation(String),

    #[error("Pose mismatch: {0}")]
    PoseMismatch(String),

    #[error("Not authorized: {0}")]
    Unauthorized(String),

    #[error("Rate limited, retry in {retry_after_secs:?}s")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("Generation API error: {0}")]
    Api(String),

    #[error("Generation API connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Request timeout")]
    Timeout,
}

/// Errors returned by a status fetch.
#[derive(Debug, Clone, Error)]
pub enum StatusError {
    #[error("Generation task not found: {0}")]
    NotFound(String),

    #[error("Not authorized to read task status: {0}")]
    Unauthorized(String),

    #[error("Access to task status forbidden: {0}")]
    Forbidden(String),

    #[error("Status polling rate limited")]
    RateLimited { retry_after: Option<Duration> },

    #[error("Status fetch failed: {0}")]
    Transient(String),
}

impl StatusError {
    /// Whether retrying can never succeed for this task.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StatusError::NotFound(_) | StatusError::Unauthorized(_) | StatusError::Forbidden(_)
        )
    }
}

/// Errors opening a realtime connection.
#[derive(Debug, Clone, Error)]
pub enum RealtimeError {
    #[error("Realtime connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Invalid realtime URL: {0}")]
    InvalidUrl(String),
}

/// Low-level event from an open realtime connection.
#[derive(Debug, Clone, PartialEq)]
pub enum RealtimeEvent {
    /// A text frame, not yet parsed.
    Frame(String),
    /// A transport error. The connection is usually closed right after.
    Error(String),
    /// The connection closed. `code` is `None` when no close frame was
    /// received.
    Closed { code: Option<u16>, reason: String },
}

/// An open realtime connection.
///
/// Dropping or closing it shuts the underlying socket down.
#[derive(Debug)]
pub struct RealtimeConnection {
    events: mpsc::Receiver<RealtimeEvent>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl RealtimeConnection {
    pub fn new(events: mpsc::Receiver<RealtimeEvent>, shutdown: oneshot::Sender<()>) -> Self {
        Self {
            events,
            shutdown: Some(shutdown),
        }
    }

    /// Next event, or `None` once the connection is gone.
    pub async fn next_event(&mut self) -> Option<RealtimeEvent> {
        self.events.recv().await
    }

    /// Request a normal closure.
    pub fn close(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}

impl Drop for RealtimeConnection {
    fn drop(&mut self) {
        self.close();
    }
}

/// Submits generation jobs.
#[async_trait]
pub trait JobSubmitter: Send + Sync {
    async fn submit(&self, request: &GenerationRequest) -> Result<SubmittedTask, SubmitError>;
}

/// Fetches the status of a generation job.
#[async_trait]
pub trait StatusSource: Send + Sync {
    async fn fetch_status(&self, task_id: &str) -> Result<Snapshot, StatusError>;
}

/// Opens push-notification connections for a generation job.
#[async_trait]
pub trait RealtimeConnector: Send + Sync {
    /// Open a connection for `task_id`, authenticated with `credential`.
    ///
    /// Resolves once the connection is open.
    async fn connect(
        &self,
        task_id: &str,
        credential: &Credential,
    ) -> Result<RealtimeConnection, RealtimeError>;
}
