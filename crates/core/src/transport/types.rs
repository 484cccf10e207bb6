//! Types shared between the transport orchestrator and its channels.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::auth::{AuthError, Credential};
use crate::client::SubmitError;
use crate::task::{user_facing_error, AnalyzedMuscle, GenerationTask, Snapshot, TaskStatus};

/// Failure text when the session cannot be refreshed.
pub const SESSION_EXPIRED_MESSAGE: &str = "Session expired. Please sign in again.";
/// Failure text when the backend does not know the task.
pub const TASK_NOT_FOUND_MESSAGE: &str = "Generation task not found";
/// Failure text when the task belongs to someone else.
pub const FORBIDDEN_MESSAGE: &str = "Not allowed to follow this generation task";
/// Failure text when neither channel can reach the backend.
pub const CONNECTION_LOST_MESSAGE: &str = "Lost connection to the generation service";

/// Lifecycle phase of the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportPhase {
    /// No task.
    Idle,
    /// Job submitted, waiting for a task id.
    Starting,
    /// Task id known, channels delivering updates.
    Active,
    /// Finalized; the last state stays visible until the next start or reset.
    Terminal,
}

/// Read model published to consumers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationView {
    pub phase: TransportPhase,
    pub task_id: Option<String>,
    pub is_generating: bool,
    pub progress: u8,
    pub status: Option<TaskStatus>,
    pub status_message: Option<String>,
    /// User-facing error text.
    pub error: Option<String>,
    pub photo_url: Option<String>,
    pub muscles_url: Option<String>,
    pub quota_warning: bool,
    pub analyzed_muscles: Option<Vec<AnalyzedMuscle>>,
}

impl GenerationView {
    pub fn idle() -> Self {
        Self {
            phase: TransportPhase::Idle,
            task_id: None,
            is_generating: false,
            progress: 0,
            status: None,
            status_message: None,
            error: None,
            photo_url: None,
            muscles_url: None,
            quota_warning: false,
            analyzed_muscles: None,
        }
    }

    pub fn starting() -> Self {
        Self {
            phase: TransportPhase::Starting,
            is_generating: true,
            ..Self::idle()
        }
    }

    /// Terminal view for a job that never got a task id.
    pub fn submission_failed(error: &str) -> Self {
        Self {
            phase: TransportPhase::Terminal,
            status: Some(TaskStatus::Failed),
            error: Some(user_facing_error(error)),
            ..Self::idle()
        }
    }

    pub fn from_task(phase: TransportPhase, task: &GenerationTask) -> Self {
        Self {
            phase,
            task_id: Some(task.task_id.clone()),
            is_generating: task.is_generating(),
            progress: task.progress,
            status: Some(task.status),
            status_message: task.status_message.clone(),
            error: task.error_message.as_deref().map(user_facing_error),
            photo_url: task.photo_url.clone(),
            muscles_url: task.muscles_url.clone(),
            quota_warning: task.quota_warning,
            analyzed_muscles: task.analyzed_muscles.clone(),
        }
    }
}

impl Default for GenerationView {
    fn default() -> Self {
        Self::idle()
    }
}

/// Where a snapshot came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotSource {
    Poll,
    Realtime,
    /// Synthesized by the orchestrator itself.
    Transport,
}

impl SnapshotSource {
    pub fn as_str(self) -> &'static str {
        match self {
            SnapshotSource::Poll => "poll",
            SnapshotSource::Realtime => "realtime",
            SnapshotSource::Transport => "transport",
        }
    }
}

/// Terminal result of one generation, delivered exactly once.
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationOutcome {
    Completed {
        task_id: String,
        photo_url: Option<String>,
        muscles_url: Option<String>,
    },
    Failed {
        /// `None` when the job was rejected before a task existed.
        task_id: Option<String>,
        error: String,
    },
}

impl GenerationOutcome {
    pub fn task_id(&self) -> Option<&str> {
        match self {
            GenerationOutcome::Completed { task_id, .. } => Some(task_id),
            GenerationOutcome::Failed { task_id, .. } => task_id.as_deref(),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            GenerationOutcome::Completed { .. } => "completed",
            GenerationOutcome::Failed { .. } => "failed",
        }
    }
}

/// Invoked once per generation when it reaches a terminal outcome.
pub type FinalizeCallback = Arc<dyn Fn(&GenerationOutcome) + Send + Sync>;

/// Errors returned to the caller of `start`.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("Job submission failed: {0}")]
    Submission(#[from] SubmitError),

    #[error("Session expired")]
    SessionExpired,

    #[error("Superseded by a newer generation")]
    Superseded,

    #[error("Transport stopped")]
    Stopped,
}

/// Why polling was engaged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackReason {
    OpenTimeout,
    Silence,
    RealtimeError,
    AbnormalClose,
    NormalClose,
}

impl FallbackReason {
    pub fn as_str(self) -> &'static str {
        match self {
            FallbackReason::OpenTimeout => "open_timeout",
            FallbackReason::Silence => "silence",
            FallbackReason::RealtimeError => "realtime_error",
            FallbackReason::AbnormalClose => "abnormal_close",
            FallbackReason::NormalClose => "normal_close",
        }
    }
}

/// Event reported to the orchestrator by a channel or the submission task.
#[derive(Debug)]
pub enum ChannelEvent {
    /// The job was accepted; `credential` is the pre-flight result.
    Submitted {
        task_id: String,
        credential: Result<Credential, AuthError>,
    },
    SubmissionFailed(SubmitError),
    Snapshot {
        snapshot: Snapshot,
        source: SnapshotSource,
    },
    RealtimeOpened,
    RealtimeError(String),
    /// Abnormal closure; the channel is reconnecting.
    RealtimeDisconnected { code: Option<u16> },
    /// Normal closure before a terminal snapshot; the channel is done.
    RealtimeClosed,
    /// Reconnect attempts used up.
    RealtimeExhausted,
    /// Whether the last poll reached the backend.
    PollHealth(bool),
}

/// A channel event tagged with the generation it belongs to.
#[derive(Debug)]
pub struct ChannelMessage {
    pub generation: u64,
    pub event: ChannelEvent,
}

/// Sending half handed to channels. Every event is stamped with the
/// generation the sink was created for.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    generation: u64,
    tx: mpsc::UnboundedSender<ChannelMessage>,
}

impl ChannelSink {
    pub fn new(generation: u64, tx: mpsc::UnboundedSender<ChannelMessage>) -> Self {
        Self { generation, tx }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Returns `false` once the orchestrator is gone.
    pub fn send(&self, event: ChannelEvent) -> bool {
        self.tx
            .send(ChannelMessage {
                generation: self.generation,
                event,
            })
            .is_ok()
    }

    pub fn snapshot(&self, snapshot: Snapshot, source: SnapshotSource) -> bool {
        self.send(ChannelEvent::Snapshot { snapshot, source })
    }
}
