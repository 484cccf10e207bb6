//! Types for generation task state.

use serde::{Deserialize, Serialize};

/// Observed status of a server-side generation job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl TaskStatus {
    /// Whether no further updates are accepted after this status.
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Processing => "processing",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A muscle detected in the generated image, with its activation level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzedMuscle {
    pub name: String,
    #[serde(default)]
    pub activation_level: f32,
}

/// A normalized status update for one generation task.
///
/// Both the poll channel and the realtime channel produce this shape. Every
/// field except `task_id` is optional on the wire.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Task this update belongs to. Realtime frames may omit it, in which
    /// case the channel fills in the task it is connected for.
    #[serde(default)]
    pub task_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub muscles_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quota_warning: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analyzed_muscles: Option<Vec<AnalyzedMuscle>>,
}

impl Snapshot {
    /// Create a snapshot carrying only a status.
    pub fn new(task_id: impl Into<String>, status: TaskStatus) -> Self {
        Self {
            task_id: task_id.into(),
            status: Some(status),
            ..Default::default()
        }
    }

    /// Create a synthetic failure snapshot.
    pub fn failed(task_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            error_message: Some(error.into()),
            ..Self::new(task_id, TaskStatus::Failed)
        }
    }

    pub fn with_progress(mut self, progress: u32) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn with_status_message(mut self, message: impl Into<String>) -> Self {
        self.status_message = Some(message.into());
        self
    }

    pub fn with_photo_url(mut self, url: impl Into<String>) -> Self {
        self.photo_url = Some(url.into());
        self
    }

    pub fn with_muscles_url(mut self, url: impl Into<String>) -> Self {
        self.muscles_url = Some(url.into());
        self
    }

    pub fn with_quota_warning(mut self, warning: bool) -> Self {
        self.quota_warning = Some(warning);
        self
    }

    pub fn with_analyzed_muscles(mut self, muscles: Vec<AnalyzedMuscle>) -> Self {
        self.analyzed_muscles = Some(muscles);
        self
    }

    /// Whether this snapshot carries a terminal status.
    pub fn is_terminal(&self) -> bool {
        self.status.is_some_and(TaskStatus::is_terminal)
    }
}

/// The observed state of one generation attempt.
///
/// Owned exclusively by the transport orchestrator and only ever replaced
/// through [`apply_snapshot`](super::apply_snapshot).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationTask {
    pub task_id: String,
    pub status: TaskStatus,
    /// Always in `0..=100`.
    pub progress: u8,
    pub status_message: Option<String>,
    pub error_message: Option<String>,
    pub photo_url: Option<String>,
    pub muscles_url: Option<String>,
    pub quota_warning: bool,
    pub analyzed_muscles: Option<Vec<AnalyzedMuscle>>,
}

impl GenerationTask {
    /// Fresh task as returned by job submission.
    pub fn new(task_id: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            status: TaskStatus::Pending,
            progress: 0,
            status_message: None,
            error_message: None,
            photo_url: None,
            muscles_url: None,
            quota_warning: false,
            analyzed_muscles: None,
        }
    }

    pub fn is_generating(&self) -> bool {
        !self.status.is_terminal()
    }
}
