//! Snapshot reducer.
//!
//! The single place where task state changes. Both delivery channels funnel
//! through [`apply_snapshot`]; because progress is monotonic and the optional
//! fields are sticky, the result does not depend on which channel delivers
//! first (except for `status`, where the orchestrator's finalize-once guard
//! decides).

use super::types::{GenerationTask, Snapshot, TaskStatus};

/// Server error substring that gets a dedicated user-facing message.
const POSE_MISMATCH_MARKER: &str = "pose mismatch";

const POSE_MISMATCH_MESSAGE: &str =
    "The generated image did not match the requested pose. Try again or adjust the pose.";

/// Apply an incoming snapshot to the current task state.
///
/// Returns `None` when the snapshot is rejected: it belongs to a different
/// task, or the current task already reached a terminal status.
pub fn apply_snapshot(current: &GenerationTask, incoming: &Snapshot) -> Option<GenerationTask> {
    if incoming.task_id != current.task_id {
        return None;
    }
    if current.status.is_terminal() {
        return None;
    }

    let status = incoming.status.unwrap_or(current.status);

    let progress = if status == TaskStatus::Completed {
        100
    } else {
        let incoming_progress = incoming
            .progress
            .map(|p| p.min(100) as u8)
            .unwrap_or(current.progress);
        current.progress.max(incoming_progress)
    };

    let error_message = if status == TaskStatus::Failed {
        sticky(&current.error_message, &incoming.error_message)
    } else {
        current.error_message.clone()
    };

    let analyzed_muscles = match &incoming.analyzed_muscles {
        Some(muscles) if !muscles.is_empty() => Some(muscles.clone()),
        _ => current.analyzed_muscles.clone(),
    };

    Some(GenerationTask {
        task_id: current.task_id.clone(),
        status,
        progress,
        status_message: sticky(&current.status_message, &incoming.status_message),
        error_message,
        photo_url: sticky(&current.photo_url, &incoming.photo_url),
        muscles_url: sticky(&current.muscles_url, &incoming.muscles_url),
        quota_warning: current.quota_warning || incoming.quota_warning.unwrap_or(false),
        analyzed_muscles,
    })
}

/// Incoming value if present and non-empty, else the current one.
fn sticky(current: &Option<String>, incoming: &Option<String>) -> Option<String> {
    match incoming {
        Some(value) if !value.is_empty() => Some(value.clone()),
        _ => current.clone(),
    }
}

/// Map a raw server error to the message shown to the user.
pub fn user_facing_error(raw: &str) -> String {
    if raw.to_lowercase().contains(POSE_MISMATCH_MARKER) {
        POSE_MISMATCH_MESSAGE.to_string()
    } else {
        raw.to_string()
    }
}
