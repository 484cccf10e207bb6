//! Poll delivery channel.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::client::{StatusError, StatusSource};
use crate::metrics;
use crate::task::Snapshot;
use crate::transport::{
    ChannelEvent, ChannelSink, PollConfig, SnapshotSource, FORBIDDEN_MESSAGE,
    SESSION_EXPIRED_MESSAGE, TASK_NOT_FOUND_MESSAGE,
};

use super::backoff::PollBackoff;

struct ActivePoll {
    task_id: String,
    generation: u64,
    handle: JoinHandle<()>,
}

/// Fetches task status on an adaptive schedule until the task is terminal
/// or the channel is stopped.
pub struct PollChannel {
    source: Arc<dyn StatusSource>,
    config: PollConfig,
    active: Option<ActivePoll>,
}

impl PollChannel {
    pub fn new(source: Arc<dyn StatusSource>, config: &PollConfig) -> Self {
        Self {
            source,
            config: config.clone(),
            active: None,
        }
    }

    /// Start polling `task_id`. The first fetch happens immediately.
    ///
    /// Returns `false` when this task is already being polled for the same
    /// generation.
    pub fn start(&mut self, task_id: &str, sink: ChannelSink) -> bool {
        if let Some(active) = &self.active {
            if active.task_id == task_id
                && active.generation == sink.generation()
                && !active.handle.is_finished()
            {
                return false;
            }
        }
        self.stop();

        debug!(task_id = task_id, "Starting status polling");
        let handle = tokio::spawn(poll_loop(
            task_id.to_string(),
            Arc::clone(&self.source),
            PollBackoff::new(&self.config),
            sink.clone(),
        ));
        self.active = Some(ActivePoll {
            task_id: task_id.to_string(),
            generation: sink.generation(),
            handle,
        });
        true
    }

    /// Cancel the scheduled fetch, if any.
    pub fn stop(&mut self) {
        if let Some(active) = self.active.take() {
            active.handle.abort();
            debug!(task_id = %active.task_id, "Status polling stopped");
        }
    }

    pub fn is_polling(&self, task_id: &str) -> bool {
        self.active
            .as_ref()
            .is_some_and(|active| active.task_id == task_id && !active.handle.is_finished())
    }

    pub fn is_active(&self) -> bool {
        self.active
            .as_ref()
            .is_some_and(|active| !active.handle.is_finished())
    }
}

impl Drop for PollChannel {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn poll_loop(
    task_id: String,
    source: Arc<dyn StatusSource>,
    mut backoff: PollBackoff,
    sink: ChannelSink,
) {
    loop {
        let delay = match source.fetch_status(&task_id).await {
            Ok(mut snapshot) => {
                metrics::POLL_REQUESTS.with_label_values(&["ok"]).inc();
                if snapshot.task_id.is_empty() {
                    snapshot.task_id = task_id.clone();
                }
                let terminal = snapshot.is_terminal();
                if !sink.send(ChannelEvent::PollHealth(true))
                    || !sink.snapshot(snapshot, SnapshotSource::Poll)
                {
                    return;
                }
                if terminal {
                    debug!(task_id = %task_id, "Polled terminal status");
                    return;
                }
                backoff.after_progress()
            }
            Err(e) if e.is_terminal() => {
                metrics::POLL_REQUESTS
                    .with_label_values(&["terminal_error"])
                    .inc();
                warn!(task_id = %task_id, "Status polling stopped: {}", e);
                sink.snapshot(
                    Snapshot::failed(&task_id, failure_message(&e)),
                    SnapshotSource::Poll,
                );
                return;
            }
            Err(StatusError::RateLimited { retry_after }) => {
                metrics::POLL_REQUESTS
                    .with_label_values(&["rate_limited"])
                    .inc();
                let delay = backoff.after_rate_limit(retry_after);
                debug!(
                    task_id = %task_id,
                    delay_ms = delay.as_millis() as u64,
                    "Status polling rate limited"
                );
                delay
            }
            Err(e) => {
                metrics::POLL_REQUESTS.with_label_values(&["transient"]).inc();
                warn!(task_id = %task_id, "Status poll failed: {}", e);
                if !sink.send(ChannelEvent::PollHealth(false)) {
                    return;
                }
                backoff.after_error()
            }
        };

        tokio::time::sleep(delay).await;
    }
}

fn failure_message(error: &StatusError) -> &'static str {
    match error {
        StatusError::Unauthorized(_) => SESSION_EXPIRED_MESSAGE,
        StatusError::Forbidden(_) => FORBIDDEN_MESSAGE,
        _ => TASK_NOT_FOUND_MESSAGE,
    }
}
