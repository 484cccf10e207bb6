//! Realtime delivery channel.
//!
//! One spawned task per task id: connect, forward progress frames into the
//! orchestrator's inbox, and reconnect with a doubling delay after abnormal
//! closures. The channel never touches task state.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::auth::{ensure_fresh, Credential, CredentialProvider};
use crate::client::{RealtimeConnection, RealtimeConnector, RealtimeEvent};
use crate::metrics;
use crate::task::Snapshot;
use crate::transport::{
    ChannelEvent, ChannelSink, RealtimeConfig, SnapshotSource, TransportConfig,
    FORBIDDEN_MESSAGE, SESSION_EXPIRED_MESSAGE, TASK_NOT_FOUND_MESSAGE,
};

use super::frame::{close_code, ServerFrame};
use super::reconnect::ReconnectBackoff;

struct ActiveConnection {
    task_id: String,
    handle: JoinHandle<()>,
}

/// Owns the realtime connection task for the current generation.
pub struct RealtimeChannel {
    connector: Arc<dyn RealtimeConnector>,
    credentials: Arc<dyn CredentialProvider>,
    config: RealtimeConfig,
    refresh_margin: chrono::Duration,
    active: Option<ActiveConnection>,
}

impl RealtimeChannel {
    pub fn new(
        connector: Arc<dyn RealtimeConnector>,
        credentials: Arc<dyn CredentialProvider>,
        config: &TransportConfig,
    ) -> Self {
        Self {
            connector,
            credentials,
            config: config.realtime.clone(),
            refresh_margin: config.credential_refresh_margin(),
            active: None,
        }
    }

    /// Open a connection for `task_id` using an already checked credential.
    ///
    /// Any previous connection is torn down first.
    pub fn start(&mut self, task_id: &str, credential: Credential, sink: ChannelSink) {
        self.stop();

        let session = Session {
            task_id: task_id.to_string(),
            connector: Arc::clone(&self.connector),
            credentials: Arc::clone(&self.credentials),
            backoff: ReconnectBackoff::new(&self.config),
            refresh_margin: self.refresh_margin,
            sink,
        };
        debug!(task_id = task_id, "Starting realtime channel");

        self.active = Some(ActiveConnection {
            task_id: task_id.to_string(),
            handle: tokio::spawn(session.run(credential)),
        });
    }

    /// Stop the connection task. Pending reconnects are cancelled and an
    /// open connection is closed normally.
    pub fn stop(&mut self) {
        if let Some(active) = self.active.take() {
            active.handle.abort();
            debug!(task_id = %active.task_id, "Realtime channel stopped");
        }
    }

    /// Whether a connection task is still running.
    pub fn is_active(&self) -> bool {
        self.active
            .as_ref()
            .is_some_and(|active| !active.handle.is_finished())
    }
}

impl Drop for RealtimeChannel {
    fn drop(&mut self) {
        self.stop();
    }
}

/// How a connection ended.
enum Ended {
    /// Nothing left to do on this channel.
    Finished,
    /// Abnormal closure; reconnect.
    Dropped { code: Option<u16> },
}

struct Session {
    task_id: String,
    connector: Arc<dyn RealtimeConnector>,
    credentials: Arc<dyn CredentialProvider>,
    backoff: ReconnectBackoff,
    refresh_margin: chrono::Duration,
    sink: ChannelSink,
}

impl Session {
    async fn run(mut self, mut credential: Credential) {
        loop {
            match self.connector.connect(&self.task_id, &credential).await {
                Ok(mut connection) => {
                    metrics::REALTIME_CONNECTIONS
                        .with_label_values(&["open"])
                        .inc();
                    self.backoff.reset();
                    info!(task_id = %self.task_id, "Realtime connection open");
                    if !self.sink.send(ChannelEvent::RealtimeOpened) {
                        return;
                    }

                    match self.pump(&mut connection).await {
                        Ended::Finished => {
                            connection.close();
                            return;
                        }
                        Ended::Dropped { code } => {
                            warn!(
                                task_id = %self.task_id,
                                code = ?code,
                                "Realtime connection closed abnormally"
                            );
                            if !self.sink.send(ChannelEvent::RealtimeDisconnected { code }) {
                                return;
                            }
                        }
                    }
                }
                Err(e) => {
                    metrics::REALTIME_CONNECTIONS
                        .with_label_values(&["failed"])
                        .inc();
                    warn!(task_id = %self.task_id, "Realtime connect failed: {}", e);
                    if !self.sink.send(ChannelEvent::RealtimeError(e.to_string())) {
                        return;
                    }
                }
            }

            let Some(delay) = self.backoff.next_delay() else {
                warn!(
                    task_id = %self.task_id,
                    "Realtime reconnect attempts exhausted"
                );
                self.sink.send(ChannelEvent::RealtimeExhausted);
                return;
            };

            metrics::REALTIME_RECONNECTS.inc();
            debug!(
                task_id = %self.task_id,
                attempt = self.backoff.attempt(),
                delay_ms = delay.as_millis() as u64,
                "Scheduling realtime reconnect"
            );
            tokio::time::sleep(delay).await;

            // The socket authenticates at open time, so every reconnect gets
            // the pre-flight check too. On failure the old credential is
            // presented and the server decides.
            match ensure_fresh(self.credentials.as_ref(), self.refresh_margin).await {
                Ok(fresh) => credential = fresh,
                Err(e) => warn!(
                    task_id = %self.task_id,
                    "Credential check before reconnect failed: {}",
                    e
                ),
            }
        }
    }

    async fn pump(&self, connection: &mut RealtimeConnection) -> Ended {
        while let Some(event) = connection.next_event().await {
            match event {
                RealtimeEvent::Frame(text) => match ServerFrame::parse(&text) {
                    Ok(ServerFrame::ProgressUpdate(mut snapshot)) => {
                        if snapshot.task_id.is_empty() {
                            snapshot.task_id = self.task_id.clone();
                        } else if snapshot.task_id != self.task_id {
                            debug!(
                                task_id = %self.task_id,
                                frame_task_id = %snapshot.task_id,
                                "Ignoring frame for another task"
                            );
                            continue;
                        }
                        let terminal = snapshot.is_terminal();
                        if !self.sink.snapshot(snapshot, SnapshotSource::Realtime) || terminal {
                            return Ended::Finished;
                        }
                    }
                    Ok(ServerFrame::Pong) => trace!("pong"),
                    Ok(ServerFrame::Unknown) => debug!("Ignoring unknown realtime frame"),
                    Err(e) => warn!(task_id = %self.task_id, "Malformed realtime frame: {}", e),
                },
                RealtimeEvent::Error(message) => {
                    warn!(task_id = %self.task_id, "Realtime error: {}", message);
                    if !self.sink.send(ChannelEvent::RealtimeError(message)) {
                        return Ended::Finished;
                    }
                }
                RealtimeEvent::Closed { code, reason } => {
                    return match code {
                        Some(close_code::NORMAL) => {
                            // Frames are ordered, so a terminal snapshot
                            // would already have ended the pump.
                            debug!(task_id = %self.task_id, "Realtime connection closed");
                            self.sink.send(ChannelEvent::RealtimeClosed);
                            Ended::Finished
                        }
                        Some(code) if close_code::is_authoritative(code) => {
                            warn!(
                                task_id = %self.task_id,
                                code = code,
                                "Realtime connection rejected: {}",
                                reason
                            );
                            let failure =
                                Snapshot::failed(&self.task_id, rejection_message(code, &reason));
                            self.sink.snapshot(failure, SnapshotSource::Realtime);
                            Ended::Finished
                        }
                        code => Ended::Dropped { code },
                    };
                }
            }
        }

        Ended::Dropped { code: None }
    }
}

/// Failure text for an authoritative close.
fn rejection_message(code: u16, reason: &str) -> String {
    if !reason.is_empty() {
        return reason.to_string();
    }
    match code {
        close_code::TASK_NOT_FOUND => TASK_NOT_FOUND_MESSAGE,
        close_code::FORBIDDEN => FORBIDDEN_MESSAGE,
        _ => SESSION_EXPIRED_MESSAGE,
    }
    .to_string()
}
