//! Mock realtime connector for testing.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot, RwLock};
use tokio::time::Instant;

use crate::auth::Credential;
use crate::client::{RealtimeConnection, RealtimeConnector, RealtimeError, RealtimeEvent};

/// What happens on one connect attempt.
#[derive(Debug, Clone)]
pub enum ScriptedConnect {
    /// Connecting fails immediately.
    Fail(String),
    /// The connection never opens.
    Hang,
    /// The connection opens and plays the events in order. Unless the
    /// script closes it, the connection then stays open until the client
    /// closes it.
    Open(Vec<ScriptedEvent>),
}

/// A step in an open connection's script.
#[derive(Debug, Clone)]
pub enum ScriptedEvent {
    /// Deliver a text frame.
    Frame(String),
    /// Wait before the next step.
    Delay(Duration),
    /// Server closes with this code.
    Close(u16),
    /// Transport error, connection stays up.
    Error(String),
    /// Connection dropped without a close frame.
    Drop,
}

/// A recorded connect attempt.
#[derive(Debug, Clone)]
pub struct RecordedConnect {
    pub task_id: String,
    pub token: String,
    pub at: Instant,
}

/// Mock implementation of the RealtimeConnector trait.
///
/// Each connect attempt consumes the next queued script; with an empty queue
/// the attempt hangs, which is what a realtime endpoint that never answers
/// looks like.
pub struct MockRealtimeConnector {
    scripts: Arc<RwLock<VecDeque<ScriptedConnect>>>,
    connects: Arc<RwLock<Vec<RecordedConnect>>>,
    closed: Arc<AtomicUsize>,
}

impl Default for MockRealtimeConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl MockRealtimeConnector {
    pub fn new() -> Self {
        Self {
            scripts: Arc::new(RwLock::new(VecDeque::new())),
            connects: Arc::new(RwLock::new(Vec::new())),
            closed: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Queue the script for the next connect attempt.
    pub async fn push(&self, script: ScriptedConnect) {
        self.scripts.write().await.push_back(script);
    }

    pub async fn connects(&self) -> Vec<RecordedConnect> {
        self.connects.read().await.clone()
    }

    pub async fn connect_count(&self) -> usize {
        self.connects.read().await.len()
    }

    /// Connections closed by the client.
    pub fn closed_count(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RealtimeConnector for MockRealtimeConnector {
    async fn connect(
        &self,
        task_id: &str,
        credential: &Credential,
    ) -> Result<RealtimeConnection, RealtimeError> {
        self.connects.write().await.push(RecordedConnect {
            task_id: task_id.to_string(),
            token: credential.access_token.clone(),
            at: Instant::now(),
        });

        let script = self
            .scripts
            .write()
            .await
            .pop_front()
            .unwrap_or(ScriptedConnect::Hang);

        match script {
            ScriptedConnect::Fail(message) => Err(RealtimeError::ConnectionFailed(message)),
            ScriptedConnect::Hang => std::future::pending().await,
            ScriptedConnect::Open(events) => {
                let (events_tx, events_rx) = mpsc::channel(64);
                let (shutdown_tx, shutdown_rx) = oneshot::channel();
                tokio::spawn(play(events, events_tx, shutdown_rx, Arc::clone(&self.closed)));
                Ok(RealtimeConnection::new(events_rx, shutdown_tx))
            }
        }
    }
}

async fn play(
    events: Vec<ScriptedEvent>,
    tx: mpsc::Sender<RealtimeEvent>,
    mut shutdown: oneshot::Receiver<()>,
    closed: Arc<AtomicUsize>,
) {
    for event in events {
        let delivered = match event {
            ScriptedEvent::Delay(delay) => {
                tokio::select! {
                    _ = &mut shutdown => {
                        closed.fetch_add(1, Ordering::SeqCst);
                        return;
                    }
                    _ = tokio::time::sleep(delay) => true,
                }
            }
            ScriptedEvent::Frame(text) => tx.send(RealtimeEvent::Frame(text)).await.is_ok(),
            ScriptedEvent::Error(message) => tx.send(RealtimeEvent::Error(message)).await.is_ok(),
            ScriptedEvent::Close(code) => {
                let _ = tx
                    .send(RealtimeEvent::Closed {
                        code: Some(code),
                        reason: String::new(),
                    })
                    .await;
                return;
            }
            ScriptedEvent::Drop => return,
        };
        if !delivered {
            return;
        }
    }

    if shutdown.await.is_ok() {
        closed.fetch_add(1, Ordering::SeqCst);
    }
}
