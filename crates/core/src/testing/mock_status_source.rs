//! Mock status source for testing.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::client::{StatusError, StatusSource};
use crate::task::{Snapshot, TaskStatus};

/// A recorded status fetch for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedPoll {
    pub task_id: String,
    /// Tokio time, so paused-clock tests can assert exact offsets.
    pub at: Instant,
}

/// Mock implementation of the StatusSource trait.
///
/// Responses queued for a task are returned in order. After that the
/// fallback response is repeated, or a `pending` snapshot when none is set.
pub struct MockStatusSource {
    responses: Arc<RwLock<HashMap<String, VecDeque<Result<Snapshot, StatusError>>>>>,
    fallback: Arc<RwLock<Option<Result<Snapshot, StatusError>>>>,
    calls: Arc<RwLock<Vec<RecordedPoll>>>,
}

impl Default for MockStatusSource {
    fn default() -> Self {
        Self::new()
    }
}

impl MockStatusSource {
    pub fn new() -> Self {
        Self {
            responses: Arc::new(RwLock::new(HashMap::new())),
            fallback: Arc::new(RwLock::new(None)),
            calls: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub async fn push_response(&self, task_id: &str, response: Result<Snapshot, StatusError>) {
        self.responses
            .write()
            .await
            .entry(task_id.to_string())
            .or_default()
            .push_back(response);
    }

    /// Response repeated once a task's queue is empty.
    pub async fn set_fallback(&self, response: Result<Snapshot, StatusError>) {
        *self.fallback.write().await = Some(response);
    }

    pub async fn calls(&self) -> Vec<RecordedPoll> {
        self.calls.read().await.clone()
    }

    pub async fn call_count(&self) -> usize {
        self.calls.read().await.len()
    }

    pub async fn calls_for(&self, task_id: &str) -> usize {
        self.calls
            .read()
            .await
            .iter()
            .filter(|call| call.task_id == task_id)
            .count()
    }
}

#[async_trait]
impl StatusSource for MockStatusSource {
    async fn fetch_status(&self, task_id: &str) -> Result<Snapshot, StatusError> {
        self.calls.write().await.push(RecordedPoll {
            task_id: task_id.to_string(),
            at: Instant::now(),
        });

        let queued = self
            .responses
            .write()
            .await
            .get_mut(task_id)
            .and_then(VecDeque::pop_front);
        let response = match queued {
            Some(response) => response,
            None => match self.fallback.read().await.clone() {
                Some(response) => response,
                None => Ok(Snapshot::new(task_id, TaskStatus::Pending)),
            },
        };

        response.map(|mut snapshot| {
            if snapshot.task_id.is_empty() {
                snapshot.task_id = task_id.to_string();
            }
            snapshot
        })
    }
}
