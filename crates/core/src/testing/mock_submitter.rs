//! Mock job submitter for testing.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::client::{GenerationRequest, JobSubmitter, SubmitError, SubmittedTask};

/// Mock implementation of the JobSubmitter trait.
///
/// Queued results are returned in order. Once the queue is empty every
/// submission is accepted with a generated id (`task-1`, `task-2`, ...).
pub struct MockJobSubmitter {
    results: Arc<RwLock<VecDeque<Result<SubmittedTask, SubmitError>>>>,
    requests: Arc<RwLock<Vec<GenerationRequest>>>,
    delay: Arc<RwLock<Option<Duration>>>,
    next_id: AtomicU64,
}

impl Default for MockJobSubmitter {
    fn default() -> Self {
        Self::new()
    }
}

impl MockJobSubmitter {
    pub fn new() -> Self {
        Self {
            results: Arc::new(RwLock::new(VecDeque::new())),
            requests: Arc::new(RwLock::new(Vec::new())),
            delay: Arc::new(RwLock::new(None)),
            next_id: AtomicU64::new(1),
        }
    }

    /// Queue the result of a future submission.
    pub async fn push_result(&self, result: Result<SubmittedTask, SubmitError>) {
        self.results.write().await.push_back(result);
    }

    /// Queue an accepted submission with a specific task id.
    pub async fn push_task_id(&self, task_id: &str) {
        self.push_result(Ok(SubmittedTask {
            task_id: task_id.to_string(),
        }))
        .await;
    }

    /// Delay every submission by `delay`.
    pub async fn set_delay(&self, delay: Duration) {
        *self.delay.write().await = Some(delay);
    }

    pub async fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.read().await.clone()
    }

    pub async fn submission_count(&self) -> usize {
        self.requests.read().await.len()
    }
}

#[async_trait]
impl JobSubmitter for MockJobSubmitter {
    async fn submit(&self, request: &GenerationRequest) -> Result<SubmittedTask, SubmitError> {
        self.requests.write().await.push(request.clone());

        let delay = *self.delay.read().await;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(result) = self.results.write().await.pop_front() {
            return result;
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        Ok(SubmittedTask {
            task_id: format!("task-{}", id),
        })
    }
}
