//! Generation transport orchestrator.
//!
//! A single worker task owns the current [`GenerationTask`]. Channels and the
//! submission task report into its inbox; every event carries the generation
//! it was created for, and events from a superseded generation are dropped
//! before they can touch state.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::auth::{ensure_fresh, AuthError, Credential, CredentialProvider};
use crate::client::{GenerationRequest, JobSubmitter, RealtimeConnector, StatusSource, SubmitError};
use crate::metrics;
use crate::poll::PollChannel;
use crate::realtime::RealtimeChannel;
use crate::task::{apply_snapshot, user_facing_error, GenerationTask, Snapshot, TaskStatus};

use super::config::TransportConfig;
use super::types::{
    ChannelEvent, ChannelMessage, ChannelSink, FallbackReason, FinalizeCallback,
    GenerationOutcome, GenerationView, SnapshotSource, TransportError, TransportPhase,
    CONNECTION_LOST_MESSAGE, SESSION_EXPIRED_MESSAGE,
};

type StartReply = oneshot::Sender<Result<String, TransportError>>;

enum Command {
    Start {
        request: GenerationRequest,
        reply: StartReply,
    },
    Reset,
    Shutdown {
        ack: oneshot::Sender<()>,
    },
}

/// Builder for the transport worker.
pub struct GenerationTransport {
    config: TransportConfig,
    submitter: Arc<dyn JobSubmitter>,
    status_source: Arc<dyn StatusSource>,
    connector: Arc<dyn RealtimeConnector>,
    credentials: Arc<dyn CredentialProvider>,
    on_finalize: Option<FinalizeCallback>,
}

impl GenerationTransport {
    pub fn new(
        config: TransportConfig,
        submitter: Arc<dyn JobSubmitter>,
        status_source: Arc<dyn StatusSource>,
        connector: Arc<dyn RealtimeConnector>,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Self {
        Self {
            config,
            submitter,
            status_source,
            connector,
            credentials,
            on_finalize: None,
        }
    }

    /// Called exactly once per generation with its terminal outcome.
    pub fn with_finalize_callback(mut self, callback: FinalizeCallback) -> Self {
        self.on_finalize = Some(callback);
        self
    }

    /// Spawn the worker and return a handle to it.
    ///
    /// The worker stops when [`TransportHandle::shutdown`] is called or the
    /// last handle is dropped; both tear down any running channels.
    pub fn spawn(self) -> TransportHandle {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (worker, events_rx, view_rx) = self.into_worker();
        tokio::spawn(worker.run(commands_rx, events_rx));

        TransportHandle {
            commands: commands_tx,
            view: view_rx,
        }
    }

    fn into_worker(
        self,
    ) -> (
        Worker,
        mpsc::UnboundedReceiver<ChannelMessage>,
        watch::Receiver<GenerationView>,
    ) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (view_tx, view_rx) = watch::channel(GenerationView::idle());

        let worker = Worker {
            realtime: RealtimeChannel::new(
                self.connector,
                Arc::clone(&self.credentials),
                &self.config,
            ),
            poll: PollChannel::new(self.status_source, &self.config.poll),
            config: self.config,
            submitter: self.submitter,
            credentials: self.credentials,
            on_finalize: self.on_finalize,
            events_tx,
            view_tx,
            generation: 0,
            phase: TransportPhase::Idle,
            task: None,
            pending_start: None,
            submission: None,
            finalized: false,
            open_deadline: None,
            silence_deadline: None,
            polling_engaged: false,
            poll_healthy: true,
            started_at: None,
        };

        (worker, events_rx, view_rx)
    }
}

/// Handle to a running transport. Cheap to clone.
#[derive(Clone)]
pub struct TransportHandle {
    commands: mpsc::UnboundedSender<Command>,
    view: watch::Receiver<GenerationView>,
}

impl TransportHandle {
    /// Submit a job and follow it.
    ///
    /// Supersedes any current generation. Resolves with the task id once
    /// the job is accepted and the realtime channel is being opened.
    pub async fn start(&self, request: GenerationRequest) -> Result<String, TransportError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::Start { request, reply })
            .map_err(|_| TransportError::Stopped)?;
        response.await.map_err(|_| TransportError::Stopped)?
    }

    /// Stop following the current generation and return to idle.
    pub fn cancel(&self) {
        self.reset();
    }

    /// Tear down the current generation and return to idle.
    pub fn reset(&self) {
        let _ = self.commands.send(Command::Reset);
    }

    pub fn subscribe(&self) -> watch::Receiver<GenerationView> {
        self.view.clone()
    }

    /// The latest published view.
    pub fn view(&self) -> GenerationView {
        self.view.borrow().clone()
    }

    /// Stop the worker and wait until all channels are torn down.
    pub async fn shutdown(&self) {
        let (ack, done) = oneshot::channel();
        if self.commands.send(Command::Shutdown { ack }).is_ok() {
            let _ = done.await;
        }
    }
}

struct Worker {
    config: TransportConfig,
    submitter: Arc<dyn JobSubmitter>,
    credentials: Arc<dyn CredentialProvider>,
    realtime: RealtimeChannel,
    poll: PollChannel,
    on_finalize: Option<FinalizeCallback>,
    events_tx: mpsc::UnboundedSender<ChannelMessage>,
    view_tx: watch::Sender<GenerationView>,

    generation: u64,
    phase: TransportPhase,
    task: Option<GenerationTask>,
    pending_start: Option<StartReply>,
    submission: Option<JoinHandle<()>>,
    /// Finalize-once guard for the current generation.
    finalized: bool,
    open_deadline: Option<Instant>,
    silence_deadline: Option<Instant>,
    polling_engaged: bool,
    poll_healthy: bool,
    started_at: Option<Instant>,
}

impl Worker {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut events: mpsc::UnboundedReceiver<ChannelMessage>,
    ) {
        info!("Generation transport started");
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Start { request, reply }) => self.start(request, reply),
                    Some(Command::Reset) => self.reset(),
                    Some(Command::Shutdown { ack }) => {
                        self.reset();
                        let _ = ack.send(());
                        break;
                    }
                    None => {
                        self.reset();
                        break;
                    }
                },
                Some(message) = events.recv() => self.handle_message(message),
                _ = sleep_until_deadline(self.open_deadline) => {
                    self.open_deadline = None;
                    debug!("Realtime open watchdog fired");
                    self.engage_polling(FallbackReason::OpenTimeout);
                }
                _ = sleep_until_deadline(self.silence_deadline) => {
                    self.silence_deadline = None;
                    debug!("Realtime silence watchdog fired");
                    self.engage_polling(FallbackReason::Silence);
                }
            }
        }
        info!("Generation transport stopped");
    }

    fn sink(&self) -> ChannelSink {
        ChannelSink::new(self.generation, self.events_tx.clone())
    }

    fn start(&mut self, request: GenerationRequest, reply: StartReply) {
        self.supersede();
        self.phase = TransportPhase::Starting;
        self.pending_start = Some(reply);
        self.started_at = Some(Instant::now());
        self.view_tx.send_replace(GenerationView::starting());
        info!(generation = self.generation, "Submitting generation job");

        let sink = self.sink();
        let submitter = Arc::clone(&self.submitter);
        let credentials = Arc::clone(&self.credentials);
        let margin = self.config.credential_refresh_margin();
        self.submission = Some(tokio::spawn(async move {
            match submitter.submit(&request).await {
                Ok(submitted) => {
                    let credential = ensure_fresh(credentials.as_ref(), margin).await;
                    sink.send(ChannelEvent::Submitted {
                        task_id: submitted.task_id,
                        credential,
                    });
                }
                Err(e) => {
                    sink.send(ChannelEvent::SubmissionFailed(e));
                }
            }
        }));
    }

    fn reset(&mut self) {
        self.supersede();
        self.phase = TransportPhase::Idle;
        self.view_tx.send_replace(GenerationView::idle());
        debug!(generation = self.generation, "Transport reset");
    }

    /// Invalidate the current generation and everything attached to it.
    fn supersede(&mut self) {
        self.generation += 1;
        if let Some(submission) = self.submission.take() {
            submission.abort();
        }
        self.realtime.stop();
        self.poll.stop();
        self.open_deadline = None;
        self.silence_deadline = None;
        self.polling_engaged = false;
        self.poll_healthy = true;
        self.finalized = false;
        self.task = None;
        self.started_at = None;
        if let Some(reply) = self.pending_start.take() {
            let _ = reply.send(Err(TransportError::Superseded));
        }
    }

    fn handle_message(&mut self, message: ChannelMessage) {
        if message.generation != self.generation {
            metrics::STALE_MESSAGES_DROPPED.inc();
            debug!(
                generation = message.generation,
                current = self.generation,
                "Dropping stale channel event"
            );
            return;
        }

        match message.event {
            ChannelEvent::Submitted {
                task_id,
                credential,
            } => self.on_submitted(task_id, credential),
            ChannelEvent::SubmissionFailed(error) => self.on_submission_failed(error),
            ChannelEvent::Snapshot { snapshot, source } => self.apply(&snapshot, source),
            ChannelEvent::RealtimeOpened => {
                self.open_deadline = None;
                if self.is_following() && !self.polling_engaged {
                    self.silence_deadline =
                        Some(Instant::now() + self.config.realtime.silence_timeout());
                }
            }
            ChannelEvent::RealtimeError(_) => self.engage_polling(FallbackReason::RealtimeError),
            ChannelEvent::RealtimeDisconnected { .. } => {
                self.engage_polling(FallbackReason::AbnormalClose)
            }
            // Realtime will not deliver the terminal snapshot any more.
            ChannelEvent::RealtimeClosed => self.engage_polling(FallbackReason::NormalClose),
            ChannelEvent::RealtimeExhausted => self.on_realtime_exhausted(),
            ChannelEvent::PollHealth(healthy) => self.poll_healthy = healthy,
        }
    }

    fn on_submitted(&mut self, task_id: String, credential: Result<Credential, AuthError>) {
        self.submission = None;
        metrics::TASKS_SUBMITTED
            .with_label_values(&["accepted"])
            .inc();
        info!(task_id = %task_id, "Generation job accepted");

        self.task = Some(GenerationTask::new(&task_id));
        self.phase = TransportPhase::Active;
        self.publish();

        match credential {
            Ok(credential) => {
                let sink = self.sink();
                self.realtime.start(&task_id, credential, sink);
                self.open_deadline = Some(Instant::now() + self.config.realtime.open_timeout());
                self.reply(Ok(task_id));
            }
            Err(e) => {
                warn!(task_id = %task_id, "Credential pre-flight failed: {}", e);
                let failure = Snapshot::failed(&task_id, SESSION_EXPIRED_MESSAGE);
                self.apply(&failure, SnapshotSource::Transport);
                self.reply(Err(TransportError::SessionExpired));
            }
        }
    }

    fn on_submission_failed(&mut self, error: SubmitError) {
        self.submission = None;
        metrics::TASKS_SUBMITTED
            .with_label_values(&["rejected"])
            .inc();
        warn!("Generation job rejected: {}", error);

        let message = error.to_string();
        self.finalized = true;
        self.phase = TransportPhase::Terminal;
        self.view_tx
            .send_replace(GenerationView::submission_failed(&message));
        self.record_finalization(
            GenerationOutcome::Failed {
                task_id: None,
                error: user_facing_error(&message),
            },
            SnapshotSource::Transport,
        );
        self.reply(Err(TransportError::Submission(error)));
    }

    fn apply(&mut self, snapshot: &Snapshot, source: SnapshotSource) {
        let Some(current) = &self.task else {
            return;
        };
        let Some(next) = apply_snapshot(current, snapshot) else {
            debug!(
                task_id = %snapshot.task_id,
                source = source.as_str(),
                "Snapshot rejected"
            );
            return;
        };

        if source == SnapshotSource::Realtime {
            self.silence_deadline = None;
        }
        let terminal = next.status.is_terminal();
        self.task = Some(next);

        if terminal {
            self.finalize(source);
        } else {
            self.publish();
        }
    }

    fn finalize(&mut self, source: SnapshotSource) {
        if self.finalized {
            return;
        }
        self.finalized = true;

        self.realtime.stop();
        self.poll.stop();
        self.open_deadline = None;
        self.silence_deadline = None;
        self.phase = TransportPhase::Terminal;
        self.publish();

        let Some(task) = &self.task else {
            return;
        };
        let outcome = match task.status {
            TaskStatus::Completed => GenerationOutcome::Completed {
                task_id: task.task_id.clone(),
                photo_url: task.photo_url.clone(),
                muscles_url: task.muscles_url.clone(),
            },
            _ => GenerationOutcome::Failed {
                task_id: Some(task.task_id.clone()),
                error: task
                    .error_message
                    .as_deref()
                    .map(user_facing_error)
                    .unwrap_or_else(|| "Generation failed".to_string()),
            },
        };
        info!(
            task_id = %task.task_id,
            outcome = outcome.label(),
            source = source.as_str(),
            "Generation finalized"
        );
        self.record_finalization(outcome, source);
    }

    fn record_finalization(&mut self, outcome: GenerationOutcome, source: SnapshotSource) {
        metrics::TASKS_FINALIZED
            .with_label_values(&[outcome.label(), source.as_str()])
            .inc();
        if let Some(started_at) = self.started_at.take() {
            metrics::GENERATION_DURATION
                .with_label_values(&[outcome.label()])
                .observe(started_at.elapsed().as_secs_f64());
        }
        if let Some(callback) = &self.on_finalize {
            callback(&outcome);
        }
    }

    /// Start the poll channel. Idempotent per generation.
    fn engage_polling(&mut self, reason: FallbackReason) {
        if !self.is_following() {
            return;
        }
        let Some(task_id) = self.task.as_ref().map(|task| task.task_id.clone()) else {
            return;
        };

        self.open_deadline = None;
        self.silence_deadline = None;
        if self.polling_engaged {
            return;
        }

        self.polling_engaged = true;
        self.poll_healthy = true;
        metrics::FALLBACK_ACTIVATIONS
            .with_label_values(&[reason.as_str()])
            .inc();
        info!(
            task_id = %task_id,
            reason = reason.as_str(),
            "Falling back to status polling"
        );
        let sink = self.sink();
        self.poll.start(&task_id, sink);
    }

    fn on_realtime_exhausted(&mut self) {
        if !self.is_following() {
            return;
        }
        let Some(task_id) = self.task.as_ref().map(|task| task.task_id.clone()) else {
            return;
        };

        if self.polling_engaged && self.poll_healthy && self.poll.is_polling(&task_id) {
            info!(
                task_id = %task_id,
                "Realtime reconnects exhausted, continuing with polling"
            );
            return;
        }

        warn!(task_id = %task_id, "Realtime reconnects exhausted and polling unavailable");
        let failure = Snapshot::failed(&task_id, CONNECTION_LOST_MESSAGE);
        self.apply(&failure, SnapshotSource::Transport);
    }

    fn is_following(&self) -> bool {
        self.phase == TransportPhase::Active && !self.finalized
    }

    fn publish(&self) {
        if let Some(task) = &self.task {
            self.view_tx
                .send_replace(GenerationView::from_task(self.phase, task));
        }
    }

    fn reply(&mut self, result: Result<String, TransportError>) {
        if let Some(reply) = self.pending_start.take() {
            let _ = reply.send(result);
        }
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
