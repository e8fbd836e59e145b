//! Shared mutation surface for pipeline, agent board and activity log.
//!
//! Exactly one writer drives a monitor at a time (the live event source or
//! the demo driver, never both). Every successful transition is applied to
//! the machine, fanned out to the agent board, mirrored into the activity
//! log where the contract asks for a message, and broadcast to subscribers.
//! Readers only ever receive cloned snapshots.
//!
//! Writers that drive a whole run bind themselves to the current run
//! generation via [`PipelineMonitor::run_writer`]; the generation is
//! re-checked inside the pipeline lock on every transition, so a `reset()`
//! can never interleave between a writer's check and its mutation.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{broadcast, RwLock};

use crate::activity::{ActivityLog, AgentMessage, MessageDetail, MessageLevel};
use crate::agents::{AgentBoard, AgentStatus};
use crate::error::PipelineError;
use crate::pipeline::machine::{Pipeline, StageEvent};
use crate::pipeline::stage::PipelineStage;

/// Capacity of the transition broadcast channel. Slow subscribers lag rather
/// than block the writer.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Lock-guarded composition of the pipeline state machine, the agent status
/// board and the activity log.
pub struct PipelineMonitor {
    pipeline: RwLock<Pipeline>,
    agents: RwLock<AgentBoard>,
    activity: RwLock<ActivityLog>,
    /// Bumped on every reset, while the pipeline write lock is held; a stale
    /// run-bound writer is rejected instead of mutating the fresh pipeline.
    run_seq: AtomicU64,
    events: broadcast::Sender<StageEvent>,
}

impl Default for PipelineMonitor {
    fn default() -> Self {
        Self::new(Pipeline::default())
    }
}

impl PipelineMonitor {
    pub fn new(pipeline: Pipeline) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            pipeline: RwLock::new(pipeline),
            agents: RwLock::new(AgentBoard::new()),
            activity: RwLock::new(ActivityLog::new()),
            run_seq: AtomicU64::new(0),
            events,
        }
    }

    /// Shared monitor over the default six-stage pipeline.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A writer bound to the current run generation. Its transitions are
    /// rejected with [`PipelineError::RunSuperseded`] once `reset()` has
    /// started a new run.
    pub fn run_writer(&self) -> RunWriter<'_> {
        RunWriter {
            monitor: self,
            run_seq: self.run_seq(),
        }
    }

    /// Begin a stage; logs an info message on success.
    pub async fn begin_stage(&self, stage_id: &str) -> Result<(), PipelineError> {
        self.begin_inner(None, stage_id).await
    }

    /// Report progress for the running stage. Updates the agent board but
    /// emits no activity message (progress ticks would flood the log).
    pub async fn advance_stage(&self, stage_id: &str, progress: f64) -> Result<(), PipelineError> {
        self.advance_inner(None, stage_id, progress).await
    }

    /// Complete the running stage; logs a success message carrying the given
    /// stage-specific detail.
    pub async fn complete_stage(
        &self,
        stage_id: &str,
        detail: Option<MessageDetail>,
    ) -> Result<(), PipelineError> {
        self.complete_inner(None, stage_id, detail).await
    }

    /// Fail the running stage; logs an error message.
    pub async fn fail_stage(
        &self,
        stage_id: &str,
        message: impl Into<String>,
    ) -> Result<(), PipelineError> {
        self.fail_inner(None, stage_id, message.into()).await
    }

    /// Skip a pending or running stage; logs a warning message.
    pub async fn skip_stage(&self, stage_id: &str) -> Result<(), PipelineError> {
        self.skip_inner(None, stage_id).await
    }

    /// Start a new run: stages back to pending, run generation bumped. Agent
    /// counters and the activity log survive (session-lifetime data).
    pub async fn reset(&self) {
        let mut pipeline = self.pipeline.write().await;
        pipeline.reset();
        // Bumped under the pipeline lock so no writer can slip a transition
        // in between the wipe and the bump.
        self.run_seq.fetch_add(1, Ordering::SeqCst);
        tracing::info!("Pipeline reset for a new run");
    }

    /// Current run generation. Changes exactly when [`PipelineMonitor::reset`]
    /// runs.
    pub fn run_seq(&self) -> u64 {
        self.run_seq.load(Ordering::SeqCst)
    }

    /// Subscribe to the transition event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<StageEvent> {
        self.events.subscribe()
    }

    // -- Read-only views --

    /// Derived overall progress, recomputed per call.
    pub async fn overall_progress(&self) -> f64 {
        self.pipeline.read().await.overall_progress()
    }

    pub async fn stages(&self) -> Vec<PipelineStage> {
        self.pipeline.read().await.stages().to_vec()
    }

    pub async fn current_stage(&self) -> Option<PipelineStage> {
        self.pipeline.read().await.current_stage().cloned()
    }

    pub async fn is_finished(&self) -> bool {
        self.pipeline.read().await.is_finished()
    }

    pub async fn agents(&self) -> Vec<AgentStatus> {
        self.agents.read().await.agents()
    }

    pub async fn messages(&self) -> Vec<AgentMessage> {
        self.activity.read().await.messages().to_vec()
    }

    pub async fn messages_for(&self, agent: crate::pipeline::AgentKind) -> Vec<AgentMessage> {
        self.activity
            .read()
            .await
            .by_agent(agent)
            .into_iter()
            .cloned()
            .collect()
    }

    // -- Transition plumbing --

    /// Apply one machine op while holding the pipeline write lock. The run
    /// generation is verified inside the same critical section, so a stale
    /// writer and a `reset()` cannot interleave.
    async fn guarded<F>(
        &self,
        expected_run: Option<u64>,
        op: F,
    ) -> Result<StageEvent, PipelineError>
    where
        F: FnOnce(&mut Pipeline) -> Result<StageEvent, PipelineError>,
    {
        let mut pipeline = self.pipeline.write().await;
        if let Some(expected) = expected_run {
            let actual = self.run_seq.load(Ordering::SeqCst);
            if actual != expected {
                let err = PipelineError::RunSuperseded { expected, actual };
                log_rejection(&err);
                return Err(err);
            }
        }
        op(&mut pipeline).inspect_err(log_rejection)
    }

    async fn begin_inner(
        &self,
        expected_run: Option<u64>,
        stage_id: &str,
    ) -> Result<(), PipelineError> {
        let event = self.guarded(expected_run, |p| p.begin(stage_id)).await?;
        self.agents.write().await.apply(&event);
        self.activity.write().await.append(
            event.agent,
            MessageLevel::Info,
            format!("{} started", event.stage_name),
            None,
        );
        let _ = self.events.send(event);
        Ok(())
    }

    async fn advance_inner(
        &self,
        expected_run: Option<u64>,
        stage_id: &str,
        progress: f64,
    ) -> Result<(), PipelineError> {
        let event = self
            .guarded(expected_run, |p| p.advance(stage_id, progress))
            .await?;
        self.agents.write().await.apply(&event);
        let _ = self.events.send(event);
        Ok(())
    }

    async fn complete_inner(
        &self,
        expected_run: Option<u64>,
        stage_id: &str,
        detail: Option<MessageDetail>,
    ) -> Result<(), PipelineError> {
        let event = self.guarded(expected_run, |p| p.complete(stage_id)).await?;
        self.agents.write().await.apply(&event);
        self.activity.write().await.append(
            event.agent,
            MessageLevel::Success,
            format!("{} completed", event.stage_name),
            detail,
        );
        let _ = self.events.send(event);
        Ok(())
    }

    async fn fail_inner(
        &self,
        expected_run: Option<u64>,
        stage_id: &str,
        message: String,
    ) -> Result<(), PipelineError> {
        let event = self
            .guarded(expected_run, |p| p.fail(stage_id, message.clone()))
            .await?;
        self.agents.write().await.apply(&event);
        self.activity.write().await.append(
            event.agent,
            MessageLevel::Error,
            format!("{} failed: {}", event.stage_name, message),
            None,
        );
        let _ = self.events.send(event);
        Ok(())
    }

    async fn skip_inner(
        &self,
        expected_run: Option<u64>,
        stage_id: &str,
    ) -> Result<(), PipelineError> {
        let event = self.guarded(expected_run, |p| p.skip(stage_id)).await?;
        self.agents.write().await.apply(&event);
        self.activity.write().await.append(
            event.agent,
            MessageLevel::Warning,
            format!("{} skipped", event.stage_name),
            None,
        );
        let _ = self.events.send(event);
        Ok(())
    }
}

/// Transition surface bound to one run generation.
///
/// Every call re-validates the generation inside the pipeline lock; a writer
/// that outlives its run gets [`PipelineError::RunSuperseded`] and the fresh
/// pipeline stays untouched.
pub struct RunWriter<'a> {
    monitor: &'a PipelineMonitor,
    run_seq: u64,
}

impl RunWriter<'_> {
    /// The run generation this writer is bound to.
    pub fn run_seq(&self) -> u64 {
        self.run_seq
    }

    pub async fn begin(&self, stage_id: &str) -> Result<(), PipelineError> {
        self.monitor.begin_inner(Some(self.run_seq), stage_id).await
    }

    pub async fn advance(&self, stage_id: &str, progress: f64) -> Result<(), PipelineError> {
        self.monitor
            .advance_inner(Some(self.run_seq), stage_id, progress)
            .await
    }

    pub async fn complete(
        &self,
        stage_id: &str,
        detail: Option<MessageDetail>,
    ) -> Result<(), PipelineError> {
        self.monitor
            .complete_inner(Some(self.run_seq), stage_id, detail)
            .await
    }

    pub async fn fail(
        &self,
        stage_id: &str,
        message: impl Into<String>,
    ) -> Result<(), PipelineError> {
        self.monitor
            .fail_inner(Some(self.run_seq), stage_id, message.into())
            .await
    }

    pub async fn skip(&self, stage_id: &str) -> Result<(), PipelineError> {
        self.monitor.skip_inner(Some(self.run_seq), stage_id).await
    }
}

fn log_rejection(err: &PipelineError) {
    match err {
        // A superseded writer is the expected outcome of a reset, not a bug.
        PipelineError::RunSuperseded { .. } => {
            tracing::debug!("Stale run writer rejected: {}", err);
        }
        // Ordering violations are logic errors; they are reported here and
        // propagated, never rendered as user-facing error text.
        _ => tracing::error!("Pipeline invariant violation: {}", err),
    }
}
