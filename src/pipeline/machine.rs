//! The pipeline state machine.
//!
//! Stages begin strictly in sequence, carry monotone progress while running,
//! and are final once terminal. Violations are programmer errors and fail
//! fast with [`PipelineError`]; state is never coerced silently.

use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::error::PipelineError;
use crate::pipeline::stage::{default_stages, AgentKind, PipelineStage, StageStatus};

/// What happened in one transition.
#[derive(Debug, Clone, PartialEq)]
pub enum TransitionKind {
    Began,
    Advanced { progress: f64 },
    Completed,
    Failed { message: String },
    /// `was_running` distinguishes skipping an in-flight stage from skipping
    /// one that never started (the latter must not touch agent counters).
    Skipped { was_running: bool },
}

/// Emitted on every successful transition; fanned out to the agent board and
/// the activity log.
#[derive(Debug, Clone)]
pub struct StageEvent {
    pub stage_id: String,
    pub stage_name: String,
    pub agent: AgentKind,
    pub kind: TransitionKind,
    pub at: DateTime<Utc>,
    /// Wall-clock stage duration, set on terminal transitions of a begun
    /// stage.
    pub duration: Option<Duration>,
}

/// Ordered sequence of stages for one pipeline run.
#[derive(Debug, Clone)]
pub struct Pipeline {
    stages: Vec<PipelineStage>,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new(default_stages())
    }
}

impl Pipeline {
    /// A pipeline over a fixed stage sequence; all stages start pending.
    pub fn new(stages: Vec<PipelineStage>) -> Self {
        Self { stages }
    }

    /// Begin `stage_id`. Every prior stage must already be terminal and the
    /// target must be pending.
    pub fn begin(&mut self, stage_id: &str) -> Result<StageEvent, PipelineError> {
        let idx = self.index_of(stage_id)?;

        if let Some(prior) = self.stages[..idx].iter().find(|s| !s.status.is_terminal()) {
            return Err(PipelineError::OutOfOrder {
                stage: stage_id.to_string(),
                prior: prior.id.clone(),
            });
        }

        let stage = &mut self.stages[idx];
        if stage.status != StageStatus::Pending {
            return Err(PipelineError::InvalidTransition {
                stage: stage_id.to_string(),
                status: stage.status.to_string(),
                expected: "pending".to_string(),
            });
        }

        let now = Utc::now();
        stage.status = StageStatus::Running;
        stage.progress = Some(0.0);
        stage.started_at = Some(now);

        Ok(event(stage, TransitionKind::Began, now, None))
    }

    /// Update progress of the running stage. Values are clamped into `[0, 1]`
    /// first; a clamped value below current progress is a monotonicity
    /// violation.
    pub fn advance(&mut self, stage_id: &str, progress: f64) -> Result<StageEvent, PipelineError> {
        let idx = self.index_of(stage_id)?;
        let stage = &mut self.stages[idx];

        if stage.status != StageStatus::Running {
            return Err(PipelineError::InvalidTransition {
                stage: stage_id.to_string(),
                status: stage.status.to_string(),
                expected: "running".to_string(),
            });
        }

        let clamped = progress.clamp(0.0, 1.0);
        let current = stage.progress.unwrap_or(0.0);
        if clamped < current {
            return Err(PipelineError::ProgressRegression {
                stage: stage_id.to_string(),
                from: current,
                to: clamped,
            });
        }

        stage.progress = Some(clamped);
        Ok(event(
            stage,
            TransitionKind::Advanced { progress: clamped },
            Utc::now(),
            None,
        ))
    }

    /// Mark the running stage completed.
    pub fn complete(&mut self, stage_id: &str) -> Result<StageEvent, PipelineError> {
        let idx = self.index_of(stage_id)?;
        let stage = &mut self.stages[idx];

        if stage.status != StageStatus::Running {
            return Err(PipelineError::InvalidTransition {
                stage: stage_id.to_string(),
                status: stage.status.to_string(),
                expected: "running".to_string(),
            });
        }

        let now = Utc::now();
        stage.status = StageStatus::Completed;
        stage.progress = Some(1.0);
        stage.ended_at = Some(now);

        Ok(event(stage, TransitionKind::Completed, now, stage.duration()))
    }

    /// Mark the running stage failed.
    pub fn fail(&mut self, stage_id: &str, message: impl Into<String>) -> Result<StageEvent, PipelineError> {
        let idx = self.index_of(stage_id)?;
        let stage = &mut self.stages[idx];

        if stage.status != StageStatus::Running {
            return Err(PipelineError::InvalidTransition {
                stage: stage_id.to_string(),
                status: stage.status.to_string(),
                expected: "running".to_string(),
            });
        }

        let now = Utc::now();
        let message = message.into();
        stage.status = StageStatus::Failed;
        stage.ended_at = Some(now);
        stage.message = Some(message.clone());

        Ok(event(
            stage,
            TransitionKind::Failed { message },
            now,
            stage.duration(),
        ))
    }

    /// Skip a pending or running stage.
    pub fn skip(&mut self, stage_id: &str) -> Result<StageEvent, PipelineError> {
        let idx = self.index_of(stage_id)?;
        let stage = &mut self.stages[idx];

        let was_running = match stage.status {
            StageStatus::Running => true,
            StageStatus::Pending => false,
            status => {
                return Err(PipelineError::InvalidTransition {
                    stage: stage_id.to_string(),
                    status: status.to_string(),
                    expected: "pending or running".to_string(),
                });
            }
        };

        let now = Utc::now();
        stage.status = StageStatus::Skipped;
        stage.ended_at = Some(now);

        Ok(event(
            stage,
            TransitionKind::Skipped { was_running },
            now,
            stage.duration(),
        ))
    }

    /// Return every stage to pending for a new run.
    pub fn reset(&mut self) {
        for stage in &mut self.stages {
            stage.reset();
        }
    }

    /// Derived aggregate progress, recomputed on every read:
    /// `(completed + progress of the running stage) / total`.
    pub fn overall_progress(&self) -> f64 {
        if self.stages.is_empty() {
            return 0.0;
        }
        let completed = self
            .stages
            .iter()
            .filter(|s| s.status == StageStatus::Completed)
            .count() as f64;
        let running = self
            .current_stage()
            .and_then(|s| s.progress)
            .unwrap_or(0.0);
        (completed + running) / self.stages.len() as f64
    }

    /// The single running stage, if any.
    pub fn current_stage(&self) -> Option<&PipelineStage> {
        self.stages
            .iter()
            .find(|s| s.status == StageStatus::Running)
    }

    /// All stages, in pipeline order.
    pub fn stages(&self) -> &[PipelineStage] {
        &self.stages
    }

    /// Whether every stage has reached a terminal status.
    pub fn is_finished(&self) -> bool {
        self.stages.iter().all(|s| s.status.is_terminal())
    }

    fn index_of(&self, stage_id: &str) -> Result<usize, PipelineError> {
        self.stages
            .iter()
            .position(|s| s.id == stage_id)
            .ok_or_else(|| PipelineError::UnknownStage {
                id: stage_id.to_string(),
            })
    }
}

fn event(
    stage: &PipelineStage,
    kind: TransitionKind,
    at: DateTime<Utc>,
    duration: Option<Duration>,
) -> StageEvent {
    StageEvent {
        stage_id: stage.id.clone(),
        stage_name: stage.name.clone(),
        agent: stage.agent,
        kind,
        at,
        duration,
    }
}
