//! Per-agent status aggregation.
//!
//! The board consumes [`StageEvent`]s from the pipeline machine and derives
//! each agent's current status, task text and cumulative performance
//! counters. Counters only ever grow within a session; a pipeline `reset()`
//! starts a new run but does not zero them.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::pipeline::{AgentKind, StageEvent, TransitionKind};

/// Current activity state of one agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentState {
    Idle,
    Active,
    Busy,
    Error,
    Offline,
}

impl std::fmt::Display for AgentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Active => write!(f, "active"),
            Self::Busy => write!(f, "busy"),
            Self::Error => write!(f, "error"),
            Self::Offline => write!(f, "offline"),
        }
    }
}

/// Live status and session counters for one agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentStatus {
    pub agent: AgentKind,
    pub name: String,
    pub status: AgentState,
    pub current_task: Option<String>,
    pub progress: Option<f64>,
    pub last_activity: DateTime<Utc>,
    /// Tasks begun, cumulative for the session.
    pub total_tasks: u64,
    pub completed_tasks: u64,
    pub failed_tasks: u64,
    /// Begun tasks later skipped; closes their in-flight slot so the counter
    /// arithmetic stays consistent.
    pub skipped_tasks: u64,
    /// Running mean over completed task durations.
    pub avg_duration: Duration,
}

impl AgentStatus {
    fn new(agent: AgentKind) -> Self {
        Self {
            agent,
            name: agent.display_name().to_string(),
            status: AgentState::Idle,
            current_task: None,
            progress: None,
            last_activity: Utc::now(),
            total_tasks: 0,
            completed_tasks: 0,
            failed_tasks: 0,
            skipped_tasks: 0,
            avg_duration: Duration::ZERO,
        }
    }

    /// Tasks begun but not yet finished. Sequential execution keeps this at
    /// zero or one.
    pub fn in_flight(&self) -> u64 {
        self.total_tasks - self.completed_tasks - self.failed_tasks - self.skipped_tasks
    }
}

/// Aggregated status of every pipeline agent.
#[derive(Debug, Clone)]
pub struct AgentBoard {
    agents: HashMap<AgentKind, AgentStatus>,
}

impl Default for AgentBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentBoard {
    /// A board with every agent idle and zeroed counters.
    pub fn new() -> Self {
        let agents = AgentKind::ALL
            .iter()
            .map(|&kind| (kind, AgentStatus::new(kind)))
            .collect();
        Self { agents }
    }

    /// Apply one pipeline transition to the owning agent.
    pub fn apply(&mut self, event: &StageEvent) {
        let status = self
            .agents
            .entry(event.agent)
            .or_insert_with(|| AgentStatus::new(event.agent));
        status.last_activity = event.at;

        match &event.kind {
            TransitionKind::Began => {
                status.status = AgentState::Busy;
                status.current_task = Some(format!("Running {}", event.stage_name));
                status.progress = Some(0.0);
                status.total_tasks += 1;
            }
            TransitionKind::Advanced { progress } => {
                status.progress = Some(*progress);
            }
            TransitionKind::Completed => {
                status.status = AgentState::Idle;
                status.current_task = None;
                status.progress = None;
                if let Some(duration) = event.duration {
                    status.avg_duration = running_mean(
                        status.avg_duration,
                        status.completed_tasks,
                        duration,
                    );
                }
                status.completed_tasks += 1;
            }
            TransitionKind::Failed { .. } => {
                status.status = AgentState::Error;
                status.current_task = None;
                status.progress = None;
                status.failed_tasks += 1;
            }
            TransitionKind::Skipped { was_running } => {
                status.status = AgentState::Idle;
                status.current_task = None;
                status.progress = None;
                // A skip of a never-begun stage touches no counters.
                if *was_running {
                    status.skipped_tasks += 1;
                }
            }
        }
    }

    /// Status for one agent.
    pub fn agent(&self, kind: AgentKind) -> &AgentStatus {
        // Every kind is seeded in new(), so this cannot miss.
        &self.agents[&kind]
    }

    /// All agents in pipeline order.
    pub fn agents(&self) -> Vec<AgentStatus> {
        AgentKind::ALL
            .iter()
            .map(|kind| self.agents[kind].clone())
            .collect()
    }
}

/// `(old × n + d) / (n + 1)` — the incremental mean over completed tasks.
fn running_mean(old: Duration, completed: u64, next: Duration) -> Duration {
    let total = old.as_secs_f64() * completed as f64 + next.as_secs_f64();
    Duration::from_secs_f64(total / (completed + 1) as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::Pipeline;

    #[test]
    fn begin_marks_agent_busy_and_counts_task() {
        let mut pipeline = Pipeline::default();
        let mut board = AgentBoard::new();

        board.apply(&pipeline.begin("initialization").unwrap());

        let agent = board.agent(AgentKind::Coordinator);
        assert_eq!(agent.status, AgentState::Busy);
        assert_eq!(agent.total_tasks, 1);
        assert_eq!(agent.in_flight(), 1);
        assert!(agent.current_task.as_deref().unwrap().contains("Initialization"));
    }

    #[test]
    fn complete_returns_agent_to_idle() {
        let mut pipeline = Pipeline::default();
        let mut board = AgentBoard::new();

        board.apply(&pipeline.begin("initialization").unwrap());
        board.apply(&pipeline.complete("initialization").unwrap());

        let agent = board.agent(AgentKind::Coordinator);
        assert_eq!(agent.status, AgentState::Idle);
        assert_eq!(agent.completed_tasks, 1);
        assert_eq!(agent.in_flight(), 0);
        assert!(agent.current_task.is_none());
    }

    #[test]
    fn failure_marks_agent_error() {
        let mut pipeline = Pipeline::default();
        let mut board = AgentBoard::new();

        board.apply(&pipeline.begin("initialization").unwrap());
        board.apply(&pipeline.fail("initialization", "boom").unwrap());

        let agent = board.agent(AgentKind::Coordinator);
        assert_eq!(agent.status, AgentState::Error);
        assert_eq!(agent.failed_tasks, 1);
        assert_eq!(agent.in_flight(), 0);
    }

    #[test]
    fn counters_balance_at_every_step() {
        let mut pipeline = Pipeline::default();
        let mut board = AgentBoard::new();
        let ids: Vec<String> = pipeline.stages().iter().map(|s| s.id.clone()).collect();

        for id in &ids {
            board.apply(&pipeline.begin(id).unwrap());
            for status in board.agents() {
                assert!(status.in_flight() <= 1);
            }
            board.apply(&pipeline.complete(id).unwrap());
        }

        for status in board.agents() {
            assert_eq!(status.total_tasks, 1);
            assert_eq!(status.completed_tasks, 1);
            assert_eq!(status.in_flight(), 0);
        }
    }

    #[test]
    fn skip_of_unstarted_stage_leaves_counters_alone() {
        let mut pipeline = Pipeline::default();
        let mut board = AgentBoard::new();

        board.apply(&pipeline.skip("initialization").unwrap());

        let agent = board.agent(AgentKind::Coordinator);
        assert_eq!(agent.status, AgentState::Idle);
        assert_eq!(agent.total_tasks, 0);
        assert_eq!(agent.skipped_tasks, 0);
    }

    #[test]
    fn skip_of_running_stage_closes_in_flight_slot() {
        let mut pipeline = Pipeline::default();
        let mut board = AgentBoard::new();

        board.apply(&pipeline.begin("initialization").unwrap());
        board.apply(&pipeline.skip("initialization").unwrap());

        let agent = board.agent(AgentKind::Coordinator);
        assert_eq!(agent.total_tasks, 1);
        assert_eq!(agent.skipped_tasks, 1);
        assert_eq!(agent.in_flight(), 0);
    }

    #[test]
    fn running_mean_updates_incrementally() {
        let avg = running_mean(Duration::ZERO, 0, Duration::from_secs(4));
        assert_eq!(avg, Duration::from_secs(4));

        let avg = running_mean(avg, 1, Duration::from_secs(2));
        assert_eq!(avg, Duration::from_secs(3));

        let avg = running_mean(avg, 2, Duration::from_secs(9));
        assert_eq!(avg, Duration::from_secs(5));
    }
}
