//! Stage and agent definitions for the analysis pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The closed set of pipeline participants.
///
/// Used purely as a status/ownership tag; agent internals live in the
/// backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    Coordinator,
    DataFetch,
    Normalization,
    Rag,
    Report,
    Dashboard,
}

impl AgentKind {
    /// All agents, in pipeline order.
    pub const ALL: [AgentKind; 6] = [
        AgentKind::Coordinator,
        AgentKind::DataFetch,
        AgentKind::Normalization,
        AgentKind::Rag,
        AgentKind::Report,
        AgentKind::Dashboard,
    ];

    /// Human-readable display name.
    pub fn display_name(&self) -> &'static str {
        match self {
            AgentKind::Coordinator => "Coordinator",
            AgentKind::DataFetch => "Data Fetch",
            AgentKind::Normalization => "Normalization",
            AgentKind::Rag => "RAG",
            AgentKind::Report => "Report",
            AgentKind::Dashboard => "Dashboard",
        }
    }
}

impl std::fmt::Display for AgentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentKind::Coordinator => write!(f, "coordinator"),
            AgentKind::DataFetch => write!(f, "data_fetch"),
            AgentKind::Normalization => write!(f, "normalization"),
            AgentKind::Rag => write!(f, "rag"),
            AgentKind::Report => write!(f, "report"),
            AgentKind::Dashboard => write!(f, "dashboard"),
        }
    }
}

/// Status of one stage within a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

impl StageStatus {
    /// Terminal statuses are final for the lifetime of one run.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StageStatus::Completed | StageStatus::Failed | StageStatus::Skipped
        )
    }
}

impl std::fmt::Display for StageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

/// One named unit of work in the fixed pipeline sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineStage {
    pub id: String,
    pub name: String,
    pub agent: AgentKind,
    pub status: StageStatus,
    /// Fraction complete while running; cleared on reset.
    pub progress: Option<f64>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub message: Option<String>,
}

impl PipelineStage {
    pub fn new(id: impl Into<String>, name: impl Into<String>, agent: AgentKind) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            agent,
            status: StageStatus::Pending,
            progress: None,
            started_at: None,
            ended_at: None,
            message: None,
        }
    }

    /// Wall-clock duration of the stage, once both timestamps exist.
    pub fn duration(&self) -> Option<std::time::Duration> {
        match (self.started_at, self.ended_at) {
            (Some(start), Some(end)) => (end - start).to_std().ok(),
            _ => None,
        }
    }

    pub(crate) fn reset(&mut self) {
        self.status = StageStatus::Pending;
        self.progress = None;
        self.started_at = None;
        self.ended_at = None;
        self.message = None;
    }
}

/// The six-stage sequence the coordinator executes, in order.
pub fn default_stages() -> Vec<PipelineStage> {
    vec![
        PipelineStage::new("initialization", "Initialization", AgentKind::Coordinator),
        PipelineStage::new("data_fetch", "Data Fetch", AgentKind::DataFetch),
        PipelineStage::new("normalization", "Normalization", AgentKind::Normalization),
        PipelineStage::new("rag_processing", "Insight Generation", AgentKind::Rag),
        PipelineStage::new("report_generation", "Report Generation", AgentKind::Report),
        PipelineStage::new("dashboard_ready", "Dashboard Publish", AgentKind::Dashboard),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_sequence_covers_every_agent_once() {
        let stages = default_stages();
        assert_eq!(stages.len(), 6);
        for (stage, agent) in stages.iter().zip(AgentKind::ALL) {
            assert_eq!(stage.agent, agent);
            assert_eq!(stage.status, StageStatus::Pending);
        }
    }

    #[test]
    fn agent_kind_serializes_snake_case() {
        let json = serde_json::to_string(&AgentKind::DataFetch).unwrap();
        assert_eq!(json, "\"data_fetch\"");
        assert_eq!(AgentKind::Rag.to_string(), "rag");
    }

    #[test]
    fn terminal_stage_statuses() {
        assert!(StageStatus::Completed.is_terminal());
        assert!(StageStatus::Failed.is_terminal());
        assert!(StageStatus::Skipped.is_terminal());
        assert!(!StageStatus::Running.is_terminal());
        assert!(!StageStatus::Pending.is_terminal());
    }
}
