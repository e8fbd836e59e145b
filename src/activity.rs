//! Append-only activity log.
//!
//! The log is a pure data stream: messages are immutable once appended and
//! never reordered or dropped. Grouping and filtering are read-time
//! projections, and per-message expansion is a separate annotation keyed by
//! message id, so presentation state never touches the log itself.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::pipeline::AgentKind;

/// Severity of an activity message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// Structured payload attached to a message.
///
/// Known per-stage shapes get their own variant; anything else rides in
/// `Unstructured` rather than an open-ended map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageDetail {
    RunConfigured {
        tables: Vec<String>,
    },
    DataFetched {
        tables: Vec<String>,
        rows: u64,
    },
    Normalized {
        rows_in: u64,
        rows_out: u64,
    },
    InsightsGenerated {
        insights: u64,
    },
    ReportWritten {
        path: String,
        worksheets: Vec<String>,
    },
    DashboardPublished {
        url: String,
    },
    Unstructured {
        data: serde_json::Value,
    },
}

/// One timestamped, leveled message from an agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentMessage {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub agent: AgentKind,
    pub text: String,
    pub level: MessageLevel,
    pub detail: Option<MessageDetail>,
}

/// Append-only, time-ordered message log.
#[derive(Debug, Clone, Default)]
pub struct ActivityLog {
    messages: Vec<AgentMessage>,
}

impl ActivityLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message; the sole mutator. Returns the assigned id.
    pub fn append(
        &mut self,
        agent: AgentKind,
        level: MessageLevel,
        text: impl Into<String>,
        detail: Option<MessageDetail>,
    ) -> Uuid {
        let message = AgentMessage {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            agent,
            text: text.into(),
            level,
            detail,
        };
        let id = message.id;
        self.messages.push(message);
        id
    }

    /// All messages in append (= chronological) order.
    pub fn messages(&self) -> &[AgentMessage] {
        &self.messages
    }

    /// Messages from one agent, in their original relative order.
    pub fn by_agent(&self, agent: AgentKind) -> Vec<&AgentMessage> {
        self.messages.iter().filter(|m| m.agent == agent).collect()
    }

    /// Messages bucketed per agent, agents in pipeline order. A read-time
    /// projection over the same underlying sequence.
    pub fn grouped(&self) -> Vec<(AgentKind, Vec<&AgentMessage>)> {
        AgentKind::ALL
            .iter()
            .map(|&agent| (agent, self.by_agent(agent)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// Which messages currently show their detail payload.
///
/// Held apart from the log so toggling never requires log mutation.
#[derive(Debug, Clone, Default)]
pub struct ExpansionState {
    expanded: HashMap<Uuid, bool>,
}

impl ExpansionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flip one message's expansion; returns the new state.
    pub fn toggle(&mut self, id: Uuid) -> bool {
        let entry = self.expanded.entry(id).or_insert(false);
        *entry = !*entry;
        *entry
    }

    pub fn is_expanded(&self, id: Uuid) -> bool {
        self.expanded.get(&id).copied().unwrap_or(false)
    }

    pub fn collapse_all(&mut self) {
        self.expanded.clear();
    }
}
