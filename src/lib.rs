//! Live operational-status layer for the retail-analysis agent pipeline.
//!
//! The backend runs analysis jobs through a fixed sequence of agent stages;
//! this crate keeps a client-side picture of that work fresh. It polls the
//! job list, a watched job and backend health at different cadences, mirrors
//! stage transitions into a local pipeline state machine with per-agent
//! status and an activity log, and can replay a full simulated run when no
//! backend is available.

pub mod activity;
pub mod agents;
pub mod api;
pub mod config;
pub mod demo;
pub mod error;
pub mod pipeline;
pub mod poller;
pub mod store;

pub use activity::{ActivityLog, AgentMessage, ExpansionState, MessageDetail, MessageLevel};
pub use agents::{AgentBoard, AgentState, AgentStatus};
pub use api::{HttpStatusApi, StatusApi};
pub use config::Settings;
pub use demo::DemoDriver;
pub use error::{ApiError, DemoError, PipelineError};
pub use pipeline::{Pipeline, PipelineMonitor, StageEvent};
pub use poller::{PollState, Poller};
pub use store::{HealthStore, JobStore};
