//! Pipeline stage model, state machine and fan-out monitor.

mod machine;
mod monitor;
mod stage;

pub use machine::{Pipeline, StageEvent, TransitionKind};
pub use monitor::{PipelineMonitor, RunWriter};
pub use stage::{default_stages, AgentKind, PipelineStage, StageStatus};
