//! Polled stores layered over the status API.

mod health;
mod jobs;

pub use health::HealthStore;
pub use jobs::JobStore;
