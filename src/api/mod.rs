//! Client-side view of the backend API.
//!
//! The status layer never implements the pipeline itself; it consumes a small
//! set of operations exposed by the dashboard agent. [`StatusApi`] is the
//! seam: production code talks to [`HttpStatusApi`], tests plug in stubs.

mod http;
mod types;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::ApiError;

pub use http::HttpStatusApi;
pub use types::{
    AnalysisReceipt, AnalysisRequest, DateRange, HealthSnapshot, HealthState, Job, JobStatus,
    ReportInfo, UploadReceipt,
};

/// Operations the status layer consumes from the backend.
///
/// All operations are idempotent reads except [`StatusApi::start_analysis`]
/// and [`StatusApi::upload_file`], which create server-side resources and must
/// not be retried silently on ambiguous failure.
#[async_trait]
pub trait StatusApi: Send + Sync {
    /// Current system health.
    async fn health(&self) -> Result<HealthSnapshot, ApiError>;

    /// Kick off a new analysis run.
    async fn start_analysis(&self, request: AnalysisRequest) -> Result<AnalysisReceipt, ApiError>;

    /// All jobs known to the server.
    async fn list_jobs(&self) -> Result<Vec<Job>, ApiError>;

    /// Status of one job; `NotFound` if the id is unknown.
    async fn get_job_status(&self, job_id: &str) -> Result<Job, ApiError>;

    /// Reports available for download.
    async fn list_reports(&self) -> Result<Vec<ReportInfo>, ApiError>;

    /// Download a report by filename.
    async fn download_report(&self, filename: &str) -> Result<Bytes, ApiError>;

    /// Upload a data file for analysis.
    async fn upload_file(&self, filename: &str, data: Bytes) -> Result<UploadReceipt, ApiError>;
}
