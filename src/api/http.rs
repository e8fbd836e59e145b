//! HTTP implementation of [`StatusApi`] against the dashboard agent.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::StatusCode;

use crate::api::types::{JobListEnvelope, ReportListEnvelope};
use crate::api::{
    AnalysisReceipt, AnalysisRequest, HealthSnapshot, Job, ReportInfo, StatusApi, UploadReceipt,
};
use crate::config::ApiSettings;
use crate::error::ApiError;

/// REST client for the backend status endpoints.
pub struct HttpStatusApi {
    client: reqwest::Client,
    base_url: String,
}

impl HttpStatusApi {
    /// Build a client from settings.
    pub fn new(settings: &ApiSettings) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| ApiError::RequestFailed {
                reason: format!("failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Map a non-success status to an [`ApiError`], labelling 404s with the
    /// resource they were about.
    fn check_status(resp: reqwest::Response, resource: &str) -> Result<reqwest::Response, ApiError> {
        match resp.status() {
            StatusCode::NOT_FOUND => Err(ApiError::NotFound {
                resource: resource.to_string(),
            }),
            status if status.is_success() => Ok(resp),
            status => Err(ApiError::RequestFailed {
                reason: format!("{} returned {}", resource, status),
            }),
        }
    }
}

#[async_trait]
impl StatusApi for HttpStatusApi {
    async fn health(&self) -> Result<HealthSnapshot, ApiError> {
        let resp = self.client.get(self.url("/health")).send().await?;
        let resp = Self::check_status(resp, "health")?;
        Ok(resp.json().await?)
    }

    async fn start_analysis(&self, request: AnalysisRequest) -> Result<AnalysisReceipt, ApiError> {
        let resp = self
            .client
            .post(self.url("/api/v1/analysis/start"))
            .json(&request)
            .send()
            .await?;
        let resp = Self::check_status(resp, "analysis start")?;
        let receipt: AnalysisReceipt = resp.json().await?;
        tracing::info!(job_id = %receipt.job_id, "Started analysis job");
        Ok(receipt)
    }

    async fn list_jobs(&self) -> Result<Vec<Job>, ApiError> {
        let resp = self
            .client
            .get(self.url("/api/v1/analysis/jobs"))
            .send()
            .await?;
        let resp = Self::check_status(resp, "job list")?;
        let envelope: JobListEnvelope = resp.json().await?;
        Ok(envelope.jobs)
    }

    async fn get_job_status(&self, job_id: &str) -> Result<Job, ApiError> {
        let resp = self
            .client
            .get(self.url(&format!("/api/v1/analysis/{}/status", job_id)))
            .send()
            .await?;
        let resp = Self::check_status(resp, &format!("job {}", job_id))?;
        Ok(resp.json().await?)
    }

    async fn list_reports(&self) -> Result<Vec<ReportInfo>, ApiError> {
        let resp = self.client.get(self.url("/api/v1/reports")).send().await?;
        let resp = Self::check_status(resp, "report list")?;
        let envelope: ReportListEnvelope = resp.json().await?;
        Ok(envelope.reports)
    }

    async fn download_report(&self, filename: &str) -> Result<Bytes, ApiError> {
        let resp = self
            .client
            .get(self.url(&format!("/api/v1/reports/{}/download", filename)))
            .send()
            .await?;
        let resp = Self::check_status(resp, &format!("report {}", filename))?;
        Ok(resp.bytes().await?)
    }

    async fn upload_file(&self, filename: &str, data: Bytes) -> Result<UploadReceipt, ApiError> {
        let part = reqwest::multipart::Part::bytes(data.to_vec()).file_name(filename.to_string());
        let form = reqwest::multipart::Form::new().part("file", part);

        let resp = self
            .client
            .post(self.url("/api/v1/data/upload"))
            .multipart(form)
            .send()
            .await?;
        let resp = Self::check_status(resp, &format!("upload {}", filename))?;
        Ok(resp.json().await?)
    }
}
