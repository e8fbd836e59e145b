//! Wire types for the dashboard agent's REST surface.
//!
//! Timestamps arrive as naive ISO-8601 strings (the backend serializes
//! `datetime.now()` without an offset), so the serde helpers below accept
//! both naive and offset-carrying forms and normalize to UTC.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of an analysis job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    /// Whether the job can still change server-side.
    pub fn is_active(&self) -> bool {
        matches!(self, JobStatus::Pending | JobStatus::Running)
    }

    /// Whether the job has reached a final status.
    pub fn is_terminal(&self) -> bool {
        !self.is_active()
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// One analysis job as reported by the server.
///
/// Mutated client-side only by poll results; the server owns the truth.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub job_id: String,
    pub status: JobStatus,
    /// Fraction complete in `[0, 1]`; non-decreasing while running.
    pub progress: f64,
    pub message: String,
    #[serde(with = "lenient_utc")]
    pub started_at: DateTime<Utc>,
    /// Set if and only if the status is terminal. Absent in list payloads.
    #[serde(default, with = "lenient_utc_opt")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Overall system health.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Healthy,
    Unhealthy,
}

impl std::fmt::Display for HealthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Unhealthy => write!(f, "unhealthy"),
        }
    }
}

/// Snapshot of system health, replaced wholesale on every successful poll.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthSnapshot {
    pub status: HealthState,
    #[serde(with = "lenient_utc")]
    pub timestamp: DateTime<Utc>,
    pub active_jobs: usize,
    pub completed_jobs: usize,
}

/// Inclusive date range for an analysis request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// Request body for starting an analysis run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisRequest {
    /// Start date, `YYYY-MM-DD`.
    pub date_range_start: NaiveDate,
    /// End date, `YYYY-MM-DD`.
    pub date_range_end: NaiveDate,
    /// Tables to analyze.
    #[serde(default = "AnalysisRequest::default_tables")]
    pub tables: Vec<String>,
    /// Additional free-form filters forwarded to the backend.
    #[serde(default)]
    pub filters: serde_json::Map<String, serde_json::Value>,
}

impl AnalysisRequest {
    /// The tables the backend analyzes when none are named.
    pub fn default_tables() -> Vec<String> {
        vec![
            "returns".to_string(),
            "warranties".to_string(),
            "products".to_string(),
        ]
    }

    /// Request covering the given range over the default tables.
    pub fn for_range(range: DateRange) -> Self {
        Self {
            date_range_start: range.start,
            date_range_end: range.end,
            tables: Self::default_tables(),
            filters: serde_json::Map::new(),
        }
    }
}

/// Acknowledgement returned when an analysis is started.
///
/// The server answers with `status: "started"`, which is not a job lifecycle
/// status, so this stays a plain string.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReceipt {
    pub job_id: String,
    pub status: String,
}

/// A generated report available for download.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportInfo {
    pub file_path: String,
    pub file_name: String,
    pub size_bytes: u64,
    #[serde(with = "lenient_utc")]
    pub created_at: DateTime<Utc>,
    pub download_url: String,
}

/// Acknowledgement for an uploaded data file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadReceipt {
    pub filename: String,
    pub size: u64,
    pub path: String,
}

/// Envelope for `GET /api/v1/analysis/jobs`.
#[derive(Debug, Deserialize)]
pub(crate) struct JobListEnvelope {
    pub jobs: Vec<Job>,
}

/// Envelope for `GET /api/v1/reports`.
#[derive(Debug, Deserialize)]
pub(crate) struct ReportListEnvelope {
    pub reports: Vec<ReportInfo>,
}

/// Accepts `2025-06-01T10:00:00Z`, `2025-06-01T10:00:00+02:00` and the naive
/// `2025-06-01T10:00:00.123456`; naive values are taken as UTC.
mod lenient_utc {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(dt: &DateTime<Utc>, ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_str(&dt.to_rfc3339())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(de)?;
        parse(&raw).map_err(serde::de::Error::custom)
    }

    pub(super) fn parse(raw: &str) -> Result<DateTime<Utc>, String> {
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Ok(dt.with_timezone(&Utc));
        }
        raw.parse::<NaiveDateTime>()
            .map(|naive| naive.and_utc())
            .map_err(|e| format!("unparseable timestamp {:?}: {}", raw, e))
    }
}

mod lenient_utc_opt {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        dt: &Option<DateTime<Utc>>,
        ser: S,
    ) -> Result<S::Ok, S::Error> {
        match dt {
            Some(dt) => ser.serialize_some(&dt.to_rfc3339()),
            None => ser.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        de: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        let raw = Option::<String>::deserialize(de)?;
        match raw {
            Some(raw) => super::lenient_utc::parse(&raw)
                .map(Some)
                .map_err(serde::de::Error::custom),
            None => Ok(None),
        }
    }
}
