//! Backend health store: one slow unconditional poll.

use std::sync::Arc;

use crate::api::{HealthSnapshot, HealthState, StatusApi};
use crate::config::PollSettings;
use crate::poller::{PollState, Poller};

/// Polled view of backend health at the slow cadence.
pub struct HealthStore {
    poller: Poller<HealthSnapshot>,
}

impl HealthStore {
    pub fn spawn(api: Arc<dyn StatusApi>, settings: PollSettings) -> Self {
        let poller = Poller::spawn(
            move || {
                let api = Arc::clone(&api);
                async move { api.health().await }
            },
            settings.health_interval,
        );
        Self { poller }
    }

    /// Last successful snapshot, stale or not.
    pub async fn snapshot(&self) -> Option<HealthSnapshot> {
        self.poller.value().await
    }

    /// Full poll state (value, error, loading).
    pub async fn state(&self) -> PollState<HealthSnapshot> {
        self.poller.state().await
    }

    /// Effective health: unreachable counts as unhealthy, and so does a
    /// snapshot that says so. Unknown until the first result arrives.
    pub async fn is_healthy(&self) -> Option<bool> {
        let state = self.poller.state().await;
        match (&state.value, &state.error) {
            (_, Some(_)) => Some(false),
            (Some(snapshot), None) => Some(snapshot.status == HealthState::Healthy),
            (None, None) => None,
        }
    }

    /// Immediate out-of-band health check.
    pub async fn refresh(&self) {
        self.poller.refresh().await;
    }

    pub fn stop(&self) {
        self.poller.stop();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use bytes::Bytes;
    use chrono::Utc;

    use super::*;
    use crate::api::{
        AnalysisReceipt, AnalysisRequest, Job, ReportInfo, UploadReceipt,
    };
    use crate::error::ApiError;

    struct FlakyHealthApi {
        calls: AtomicUsize,
        down: AtomicBool,
    }

    impl FlakyHealthApi {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                down: AtomicBool::new(false),
            }
        }
    }

    #[async_trait]
    impl StatusApi for FlakyHealthApi {
        async fn health(&self) -> Result<HealthSnapshot, ApiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.down.load(Ordering::SeqCst) {
                return Err(ApiError::RequestFailed {
                    reason: "connection refused".to_string(),
                });
            }
            Ok(HealthSnapshot {
                status: HealthState::Healthy,
                timestamp: Utc::now(),
                active_jobs: 2,
                completed_jobs: 7,
            })
        }

        async fn start_analysis(
            &self,
            _request: AnalysisRequest,
        ) -> Result<AnalysisReceipt, ApiError> {
            unimplemented!("not used by HealthStore tests")
        }

        async fn list_jobs(&self) -> Result<Vec<Job>, ApiError> {
            unimplemented!("not used by HealthStore tests")
        }

        async fn get_job_status(&self, _job_id: &str) -> Result<Job, ApiError> {
            unimplemented!("not used by HealthStore tests")
        }

        async fn list_reports(&self) -> Result<Vec<ReportInfo>, ApiError> {
            unimplemented!("not used by HealthStore tests")
        }

        async fn download_report(&self, _filename: &str) -> Result<Bytes, ApiError> {
            unimplemented!("not used by HealthStore tests")
        }

        async fn upload_file(
            &self,
            _filename: &str,
            _data: Bytes,
        ) -> Result<UploadReceipt, ApiError> {
            unimplemented!("not used by HealthStore tests")
        }
    }

    fn fast_settings() -> PollSettings {
        PollSettings {
            list_interval: Duration::from_secs(5),
            watch_interval: Duration::from_secs(2),
            health_interval: Duration::from_millis(20),
        }
    }

    #[tokio::test]
    async fn outage_keeps_last_snapshot_and_flips_health() {
        let api = Arc::new(FlakyHealthApi::new());
        let store = HealthStore::spawn(api.clone() as Arc<dyn StatusApi>, fast_settings());

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(store.is_healthy().await, Some(true));
        let before = store.snapshot().await.unwrap();

        api.down.store(true, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(store.is_healthy().await, Some(false));
        let state = store.state().await;
        assert_eq!(
            state.value.as_ref().map(|s| s.completed_jobs),
            Some(before.completed_jobs),
            "stale snapshot survives the outage"
        );
        assert!(state.error.unwrap().contains("connection refused"));

        // Recovery clears the error and resumes fresh snapshots.
        api.down.store(false, Ordering::SeqCst);
        store.refresh().await;
        assert_eq!(store.is_healthy().await, Some(true));
        assert!(store.state().await.error.is_none());

        store.stop();
    }

    #[tokio::test]
    async fn health_is_unknown_before_first_result() {
        let api = Arc::new(FlakyHealthApi::new());
        let store = HealthStore::spawn(
            api as Arc<dyn StatusApi>,
            PollSettings {
                health_interval: Duration::from_secs(60),
                ..fast_settings()
            },
        );
        // First tick is immediate but may not have settled yet; both unknown
        // and healthy are acceptable, unhealthy is not.
        assert_ne!(store.is_healthy().await, Some(false));
        store.stop();
    }
}
