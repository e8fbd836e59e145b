//! Job store: polled views of the server's job list and one watched job.
//!
//! Two deliberately different polling policies live here. The list poll is
//! unconditional — it ticks every five seconds for the store's lifetime even
//! when every job is terminal (the asymmetry is intentional and preserved).
//! The watch poll is conditional: once a poll observes the watched job in a
//! terminal status, no further scheduled tick is issued for that id; only a
//! manual refresh can fetch it again.

use std::sync::Arc;

use crate::api::{AnalysisReceipt, AnalysisRequest, Job, StatusApi};
use crate::config::PollSettings;
use crate::error::ApiError;
use crate::poller::{PollState, Poller};

struct WatchEntry {
    job_id: String,
    poller: Poller<Job>,
}

/// Polled store of jobs known to the backend.
///
/// Dropping the store stops both pollers (scoped acquisition, guaranteed
/// release).
pub struct JobStore {
    api: Arc<dyn StatusApi>,
    settings: PollSettings,
    list: Poller<Vec<Job>>,
    watch: std::sync::RwLock<Option<Arc<WatchEntry>>>,
}

impl JobStore {
    /// Start the unconditional list poll immediately.
    pub fn spawn(api: Arc<dyn StatusApi>, settings: PollSettings) -> Self {
        let list_api = Arc::clone(&api);
        let list = Poller::spawn(
            move || {
                let api = Arc::clone(&list_api);
                async move { api.list_jobs().await }
            },
            settings.list_interval,
        );

        Self {
            api,
            settings,
            list,
            watch: std::sync::RwLock::new(None),
        }
    }

    /// Last successfully fetched job set (empty before the first success).
    pub async fn jobs(&self) -> Vec<Job> {
        self.list.value().await.unwrap_or_default()
    }

    /// Full poll state of the list (value, error, loading).
    pub async fn list_state(&self) -> PollState<Vec<Job>> {
        self.list.state().await
    }

    /// One immediate out-of-band list fetch.
    pub async fn refresh_list(&self) {
        self.list.refresh().await;
    }

    /// Watch one job at the conditional cadence, replacing any previous
    /// watch. Scheduled polling ends on its own once the job is observed
    /// terminal.
    pub fn watch(&self, job_id: impl Into<String>) {
        let job_id = job_id.into();
        let api = Arc::clone(&self.api);
        let fetch_id = job_id.clone();

        let poller = Poller::spawn_while(
            move || {
                let api = Arc::clone(&api);
                let job_id = fetch_id.clone();
                async move { api.get_job_status(&job_id).await }
            },
            self.settings.watch_interval,
            |job: &Job| job.status.is_active(),
        );

        let entry = Arc::new(WatchEntry { job_id, poller });
        let previous = self
            .watch
            .write()
            .expect("watch lock")
            .replace(entry);
        if let Some(previous) = previous {
            previous.poller.stop();
        }
    }

    /// Stop watching without replacing.
    pub fn unwatch(&self) {
        if let Some(entry) = self.watch.write().expect("watch lock").take() {
            entry.poller.stop();
        }
    }

    /// Id of the currently watched job.
    pub fn watched_id(&self) -> Option<String> {
        self.watch
            .read()
            .expect("watch lock")
            .as_ref()
            .map(|e| e.job_id.clone())
    }

    /// Latest observation of the watched job.
    pub async fn watched(&self) -> Option<Job> {
        let entry = self.watch.read().expect("watch lock").clone();
        match entry {
            Some(entry) => entry.poller.value().await,
            None => None,
        }
    }

    /// Full poll state of the watched job, if one is watched.
    pub async fn watch_state(&self) -> Option<PollState<Job>> {
        let entry = self.watch.read().expect("watch lock").clone();
        match entry {
            Some(entry) => Some(entry.poller.state().await),
            None => None,
        }
    }

    /// Manual refresh of the watched job; works even after the conditional
    /// poll has ended.
    pub async fn refresh_watched(&self) {
        let entry = self.watch.read().expect("watch lock").clone();
        if let Some(entry) = entry {
            entry.poller.refresh().await;
        }
    }

    /// Forward a start-analysis request. Creates a server-side resource, so
    /// this is never retried here on ambiguous failure.
    pub async fn start_analysis(
        &self,
        request: AnalysisRequest,
    ) -> Result<AnalysisReceipt, ApiError> {
        self.api.start_analysis(request).await
    }

    /// Stop all polling. The store remains readable.
    pub fn stop(&self) {
        self.list.stop();
        self.unwatch();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use bytes::Bytes;
    use chrono::Utc;

    use super::*;
    use crate::api::{HealthSnapshot, JobStatus, ReportInfo, UploadReceipt};

    /// Stub API: a fixed job that turns terminal after a set number of
    /// status polls, plus call counters.
    struct ScriptedApi {
        list_calls: AtomicUsize,
        status_calls: AtomicUsize,
        /// Number of status polls that still report `running`.
        running_polls: usize,
        fail_list: std::sync::atomic::AtomicBool,
    }

    impl ScriptedApi {
        fn new(running_polls: usize) -> Self {
            Self {
                list_calls: AtomicUsize::new(0),
                status_calls: AtomicUsize::new(0),
                running_polls,
                fail_list: std::sync::atomic::AtomicBool::new(false),
            }
        }

        fn job(&self, id: &str, status: JobStatus) -> Job {
            Job {
                job_id: id.to_string(),
                status,
                progress: if status.is_terminal() { 1.0 } else { 0.5 },
                message: "scripted".to_string(),
                started_at: Utc::now(),
                completed_at: status.is_terminal().then(Utc::now),
                error: None,
            }
        }
    }

    #[async_trait]
    impl StatusApi for ScriptedApi {
        async fn health(&self) -> Result<HealthSnapshot, ApiError> {
            unimplemented!("not used by JobStore tests")
        }

        async fn start_analysis(
            &self,
            _request: AnalysisRequest,
        ) -> Result<AnalysisReceipt, ApiError> {
            Ok(AnalysisReceipt {
                job_id: "job-1".to_string(),
                status: "started".to_string(),
            })
        }

        async fn list_jobs(&self) -> Result<Vec<Job>, ApiError> {
            self.list_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_list.load(Ordering::SeqCst) {
                return Err(ApiError::RequestFailed {
                    reason: "list down".to_string(),
                });
            }
            Ok(vec![self.job("job-1", JobStatus::Running)])
        }

        async fn get_job_status(&self, job_id: &str) -> Result<Job, ApiError> {
            if job_id != "job-1" {
                return Err(ApiError::NotFound {
                    resource: format!("job {}", job_id),
                });
            }
            let n = self.status_calls.fetch_add(1, Ordering::SeqCst);
            let status = if n + 1 < self.running_polls {
                JobStatus::Running
            } else {
                JobStatus::Completed
            };
            Ok(self.job(job_id, status))
        }

        async fn list_reports(&self) -> Result<Vec<ReportInfo>, ApiError> {
            Ok(vec![])
        }

        async fn download_report(&self, _filename: &str) -> Result<Bytes, ApiError> {
            Ok(Bytes::new())
        }

        async fn upload_file(
            &self,
            _filename: &str,
            _data: Bytes,
        ) -> Result<UploadReceipt, ApiError> {
            unimplemented!("not used by JobStore tests")
        }
    }

    fn fast_settings() -> PollSettings {
        PollSettings {
            list_interval: Duration::from_millis(20),
            watch_interval: Duration::from_millis(10),
            health_interval: Duration::from_secs(30),
        }
    }

    #[tokio::test]
    async fn watch_stops_after_terminal_observation() {
        let api = Arc::new(ScriptedApi::new(3));
        let store = JobStore::spawn(api.clone() as Arc<dyn StatusApi>, fast_settings());

        store.watch("job-1");
        tokio::time::sleep(Duration::from_millis(150)).await;

        let polls = api.status_calls.load(Ordering::SeqCst);
        assert_eq!(
            polls, 3,
            "exactly the polls up to and including the terminal one"
        );
        assert_eq!(
            store.watched().await.unwrap().status,
            JobStatus::Completed
        );

        // No tick follows the terminal observation.
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(api.status_calls.load(Ordering::SeqCst), polls);

        // Manual refresh is still honored.
        store.refresh_watched().await;
        assert_eq!(api.status_calls.load(Ordering::SeqCst), polls + 1);
    }

    #[tokio::test]
    async fn list_polls_unconditionally() {
        let api = Arc::new(ScriptedApi::new(1));
        let store = JobStore::spawn(api.clone() as Arc<dyn StatusApi>, fast_settings());

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(
            api.list_calls.load(Ordering::SeqCst) >= 3,
            "list keeps polling regardless of job state"
        );
        assert_eq!(store.jobs().await.len(), 1);
    }

    #[tokio::test]
    async fn list_failure_retains_previous_jobs() {
        let api = Arc::new(ScriptedApi::new(1));
        let store = JobStore::spawn(api.clone() as Arc<dyn StatusApi>, fast_settings());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(store.jobs().await.len(), 1);

        api.fail_list.store(true, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(60)).await;

        let state = store.list_state().await;
        assert_eq!(
            state.value.as_ref().map(Vec::len),
            Some(1),
            "stale job set survives listing failures"
        );
        assert!(state.error.is_some());
    }

    #[tokio::test]
    async fn not_found_watch_leaves_list_untouched() {
        let api = Arc::new(ScriptedApi::new(1));
        let store = JobStore::spawn(api.clone() as Arc<dyn StatusApi>, fast_settings());
        tokio::time::sleep(Duration::from_millis(50)).await;

        store.watch("unknown-id");
        tokio::time::sleep(Duration::from_millis(40)).await;

        let watch_state = store.watch_state().await.unwrap();
        assert!(watch_state.value.is_none());
        assert!(watch_state.error.unwrap().contains("not found"));

        // The failing watch never disturbs the job list.
        assert_eq!(store.jobs().await.len(), 1);
    }

    #[tokio::test]
    async fn rewatching_replaces_the_previous_poller() {
        let api = Arc::new(ScriptedApi::new(usize::MAX));
        let store = JobStore::spawn(api.clone() as Arc<dyn StatusApi>, fast_settings());

        store.watch("job-1");
        tokio::time::sleep(Duration::from_millis(35)).await;
        store.watch("job-1");
        assert_eq!(store.watched_id().as_deref(), Some("job-1"));

        store.stop();
        let calls = api.status_calls.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(
            api.status_calls.load(Ordering::SeqCst),
            calls,
            "stop() ends all watch polling"
        );
    }
}
