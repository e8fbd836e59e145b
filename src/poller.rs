//! Generic repeating-fetch primitive.
//!
//! A [`Poller`] owns one background task that invokes a fetch operation
//! immediately and then on every interval tick, publishing the latest settled
//! result into a shared [`PollState`]. Three contracts matter to consumers:
//!
//! - **Stale-on-error**: a failed fetch records an error string but never
//!   clears the previous good value.
//! - **Conditional stop**: an optional `keep_polling` predicate, evaluated
//!   after each successful fetch, ends the scheduled loop without killing the
//!   poller — a manual [`Poller::refresh`] is still honored.
//! - **Generation guard**: [`Poller::stop`] bumps an epoch so a fetch that
//!   settles late cannot resurrect state after cancellation.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::error::ApiError;

type FetchFn<T> = Arc<dyn Fn() -> BoxFuture<'static, Result<T, ApiError>> + Send + Sync>;
type KeepFn<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;

/// Snapshot of a poller's observable state.
#[derive(Debug, Clone)]
pub struct PollState<T> {
    /// Most recently *settled* successful value. Retained across failures.
    pub value: Option<T>,
    /// Error from the most recent fetch, cleared on the next success.
    pub error: Option<String>,
    /// True while at least one fetch is outstanding. A manual refresh can
    /// overlap a scheduled fetch, so this tracks the count, not one fetch.
    pub loading: bool,
    /// When `value` was last replaced.
    pub last_updated: Option<DateTime<Utc>>,
}

impl<T> Default for PollState<T> {
    fn default() -> Self {
        Self {
            value: None,
            error: None,
            loading: false,
            last_updated: None,
        }
    }
}

struct PollCell<T> {
    state: RwLock<PollState<T>>,
    /// Bumped on `stop()`; in-flight fetches from an older generation are
    /// discarded when they settle.
    epoch: AtomicU64,
    /// Outstanding fetches; `loading` is derived from this so a refresh
    /// settling first cannot clear it while a scheduled fetch is in flight.
    in_flight: AtomicUsize,
    stopped: AtomicBool,
}

enum FetchOutcome {
    /// Result applied; the predicate wants more scheduled ticks.
    Continue,
    /// Result applied; the predicate ended the schedule.
    PolicyStop,
    /// Fetch failed; error recorded, previous value retained.
    Errored,
    /// A newer generation took over while this fetch was in flight.
    Stale,
}

/// A repeating fetch with a lifecycle tied to this handle.
///
/// Dropping the poller aborts its background task.
pub struct Poller<T> {
    cell: Arc<PollCell<T>>,
    fetch: FetchFn<T>,
    handle: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl<T: Clone + Send + Sync + 'static> Poller<T> {
    /// Start polling unconditionally at `interval`.
    pub fn spawn<F, Fut>(fetch: F, interval: Duration) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<T, ApiError>> + Send + 'static,
    {
        Self::spawn_while(fetch, interval, |_| true)
    }

    /// Start polling at `interval` for as long as `keep_polling` approves the
    /// latest successful value. Once it returns false no further scheduled
    /// tick is issued, but [`Poller::refresh`] still works.
    pub fn spawn_while<F, Fut, K>(fetch: F, interval: Duration, keep_polling: K) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<T, ApiError>> + Send + 'static,
        K: Fn(&T) -> bool + Send + Sync + 'static,
    {
        let fetch: FetchFn<T> = Arc::new(move || fetch().boxed());
        let keep: KeepFn<T> = Arc::new(keep_polling);

        let cell = Arc::new(PollCell {
            state: RwLock::new(PollState::default()),
            epoch: AtomicU64::new(0),
            in_flight: AtomicUsize::new(0),
            stopped: AtomicBool::new(false),
        });

        let loop_cell = Arc::clone(&cell);
        let loop_fetch = Arc::clone(&fetch);
        let generation = cell.epoch.load(Ordering::SeqCst);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                // First tick fires immediately; later ticks wait out the
                // interval. The fetch is awaited inside the loop, so two
                // scheduled fetches never overlap.
                ticker.tick().await;

                if loop_cell.epoch.load(Ordering::SeqCst) != generation {
                    break;
                }

                match run_fetch(&loop_cell, &loop_fetch, Some(&keep), generation).await {
                    FetchOutcome::Continue | FetchOutcome::Errored => {}
                    FetchOutcome::PolicyStop => {
                        tracing::debug!("Poll schedule ended by policy");
                        break;
                    }
                    FetchOutcome::Stale => break,
                }
            }
        });

        Self {
            cell,
            fetch,
            handle: std::sync::Mutex::new(Some(handle)),
        }
    }

    /// One immediate out-of-band fetch. Its result is canonical unless the
    /// poller is stopped while it is in flight. No-op after [`Poller::stop`].
    pub async fn refresh(&self) {
        if self.cell.stopped.load(Ordering::SeqCst) {
            return;
        }
        let generation = self.cell.epoch.load(Ordering::SeqCst);
        run_fetch(&self.cell, &self.fetch, None, generation).await;
    }

    /// Cancel future ticks and invalidate any in-flight fetch. Idempotent;
    /// every operation on this poller is a no-op afterwards.
    pub fn stop(&self) {
        self.cell.stopped.store(true, Ordering::SeqCst);
        self.cell.epoch.fetch_add(1, Ordering::SeqCst);
        if let Some(handle) = self.handle.lock().expect("poller handle lock").take() {
            handle.abort();
        }
    }

    /// Cloned snapshot of the current poll state.
    pub async fn state(&self) -> PollState<T> {
        self.cell.state.read().await.clone()
    }

    /// Most recently settled value, if any.
    pub async fn value(&self) -> Option<T> {
        self.cell.state.read().await.value.clone()
    }

    /// Error from the most recent fetch, if it failed.
    pub async fn error(&self) -> Option<String> {
        self.cell.state.read().await.error.clone()
    }
}

impl<T> Drop for Poller<T> {
    fn drop(&mut self) {
        self.cell.stopped.store(true, Ordering::SeqCst);
        self.cell.epoch.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut guard) = self.handle.lock() {
            if let Some(handle) = guard.take() {
                handle.abort();
            }
        }
    }
}

/// Run one guarded fetch and publish its outcome.
async fn run_fetch<T: Clone>(
    cell: &PollCell<T>,
    fetch: &FetchFn<T>,
    keep: Option<&KeepFn<T>>,
    generation: u64,
) -> FetchOutcome {
    {
        let mut state = cell.state.write().await;
        if cell.epoch.load(Ordering::SeqCst) != generation {
            return FetchOutcome::Stale;
        }
        cell.in_flight.fetch_add(1, Ordering::SeqCst);
        state.loading = true;
    }

    let result = fetch().await;

    let mut state = cell.state.write().await;
    let outstanding = cell.in_flight.fetch_sub(1, Ordering::SeqCst) - 1;
    if cell.epoch.load(Ordering::SeqCst) != generation {
        // Stopped (or superseded) while in flight; leave state untouched.
        return FetchOutcome::Stale;
    }
    state.loading = outstanding > 0;

    match result {
        Ok(value) => {
            let more = keep.map(|k| k(&value)).unwrap_or(true);
            state.value = Some(value);
            state.error = None;
            state.last_updated = Some(Utc::now());
            if more {
                FetchOutcome::Continue
            } else {
                FetchOutcome::PolicyStop
            }
        }
        Err(err) => {
            tracing::debug!("Poll fetch failed: {}", err);
            state.error = Some(err.to_string());
            FetchOutcome::Errored
        }
    }
}
