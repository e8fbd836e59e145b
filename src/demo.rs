//! Demo driver: walks the pipeline end-to-end without a backend.
//!
//! Used when no live event stream exists. The run is a spawned task that
//! drives the shared [`PipelineMonitor`] through every stage in order,
//! emitting the same transitions a live pipeline would. The task is
//! cancellable between steps: an explicit [`DemoDriver::stop`], a monitor
//! `reset()` (observed via the run generation) or any transition error ends
//! the run without further state mutation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::activity::MessageDetail;
use crate::api::AnalysisRequest;
use crate::config::DemoSettings;
use crate::error::DemoError;
use crate::pipeline::PipelineMonitor;

/// Simulated progress checkpoints within each stage.
const PROGRESS_STEPS: [f64; 4] = [0.25, 0.5, 0.75, 1.0];

/// Drives a simulated pipeline run against a shared monitor.
pub struct DemoDriver {
    monitor: Arc<PipelineMonitor>,
    step_delay: Duration,
    running: Arc<AtomicBool>,
    cancel_tx: std::sync::Mutex<Option<watch::Sender<bool>>>,
    handle: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl DemoDriver {
    pub fn new(monitor: Arc<PipelineMonitor>, settings: &DemoSettings) -> Self {
        Self {
            monitor,
            step_delay: settings.step_delay,
            running: Arc::new(AtomicBool::new(false)),
            cancel_tx: std::sync::Mutex::new(None),
            handle: std::sync::Mutex::new(None),
        }
    }

    /// Start a run. Rejected while another run from this driver is active;
    /// callers wanting a fresh run must `stop()` (or let the run finish) and
    /// `reset()` the monitor first.
    pub fn start(&self) -> Result<(), DemoError> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(DemoError::AlreadyRunning);
        }

        let (cancel_tx, cancel_rx) = watch::channel(false);
        *self.cancel_tx.lock().expect("demo cancel lock") = Some(cancel_tx);

        let monitor = Arc::clone(&self.monitor);
        let running = Arc::clone(&self.running);
        let step_delay = self.step_delay;

        let handle = tokio::spawn(async move {
            run_demo(monitor, step_delay, cancel_rx).await;
            running.store(false, Ordering::SeqCst);
        });
        *self.handle.lock().expect("demo handle lock") = Some(handle);

        tracing::info!("Demo run started");
        Ok(())
    }

    /// Whether a run from this driver is currently active.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Signal cancellation and wait for the run task to exit. No state is
    /// mutated after this returns. Idempotent.
    pub async fn stop(&self) {
        if let Some(tx) = self.cancel_tx.lock().expect("demo cancel lock").take() {
            let _ = tx.send(true);
        }
        self.wait().await;
    }

    /// Wait for the current run (if any) to finish.
    pub async fn wait(&self) {
        let handle = self.handle.lock().expect("demo handle lock").take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}

/// The run body: strictly sequential stage walk.
///
/// Transitions go through a run-bound writer, so a `reset()` racing with any
/// step is rejected inside the monitor's lock rather than mutating the fresh
/// pipeline.
async fn run_demo(
    monitor: Arc<PipelineMonitor>,
    step_delay: Duration,
    mut cancel_rx: watch::Receiver<bool>,
) {
    let writer = monitor.run_writer();
    let stages = monitor.stages().await;

    for stage in &stages {
        if writer.begin(&stage.id).await.is_err() {
            // Rejected: reset mid-run, or a live source owns the pipeline.
            // Stop touching it.
            return;
        }

        for progress in PROGRESS_STEPS {
            tokio::select! {
                _ = tokio::time::sleep(step_delay) => {}
                _ = cancel_rx.changed() => {
                    tracing::debug!("Demo run cancelled");
                    return;
                }
            }

            if writer.advance(&stage.id, progress).await.is_err() {
                return;
            }
        }

        if writer
            .complete(&stage.id, Some(stage_detail(&stage.id)))
            .await
            .is_err()
        {
            return;
        }
    }

    tracing::info!("Demo run finished");
}

/// Plausible per-stage completion metadata for the simulated run.
fn stage_detail(stage_id: &str) -> MessageDetail {
    match stage_id {
        "initialization" => MessageDetail::RunConfigured {
            tables: AnalysisRequest::default_tables(),
        },
        "data_fetch" => MessageDetail::DataFetched {
            tables: AnalysisRequest::default_tables(),
            rows: 12_847,
        },
        "normalization" => MessageDetail::Normalized {
            rows_in: 12_847,
            rows_out: 12_102,
        },
        "rag_processing" => MessageDetail::InsightsGenerated { insights: 14 },
        "report_generation" => MessageDetail::ReportWritten {
            path: "output/reports/retail_analysis.xlsx".to_string(),
            worksheets: vec![
                "Summary".to_string(),
                "Returns".to_string(),
                "Warranties".to_string(),
            ],
        },
        "dashboard_ready" => MessageDetail::DashboardPublished {
            url: "/dashboard".to_string(),
        },
        other => MessageDetail::Unstructured {
            data: serde_json::json!({ "stage": other }),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::MessageLevel;
    use crate::pipeline::StageStatus;

    fn fast_settings() -> DemoSettings {
        DemoSettings {
            step_delay: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn full_run_completes_every_stage() {
        let monitor = PipelineMonitor::shared();
        let driver = DemoDriver::new(Arc::clone(&monitor), &fast_settings());

        driver.start().unwrap();
        driver.wait().await;

        assert_eq!(monitor.overall_progress().await, 1.0);
        for stage in monitor.stages().await {
            assert_eq!(stage.status, StageStatus::Completed, "stage {}", stage.id);
        }

        // Six start + six completion messages, alternating per stage.
        let messages = monitor.messages().await;
        assert_eq!(messages.len(), 12);
        for pair in messages.chunks(2) {
            assert_eq!(pair[0].level, MessageLevel::Info);
            assert_eq!(pair[1].level, MessageLevel::Success);
            assert_eq!(pair[0].agent, pair[1].agent);
            assert!(pair[1].detail.is_some());
        }

        for agent in monitor.agents().await {
            assert_eq!(agent.completed_tasks, 1, "agent {}", agent.agent);
            assert_eq!(agent.failed_tasks, 0);
        }

        assert!(!driver.is_running());
    }

    #[tokio::test]
    async fn second_start_while_running_is_rejected() {
        let monitor = PipelineMonitor::shared();
        let driver = DemoDriver::new(
            Arc::clone(&monitor),
            &DemoSettings {
                step_delay: Duration::from_millis(50),
            },
        );

        driver.start().unwrap();
        assert_eq!(driver.start().unwrap_err(), DemoError::AlreadyRunning);

        driver.stop().await;
    }

    #[tokio::test]
    async fn restart_after_reset_is_allowed() {
        let monitor = PipelineMonitor::shared();
        let driver = DemoDriver::new(Arc::clone(&monitor), &fast_settings());

        driver.start().unwrap();
        driver.wait().await;
        monitor.reset().await;

        driver.start().unwrap();
        driver.wait().await;
        assert_eq!(monitor.overall_progress().await, 1.0);
    }

    #[tokio::test]
    async fn stop_halts_mutation_mid_run() {
        let monitor = PipelineMonitor::shared();
        let driver = DemoDriver::new(
            Arc::clone(&monitor),
            &DemoSettings {
                step_delay: Duration::from_millis(30),
            },
        );

        driver.start().unwrap();
        tokio::time::sleep(Duration::from_millis(45)).await;
        driver.stop().await;

        let progress = monitor.overall_progress().await;
        assert!(progress < 1.0, "run must not have finished");

        // Nothing moves after stop.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(monitor.overall_progress().await, progress);
        assert!(!driver.is_running());
    }

    #[tokio::test]
    async fn reset_during_run_leaves_pipeline_startable() {
        let monitor = PipelineMonitor::shared();
        let driver = DemoDriver::new(
            Arc::clone(&monitor),
            &DemoSettings {
                step_delay: Duration::from_millis(10),
            },
        );

        driver.start().unwrap();
        tokio::time::sleep(Duration::from_millis(15)).await;
        monitor.reset().await;
        driver.wait().await;

        // The interrupted run left no stage stuck in running, so a fresh run
        // goes all the way through.
        assert!(monitor.current_stage().await.is_none());
        let driver = DemoDriver::new(Arc::clone(&monitor), &fast_settings());
        driver.start().unwrap();
        driver.wait().await;
        assert_eq!(monitor.overall_progress().await, 1.0);
    }

    #[tokio::test]
    async fn reset_mid_run_stops_the_task_without_stale_writes() {
        let monitor = PipelineMonitor::shared();
        let driver = DemoDriver::new(
            Arc::clone(&monitor),
            &DemoSettings {
                step_delay: Duration::from_millis(20),
            },
        );

        driver.start().unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        monitor.reset().await;
        driver.wait().await;

        // The reset pipeline stays pristine; the dead run wrote nothing more.
        for stage in monitor.stages().await {
            assert_eq!(stage.status, StageStatus::Pending);
        }
        assert_eq!(monitor.overall_progress().await, 0.0);
    }
}
