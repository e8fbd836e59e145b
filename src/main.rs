//! Command-line front end for the status layer.

use std::io::Write as _;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use pulseboard::api::{AnalysisRequest, DateRange};
use pulseboard::pipeline::TransitionKind;
use pulseboard::{
    DemoDriver, HealthStore, HttpStatusApi, JobStore, PipelineMonitor, Settings, StatusApi,
};

#[derive(Parser)]
#[command(name = "pulseboard", about = "Live status for the retail-analysis pipeline")]
struct Cli {
    /// Backend base URL (overrides PULSEBOARD_API_URL).
    #[arg(long, global = true)]
    api_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Check backend health once.
    Health,
    /// List known analysis jobs once.
    Jobs,
    /// Start an analysis run and print the job id.
    Start {
        /// Range start, YYYY-MM-DD.
        #[arg(long)]
        from: NaiveDate,
        /// Range end, YYYY-MM-DD.
        #[arg(long)]
        to: NaiveDate,
        /// Tables to analyze (defaults to returns, warranties, products).
        #[arg(long)]
        tables: Vec<String>,
    },
    /// Poll one job until it reaches a terminal status.
    Watch { job_id: String },
    /// List generated reports.
    Reports,
    /// Download one report to the current directory.
    Download { file_name: String },
    /// Run a simulated pipeline walk locally, printing live transitions.
    Demo,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .init();

    let cli = Cli::parse();
    let mut settings = Settings::from_env();
    if let Some(url) = cli.api_url {
        settings = settings.with_base_url(url);
    }

    match cli.command {
        Command::Health => health(&settings).await,
        Command::Jobs => jobs(&settings).await,
        Command::Start { from, to, tables } => start(&settings, from, to, tables).await,
        Command::Watch { job_id } => watch(&settings, job_id).await,
        Command::Reports => reports(&settings).await,
        Command::Download { file_name } => download(&settings, file_name).await,
        Command::Demo => demo(&settings).await,
    }
}

fn api(settings: &Settings) -> anyhow::Result<Arc<dyn StatusApi>> {
    let api = HttpStatusApi::new(&settings.api).context("building HTTP client")?;
    Ok(Arc::new(api))
}

async fn health(settings: &Settings) -> anyhow::Result<()> {
    let store = HealthStore::spawn(api(settings)?, settings.poll.clone());
    store.refresh().await;
    match store.state().await {
        state if state.error.is_some() => {
            anyhow::bail!("backend unreachable: {}", state.error.unwrap_or_default())
        }
        state => {
            let snapshot = state.value.context("no health snapshot")?;
            println!(
                "{} | active jobs: {} | completed jobs: {}",
                snapshot.status,
                snapshot.active_jobs,
                snapshot.completed_jobs
            );
            store.stop();
            Ok(())
        }
    }
}

async fn jobs(settings: &Settings) -> anyhow::Result<()> {
    let jobs = api(settings)?.list_jobs().await?;
    if jobs.is_empty() {
        println!("No jobs.");
        return Ok(());
    }
    for job in jobs {
        println!(
            "{}  {:>9}  {:>5.1}%  {}",
            job.job_id,
            job.status.to_string(),
            job.progress * 100.0,
            job.message
        );
    }
    Ok(())
}

async fn start(
    settings: &Settings,
    from: NaiveDate,
    to: NaiveDate,
    tables: Vec<String>,
) -> anyhow::Result<()> {
    let mut request = AnalysisRequest::for_range(DateRange { start: from, end: to });
    if !tables.is_empty() {
        request.tables = tables;
    }
    let receipt = api(settings)?.start_analysis(request).await?;
    println!("Job {} {}", receipt.job_id, receipt.status);
    Ok(())
}

async fn watch(settings: &Settings, job_id: String) -> anyhow::Result<()> {
    let store = JobStore::spawn(api(settings)?, settings.poll.clone());
    store.watch(job_id);

    loop {
        tokio::time::sleep(Duration::from_millis(250)).await;
        if let Some(state) = store.watch_state().await {
            if let Some(err) = &state.error {
                if watch_error_is_fatal(err) {
                    store.stop();
                    anyhow::bail!("watch failed: {}", err);
                }
                // Transient failure; the next scheduled poll retries and the
                // last good line stays on screen.
            }
            if let Some(job) = &state.value {
                print!(
                    "\r{}  {:>9}  {:>5.1}%  {}        ",
                    job.job_id,
                    job.status.to_string(),
                    job.progress * 100.0,
                    job.message
                );
                let _ = std::io::stdout().flush();
                if job.status.is_terminal() {
                    println!();
                    if let Some(err) = &job.error {
                        anyhow::bail!("job failed: {}", err);
                    }
                    break;
                }
            }
        }
    }
    store.stop();
    Ok(())
}

/// A missing job is final; transport and server errors are retried by the
/// next scheduled poll.
fn watch_error_is_fatal(error: &str) -> bool {
    error.ends_with("not found")
}

async fn reports(settings: &Settings) -> anyhow::Result<()> {
    let reports = api(settings)?.list_reports().await?;
    if reports.is_empty() {
        println!("No reports.");
        return Ok(());
    }
    for report in reports {
        println!(
            "{}  {:>10} bytes  {}",
            report.created_at.format("%Y-%m-%d %H:%M"),
            report.size_bytes,
            report.file_name
        );
    }
    Ok(())
}

async fn download(settings: &Settings, file_name: String) -> anyhow::Result<()> {
    let data = api(settings)?.download_report(&file_name).await?;
    tokio::fs::write(&file_name, &data)
        .await
        .with_context(|| format!("writing {}", file_name))?;
    println!("Wrote {} ({} bytes)", file_name, data.len());
    Ok(())
}

async fn demo(settings: &Settings) -> anyhow::Result<()> {
    let monitor = PipelineMonitor::shared();
    let mut events = monitor.subscribe();

    let driver = DemoDriver::new(Arc::clone(&monitor), &settings.demo);
    driver.start()?;

    while let Ok(event) = events.recv().await {
        match &event.kind {
            TransitionKind::Began => println!("▶ {} ({})", event.stage_name, event.agent),
            TransitionKind::Advanced { progress } => {
                println!("  {} {:>5.1}%", event.stage_name, progress * 100.0)
            }
            TransitionKind::Completed => println!("✓ {}", event.stage_name),
            TransitionKind::Failed { message } => {
                println!("✗ {}: {}", event.stage_name, message)
            }
            TransitionKind::Skipped { .. } => println!("- {} skipped", event.stage_name),
        }
        if monitor.is_finished().await {
            break;
        }
    }
    driver.wait().await;

    println!(
        "Overall progress: {:.0}%",
        monitor.overall_progress().await * 100.0
    );
    for agent in monitor.agents().await {
        println!(
            "{:<14} {:>8}  done {}  failed {}",
            agent.agent.display_name(),
            agent.status.to_string(),
            agent.completed_tasks,
            agent.failed_tasks
        );
    }
    Ok(())
}
