use anyhow::Result;
use clap::{Parser, Subcommand};
use log::{info, warn};
use pipeline::{ConfirmPolicy, Orchestrator, OrchestratorConfig};
use remote_api::{HttpBackend, HttpBackendConfig, RemixBackend};
use std::path::PathBuf;
use std::sync::Arc;
use storyboard::JobId;

#[derive(Parser)]
#[command(name = "remix-cli")]
#[command(about = "Content remix CLI - drive a source video through analysis, storyboard and render")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Backend base URL
    #[arg(long, global = true, default_value = "http://localhost:8700")]
    base_url: String,

    /// Bearer token for the backend
    #[arg(long, global = true, env = "REMIX_API_KEY")]
    api_key: Option<String>,

    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the whole pipeline on one source video
    Run {
        /// Source video to remix
        source: PathBuf,

        /// Skip entity view generation
        #[arg(long)]
        skip_views: bool,

        /// Revision instructions to apply before rendering (repeatable)
        #[arg(long = "revise")]
        revisions: Vec<String>,

        /// Render even if revised shots were not regenerated
        #[arg(long)]
        allow_dirty: bool,
    },

    /// Upload and analyze only; print the shot list as JSON
    Analyze {
        /// Source video to analyze
        source: PathBuf,

        /// Write the storyboard to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Check backend availability and, optionally, a job's stage statuses
    Status {
        /// Job id to query
        #[arg(long)]
        job: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let mut config = HttpBackendConfig::new(&cli.base_url);
    if let Some(key) = &cli.api_key {
        config = config.with_api_key(key);
    }
    let backend = Arc::new(HttpBackend::new(config)?);

    match cli.command {
        Commands::Run {
            source,
            skip_views,
            revisions,
            allow_dirty,
        } => run_command(backend, source, skip_views, revisions, allow_dirty).await,
        Commands::Analyze { source, output } => analyze_command(backend, source, output).await,
        Commands::Status { job } => status_command(backend, job).await,
    }
}

async fn run_command(
    backend: Arc<HttpBackend>,
    source: PathBuf,
    skip_views: bool,
    revisions: Vec<String>,
    allow_dirty: bool,
) -> Result<()> {
    let mut orchestrator = Orchestrator::new(backend, OrchestratorConfig::default());

    let job_id = orchestrator.upload(&source).await?;
    info!("Job {job_id} started for {:?}", source);

    let board = orchestrator.await_analysis().await?;
    info!("Analysis found {} shots", board.len());
    orchestrator.confirm_script()?;

    let entities = orchestrator.bind_identities().await?;
    info!("Resolved {} entities", entities.len());

    if skip_views {
        orchestrator.skip_views()?;
    } else {
        let ids: Vec<String> = orchestrator.entities().iter().map(|e| e.id.clone()).collect();
        for id in ids {
            info!("Generating reference views for {id}");
            if let Err(e) = orchestrator.generate_views(&id, false).await {
                warn!("View generation for {id} failed: {e}");
            }
        }
        orchestrator.confirm_views()?;
    }

    orchestrator.await_storyboard().await?;
    info!("Storyboard ready");

    for instruction in &revisions {
        let reply = orchestrator.revise(instruction).await?;
        println!("{reply}");
    }
    if !orchestrator.pending_regeneration().is_empty() {
        let count = orchestrator.regenerate_revised().await?;
        info!("Regenerated {count} revised shots");
    }

    let policy = if allow_dirty {
        ConfirmPolicy::AllowDirtyOverride
    } else {
        ConfirmPolicy::RequireClean
    };
    orchestrator.confirm_storyboard(policy)?;

    let output = orchestrator.render_video().await?;
    info!("Render complete");
    println!("{output}");

    Ok(())
}

async fn analyze_command(
    backend: Arc<HttpBackend>,
    source: PathBuf,
    output: Option<PathBuf>,
) -> Result<()> {
    let mut orchestrator = Orchestrator::new(backend, OrchestratorConfig::default());

    let job_id = orchestrator.upload(&source).await?;
    info!("Job {job_id} started for {:?}", source);
    let board = orchestrator.await_analysis().await?;

    let report = serde_json::json!({
        "jobId": job_id,
        "shots": board.shots,
        "analyzedAt": chrono::Utc::now().to_rfc3339(),
    });
    let pretty = serde_json::to_string_pretty(&report)?;
    if let Some(path) = output {
        std::fs::write(&path, pretty)?;
        info!("Storyboard written to {:?}", path);
    } else {
        println!("{pretty}");
    }

    Ok(())
}

async fn status_command(backend: Arc<HttpBackend>, job: Option<String>) -> Result<()> {
    if !backend.is_available().await {
        warn!("Backend is not reachable");
        return Err(anyhow::anyhow!("backend unavailable"));
    }
    println!("backend: ok");

    if let Some(job) = job {
        let report = backend.fetch_job_status(&JobId(job)).await?;
        let mut stages: Vec<_> = report.stage_statuses.iter().collect();
        stages.sort_by(|a, b| a.0.cmp(b.0));
        for (stage, status) in stages {
            println!("{stage}: {status:?}");
        }
    }

    Ok(())
}
