use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use fieldops_domain::{today_utc, DashboardSummary, JobExtraction};
use fieldops_engine::{EngineConfig, Orchestrator};
use fieldops_intake::{
    validate_transcript, Extractor, HttpIntakeConfig, HttpJsonTranscriber, HttpLlmExtractor,
    Transcriber,
};
use fieldops_store::JobStore;
use fieldops_store_sqlite::SqliteJobStore;
use time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "fieldops")]
#[command(about = "Voice-driven field service bookkeeping with auditable runs")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Create the database schema and load the seed inventory catalogue.
    Init(InitArgs),
    /// Run the full pipeline for one voice note and print the run result.
    Process(ProcessArgs),
    /// Print the dashboard overview.
    Dashboard(DbArgs),
    /// List recent jobs as JSON lines.
    Jobs(DbArgs),
    /// List the inventory as JSON lines.
    Inventory(DbArgs),
    /// List pending follow-ups over the next year as JSON lines.
    Followups(DbArgs),
}

#[derive(Debug, Args)]
struct InitArgs {
    #[arg(long)]
    db: PathBuf,
    #[arg(long, default_value_t = false)]
    skip_seed: bool,
}

#[derive(Debug, Args)]
struct DbArgs {
    #[arg(long)]
    db: PathBuf,
}

#[derive(Debug, Args)]
struct ProcessArgs {
    #[arg(long)]
    db: PathBuf,
    /// Path to a ready-made extraction JSON (skips transcription and
    /// extraction entirely).
    #[arg(long)]
    extraction: Option<PathBuf>,
    /// Transcript text to extract from.
    #[arg(long)]
    transcript: Option<String>,
    /// Path to a file holding the transcript text.
    #[arg(long)]
    transcript_file: Option<PathBuf>,
    /// Path to an audio clip to transcribe and extract from.
    #[arg(long)]
    audio: Option<PathBuf>,
    #[arg(long)]
    labor_rate: Option<f64>,
    #[arg(long)]
    low_stock_threshold: Option<i64>,
    #[arg(long, default_value_t = false)]
    pretty: bool,
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Init(args) => init_command(&args),
        Commands::Process(args) => process_command(&args),
        Commands::Dashboard(args) => dashboard_command(&args),
        Commands::Jobs(args) => jobs_command(&args),
        Commands::Inventory(args) => inventory_command(&args),
        Commands::Followups(args) => followups_command(&args),
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // Logs go to stderr so stdout stays parseable JSON.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn open_store(path: &Path) -> Result<SqliteJobStore> {
    let store = SqliteJobStore::open(path)?;
    store.migrate()?;
    Ok(store)
}

fn init_command(args: &InitArgs) -> Result<()> {
    let store = open_store(&args.db)?;
    if args.skip_seed {
        println!("database ready at {} (seed skipped)", args.db.display());
        return Ok(());
    }
    let (added, skipped) = store.seed_inventory()?;
    println!(
        "database ready at {}; inventory seeded: {added} added, {skipped} already existed",
        args.db.display()
    );
    Ok(())
}

fn process_command(args: &ProcessArgs) -> Result<()> {
    let mut config = EngineConfig::from_env()?;
    if let Some(rate) = args.labor_rate {
        config.labor_rate_per_hour = rate;
    }
    if let Some(threshold) = args.low_stock_threshold {
        config.low_stock_threshold = threshold;
    }

    let store = open_store(&args.db)?;
    let extraction = resolve_extraction(args)?;

    let result = Orchestrator::new(&store, &config).execute(&extraction)?;
    let encoded = if args.pretty {
        serde_json::to_string_pretty(&result)?
    } else {
        serde_json::to_string(&result)?
    };
    println!("{encoded}");
    Ok(())
}

/// Produce the extraction from whichever input was given. Upstream
/// collaborator failures (transcription, extraction) surface here as plain
/// errors; they never reach the orchestrator.
fn resolve_extraction(args: &ProcessArgs) -> Result<JobExtraction> {
    if let Some(path) = &args.extraction {
        let body = fs::read_to_string(path)
            .with_context(|| format!("failed to read extraction file {}", path.display()))?;
        let extraction: JobExtraction = serde_json::from_str(&body)
            .with_context(|| format!("invalid extraction JSON in {}", path.display()))?;
        extraction.validate()?;
        return Ok(extraction);
    }

    let transcript = if let Some(text) = &args.transcript {
        validate_transcript(text).map_err(|err| anyhow!(err))?
    } else if let Some(path) = &args.transcript_file {
        let body = fs::read_to_string(path)
            .with_context(|| format!("failed to read transcript file {}", path.display()))?;
        validate_transcript(&body).map_err(|err| anyhow!(err))?
    } else if let Some(path) = &args.audio {
        let audio = fs::read(path)
            .with_context(|| format!("failed to read audio file {}", path.display()))?;
        let transcriber = HttpJsonTranscriber::new(HttpIntakeConfig::from_env());
        transcriber
            .transcribe(&audio, mime_for(path))
            .map_err(|err| anyhow!(err))
            .context("transcription failed")?
    } else {
        return Err(anyhow!(
            "provide one of --extraction, --transcript, --transcript-file, or --audio"
        ));
    };

    info!(%transcript, "extracting job data from transcript");
    let extractor = HttpLlmExtractor::new(HttpIntakeConfig::from_env());
    extractor
        .extract(&transcript)
        .map_err(|err| anyhow!(err))
        .context("extraction failed")
}

fn mime_for(path: &Path) -> &'static str {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("wav") => "audio/wav",
        Some("mp3") => "audio/mpeg",
        Some("m4a") => "audio/mp4",
        Some("ogg") => "audio/ogg",
        _ => "audio/webm",
    }
}

fn dashboard_command(args: &DbArgs) -> Result<()> {
    let config = EngineConfig::from_env()?;
    let store = open_store(&args.db)?;
    let today = today_utc();

    let summary = DashboardSummary {
        total_jobs_today: store.jobs_logged_on(today)?,
        total_revenue_today: store.revenue_on(today)?,
        total_revenue_week: store.revenue_since(today.saturating_sub(Duration::days(7)))?,
        total_revenue_month: store.revenue_since(today.saturating_sub(Duration::days(30)))?,
        low_stock_items: store.low_stock_below(config.low_stock_threshold)?,
        upcoming_followups: store
            .pending_follow_ups_through(today.saturating_add(Duration::days(7)))?,
        recent_jobs: store.recent_jobs(10)?,
    };

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn jobs_command(args: &DbArgs) -> Result<()> {
    let store = open_store(&args.db)?;
    for job in store.recent_jobs(50)? {
        println!("{}", serde_json::to_string(&job)?);
    }
    Ok(())
}

fn inventory_command(args: &DbArgs) -> Result<()> {
    let store = open_store(&args.db)?;
    for item in store.list_inventory()? {
        println!("{}", serde_json::to_string(&item)?);
    }
    Ok(())
}

fn followups_command(args: &DbArgs) -> Result<()> {
    let store = open_store(&args.db)?;
    let horizon = today_utc().saturating_add(Duration::days(365));
    for follow_up in store.pending_follow_ups_through(horizon)? {
        println!("{}", serde_json::to_string(&follow_up)?);
    }
    Ok(())
}
