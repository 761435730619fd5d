// Entity Risk Scoring - CLI
// init-db | index | score | process | show

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use entity_risk_scoring::{
    score_in_parallel, AffectedEntitiesMessage, AppConfig, CliOverrides, EntityDocument,
    FailurePolicy, JsonDirEntitySource, ProcessSummary, ProgressObserver, ProgressReporter,
    RiskScoringService, ScoringRules, SqliteStore,
};
use std::fs;
use std::io::{self, BufRead, BufReader};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "risk-scorer")]
#[command(version, about = "Risk posture classification for resolved entities")]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, env = "RISK_SCORER_CONFIG")]
    config: Option<PathBuf>,

    /// SQLite database path
    #[arg(long)]
    database: Option<PathBuf>,

    /// Directory of <entity_id>.json resolved-entity snapshots
    #[arg(long)]
    entity_dir: Option<PathBuf>,

    /// Engine configuration export (G2_CONFIG)
    #[arg(long)]
    engine_config: Option<PathBuf>,

    #[arg(long)]
    lens: Option<i64>,

    /// Comma-separated trusted data sources
    #[arg(long)]
    trusted_sources: Option<String>,

    /// Query risk criteria, e.g. "+NAME+DOB:R;+NAME+ADDRESS:Y"
    #[arg(long)]
    criteria: Option<String>,

    /// What a fetch or lookup failure does: abort or skip
    #[arg(long)]
    on_collaborator_failure: Option<FailurePolicy>,

    /// Debug logging (RUST_LOG takes precedence)
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create the score and feature index tables
    InitDb,

    /// Load entity documents into the shared-feature index
    Index {
        /// Resolved-entity JSON files
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Score entities by id
    Score {
        #[arg(required = true)]
        ids: Vec<i64>,

        #[arg(short, long)]
        workers: Option<usize>,
    },

    /// Process affected-entities messages, one JSON object per line ("-" for stdin)
    Process {
        input: String,

        #[arg(short, long)]
        workers: Option<usize>,
    },

    /// Print the stored score of an entity
    Show { id: i64 },
}

impl Cli {
    fn overrides(&self) -> CliOverrides {
        let workers = match &self.command {
            Command::Score { workers, .. } | Command::Process { workers, .. } => *workers,
            _ => None,
        };

        CliOverrides {
            database: self.database.clone(),
            entity_dir: self.entity_dir.clone(),
            engine_config: self.engine_config.clone(),
            lens_id: self.lens,
            trusted_sources: self.trusted_sources.clone(),
            query_risk_criteria: self.criteria.clone(),
            collaborator_failure: self.on_collaborator_failure,
            workers,
            bind: None,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = AppConfig::load(cli.config.as_deref(), Some(&cli.overrides()))
        .context("Failed to load configuration")?;

    match &cli.command {
        Command::InitDb => run_init_db(&config),
        Command::Index { files } => run_index(&config, files),
        Command::Score { ids, .. } => run_score(&config, ids),
        Command::Process { input, .. } => run_process(&config, input),
        Command::Show { id } => run_show(&config, *id),
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();
}

// ============================================================================
// Commands
// ============================================================================

fn run_init_db(config: &AppConfig) -> Result<()> {
    SqliteStore::open(&config.database)
        .with_context(|| format!("Failed to initialize {}", config.database.display()))?;
    println!("✓ Database initialized with WAL mode: {}", config.database.display());
    Ok(())
}

fn run_index(config: &AppConfig, files: &[PathBuf]) -> Result<()> {
    let store = SqliteStore::open(&config.database)?;
    let mut indexed = 0;

    for file in files {
        let content = fs::read_to_string(file)
            .with_context(|| format!("Failed to read {}", file.display()))?;
        let doc = EntityDocument::from_json(&content)
            .with_context(|| format!("Invalid entity document {}", file.display()))?;
        indexed += store.index_entity_features(config.lens_id, &doc)?;
    }

    println!("✓ Indexed {} features from {} entities", indexed, files.len());
    Ok(())
}

fn run_score(config: &AppConfig, ids: &[i64]) -> Result<()> {
    let summary = score_entities(config, ids)?;
    print_summary(&summary);
    Ok(())
}

fn run_process(config: &AppConfig, input: &str) -> Result<()> {
    let reader: Box<dyn BufRead> = if input == "-" {
        Box::new(BufReader::new(io::stdin()))
    } else {
        let file = fs::File::open(input).with_context(|| format!("Failed to open {}", input))?;
        Box::new(BufReader::new(file))
    };

    let mut ids = Vec::new();
    for (line_number, line) in reader.lines().enumerate() {
        let line = line.context("Failed to read message")?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<AffectedEntitiesMessage>(&line) {
            Ok(message) => ids.extend(message.entity_ids()),
            Err(e) => warn!(line = line_number + 1, error = %e, "Ignoring malformed message"),
        }
    }

    info!(entities = ids.len(), "Collected affected entities");
    let summary = score_entities(config, &ids)?;
    print_summary(&summary);
    Ok(())
}

fn run_show(config: &AppConfig, id: i64) -> Result<()> {
    let store = SqliteStore::open(&config.database)?;
    let Some(record) = store.get_score(id, config.lens_id)? else {
        bail!("No risk score stored for entity {} (lens {})", id, config.lens_id);
    };
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}

// ============================================================================
// Helpers
// ============================================================================

fn score_entities(config: &AppConfig, ids: &[i64]) -> Result<ProcessSummary> {
    let rules = Arc::new(ScoringRules::from_config(config).context("Failed to load scoring rules")?);
    let progress: Arc<dyn ProgressObserver> =
        Arc::new(ProgressReporter::new(config.progress_interval));

    let summary = score_in_parallel(ids, config.workers, || {
        let store = SqliteStore::open(&config.database)?;
        Ok(RiskScoringService::new(
            rules.clone(),
            JsonDirEntitySource::new(&config.entity_dir),
            store,
        )
        .with_lens(config.lens_id)
        .with_failure_policy(config.collaborator_failure)
        .with_progress(progress.clone()))
    })?;

    Ok(summary)
}

fn print_summary(summary: &ProcessSummary) {
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("✓ Scored:  {}", summary.scored);
    println!("✓ Deleted: {}", summary.deleted);
    if summary.skipped > 0 {
        println!("⚠️  Skipped: {}", summary.skipped);
    }
}
