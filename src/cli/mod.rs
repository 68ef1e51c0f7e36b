//! Command-line interface for meetflow.
//!
//! Provides the long-running service, one-shot cycles for an account,
//! per-folder status, and snapshot history.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tokio::sync::watch;
use tracing::info;

use crate::adapters::{
    FfmpegTranscoder, HttpSummarizer, NotionClient, Notifier, TelegramNotifier, WhisperEngine,
};
use crate::config::{self, ResolvedConfig};
use crate::core::{
    ArtifactScanner, ContentCache, CycleRunner, PipelineSettings, ProcessLock, RetryExecutor,
    Scheduler, SnapshotStore, StagePipeline,
};
use crate::domain::CycleKind;

/// meetflow - Meeting pipeline orchestrator
#[derive(Parser, Debug)]
#[command(name = "meetflow")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Cycle kind selector for one-shot runs
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum CycleKindArg {
    /// Discovery and calendar refresh only
    Fast,
    /// Full stage chain
    Slow,
}

impl From<CycleKindArg> for CycleKind {
    fn from(arg: CycleKindArg) -> Self {
        match arg {
            CycleKindArg::Fast => CycleKind::Fast,
            CycleKindArg::Slow => CycleKind::Slow,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the scheduled service until interrupted
    Serve,

    /// Run one cycle immediately and exit
    Run {
        /// Account to run (all enabled accounts if not given)
        #[arg(short, long)]
        account: Option<String>,

        /// Which cycle to run
        #[arg(short, long, value_enum, default_value = "slow")]
        kind: CycleKindArg,
    },

    /// Show per-folder processing status for an account
    Status {
        /// Account name
        account: String,
    },

    /// Show recent cycle snapshots for an account
    History {
        /// Account name
        account: String,

        /// Maximum number of snapshots to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Show resolved configuration (debug)
    Config,
}

impl Cli {
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Serve => serve().await,
            Commands::Run { account, kind } => run_once(account, kind.into()).await,
            Commands::Status { account } => show_status(&account).await,
            Commands::History { account, limit } => show_history(&account, limit).await,
            Commands::Config => show_config(),
        }
    }
}

/// Build the shared pipeline and one runner per enabled account
async fn build_runners(config: &ResolvedConfig) -> Result<Vec<Arc<CycleRunner>>> {
    let cache = Arc::new(
        ContentCache::open(config.records_path())
            .await
            .context("Failed to open stage record cache")?,
    );
    let snapshots = Arc::new(
        SnapshotStore::open(config.snapshots_dir())
            .await
            .context("Failed to open snapshot store")?,
    );

    let transcoder = Arc::new(FfmpegTranscoder::new(
        config.transcode.max_concurrent,
        Duration::from_secs(config.transcode.timeout_seconds),
    ));
    let transcriber = Arc::new(WhisperEngine::new(
        config.transcription.model.clone(),
        Duration::from_secs(config.transcription.timeout_seconds),
    ));

    let summarizer_cfg = config
        .summarizer
        .as_ref()
        .context("Summarizer is not configured")?;
    let api_key = summarizer_cfg
        .api_key
        .clone()
        .context("Summarizer API key missing (set SUMMARIZER_API_KEY)")?;
    let summarizer = Arc::new(HttpSummarizer::new(summarizer_cfg.endpoint.clone(), api_key));

    let notion_cfg = config.notion.as_ref().context("Notion is not configured")?;
    let token = notion_cfg
        .token
        .clone()
        .context("Notion token missing (set NOTION_TOKEN)")?;
    let notes = Arc::new(NotionClient::new(token, notion_cfg.database_id.clone()));

    let notifier: Option<Arc<dyn Notifier>> = config
        .telegram
        .clone()
        .map(|t| Arc::new(TelegramNotifier::from_config(t)) as Arc<dyn Notifier>);

    let pipeline = Arc::new(StagePipeline::new(
        cache,
        RetryExecutor::new(config.retry.clone()),
        transcoder,
        transcriber,
        summarizer,
        notes,
        PipelineSettings {
            quality: config.transcode.quality,
            audio_format: config.transcode.audio_format.clone(),
            language: config.transcription.language.clone(),
            model_profile: summarizer_cfg.model_profile.clone(),
        },
    ));

    let runners = config
        .accounts
        .iter()
        .map(|account| {
            let scanner = ArtifactScanner::new(&account.name, account.root.clone());
            let mut runner =
                CycleRunner::new(&account.name, scanner, pipeline.clone(), snapshots.clone());
            if let Some(notifier) = &notifier {
                runner = runner.with_notifier(notifier.clone());
            }
            Arc::new(runner)
        })
        .collect();

    Ok(runners)
}

/// Run the service: process lock, scheduler, ctrl-c shutdown
async fn serve() -> Result<()> {
    let config = config::config()?;
    let _lock = ProcessLock::acquire(&config.lock_path())?;

    let runners = build_runners(config).await?;
    let scheduler = Scheduler::new(runners, config.schedule.clone());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, shutting down");
            let _ = shutdown_tx.send(true);
        }
    });

    scheduler.run(shutdown_rx).await
}

/// Run one cycle for one or all accounts, then exit
async fn run_once(account: Option<String>, kind: CycleKind) -> Result<()> {
    let config = config::config()?;
    let _lock = ProcessLock::acquire(&config.lock_path())?;

    let runners = build_runners(config).await?;
    let selected: Vec<_> = match &account {
        Some(name) => {
            let matched: Vec<_> = runners
                .into_iter()
                .filter(|r| r.account() == name)
                .collect();
            if matched.is_empty() {
                anyhow::bail!("Unknown account: {name}");
            }
            matched
        }
        None => runners,
    };

    for runner in selected {
        let (snapshot, report) = runner.run_cycle(kind).await?;
        println!(
            "{} cycle {}: {} succeeded, {} failed, {} new error(s)",
            runner.account(),
            snapshot.cycle_id,
            snapshot.total_succeeded(),
            snapshot.total_failed(),
            report.new_errors.len()
        );
    }

    Ok(())
}

/// Print per-folder derived status for an account
async fn show_status(account: &str) -> Result<()> {
    let config = config::config()?;
    let resolved = config
        .accounts
        .iter()
        .find(|a| a.name == account)
        .with_context(|| format!("Unknown account: {account}"))?;

    let cache = ContentCache::open(config.records_path())
        .await
        .context("Failed to open stage record cache")?;

    let scan = ArtifactScanner::new(account, resolved.root.clone()).scan();
    if scan.folders.is_empty() {
        println!("No meeting folders under {}", resolved.root.display());
        return Ok(());
    }

    println!("{:<40} {:<16} {}", "FOLDER", "STATUS", "STAGES");
    for folder in &scan.folders {
        let completed = cache.completed_stages(&folder.key()).await;
        let status = crate::domain::FolderStatus::from_progress(completed);
        println!("{:<40} {:<16} {}/6", folder.display_name, status, completed);
    }

    for failure in &scan.errors {
        println!("! unreadable: {} ({})", failure.path.display(), failure.message);
    }

    Ok(())
}

/// Print recent snapshots for an account, newest first
async fn show_history(account: &str, limit: usize) -> Result<()> {
    let config = config::config()?;
    let snapshots = SnapshotStore::open(config.snapshots_dir())
        .await
        .context("Failed to open snapshot store")?;

    let history = snapshots.history(account, limit).await?;
    if history.is_empty() {
        println!("No cycles recorded for {account}");
        return Ok(());
    }

    println!(
        "{:<8} {:<6} {:<24} {:>9} {:>7} {:>7}",
        "CYCLE", "KIND", "STARTED", "DURATION", "OK", "FAILED"
    );
    for snapshot in history {
        println!(
            "{:<8} {:<6} {:<24} {:>7}ms {:>7} {:>7}",
            snapshot.cycle_id,
            snapshot.kind,
            snapshot.started_at.format("%Y-%m-%d %H:%M:%S"),
            snapshot.duration_ms,
            snapshot.total_succeeded(),
            snapshot.total_failed()
        );
        for error in &snapshot.errors {
            println!("    ! {}: {}", error.signature.artifact, error.message);
        }
    }

    Ok(())
}

/// Print resolved configuration
fn show_config() -> Result<()> {
    let config = config::config()?;

    println!("home:      {}", config.home.display());
    if let Some(path) = &config.config_file {
        println!("config:    {}", path.display());
    }
    println!(
        "schedule:  fast {}s / slow {}s",
        config.schedule.fast_interval_secs, config.schedule.slow_interval_secs
    );
    println!("accounts:");
    for account in &config.accounts {
        println!("  {:<12} {}", account.name, account.root.display());
    }
    println!(
        "adapters:  summarizer={} notion={} telegram={}",
        config.summarizer.is_some(),
        config.notion.is_some(),
        config.telegram.is_some()
    );

    Ok(())
}
