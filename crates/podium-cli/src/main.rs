use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Result;
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use podium_sync::{run_audit, run_process, run_sync_from_env, PipelineConfig, SyncError};
use tracing::error;
use tracing_subscriber::EnvFilter;

const FAILURE_EXIT: u8 = 2;

#[derive(Debug, Parser)]
#[command(name = "podium")]
#[command(about = "Reconcile athlete snapshots into one dataset and replicate it")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Build the dataset and health report from the raw batch and vintages.
    Process(ProcessArgs),
    /// Replicate a written dataset into the remote store.
    Sync(SyncArgs),
    /// Process, then sync when the success-rate gate passes.
    Run {
        #[command(flatten)]
        process: ProcessArgs,
        #[arg(long)]
        source: Option<String>,
        #[arg(long)]
        dry_run: bool,
    },
    /// Check a written dataset for sport counts and intra-day result order.
    Audit {
        #[arg(long)]
        data: Option<PathBuf>,
    },
}

#[derive(Debug, Default, Args)]
struct ProcessArgs {
    #[arg(long)]
    raw: Option<PathBuf>,
    #[arg(long)]
    vintages: Option<PathBuf>,
    #[arg(long)]
    output: Option<PathBuf>,
    #[arg(long)]
    health_output: Option<PathBuf>,
    #[arg(long)]
    min_success_rate: Option<f64>,
}

#[derive(Debug, Args)]
struct SyncArgs {
    #[arg(long)]
    data: Option<PathBuf>,
    #[arg(long)]
    health: Option<PathBuf>,
    #[arg(long)]
    source: Option<String>,
    #[arg(long)]
    dry_run: bool,
}

impl ProcessArgs {
    fn into_config(self) -> PipelineConfig {
        let mut config = PipelineConfig::from_env();
        if let Some(raw) = self.raw {
            config.raw_batch_path = raw;
        }
        if let Some(vintages) = self.vintages {
            config.vintages_path = vintages;
        }
        if let Some(output) = self.output {
            config.output_path = output;
        }
        if let Some(health) = self.health_output {
            config.health_output_path = health;
        }
        if let Some(rate) = self.min_success_rate {
            config.strict_min_success_rate = rate;
        }
        config
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .compact()
        .try_init();

    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Commands::Process(ProcessArgs::default()));

    match command {
        Commands::Process(args) => Ok(exit_code(process(&args.into_config()).await?)),
        Commands::Sync(args) => {
            let defaults = PipelineConfig::from_env();
            let data = args.data.unwrap_or(defaults.output_path);
            let health = args.health.unwrap_or(defaults.health_output_path);
            sync(&data, &health, args.source.as_deref(), args.dry_run).await
        }
        Commands::Run {
            process: args,
            source,
            dry_run,
        } => {
            let config = args.into_config();
            if !process(&config).await? {
                eprintln!("sync skipped: success-rate gate failed");
                return Ok(exit_code(false));
            }
            sync(
                &config.output_path,
                &config.health_output_path,
                source.as_deref(),
                dry_run,
            )
            .await
        }
        Commands::Audit { data } => {
            let data = data.unwrap_or_else(|| PipelineConfig::from_env().output_path);
            let report = run_audit(&data).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(exit_code(report.is_clean()))
        }
    }
}

fn exit_code(ok: bool) -> ExitCode {
    if ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(FAILURE_EXIT)
    }
}

/// Returns whether the success-rate gate passed.
async fn process(config: &PipelineConfig) -> Result<bool> {
    let summary = run_process(config, Utc::now()).await?;
    println!(
        "process complete: athletes={} success_rate={:.3} stale={} passed={} output={}",
        summary.athletes,
        summary.success_rate,
        summary.stale_athletes,
        summary.passed,
        summary.output_path.display()
    );
    Ok(summary.passed)
}

async fn sync(
    data: &Path,
    health: &Path,
    source: Option<&str>,
    dry_run: bool,
) -> Result<ExitCode> {
    match run_sync_from_env(data, health, source, dry_run, Utc::now()).await {
        Ok(outcome) => {
            let max_event_date = outcome
                .max_event_date
                .map(|d| d.to_string())
                .unwrap_or_else(|| "-".to_string());
            println!(
                "sync complete: sync_run_id={} athletes={} results={} max_event_date={}{}",
                outcome.sync_run_id,
                outcome.athletes,
                outcome.results,
                max_event_date,
                if dry_run { " (dry run)" } else { "" }
            );
            Ok(exit_code(true))
        }
        Err(err) if err.downcast_ref::<SyncError>().is_some() => {
            error!(error = %err, "sync aborted");
            eprintln!("sync failed: {err:#}");
            Ok(exit_code(false))
        }
        Err(err) => Err(err),
    }
}
