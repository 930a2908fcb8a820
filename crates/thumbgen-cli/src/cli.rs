//! CLI for the thumbgen conversion pipeline.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use thumbgen_core::cache::SkipCache;
use thumbgen_core::config::Config;
use thumbgen_core::control::ShutdownToken;
use thumbgen_core::convert::Converter;
use thumbgen_core::input::InputStorage;
use thumbgen_core::output::OutputStorage;
use thumbgen_core::scheduler::{self, RunOutcome};

/// Exit code when the run was cancelled by a shutdown signal (128 + SIGINT).
const EXIT_CANCELLED: u8 = 130;

/// Top-level CLI for the thumbgen conversion pipeline.
#[derive(Debug, Parser)]
#[command(name = "thumbgen")]
#[command(about = "Incremental image conversion pipeline", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Run one conversion pass over the configured input.
    Run {
        /// Path to the configuration file.
        #[arg(short = 'c', long, value_name = "FILE")]
        config: PathBuf,
        /// Convert every file regardless of provenance or skip cache.
        #[arg(long)]
        force_rewrite: bool,
    },

    /// Load and validate a configuration file, then exit.
    CheckConfig {
        /// Path to the configuration file.
        #[arg(short = 'c', long, value_name = "FILE")]
        config: PathBuf,
    },
}

pub async fn run_from_args() -> Result<ExitCode> {
    let cli = Cli::parse();
    match cli.command {
        CliCommand::Run {
            config,
            force_rewrite,
        } => run_pipeline(&config, force_rewrite).await,
        CliCommand::CheckConfig { config } => {
            Config::load(&config)?;
            println!("configuration ok: {}", config.display());
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn run_pipeline(config_path: &Path, force_rewrite_flag: bool) -> Result<ExitCode> {
    let cfg = Config::load(config_path)?;
    tracing::debug!("loaded config: {:?}", cfg);

    let input = Arc::new(InputStorage::from_config(&cfg.input).context("initialize input storage")?);
    let output =
        Arc::new(OutputStorage::from_config(&cfg.output.storage).context("initialize output storage")?);
    let converters: Vec<Converter> = cfg
        .converters
        .iter()
        .map(Converter::from_config)
        .collect::<Result<_>>()
        .context("initialize converters")?;
    let converters = Arc::new(converters);

    let cache = Arc::new(match &cfg.cache {
        Some(cache_cfg) => SkipCache::load(&cache_cfg.path).context("load skip cache")?,
        None => SkipCache::in_memory(),
    });

    let token = ShutdownToken::new();
    spawn_signal_listener(token.clone());

    let force_rewrite = cfg.force_rewrite || force_rewrite_flag;
    let report = scheduler::run(
        input,
        output,
        converters,
        Arc::clone(&cache),
        &cfg.limits,
        force_rewrite,
        token,
    )
    .await?;

    match report.outcome {
        RunOutcome::Completed => Ok(ExitCode::SUCCESS),
        RunOutcome::Cancelled => Ok(ExitCode::from(EXIT_CANCELLED)),
    }
}

/// Cancel the token on SIGINT (and SIGTERM on Unix). In-flight conversions
/// finish and the skip cache is flushed before the process exits.
fn spawn_signal_listener(token: ShutdownToken) {
    tokio::spawn(async move {
        wait_for_signal().await;
        tracing::info!("shutdown signal received, winding down");
        token.cancel();
    });
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = term.recv() => {}
            }
        }
        Err(e) => {
            tracing::warn!("failed to install SIGTERM handler: {}", e);
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
