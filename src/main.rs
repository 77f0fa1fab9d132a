//! Podcast generator: binary entrypoint.
//! Loads config, wires the pipeline and runs one CLI command.

mod cli;

use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use podcast_generator::config::AppConfig;
use podcast_generator::output::save_episode;
use podcast_generator::research::providers::{build_sources, http_client};
use podcast_generator::research::{ResearchOrchestrator, SourceSet};
use podcast_generator::script::research_digest;
use podcast_generator::PodcastPipeline;

use crate::cli::{Cli, Commands};

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("podcast_generator=info,warn"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().compact()).init();
    }
}

fn sources_for(cfg: &AppConfig) -> Result<SourceSet> {
    let source_timeout = Duration::from_secs(cfg.research.source_timeout_secs);
    let client = http_client(source_timeout)?;
    Ok(build_sources(&cfg.sources, &client, source_timeout)?)
}

/// Cancel `token` on the first Ctrl-C.
fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, cancelling");
            token.cancel();
        }
    });
}

async fn run(cli: Cli) -> Result<()> {
    let cfg = AppConfig::load(cli.config.as_deref())?;
    let sources = sources_for(&cfg)?;
    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());

    match cli.command {
        Commands::Generate {
            topic,
            duration,
            output_dir,
        } => {
            let minutes = duration.unwrap_or(cfg.script.default_duration_minutes);
            let pipeline = PodcastPipeline::from_config(&cfg).context("building pipeline")?;
            let episode = pipeline
                .generate(&topic, minutes, &sources, &cancel)
                .await?;
            let dir = output_dir.unwrap_or_else(|| cfg.output.dir.clone());
            let saved = save_episode(&episode, &dir)?;

            println!("Episode:   {}", episode.topic);
            println!(
                "Duration:  {:.1} min ({} words)",
                episode.duration_seconds / 60.0,
                episode.word_count
            );
            if let Some(dev) = episode.deviation {
                println!(
                    "Note:      script is {} words, outside the {}-{} target band",
                    dev.word_count, dev.lower, dev.upper
                );
            }
            println!("Sources:   {}", episode.sources_used.len());
            println!("Audio:     {}", saved.audio_path.display());
            println!("Metadata:  {}", saved.metadata_path.display());
        }
        Commands::Research { topic } => {
            let orchestrator = ResearchOrchestrator::new(cfg.research_settings());
            let items = orchestrator.research(&topic, &sources, &cancel).await?;
            print!("{}", research_digest(&items));
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env if present; no-op otherwise.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
