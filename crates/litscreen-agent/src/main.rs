//! litscreen: two-stage LLM screening of a web-text corpus.
//! Entry point for the command-line binary.

mod cli;
mod config;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use litscreen_common::{ScreeningStage, StageConfig};
use litscreen_db::{CsvLedger, JsonlRecordStore};
use litscreen_llm::{build_registry, BackendRegistry, ClaimClassifier, LlmClaimClassifier};
use litscreen_pipeline::{Pipeline, RunSummary};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};

fn build_classifier(
    registry: &BackendRegistry,
    stage: ScreeningStage,
    cfg: &StageConfig,
    timeout: Duration,
) -> anyhow::Result<Arc<dyn ClaimClassifier>> {
    let backend = registry
        .get(&cfg.backend)
        .with_context(|| format!("{stage} cannot be screened"))?;
    let classifier = LlmClaimClassifier::new(backend)
        .with_model(cfg.model.clone())
        .with_max_tokens(cfg.max_output_tokens)
        .with_temperature(cfg.temperature)
        .with_timeout(timeout);
    info!(%stage, backend = %cfg.backend, model = classifier.model_name(), "Classifier ready");
    Ok(Arc::new(classifier))
}

/// Attach classifiers for `stages`. Only commands that call an LLM need
/// provider keys.
fn with_classifiers(
    mut pipeline: Pipeline,
    config: &config::Config,
    stages: &[ScreeningStage],
) -> anyhow::Result<Pipeline> {
    let registry = build_registry(config.backend_configs());
    info!("LLM backends registered: {}", registry.registered_backends().join(", "));

    let timeout = Duration::from_secs(config.screening.execution.request_timeout_secs);
    for &stage in stages {
        let classifier = build_classifier(&registry, stage, config.screening.stage(stage), timeout)?;
        pipeline = pipeline.with_classifier(stage, classifier);
    }
    Ok(pipeline)
}

fn print_summary(summary: &RunSummary, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(summary)?);
    } else {
        print!("{summary}");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                EnvFilter::new("litscreen_agent=debug,litscreen_pipeline=debug,info")
            }),
        )
        .init();

    let cli = Cli::parse();
    info!("litscreen {} starting", env!("CARGO_PKG_VERSION"));

    let config = config::Config::load(&cli.config)?;
    info!(config = %cli.config.display(), "Configuration loaded");

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received; finishing in-flight work and stopping");
                cancel.cancel();
            }
        });
    }

    let work_dir = &config.screening.execution.work_dir;
    let store = Arc::new(
        JsonlRecordStore::open(work_dir)
            .await
            .with_context(|| format!("cannot open record store at {}", work_dir.display()))?,
    );
    let ledger = Arc::new(CsvLedger::new(&config.screening.ledger.path));
    let pipeline = Pipeline::new(config.screening.clone(), store, ledger, cancel.clone());

    let summary = match cli.command {
        Commands::Filter => {
            let stats = pipeline.run_filter().await?;
            info!(
                documents = stats.documents_read,
                duplicates = stats.duplicates_skipped,
                dual = stats.dual_matched,
                "Filter finished"
            );
            pipeline.summary(None).await?
        }
        Commands::Screen { stage } => {
            let pipeline = with_classifiers(pipeline, &config, &[stage])?;
            let report = pipeline.run_stage(stage).await?;
            if report.cancelled {
                warn!(%stage, screened = report.screened, "Stage interrupted; rerun to resume");
            }
            pipeline.summary(None).await?
        }
        Commands::Export => {
            let export = pipeline.export().await?;
            pipeline.summary(Some(export)).await?
        }
        Commands::Run => {
            let pipeline =
                with_classifiers(pipeline, &config, &[ScreeningStage::One, ScreeningStage::Two])?;
            pipeline.run_all().await?
        }
        Commands::Summary => pipeline.summary(None).await?,
    };

    print_summary(&summary, cli.json)?;

    if cancel.is_cancelled() {
        warn!("Run was interrupted; completed verdicts are kept and a rerun resumes from them");
    }
    Ok(())
}
