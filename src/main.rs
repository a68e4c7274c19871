use anyhow::Context;
use clap::Parser;
use std::sync::Arc;
use tracing::{info, warn};

use speech_grading_gateway::config::Args;
use speech_grading_gateway::db::SqliteStore;
use speech_grading_gateway::models::{Accent, GradingMode};
use speech_grading_gateway::recordings::{RecordingArchive, retention_sweeper};
use speech_grading_gateway::scorer::HttpScoringClient;
use speech_grading_gateway::{AppState, GradingGateway, build_router};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // parse cli arguments
    let args = Args::parse();
    args.validate()?;

    let store = SqliteStore::open(&args.database)
        .await
        .with_context(|| format!("opening result database {}", args.database.display()))?;

    let endpoints = args.endpoints();
    for mode in [GradingMode::Scripted, GradingMode::Unscripted, GradingMode::Pronunciation] {
        if endpoints.url_for(mode, &Accent::default()).is_err() {
            warn!("No scoring URL for {} grading, those requests will fail", mode);
        }
    }

    let client = HttpScoringClient::new(
        reqwest::Client::new(),
        endpoints,
        args.api_key.clone(),
        args.beta_features,
    );
    let gateway = GradingGateway::new(Arc::new(store), Arc::new(client));
    let mut state = AppState::new(gateway, args.instance_host.clone());

    if let Some(dir) = &args.audio_dir {
        let archive = Arc::new(RecordingArchive::open(dir).await?);
        match args.retention() {
            Some(retention) => {
                // spawn the retention sweeper
                tokio::spawn(retention_sweeper(
                    archive.clone(),
                    retention,
                    args.cleanup_interval(),
                ));
            }
            None => info!("Recording retention disabled, recordings are kept forever"),
        }
        state = state.with_archive(archive);
    }

    let app = build_router(Arc::new(state));

    let addr = format!("0.0.0.0:{}", args.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;

    info!("Gateway running on http://localhost:{}", args.port);
    info!("Instance host: {}", args.instance_host);
    info!("Result cache: {}", args.database.display());

    axum::serve(listener, app).await?;
    Ok(())
}
