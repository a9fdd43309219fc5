use std::sync::Arc;

use anyhow::Context;

use mail_sorter::classifier::Classifier;
use mail_sorter::config::AppConfig;
use mail_sorter::extract::FileExtractor;
use mail_sorter::normalize::Normalizer;
use mail_sorter::pipeline::MessageProcessor;
use mail_sorter::routes::{AppState, api_routes};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = AppConfig::from_env().context("invalid configuration")?;
    tracing::info!(
        locale = %config.locale,
        model = %config.model,
        port = config.port,
        "Starting mail sorter"
    );

    let normalizer = Normalizer::from_config(&config).context("failed to build normalizer")?;

    // Model loading fetches and maps weights; keep it off the async workers.
    // A failed load leaves the classifier in its fail-closed state.
    let load_config = config.clone();
    let classifier = tokio::task::spawn_blocking(move || Classifier::load(&load_config))
        .await
        .context("model loader task failed")?;
    if !classifier.is_ready() {
        tracing::warn!("Serving without a model: every classification will report an error");
    }

    let processor = MessageProcessor::new(Arc::new(normalizer), Arc::new(classifier))
        .with_inference_timeout(config.inference_timeout);
    let state = AppState {
        processor: Arc::new(processor),
        extractor: Arc::new(FileExtractor),
    };
    let app = api_routes(state, config.max_upload_bytes);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port))
        .await
        .with_context(|| format!("failed to bind port {}", config.port))?;
    tracing::info!(port = config.port, "HTTP server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("Shutting down");
        })
        .await
        .context("server error")?;

    Ok(())
}
