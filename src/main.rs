use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use leaf_disease_service::{
    app,
    fetcher::{FetchLimits, RemoteImageFetcher},
    labels::Label,
    model::TfModel,
    utils::{ensure_model_exists, ServiceConfig},
    AppState,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "leaf_disease_service=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServiceConfig::from_env()?;

    ensure_model_exists(&config.model_path, config.model_url.as_deref()).await?;

    let model = TfModel::load(&config.model_path, &config.input_op, &config.output_op)
        .with_context(|| format!("failed to load model from {}", config.model_path.display()))?;
    tracing::info!(
        path = %config.model_path.display(),
        labels = Label::COUNT,
        "model loaded"
    );

    let state = AppState {
        classifier: Arc::new(model),
        fetcher: RemoteImageFetcher::new(FetchLimits::default())?,
    };

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Listening on http://{}", addr);
    axum::Server::bind(&addr)
        .serve(app(state, config.body_limit_bytes).into_make_service())
        .await?;

    Ok(())
}
