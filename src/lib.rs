use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub mod error;
pub mod fetcher;
pub mod handlers;
pub mod labels;
pub mod model;
pub mod preprocess;
pub mod utils;

use fetcher::RemoteImageFetcher;
use model::Classifier;

/// Built once at startup and only read afterwards.
#[derive(Clone)]
pub struct AppState {
    pub classifier: Arc<dyn Classifier>,
    pub fetcher: RemoteImageFetcher,
}

pub fn app(state: AppState, body_limit_bytes: usize) -> Router {
    Router::new()
        .route("/predict", post(handlers::predict_handler))
        .route("/predict-url", post(handlers::predict_url_handler))
        .route("/validate-url", post(handlers::validate_url_handler))
        .route("/health", get(handlers::health_check))
        .layer(DefaultBodyLimit::max(body_limit_bytes))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
