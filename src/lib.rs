pub mod analytics;
pub mod config;
pub mod db;
pub mod error;
pub mod media;
pub mod models;
pub mod routes;

use std::sync::Arc;

use axum::{extract::DefaultBodyLimit, middleware, routing::get, Router};
use tower::ServiceBuilder;
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::CorsLayer,
    trace::{DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::analytics::AnalyticsHook;
use crate::db::Database;
use crate::media::MediaHost;

#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub media: Arc<dyn MediaHost>,
}

async fn health() -> &'static str {
    "ok"
}

/// Build the full Axum application router.
///
/// Caller is responsible for running database migrations beforehand. The
/// analytics middleware is only installed when a hook is given.
pub fn build_app(
    state: AppState,
    max_upload_bytes: usize,
    analytics: Option<AnalyticsHook>,
) -> Router {
    let mut router = Router::new()
        .route("/health", get(health))
        .merge(routes::visits::router());

    if let Some(hook) = analytics {
        router = router.layer(middleware::from_fn_with_state(
            hook,
            crate::analytics::track_requests,
        ));
    }

    router
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(
            ServiceBuilder::new()
                .layer(
                    TraceLayer::new_for_http()
                        .on_request(DefaultOnRequest::new().level(Level::INFO))
                        .on_response(DefaultOnResponse::new().level(Level::INFO)),
                )
                .layer(CatchPanicLayer::custom(error::panic_response))
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}
