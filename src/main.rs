use std::sync::Arc;

use tokio::net::TcpListener;
use tracing_subscriber::{fmt, EnvFilter};
use visit_ingest::{
    analytics::AnalyticsHook, build_app, config::Config, db::Database, media::CloudinaryClient,
    AppState,
};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    if json {
        fmt().json().with_env_filter(filter).init();
    } else {
        fmt().with_env_filter(filter).init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {e}");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => tracing::error!("Failed to listen for SIGTERM: {e}"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("shutting down");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = Config::from_env()?;

    let db = Database::from_url(&config.database_url)?;
    if config.run_migrations {
        db.migrate().await?;
    }

    let media = CloudinaryClient::new(&config.cloudinary)?;
    tracing::info!(
        cloud_name = %config.cloudinary.cloud_name,
        folder = %config.cloudinary.folder,
        timeout_secs = config.cloudinary.timeout.as_secs(),
        "media host configured"
    );

    let analytics = config
        .server
        .analytics_url
        .clone()
        .map(AnalyticsHook::new)
        .transpose()?;
    if analytics.is_some() {
        tracing::info!("analytics hook enabled");
    }

    let state = AppState {
        db,
        media: Arc::new(media),
    };
    let app = build_app(state, config.server.max_upload_bytes, analytics);

    let addr = config.server.bind_addr;
    let listener = TcpListener::bind(addr).await?;

    tracing::info!("listening on {}", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}
