//! Voice gateway entry point.

use metrics_exporter_prometheus::PrometheusBuilder;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};
use voice_gateway_config::{load_settings, Settings};
use voice_gateway_server::{create_router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = load_settings().unwrap_or_else(|err| {
        eprintln!("warning: failed to load settings ({err}), using defaults");
        Settings::default()
    });

    init_tracing(&settings);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting voice gateway");

    let metrics_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("installing the Prometheus recorder only fails if one is already installed");

    let addr = settings.server.ws_addr.clone();
    let state = AppState::new(settings, metrics_handle)?;
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("shutdown complete");
    Ok(())
}

fn init_tracing(settings: &Settings) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| settings.log_filter.clone().into());

    let fmt_layer = if std::env::var("VOICE_LOG_JSON").is_ok() {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received Ctrl+C, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}
