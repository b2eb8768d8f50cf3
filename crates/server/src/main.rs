use anyhow::Result;
use axum::serve;
use kiln_core::{config::AppConfig, runtime::KilnRuntime};
use server::router;
use std::sync::Arc;
use tokio::signal;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initializes logging from `RUST_LOG`, falling back to `logging.level` for the Kiln crates.
fn init_logging(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = &config.logging.level;
        EnvFilter::new(format!("warn,kiln_core={level},server={level},tower_http=warn"))
    });

    let registry = tracing_subscriber::registry().with(filter);

    if config.logging.format.as_str() == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .pretty()
            .with_file(true)
            .with_line_number(true)
            .with_target(false);
        registry.with(fmt_layer).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config =
        AppConfig::load().map_err(|e| anyhow::anyhow!("Configuration loading failed: {e}"))?;

    init_logging(&config);
    info!("Starting Kiln asset server");
    debug!(
        model_path = %config.resources.model_path,
        root_dir = %config.resources.root_dir,
        mount_prefix = config.mount_prefix(),
        metrics_enabled = config.metrics.enabled,
        "Configuration loaded"
    );

    let addr = config.socket_addr().map_err(|e| anyhow::anyhow!(e))?;
    let runtime = Arc::new(KilnRuntime::builder().with_config(config).build()?);

    // A broken model at startup is not fatal: requests report the cold start until a reload
    // succeeds.
    match runtime.model_provider().refresh().await {
        Ok(model) => info!(groups = model.len(), "Resource model loaded"),
        Err(e) => warn!(error = %e, "Initial model load failed, serving errors until it loads"),
    }

    let app = router::create_router(runtime.clone());
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(address = %addr, "Asset server listening");

    if let Err(e) = serve(listener, app).with_graceful_shutdown(shutdown_signal()).await {
        error!(error = %e, "Server error occurred");
    }

    runtime.shutdown().await;
    info!("Server shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install signal handler");
                () = std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown");
}
