use std::time::Duration;

use anyhow::Result;
use netops_core::config::{AppConfig, LoadOptions, LogFormat};
use netops_server::{bootstrap, router};
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// `RUST_LOG` wins when set; otherwise the configured level applies to every target.
fn init_logging(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_target(false).with_env_filter(filter);

    match config.logging.format {
        LogFormat::Compact => builder.compact().init(),
        LogFormat::Pretty => builder.pretty().init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config)?;
    let server_config = app.config.server.clone();
    let address = format!("{}:{}", server_config.bind_address, server_config.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;
    info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        bind_address = %address,
        capabilities = app.state.registry.len(),
        mode = ?app.config.capabilities.mode,
        "netops-server listening"
    );

    let (stop_tx, mut stop_rx) = watch::channel(false);
    let serve = axum::serve(listener, router(app.state)).with_graceful_shutdown(async move {
        let _ = stop_rx.wait_for(|stop| *stop).await;
    });
    let server = tokio::spawn(async move { serve.await });

    let trigger = shutdown_trigger().await;
    info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        trigger,
        "draining in-flight turns"
    );
    let _ = stop_tx.send(true);

    let grace = Duration::from_secs(server_config.graceful_shutdown_secs);
    match tokio::time::timeout(grace, server).await {
        Ok(Ok(Ok(()))) => info!(event_name = "system.server.stopped", "netops-server stopped"),
        Ok(Ok(Err(serve_error))) => {
            error!(event_name = "system.server.error", error = %serve_error, "server terminated with error");
        }
        Ok(Err(join_error)) => {
            error!(event_name = "system.server.error", error = %join_error, "server task aborted");
        }
        Err(_) => warn!(
            event_name = "system.server.shutdown_timeout",
            grace_secs = grace.as_secs(),
            "in-flight turns did not finish before the shutdown deadline"
        ),
    }

    Ok(())
}

/// Resolves on Ctrl+C, or SIGTERM on Unix, and names which one fired.
#[cfg(unix)]
async fn shutdown_trigger() -> &'static str {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => tokio::select! {
            _ = tokio::signal::ctrl_c() => "ctrl-c",
            _ = sigterm.recv() => "sigterm",
        },
        Err(signal_error) => {
            warn!(
                event_name = "system.server.signal_unavailable",
                error = %signal_error,
                "SIGTERM handler not installed; waiting for ctrl-c only"
            );
            ctrl_c_only().await
        }
    }
}

#[cfg(not(unix))]
async fn shutdown_trigger() -> &'static str {
    ctrl_c_only().await
}

async fn ctrl_c_only() -> &'static str {
    match tokio::signal::ctrl_c().await {
        Ok(()) => "ctrl-c",
        Err(signal_error) => {
            error!(
                event_name = "system.server.signal_unavailable",
                error = %signal_error,
                "no shutdown signal available; serving until the process is killed"
            );
            std::future::pending().await
        }
    }
}
