mod bootstrap;
mod health;
mod quotes;
#[cfg(test)]
mod test_support;

use std::time::Duration;

use anyhow::Result;
use haulquote_core::config::{AppConfig, LoadOptions};

fn init_logging(config: &AppConfig) {
    use haulquote_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;
    let router = health::router(app.db_pool.clone(), app.index.clone())
        .merge(quotes::router(app.pipeline.clone()));

    let address = format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;
    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        bind_address = %address,
        "haulquote-server listening"
    );

    let grace = Duration::from_secs(app.config.server.graceful_shutdown_secs);
    let server = axum::serve(listener, router).with_graceful_shutdown(async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %error, "failed to listen for shutdown signal");
        }
        tracing::info!(
            event_name = "system.server.stopping",
            correlation_id = "shutdown",
            "haulquote-server stopping"
        );
    });

    // Requests still in flight after the grace period are dropped.
    let mut serving = tokio::spawn(async move { server.await });
    tokio::select! {
        joined = &mut serving => joined??,
        _ = shutdown_deadline(grace) => {
            tracing::warn!(
                event_name = "system.server.shutdown_timeout",
                correlation_id = "shutdown",
                grace_secs = grace.as_secs(),
                "graceful shutdown window elapsed"
            );
            serving.abort();
        }
    }

    app.db_pool.close().await;
    Ok(())
}

/// Resolves `grace` after the first ctrl-c.
async fn shutdown_deadline(grace: Duration) {
    if tokio::signal::ctrl_c().await.is_ok() {
        tokio::time::sleep(grace).await;
    } else {
        std::future::pending::<()>().await;
    }
}
