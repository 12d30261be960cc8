use anyhow::Context;

use payrun_infra::PayrunConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    payrun_observability::init();

    let config = PayrunConfig::from_env().context("invalid configuration")?;
    let app = payrun_api::app::build_app(&config).await?;

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    let served = axum::serve(listener, app.router)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    tracing::info!("shutting down job lanes");
    // Lanes block on joins; keep them off the async workers.
    tokio::task::spawn_blocking(move || app.workers.shutdown())
        .await
        .context("job lanes did not shut down cleanly")?;

    served.context("http server error")
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
