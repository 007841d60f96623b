use anyhow::{Context, Result};

mod init_config;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let boot = modelgate_core::bootstrap::bootstrap_from_env().await?;
    init_config::apply(&boot.state, &boot.storage).await.context("apply init config")?;

    let global = boot.state.global.load();
    let bind = format!("{}:{}", global.host, global.port);

    let app = axum::Router::new()
        .merge(modelgate_router::proxy_router(boot.state.clone()))
        .nest("/admin", modelgate_admin::router(boot.state.clone()));

    let listener = tokio::net::TcpListener::bind(&bind).await.with_context(|| format!("bind {bind}"))?;
    tracing::info!(%bind, "listening");
    axum::serve(listener, app).await.context("serve")?;
    Ok(())
}
