use std::sync::Arc;

use anyhow::Context;

use shopswift_infra::{AppConfig, LocalImageStorage, LogNotifier, Services, connect_store};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine; real deployments set the environment directly.
    let _ = dotenvy::dotenv();
    shopswift_observability::init();

    let config = AppConfig::from_env().context("invalid configuration")?;
    if config.jwt_secret_is_default {
        tracing::warn!("JWT_SECRET not set; using insecure dev default");
    }

    let store = connect_store(&config).await.context("failed to open store")?;
    let images = Arc::new(LocalImageStorage::new(
        config.upload_dir.clone(),
        config.upload_base_uri.clone(),
    ));
    let services = Services::new(store, images, Arc::new(LogNotifier));

    let app = shopswift_api::app::build_app(services, config.jwt_secret.as_bytes());

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
