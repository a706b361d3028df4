use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    hubsync_observability::init();

    let config = hubsync_api::config::SyncConfig::from_env();
    let bind_addr = config.bind_addr.clone();

    let services = Arc::new(hubsync_api::app::build_services(config)?);
    hubsync_api::app::migrate_if_durable(&services).await?;

    let _workers = hubsync_api::app::spawn_workers(&services);

    let app = hubsync_api::app::build_app(services);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
