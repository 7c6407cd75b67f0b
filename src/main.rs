use std::{net::SocketAddr, sync::Arc};

use audiohost::{
    common::{
        banner::{BannerInfo, print_banner},
        logger,
        types::AnyResult,
    },
    configs::Config,
    engine::headless::HeadlessBackend,
    server::{AppState, FocusArbiter},
    transport,
};
use tracing::info;

#[tokio::main]
async fn main() -> AnyResult<()> {
    let config = Config::load()?;
    logger::init(&config);

    let engines = Arc::new(HeadlessBackend::new(&config.player)?);
    let focus = Arc::new(FocusArbiter::new());

    let address: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let shared_state = Arc::new(AppState::new(config, engines, focus));

    print_banner(&BannerInfo::default(), &address.to_string());

    let app = transport::router(shared_state.clone());
    let listener = tokio::net::TcpListener::bind(address).await?;
    info!("Audio host listening on {}", address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    for hub in shared_state.hubs.iter() {
        hub.shutdown();
    }
    shared_state.hubs.clear();
    info!("Shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for ctrl-c: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
