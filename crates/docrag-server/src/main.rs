use std::net::SocketAddr;

use anyhow::Result;
use tracing::info;

use docrag_core::pipeline::{run_worker, JobQueue};
use docrag_core::{AppContext, Settings};
use docrag_server::state::AppState;
use docrag_server::build_router;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,docrag=debug".to_string()),
        )
        .with_target(true)
        .json()
        .init();

    info!("starting docrag");

    let settings = Settings::load()?;
    info!("configuration loaded");

    let context = AppContext::initialize(settings.clone()).await?;
    info!("adapters ready");

    let (queue, receiver) = JobQueue::new(settings.queue_capacity);
    for worker_id in 0..settings.worker_count.max(1) {
        tokio::spawn(run_worker(worker_id, context.clone(), receiver.clone()));
    }
    info!(workers = settings.worker_count.max(1), "ingestion workers started");

    let state = AppState { context, queue };
    let app = build_router(state);

    let addr = SocketAddr::from((
        settings.server_host.parse::<std::net::IpAddr>()?,
        settings.server_port,
    ));
    info!(%addr, "listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
