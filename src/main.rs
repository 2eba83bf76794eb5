//! Docent HTTP server entrypoint.

use std::net::SocketAddr;
use std::sync::Arc;

use mimalloc::MiMalloc;
use tokio::net::TcpListener;
use tokio::signal;

use docent::config::Config;
use docent::constants::DEFAULT_EMBEDDING_DIM;
use docent::gateway::LiveProvider;
use docent::persistence::InMemoryPersistence;
use docent::server::{AppState, create_router};
use docent::vectordb::{QdrantIndex, VectorIndex};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    println!(
        r#"
    ╔══════════════════════════════════╗
    ║  docent — grounded course Q&A    ║
    ╚══════════════════════════════════╝
"#
    );

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = Config::from_env()?;
    let addr: SocketAddr = config.socket_addr().parse()?;

    tracing::info!(
        bind_addr = %config.bind_addr,
        port = config.port,
        primary_model = %config.models.primary_chat,
        "docent starting"
    );

    let index = Arc::new(QdrantIndex::new(&config.qdrant_url).await?);
    index
        .ensure_collections(DEFAULT_EMBEDDING_DIM as u64)
        .await?;
    tracing::info!(qdrant = %config.qdrant_url, "vector collections ready");

    if config.models.api_key.is_none() {
        tracing::warn!("no OPENAI_API_KEY configured; embedding and transcription will fail");
    }

    let provider = LiveProvider::new(&config.models);

    // Durable conversation storage is an external collaborator; the
    // in-process store is the single-node fallback.
    let persistence = Arc::new(InMemoryPersistence::new());

    let state = AppState::new(config, provider, index, persistence);
    let app = create_router(state);

    let listener = TcpListener::bind(addr).await?;
    tracing::info!(addr = %addr, "server listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("docent shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("received SIGTERM, initiating graceful shutdown");
        }
    }
}
