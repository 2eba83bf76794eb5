//! HTTP surface (Axum) over the RAG pipeline.

pub mod error;
pub mod handlers;
pub mod payload;
pub mod state;


pub use error::ApiError;
pub use handlers::VERIFIED_TENANT_HEADER;
pub use state::AppState;

use axum::Router;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;

use crate::gateway::ModelProvider;
use crate::vectordb::VectorIndex;

/// Builds the service router.
pub fn create_router<P, V>(state: AppState<P, V>) -> Router
where
    P: ModelProvider + 'static,
    V: VectorIndex + 'static,
{
    Router::new()
        .route("/health", get(handlers::health_handler))
        .route("/upload/content", post(handlers::upload_handler))
        .route("/chat", post(handlers::chat_handler))
        .route("/chat/stream", post(handlers::chat_stream_handler))
        .route(
            "/conversations/{tenant_id}",
            get(handlers::conversations_handler),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
