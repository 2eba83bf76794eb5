//! Shared handler state and service wiring.

use std::sync::Arc;

use crate::agent::RagAgent;
use crate::cache::SemanticCache;
use crate::config::Config;
use crate::evaluate::ResponseEvaluator;
use crate::gateway::{ModelGateway, ModelProvider};
use crate::ingest::{IngestionCoordinator, RecursiveSplitter};
use crate::limiter::RequestRateLimiter;
use crate::memory::MemoryRegistry;
use crate::persistence::Persistence;
use crate::tokens::TokenCounter;
use crate::vectordb::VectorIndex;

/// Everything the handlers need, cheap to clone per request.
pub struct AppState<P: ModelProvider + 'static, V: VectorIndex + 'static> {
    /// Circuit-broken model front door.
    pub gateway: Arc<ModelGateway<P>>,
    /// Tenant-scoped vector index.
    pub index: Arc<V>,
    /// The staged agent.
    pub agent: Arc<RagAgent<P, V>>,
    /// Semantic response cache.
    pub cache: Arc<SemanticCache<V>>,
    /// Tenant/IP token buckets.
    pub limiter: Arc<RequestRateLimiter>,
    /// Live conversation memories.
    pub memories: Arc<MemoryRegistry>,
    /// Ingestion path.
    pub ingestor: Arc<IngestionCoordinator<P, V>>,
    /// External persistence collaborator.
    pub persistence: Arc<dyn Persistence>,
    /// Service configuration.
    pub config: Arc<Config>,
}

impl<P: ModelProvider + 'static, V: VectorIndex + 'static> Clone for AppState<P, V> {
    fn clone(&self) -> Self {
        Self {
            gateway: self.gateway.clone(),
            index: self.index.clone(),
            agent: self.agent.clone(),
            cache: self.cache.clone(),
            limiter: self.limiter.clone(),
            memories: self.memories.clone(),
            ingestor: self.ingestor.clone(),
            persistence: self.persistence.clone(),
            config: self.config.clone(),
        }
    }
}

impl<P: ModelProvider + 'static, V: VectorIndex + 'static> AppState<P, V> {
    /// Wires the full pipeline from a provider, an index, and a
    /// persistence collaborator.
    pub fn new(
        config: Config,
        provider: P,
        index: Arc<V>,
        persistence: Arc<dyn Persistence>,
    ) -> Self {
        let gateway = Arc::new(ModelGateway::new(
            provider,
            config.models.clone(),
            config.breaker,
            config.retry,
        ));

        let counter = TokenCounter::for_model(&config.models.primary_chat);

        let cache = Arc::new(SemanticCache::new(index.clone(), config.cache));

        let agent = Arc::new(RagAgent::new(
            gateway.clone(),
            index.clone(),
            ResponseEvaluator::new(config.review_threshold),
            config.retrieval,
            config.deadlines,
            config.server.skip_generation_on_empty_context,
        ));

        let ingestor = Arc::new(IngestionCoordinator::new(
            gateway.clone(),
            index.clone(),
            cache.clone(),
            persistence.clone(),
            RecursiveSplitter::new(config.chunking, counter.clone()),
            config.ingest_queue_on_breaker_open,
            config.breaker.open_for,
        ));

        let limiter = Arc::new(RequestRateLimiter::new(config.limits));
        let memories = Arc::new(MemoryRegistry::new(config.memory, counter));

        Self {
            gateway,
            index,
            agent,
            cache,
            limiter,
            memories,
            ingestor,
            persistence,
            config: Arc::new(config),
        }
    }
}
