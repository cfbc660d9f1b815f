//! Application State
//!
//! Shared state for all API handlers: the registry core and its
//! collaborator components.

use std::sync::Arc;

#[cfg(feature = "metrics")]
use crate::metrics::RegistryMetrics;
use crate::{
    bridge::IntegrationBridge, bus::Bus, config::RegistryConfig, crypto::CryptoLayer,
    hotswap::HotSwapManager, propagation::PropagationEngine, registry::Registry,
    storage::InMemoryStorage, streaming::StreamManager,
};

/// Shared application state for all handlers.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<Registry>,
    pub bus: Arc<Bus>,
    pub propagation: Arc<PropagationEngine>,
    pub hotswap: Arc<HotSwapManager>,
    pub streaming: Arc<StreamManager>,
    pub bridge: Arc<IntegrationBridge>,
    pub config: Arc<RegistryConfig>,
    #[cfg(feature = "metrics")]
    pub metrics: Option<Arc<RegistryMetrics>>,
}

impl AppState {
    /// Build application state from scratch, wiring every component over
    /// in-memory storage. Production deployments swap in
    /// `FilesystemStorage` via [`AppState::with_storage`]-style
    /// construction before the server starts.
    pub async fn new(config: RegistryConfig) -> crate::error::Result<Self> {
        let storage: Arc<dyn crate::storage::StorageBackend> = Arc::new(InMemoryStorage::new());
        let bus = Arc::new(Bus::new(config.max_subscriber_inbox));
        let registry = Arc::new(Registry::new(storage, bus.clone(), config.max_cache_entries));
        let propagation = Arc::new(PropagationEngine::new(
            registry.clone(),
            config.max_inflight_propagation_sessions,
        ));
        let hotswap = Arc::new(HotSwapManager::new(registry.clone(), bus.clone()));
        let crypto = Arc::new(CryptoLayer::open(config.encryption_key_path(), config.max_key_ring_depth).await?);
        let streaming = Arc::new(StreamManager::new(
            crypto,
            bus.clone(),
            config.max_parallel_streams,
        ));
        let bridge = Arc::new(IntegrationBridge::with_default_ttl(registry.clone()));

        #[cfg(feature = "metrics")]
        let metrics = RegistryMetrics::new().map(Arc::new).ok();

        Ok(Self {
            registry,
            bus,
            propagation,
            hotswap,
            streaming,
            bridge,
            config: Arc::new(config),
            #[cfg(feature = "metrics")]
            metrics,
        })
    }
}
