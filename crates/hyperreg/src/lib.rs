//! Hyperreg: a universal hyper-registry with real-time propagation.
//!
//! # Architecture
//!
//! 1. **Identity**: every registered thing is an [`identity::Entry`], addressed
//!    by an [`identity::EntryId`] and placed in a [`identity::Category`].
//! 2. **Storage**: entries are held durably by a [`storage::StorageBackend`]
//!    with a secondary facet index for fast faceted lookup.
//! 3. **Bus**: entry mutations become [`bus::ChangeEvent`]s fanned out to
//!    interested subscribers, including WebSocket stream connections.
//! 4. **Propagation**: updates reach related entries immediately, by cascade,
//!    by consensus, or eventually, via [`propagation::PropagationEngine`].
//! 5. **Hot-swap**: [`hotswap::HotSwapManager`] replaces a live entry with a
//!    verified new version and rolls back automatically if verification fails.
//! 6. **Bridge**: [`bridge::IntegrationBridge`] reconciles entries discovered
//!    from an external orchestrator into the registry.
//!
//! # Example
//!
//! ```rust,ignore
//! use hyperreg::{Entry, Registry};
//!
//! let id = registry.register(entry).await?;
//! let found = registry.get(&id).await?;
//! ```

pub mod bridge;
pub mod bus;
pub mod cache;
pub mod config;
pub mod crypto;
pub mod error;
pub mod hotswap;
pub mod identity;
pub mod propagation;
pub mod registry;
pub mod resilience;
pub mod storage;
pub mod streaming;
pub mod telemetry;

#[cfg(feature = "server")]
pub mod api;

#[cfg(feature = "metrics")]
pub mod metrics;

pub use bridge::{DiscoveredService, IntegrationBridge, UnifiedStatus};
pub use bus::{Bus, ChangeEvent, ChangeKind, Delivery, Interest};
pub use config::RegistryConfig;
pub use crypto::CryptoLayer;
pub use error::{RegistryError, Result};
pub use hotswap::{HotSwapManager, HotSwapPhase, HotSwapTransition, VerifyPredicate};
pub use identity::{
    Category, Entry, EntryId, FeatureFlag, FeatureLayer, Gefs, Maturity, Relationship,
    RelationshipKind, Status,
};
pub use propagation::{
    ConflictPolicy, PropagationEngine, PropagationMode, Rule, SessionStatus, TargetFilter,
};
pub use registry::{HookPoint, Registry, RegistryStats};
pub use resilience::{CircuitBreaker, CircuitBreakerRegistry, CircuitState, RetryPolicy};
pub use storage::{FilesystemStorage, InMemoryStorage, SearchFilters, StorageBackend};
pub use streaming::{StreamDirection, StreamManager, StreamRecord, StreamStatus};

#[cfg(feature = "server")]
pub use api::{ApiConfig, ApiServer, AppState};

#[cfg(feature = "metrics")]
pub use metrics::RegistryMetrics;

pub use cache::{
    cache_get_json, cache_set_json, keys as cache_keys, CacheConfig, CacheStats, CacheStore,
    InMemoryCacheStore, NoOpCacheStore,
};
