//! Opens the embedded, file-backed registry each CLI command operates on.

use std::sync::Arc;

use hyperreg::{Bus, FilesystemStorage, Registry, RegistryConfig, StorageBackend};

/// Open the registry rooted at `config.config_dir`, creating it if absent.
///
/// Each invocation of the CLI opens its own `Registry` over the same
/// on-disk entries; there is no long-lived server process backing it.
pub async fn open(config: &RegistryConfig) -> hyperreg::Result<Arc<Registry>> {
    Ok(open_with_bus(config).await?.0)
}

/// Like [`open`], but also returns the [`Bus`] the registry publishes
/// change events on, for commands (`hotswap`) that need to hand it to a
/// second collaborator over the same registry.
pub async fn open_with_bus(config: &RegistryConfig) -> hyperreg::Result<(Arc<Registry>, Arc<Bus>)> {
    let storage: Arc<dyn StorageBackend> =
        Arc::new(FilesystemStorage::open(&config.config_dir).await?);
    let bus = Arc::new(Bus::new(config.max_subscriber_inbox));
    let registry = Arc::new(Registry::new(storage, bus.clone(), config.max_cache_entries));
    Ok((registry, bus))
}
