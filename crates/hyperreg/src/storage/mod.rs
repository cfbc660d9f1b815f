//! Storage Backend: durable entry storage plus the facet index.

pub mod backend;
pub mod facets;

pub use backend::{FilesystemStorage, InMemoryStorage, SearchFilters, Snapshot, StorageBackend};
pub use facets::{FacetIndex, FacetQuery};
