//! Identity & Types: entries, the category taxonomy, GEFS quality scoring,
//! feature layers, and validation.

pub mod category;
pub mod entry;
pub mod feature_layer;
pub mod gefs;
pub mod validation;

pub use category::Category;
pub use entry::{Entry, EntryId, Relationship, RelationshipKind, Status};
pub use feature_layer::{FeatureFlag, FeatureLayer, Maturity};
pub use gefs::Gefs;
pub use validation::{validate, ValidationIssue};
