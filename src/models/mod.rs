// file: src/models/mod.rs
// description: domain model exports

pub mod catalog;
pub mod part;
pub mod record;

pub use catalog::{Catalog, CatalogEntry};
pub use part::Part;
pub use record::{
    ClassificationRecord, MatchType, PartStatus, Routing, StageEntry, StageName,
};
