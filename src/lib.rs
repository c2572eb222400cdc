// file: src/lib.rs
// description: library entry point and public api exports
// reference: rust library patterns
#![doc = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/readme.md"))]

pub mod config;
pub mod data;
pub mod error;
pub mod models;
pub mod oracle;
pub mod pipeline;
pub mod rules;
pub mod stages;
pub mod utils;

pub use config::{
    BatchConfig, Config, OracleConfig, PathsConfig, PipelineConfig, RetryConfig, ThresholdConfig,
};
pub use data::{OutputWriter, ValidatedExample, load_catalog, load_parts};
pub use error::{PipelineError, Result};
pub use models::{
    Catalog, CatalogEntry, ClassificationRecord, MatchType, Part, PartStatus, Routing, StageName,
};
pub use oracle::{MessagesClient, Oracle, OracleRequest, OracleResponse, RetryPolicy};
pub use pipeline::{PipelineOrchestrator, ProgressTracker, RoutingPolicy, RunOutcome, RunSummary};
pub use rules::RulesLoader;
pub use stages::EnrichmentCache;
pub use utils::Validator;
