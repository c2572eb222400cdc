// file: src/pipeline/mod.rs
// description: pipeline module exports and public api

mod orchestrator;
mod progress;
mod routing;
mod scheduler;

pub use orchestrator::{PipelineOrchestrator, RunOutcome};
pub use progress::{ProgressTracker, RunSummary};
pub use routing::{MappingDisposition, PatternOutcome, RoutingPolicy, StagePath};
pub use scheduler::{SystemGroups, create_batches, group_by_system};
