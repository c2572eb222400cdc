// file: src/data/mod.rs
// description: input loading and output writing

pub mod exporter;
pub mod loader;

pub use exporter::OutputWriter;
pub use loader::{ValidatedExample, load_catalog, load_parts, load_validated_examples};
