// file: src/error.rs
// description: Custom error types and result type aliases
// reference: https://docs.rs/thiserror

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("File operation failed for {path}: {source}")]
    FileOperation {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Transient oracle error: {0}")]
    OracleTransient(String),

    #[error("Malformed oracle output: {0}")]
    OracleMalformed(String),

    #[error("Fatal oracle error: {0}")]
    OracleFatal(String),

    #[error("Schema validation failed for stage {stage}: {message}")]
    SchemaValidation { stage: String, message: String },

    #[error("VMRS code {vmrs_code} for part {part_code} not found in customer catalog")]
    CatalogIntegrity {
        part_code: String,
        vmrs_code: String,
    },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl PipelineError {
    /// Short label used by the run report to bucket failures by kind.
    pub fn kind_label(&self) -> &'static str {
        match self {
            PipelineError::Config(_) => "config",
            PipelineError::FileOperation { .. } | PipelineError::Io(_) => "io",
            PipelineError::Csv(_) => "csv",
            PipelineError::OracleTransient(_) => "oracle_transient",
            PipelineError::OracleMalformed(_) => "oracle_malformed",
            PipelineError::OracleFatal(_) => "oracle_fatal",
            PipelineError::SchemaValidation { .. } => "schema_validation",
            PipelineError::CatalogIntegrity { .. } => "catalog_integrity",
            PipelineError::Validation(_) => "validation",
            PipelineError::Serialization(_) => "serialization",
        }
    }
}
