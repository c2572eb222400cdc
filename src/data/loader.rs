// file: src/data/loader.rs
// description: CSV input loading for parts, the customer catalog, and validated examples

use crate::error::{PipelineError, Result};
use crate::models::{Catalog, CatalogEntry, Part};
use crate::utils::Validator;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use tracing::{info, warn};

#[derive(Debug, Deserialize)]
struct PartRow {
    part_code: String,
    part_name: String,
}

#[derive(Debug, Deserialize)]
struct CatalogRow {
    vmrs_code: String,
    system_name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    is_custom: bool,
}

/// A previously human-validated mapping, fed back into pattern matching
/// as context.
#[derive(Debug, Clone, Deserialize)]
pub struct ValidatedExample {
    pub part_name: String,
    pub vmrs_code: String,
    #[serde(default)]
    pub notes: String,
}

/// Reads the input parts list. Part codes must be unique and non-empty;
/// a duplicate anywhere in the file rejects the whole run.
pub fn load_parts(path: &Path) -> Result<Vec<Part>> {
    Validator::validate_file_exists(path)?;

    let mut reader = csv::Reader::from_path(path)?;
    let headers = reader.headers()?.clone();
    let headers: Vec<&str> = headers.iter().collect();
    Validator::validate_required_headers(&headers, &["part_code", "part_name"])?;

    let mut parts = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    for row in reader.deserialize() {
        let row: PartRow = row?;
        Validator::validate_not_empty(&row.part_code, "part_code")?;
        Validator::validate_not_empty(&row.part_name, "part_name")?;

        let code = row.part_code.trim().to_string();
        if !seen.insert(code.clone()) {
            return Err(PipelineError::Validation(format!(
                "duplicate part_code {} in {}",
                code,
                path.display()
            )));
        }

        parts.push(Part::new(code, row.part_name.trim()));
    }

    if parts.is_empty() {
        return Err(PipelineError::Validation(format!(
            "no parts found in {}",
            path.display()
        )));
    }

    info!("Loaded {} part(s) from {}", parts.len(), path.display());
    Ok(parts)
}

/// Reads the customer VMRS catalog.
pub fn load_catalog(path: &Path) -> Result<Catalog> {
    Validator::validate_file_exists(path)?;

    let mut reader = csv::Reader::from_path(path)?;
    let headers = reader.headers()?.clone();
    let headers: Vec<&str> = headers.iter().collect();
    Validator::validate_required_headers(&headers, &["vmrs_code", "system_name"])?;

    let mut entries = Vec::new();
    for row in reader.deserialize() {
        let row: CatalogRow = row?;
        Validator::validate_not_empty(&row.vmrs_code, "vmrs_code")?;

        entries.push(CatalogEntry {
            vmrs_code: row.vmrs_code.trim().to_string(),
            system_name: row.system_name.trim().to_string(),
            description: row.description.trim().to_string(),
            is_custom: row.is_custom,
        });
    }

    if entries.is_empty() {
        return Err(PipelineError::Validation(format!(
            "catalog {} has no entries",
            path.display()
        )));
    }

    let catalog = Catalog::new(entries);
    info!(
        "Loaded catalog with {} entr(ies) across {} system(s)",
        catalog.len(),
        catalog.system_codes().len()
    );
    Ok(catalog)
}

/// Validated mappings for one system, or empty when the system has none
/// on file yet.
pub fn load_validated_examples(validated_dir: &Path, system_code: &str) -> Result<Vec<ValidatedExample>> {
    let path = validated_dir.join(format!("validated_parts_system_{}.csv", system_code));
    if !path.is_file() {
        warn!("No validated examples for system {}", system_code);
        return Ok(Vec::new());
    }

    let mut reader = csv::Reader::from_path(&path)?;
    let mut examples = Vec::new();
    for row in reader.deserialize() {
        let example: ValidatedExample = row?;
        examples.push(example);
    }

    info!(
        "Loaded {} validated example(s) for system {}",
        examples.len(),
        system_code
    );
    Ok(examples)
}
