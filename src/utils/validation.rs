// file: src/utils/validation.rs
// description: data validation utilities and helpers

use crate::error::{PipelineError, Result};
use std::path::Path;

pub struct Validator;

impl Validator {
    /// Accepts a raw confidence value from an external payload. Values
    /// outside [0, 100] are rejected, never clamped.
    pub fn validate_confidence(value: i64) -> Result<u8> {
        if !(0..=100).contains(&value) {
            return Err(PipelineError::Validation(format!(
                "confidence {} outside valid range 0-100",
                value
            )));
        }
        Ok(value as u8)
    }

    /// A system code is the numeric prefix of a VMRS code (e.g. "13").
    pub fn validate_system_code(system_code: &str) -> Result<()> {
        if system_code.is_empty() || !system_code.chars().all(|c| c.is_ascii_digit()) {
            return Err(PipelineError::Validation(format!(
                "invalid system code: {:?}",
                system_code
            )));
        }
        Ok(())
    }

    /// Checks that a VMRS code belongs to the system it was classified into.
    pub fn validate_code_prefix(vmrs_code: &str, system_code: &str) -> Result<()> {
        let prefix = vmrs_code.split('-').next().unwrap_or(vmrs_code);
        if prefix != system_code {
            return Err(PipelineError::Validation(format!(
                "VMRS code {} does not belong to system {}",
                vmrs_code, system_code
            )));
        }
        Ok(())
    }

    pub fn validate_file_exists(path: &Path) -> Result<()> {
        if !path.is_file() {
            return Err(PipelineError::Validation(format!(
                "file does not exist: {}",
                path.display()
            )));
        }
        Ok(())
    }

    pub fn validate_required_headers(headers: &[&str], required: &[&str]) -> Result<()> {
        let missing: Vec<&str> = required
            .iter()
            .filter(|r| !headers.contains(*r))
            .copied()
            .collect();

        if !missing.is_empty() {
            return Err(PipelineError::Validation(format!(
                "missing required columns: {}",
                missing.join(", ")
            )));
        }
        Ok(())
    }

    pub fn validate_not_empty(value: &str, field: &str) -> Result<()> {
        if value.trim().is_empty() {
            return Err(PipelineError::Validation(format!("{} is empty", field)));
        }
        Ok(())
    }
}
