// file: src/models/catalog.rs
// description: customer VMRS catalog, read-only reference data shared by all stages

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// One row of the customer's VMRS catalog. A `vmrs_code` may carry a
/// hyphenated sub-code; the part before the hyphen is the system code.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct CatalogEntry {
    pub vmrs_code: String,
    pub system_name: String,
    pub description: String,
    pub is_custom: bool,
}

impl CatalogEntry {
    pub fn system_code(&self) -> &str {
        self.vmrs_code.split('-').next().unwrap_or(&self.vmrs_code)
    }
}

/// Read-only catalog with code lookup and per-system filtering. Built once
/// at startup and shared by reference for the lifetime of the run.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    entries: Vec<CatalogEntry>,
    by_code: HashMap<String, usize>,
}

impl Catalog {
    pub fn new(entries: Vec<CatalogEntry>) -> Self {
        let by_code = entries
            .iter()
            .enumerate()
            .map(|(idx, entry)| (entry.vmrs_code.clone(), idx))
            .collect();
        Self { entries, by_code }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn contains(&self, vmrs_code: &str) -> bool {
        self.by_code.contains_key(vmrs_code)
    }

    pub fn get(&self, vmrs_code: &str) -> Option<&CatalogEntry> {
        self.by_code.get(vmrs_code).map(|&idx| &self.entries[idx])
    }

    pub fn is_custom_code(&self, vmrs_code: &str) -> bool {
        self.get(vmrs_code).map(|e| e.is_custom).unwrap_or(false)
    }

    /// Entries whose system-code prefix matches, used to build the
    /// catalog-excerpt context for mapping and validation.
    pub fn entries_for_system(&self, system_code: &str) -> Vec<&CatalogEntry> {
        self.entries
            .iter()
            .filter(|e| e.system_code() == system_code)
            .collect()
    }

    /// Unique system codes present in the catalog, sorted.
    pub fn system_codes(&self) -> Vec<String> {
        let codes: BTreeSet<String> = self
            .entries
            .iter()
            .map(|e| e.system_code().to_string())
            .collect();
        codes.into_iter().collect()
    }

    pub fn system_name(&self, system_code: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.system_code() == system_code)
            .map(|e| e.system_name.as_str())
    }
}
