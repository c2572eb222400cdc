// file: src/models/part.rs
// description: immutable input part record

use serde::{Deserialize, Serialize};

/// A single catalog part as ingested. `part_code` is the unique, stable key
/// through the whole pipeline; the record is never mutated after loading.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Part {
    pub part_code: String,
    pub part_name: String,
}

impl Part {
    pub fn new(part_code: impl Into<String>, part_name: impl Into<String>) -> Self {
        Self {
            part_code: part_code.into(),
            part_name: part_name.into(),
        }
    }
}
