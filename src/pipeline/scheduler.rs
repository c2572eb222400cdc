// file: src/pipeline/scheduler.rs
// description: grouping records by system and slicing them into stage batches

use crate::models::ClassificationRecord;
use std::collections::BTreeMap;

/// Records split by the system classification assigned in stage 1. Records
/// already terminal (or with no system) take no further part in the run.
#[derive(Debug, Default)]
pub struct SystemGroups {
    pub groups: BTreeMap<String, Vec<ClassificationRecord>>,
    pub settled: Vec<ClassificationRecord>,
}

impl SystemGroups {
    pub fn system_count(&self) -> usize {
        self.groups.len()
    }
}

/// Groups classified records by system code. BTreeMap keeps system order
/// deterministic across runs.
pub fn group_by_system(records: Vec<ClassificationRecord>) -> SystemGroups {
    let mut result = SystemGroups::default();

    for record in records {
        if record.is_terminal() {
            result.settled.push(record);
            continue;
        }
        match record.system_code.clone() {
            Some(system) => result.groups.entry(system).or_default().push(record),
            None => result.settled.push(record),
        }
    }

    result
}

/// Slices records into batches of at most `batch_size`, preserving order.
pub fn create_batches(
    records: Vec<ClassificationRecord>,
    batch_size: usize,
) -> Vec<Vec<ClassificationRecord>> {
    assert!(batch_size > 0, "batch_size must be positive");

    let mut batches = Vec::new();
    let mut current = Vec::with_capacity(batch_size.min(records.len()));

    for record in records {
        current.push(record);
        if current.len() == batch_size {
            batches.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        batches.push(current);
    }

    batches
}
