// file: src/stages/schema.rs
// description: per-stage oracle response payloads and contract checks

use crate::error::{PipelineError, Result};
use crate::models::{ClassificationRecord, Routing, StageName};
use crate::oracle::{OracleError, extract_json_payload};
use crate::utils::Validator;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::collections::{BTreeMap, HashSet};

/// Stage 1 output: one classification per input part.
#[derive(Debug, Clone, Deserialize)]
pub struct ClassificationPayload {
    pub classified_parts: Vec<ClassifiedPart>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClassifiedPart {
    pub part_code: String,
    #[serde(default)]
    pub part_name: String,
    pub vmrs_system_code: String,
    #[serde(default)]
    pub system_name: String,
    pub routing: String,
    pub confidence: i64,
    #[serde(default)]
    pub reasoning: String,
}

/// Stage 2 output: per-part pattern-match results for one system batch.
#[derive(Debug, Clone, Deserialize)]
pub struct PatternMatchPayload {
    pub mappings: Vec<PatternMapping>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PatternMapping {
    pub part_code: String,
    #[serde(default)]
    pub part_name: String,
    #[serde(default)]
    pub vmrs_code: Option<String>,
    pub confidence: i64,
    pub match_type: String,
    pub web_search_needed: bool,
    #[serde(default)]
    pub notes: String,
}

pub const PATTERN_MATCH_TYPES: [&str; 3] = ["exact", "pattern", "none"];

/// Stage 3 output: enriched description plus extracted attributes for a
/// single part.
#[derive(Debug, Clone, Deserialize)]
pub struct ResearchPayload {
    #[serde(default)]
    pub part_code: String,
    pub enriched_description: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

/// Stage 4 output: VMRS code assignment for a single part.
#[derive(Debug, Clone, Deserialize)]
pub struct MappingPayload {
    #[serde(default)]
    pub part_code: String,
    pub vmrs_code: String,
    pub confidence: i64,
    pub is_custom_code: bool,
    #[serde(default)]
    pub reasoning: String,
}

/// Stage 5 output: one verdict per part in the batch.
#[derive(Debug, Clone, Deserialize)]
pub struct ValidationPayload {
    pub validations: Vec<ValidationVerdict>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ValidationVerdict {
    pub part_code: String,
    pub status: String,
    pub confidence: i64,
    #[serde(default)]
    pub issues: Vec<String>,
}

pub const VALIDATION_STATUSES: [&str; 3] = ["PASS", "REVIEW", "FAIL"];

/// Deserializes a stage payload out of oracle content; anything that does
/// not parse is malformed output and retriable.
pub fn parse_payload<T: DeserializeOwned>(content: &str) -> std::result::Result<T, OracleError> {
    let payload = extract_json_payload(content);
    serde_json::from_str(payload)
        .map_err(|e| OracleError::Malformed(format!("payload does not match schema: {}", e)))
}

pub fn schema_err(stage: StageName, message: impl Into<String>) -> PipelineError {
    PipelineError::SchemaValidation {
        stage: stage.as_str().to_string(),
        message: message.into(),
    }
}

/// Every part code in the payload must belong to the batch, with no
/// duplicates. Missing parts are allowed or not depending on the stage.
pub fn check_part_coverage<'a>(
    stage: StageName,
    payload_codes: impl Iterator<Item = &'a str>,
    batch: &[ClassificationRecord],
    require_complete: bool,
) -> Result<()> {
    let batch_codes: HashSet<&str> = batch.iter().map(|r| r.part.part_code.as_str()).collect();
    let mut seen: HashSet<&str> = HashSet::new();

    for code in payload_codes {
        if !batch_codes.contains(code) {
            return Err(schema_err(
                stage,
                format!("response names unknown part_code {}", code),
            ));
        }
        if !seen.insert(code) {
            return Err(schema_err(
                stage,
                format!("response names part_code {} more than once", code),
            ));
        }
    }

    if require_complete && seen.len() != batch_codes.len() {
        let missing: Vec<&str> = batch_codes.difference(&seen).copied().collect();
        return Err(schema_err(
            stage,
            format!("response missing part(s): {}", missing.join(", ")),
        ));
    }

    Ok(())
}

pub fn check_confidence(stage: StageName, part_code: &str, confidence: i64) -> Result<u8> {
    Validator::validate_confidence(confidence).map_err(|_| {
        schema_err(
            stage,
            format!(
                "confidence {} for part {} outside valid range 0-100",
                confidence, part_code
            ),
        )
    })
}

pub fn check_enum(stage: StageName, field: &str, value: &str, allowed: &[&str]) -> Result<()> {
    if !allowed.contains(&value) {
        return Err(schema_err(
            stage,
            format!(
                "{} value {:?} not one of {}",
                field,
                value,
                allowed.join("|")
            ),
        ));
    }
    Ok(())
}

pub fn check_routing(stage: StageName, part_code: &str, routing: &str) -> Result<Routing> {
    Routing::parse(routing).ok_or_else(|| {
        schema_err(
            stage,
            format!("invalid routing {:?} for part {}", routing, part_code),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Part;

    fn batch(codes: &[&str]) -> Vec<ClassificationRecord> {
        codes
            .iter()
            .map(|c| ClassificationRecord::new(Part::new(*c, format!("part {}", c))))
            .collect()
    }

    #[test]
    fn test_parse_payload_fenced_json() {
        let content = "```json\n{\"classified_parts\": []}\n```";
        let payload: ClassificationPayload = parse_payload(content).unwrap();
        assert!(payload.classified_parts.is_empty());
    }

    #[test]
    fn test_parse_payload_malformed() {
        let result: std::result::Result<ClassificationPayload, _> =
            parse_payload("this is not json");
        assert!(matches!(result, Err(OracleError::Malformed(_))));
    }

    #[test]
    fn test_part_coverage_unknown_code() {
        let batch = batch(&["A", "B"]);
        let err = check_part_coverage(
            StageName::Classification,
            ["A", "C"].into_iter(),
            &batch,
            false,
        );
        assert!(err.is_err());
    }

    #[test]
    fn test_part_coverage_duplicate_code() {
        let batch = batch(&["A", "B"]);
        let err = check_part_coverage(
            StageName::Classification,
            ["A", "A"].into_iter(),
            &batch,
            false,
        );
        assert!(err.is_err());
    }

    #[test]
    fn test_part_coverage_missing_part() {
        let batch = batch(&["A", "B"]);
        assert!(
            check_part_coverage(StageName::Validation, ["A"].into_iter(), &batch, true).is_err()
        );
        assert!(
            check_part_coverage(StageName::Classification, ["A"].into_iter(), &batch, false)
                .is_ok()
        );
    }

    #[test]
    fn test_confidence_rejected_not_clamped() {
        assert!(check_confidence(StageName::Mapping, "A", 101).is_err());
        assert!(check_confidence(StageName::Mapping, "A", -5).is_err());
        assert_eq!(check_confidence(StageName::Mapping, "A", 88).unwrap(), 88);
    }

    #[test]
    fn test_enum_membership() {
        assert!(
            check_enum(
                StageName::Validation,
                "status",
                "PASS",
                &VALIDATION_STATUSES
            )
            .is_ok()
        );
        assert!(
            check_enum(
                StageName::Validation,
                "status",
                "MAYBE",
                &VALIDATION_STATUSES
            )
            .is_err()
        );
    }

    #[test]
    fn test_routing_check() {
        assert!(check_routing(StageName::Classification, "A", "EXACT_MATCH").is_ok());
        assert!(check_routing(StageName::Classification, "A", "GUESS").is_err());
    }
}
