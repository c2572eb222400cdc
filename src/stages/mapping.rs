// file: src/stages/mapping.rs
// description: stage 4 - final VMRS code assignment checked against the catalog

use crate::error::{PipelineError, Result};
use crate::models::{Catalog, ClassificationRecord, MatchType, StageName};
use crate::oracle::OracleError;
use crate::stages::StageSpec;
use crate::stages::schema::{self, MappingPayload, check_confidence};
use crate::utils::Validator;
use std::fmt::Write;
use tracing::warn;

/// Maps a single part onto a concrete VMRS code from the catalog excerpt
/// for its system. Codes the catalog does not contain are never written
/// into the record; the part is downgraded to review instead.
pub struct MappingStage<'a> {
    pub catalog: &'a Catalog,
    pub system_code: &'a str,
    pub max_tokens: u32,
}

impl StageSpec for MappingStage<'_> {
    type Payload = MappingPayload;

    fn name(&self) -> StageName {
        StageName::Mapping
    }

    fn max_tokens(&self) -> u32 {
        self.max_tokens
    }

    fn build_prompt(&self, batch: &[ClassificationRecord]) -> String {
        let record = &batch[0];
        let mut prompt = format!(
            "TASK: VMRS CODE MAPPING\n\
             Assign the single best VMRS code from the catalog excerpt below.\n\n\
             PART: {}: {}\n",
            record.part.part_code, record.part.part_name
        );

        if let Some(description) = &record.enriched_description {
            let _ = writeln!(prompt, "ENRICHED DESCRIPTION: {}", description);
        }

        prompt.push_str("\nCATALOG EXCERPT:\n");
        for entry in self.catalog.entries_for_system(self.system_code) {
            let _ = writeln!(
                prompt,
                "  {}: {}{}",
                entry.vmrs_code,
                entry.description,
                if entry.is_custom { " (customer code)" } else { "" }
            );
        }

        prompt.push_str(
            "\nRespond with JSON only:\n\
             {\"part_code\", \"vmrs_code\", \"confidence\" (0-100), \
             \"is_custom_code\" (bool), \"reasoning\"}\n",
        );

        prompt
    }

    fn parse(&self, content: &str) -> std::result::Result<Self::Payload, OracleError> {
        schema::parse_payload(content)
    }

    fn validate(&self, payload: &Self::Payload, batch: &[ClassificationRecord]) -> Result<()> {
        let expected = &batch[0].part.part_code;
        if !payload.part_code.is_empty() && payload.part_code != *expected {
            return Err(schema::schema_err(
                self.name(),
                format!(
                    "response is for part {} but {} was requested",
                    payload.part_code, expected
                ),
            ));
        }
        if payload.vmrs_code.trim().is_empty() {
            return Err(schema::schema_err(
                self.name(),
                format!("empty vmrs_code for part {}", expected),
            ));
        }
        check_confidence(self.name(), expected, payload.confidence)?;
        Ok(())
    }

    fn apply(&self, payload: Self::Payload, batch: &mut [ClassificationRecord]) -> Result<()> {
        let record = &mut batch[0];
        if record.is_terminal() {
            return Ok(());
        }

        let vmrs_code = payload.vmrs_code.trim().to_string();
        let confidence = check_confidence(self.name(), &record.part.part_code, payload.confidence)?;

        if !self.catalog.contains(&vmrs_code) {
            let err = PipelineError::CatalogIntegrity {
                part_code: record.part.part_code.clone(),
                vmrs_code: vmrs_code.clone(),
            };
            warn!("{}", err);
            record.record_stage(StageName::Mapping, "unknown_code", confidence);
            record.mark_needs_review(err.to_string());
            return Ok(());
        }

        if Validator::validate_code_prefix(&vmrs_code, self.system_code).is_err() {
            record.record_stage(StageName::Mapping, "wrong_system", confidence);
            record.mark_needs_review(format!(
                "VMRS code {} belongs to a different system than {}",
                vmrs_code, self.system_code
            ));
            return Ok(());
        }

        record.vmrs_code = Some(vmrs_code.clone());
        record.confidence = confidence;
        // The catalog, not the oracle, decides whether a code is custom.
        record.is_custom_code = self.catalog.is_custom_code(&vmrs_code);
        record.match_type = Some(if record.visited_stage(StageName::Research) {
            MatchType::WebSearch
        } else {
            MatchType::ExactMatch
        });
        record.record_stage(StageName::Mapping, "mapped", confidence);
        if !payload.reasoning.is_empty() {
            record.push_note(payload.reasoning.clone());
        }

        Ok(())
    }
}
