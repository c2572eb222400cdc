// file: src/stages/validate.rs
// description: stage 5 - quality validation and final status assignment

use crate::error::{PipelineError, Result};
use crate::models::{Catalog, ClassificationRecord, PartStatus, StageName};
use crate::oracle::OracleError;
use crate::pipeline::RoutingPolicy;
use crate::stages::StageSpec;
use crate::utils::Validator;
use crate::stages::schema::{
    self, VALIDATION_STATUSES, ValidationPayload, check_confidence, check_enum,
    check_part_coverage,
};
use std::collections::{HashMap, HashSet};
use std::fmt::Write;
use tracing::warn;

/// Reviews mapped parts in batches and settles each record into a terminal
/// status. Validation may lower a confidence but never raises one, and a
/// PASS verdict cannot overturn a forced review.
pub struct ValidationStage<'a> {
    pub catalog: &'a Catalog,
    pub policy: RoutingPolicy,
    pub max_tokens: u32,
}

impl StageSpec for ValidationStage<'_> {
    type Payload = ValidationPayload;

    fn name(&self) -> StageName {
        StageName::Validation
    }

    fn max_tokens(&self) -> u32 {
        self.max_tokens
    }

    fn build_prompt(&self, batch: &[ClassificationRecord]) -> String {
        let mut prompt = String::from(
            "TASK: QUALITY VALIDATION\n\
             Review each proposed part-to-VMRS mapping. Return PASS when the \
             mapping is sound, REVIEW when a human should look at it, FAIL \
             when it is clearly wrong.\n\n\
             PROPOSED MAPPINGS:\n",
        );

        for record in batch {
            let code = record.vmrs_code.as_deref().unwrap_or("(none)");
            let description = record
                .vmrs_code
                .as_deref()
                .and_then(|c| self.catalog.get(c))
                .map(|e| e.description.as_str())
                .unwrap_or("");
            let _ = writeln!(
                prompt,
                "  {}: {} -> {} ({}) confidence {}",
                record.part.part_code, record.part.part_name, code, description, record.confidence
            );
        }

        prompt.push_str(
            "\nRespond with JSON only:\n\
             {\"validations\": [{\"part_code\", \"status\" (PASS|REVIEW|FAIL), \
             \"confidence\" (0-100), \"issues\": [\"...\"]}]}\n",
        );

        prompt
    }

    fn parse(&self, content: &str) -> std::result::Result<Self::Payload, OracleError> {
        schema::parse_payload(content)
    }

    fn validate(&self, payload: &Self::Payload, batch: &[ClassificationRecord]) -> Result<()> {
        // Every part must get a verdict; a silent drop here would leave a
        // record unreconciled.
        check_part_coverage(
            self.name(),
            payload.validations.iter().map(|v| v.part_code.as_str()),
            batch,
            true,
        )?;

        for verdict in &payload.validations {
            check_enum(self.name(), "status", &verdict.status, &VALIDATION_STATUSES)?;
            check_confidence(self.name(), &verdict.part_code, verdict.confidence)?;
        }

        Ok(())
    }

    fn apply(&self, payload: Self::Payload, batch: &mut [ClassificationRecord]) -> Result<()> {
        let contradicted = contradictory_part_codes(batch);
        let by_code: HashMap<&str, &schema::ValidationVerdict> = payload
            .validations
            .iter()
            .map(|v| (v.part_code.as_str(), v))
            .collect();

        for record in batch.iter_mut() {
            if record.is_terminal() {
                continue;
            }
            // Coverage was checked; every non-terminal record has a verdict.
            let Some(verdict) = by_code.get(record.part.part_code.as_str()) else {
                continue;
            };

            let returned = check_confidence(self.name(), &verdict.part_code, verdict.confidence)?;
            let adjusted = returned.min(record.confidence);
            if adjusted < record.confidence {
                record.push_note(format!(
                    "validation lowered confidence from {} to {}",
                    record.confidence, adjusted
                ));
            }
            record.confidence = adjusted;

            for issue in &verdict.issues {
                record.push_note(issue.clone());
            }

            // Recheck the code regardless of which stage assigned it: it
            // must exist in the catalog and sit in the record's system.
            let integrity_err = match record.vmrs_code.as_deref() {
                None => Some(PipelineError::Validation(format!(
                    "part {} reached validation without a VMRS code",
                    record.part.part_code
                ))),
                Some(code) if !self.catalog.contains(code) => {
                    Some(PipelineError::CatalogIntegrity {
                        part_code: record.part.part_code.clone(),
                        vmrs_code: code.to_string(),
                    })
                }
                Some(code) => match &record.system_code {
                    Some(system) => Validator::validate_code_prefix(code, system).err(),
                    None => None,
                },
            };

            record.record_stage(StageName::Validation, &verdict.status, adjusted);

            if contradicted.contains(record.part.part_code.as_str()) {
                record.mark_needs_review(
                    "same part name mapped to different VMRS codes in this batch",
                );
                continue;
            }

            if let Some(err) = integrity_err {
                warn!("Part {} cannot validate: {}", record.part.part_code, err);
                record.mark_needs_review(err.to_string());
                continue;
            }

            let (status, flagged) =
                self.policy
                    .final_status(&verdict.status, adjusted, record.review_forced);
            match status {
                PartStatus::Validated => {
                    record.flagged = flagged;
                    if flagged {
                        record.push_note("confidence below auto-approve, flagged for review");
                    }
                    record.mark_validated();
                }
                PartStatus::NeedsReview => {
                    record.mark_needs_review(format!(
                        "validation verdict {} at confidence {}",
                        verdict.status, adjusted
                    ));
                }
                PartStatus::Failed => {
                    record.mark_failed("validation rejected the mapping");
                }
                PartStatus::Pending => unreachable!("final_status never returns Pending"),
            }
        }

        Ok(())
    }
}

/// Part codes whose part name maps to more than one distinct VMRS code
/// within the batch. Both sides of a contradiction go to review.
fn contradictory_part_codes(batch: &[ClassificationRecord]) -> HashSet<String> {
    let mut codes_by_name: HashMap<String, HashSet<&str>> = HashMap::new();
    for record in batch {
        if let Some(code) = record.vmrs_code.as_deref() {
            codes_by_name
                .entry(record.part.part_name.trim().to_lowercase())
                .or_default()
                .insert(code);
        }
    }

    batch
        .iter()
        .filter(|r| {
            r.vmrs_code.is_some()
                && codes_by_name
                    .get(&r.part.part_name.trim().to_lowercase())
                    .map(|codes| codes.len() > 1)
                    .unwrap_or(false)
        })
        .map(|r| r.part.part_code.clone())
        .collect()
}
