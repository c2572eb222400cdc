// file: src/stages/classify.rs
// description: stage 1 - system classification and routing over the whole part set

use crate::error::Result;
use crate::models::{Catalog, ClassificationRecord, StageName};
use crate::oracle::OracleError;
use crate::stages::StageSpec;
use crate::stages::schema::{
    self, ClassificationPayload, check_confidence, check_part_coverage, check_routing,
};
use std::collections::HashMap;
use std::fmt::Write;
use tracing::warn;

/// Assigns every part a VMRS system code, an initial confidence, and a
/// routing decision. Runs once over all parts and acts as the barrier
/// before any per-system work starts.
pub struct ClassificationStage<'a> {
    pub catalog: &'a Catalog,
    pub max_tokens: u32,
}

impl StageSpec for ClassificationStage<'_> {
    type Payload = ClassificationPayload;

    fn name(&self) -> StageName {
        StageName::Classification
    }

    fn max_tokens(&self) -> u32 {
        self.max_tokens
    }

    fn build_prompt(&self, batch: &[ClassificationRecord]) -> String {
        let mut prompt = String::from(
            "TASK: SYSTEM CLASSIFICATION\n\
             Classify each part into one of the customer's VMRS systems and decide its routing.\n\
             Routing values: EXACT_MATCH (a catalog code clearly applies), \
             PATTERN_MATCH_NEEDED (system rules should resolve it), \
             WEB_SEARCH_NEEDED (the part name alone is not enough).\n\n\
             CUSTOMER SYSTEMS:\n",
        );

        for code in self.catalog.system_codes() {
            let name = self.catalog.system_name(&code).unwrap_or("");
            let _ = writeln!(prompt, "  {}: {}", code, name);
        }

        prompt.push_str("\nPARTS:\n");
        for record in batch {
            let _ = writeln!(
                prompt,
                "  {}: {}",
                record.part.part_code, record.part.part_name
            );
        }

        prompt.push_str(
            "\nRespond with JSON only:\n\
             {\"classified_parts\": [{\"part_code\", \"part_name\", \"vmrs_system_code\", \
             \"system_name\", \"routing\", \"confidence\" (0-100), \"reasoning\"}]}\n",
        );

        prompt
    }

    fn parse(&self, content: &str) -> std::result::Result<Self::Payload, OracleError> {
        schema::parse_payload(content)
    }

    fn validate(&self, payload: &Self::Payload, batch: &[ClassificationRecord]) -> Result<()> {
        // Parts the oracle skipped are tolerated (they fail individually in
        // apply); unknown or duplicated codes are a contract violation.
        check_part_coverage(
            self.name(),
            payload
                .classified_parts
                .iter()
                .map(|p| p.part_code.as_str()),
            batch,
            false,
        )?;

        for entry in &payload.classified_parts {
            check_routing(self.name(), &entry.part_code, &entry.routing)?;
            check_confidence(self.name(), &entry.part_code, entry.confidence)?;
            if entry.vmrs_system_code.trim().is_empty() {
                return Err(schema::schema_err(
                    self.name(),
                    format!("empty system code for part {}", entry.part_code),
                ));
            }
        }

        Ok(())
    }

    fn apply(&self, payload: Self::Payload, batch: &mut [ClassificationRecord]) -> Result<()> {
        let known_systems = self.catalog.system_codes();
        let by_code: HashMap<&str, &schema::ClassifiedPart> = payload
            .classified_parts
            .iter()
            .map(|p| (p.part_code.as_str(), p))
            .collect();

        for record in batch.iter_mut() {
            if record.is_terminal() {
                continue;
            }

            let Some(entry) = by_code.get(record.part.part_code.as_str()) else {
                warn!(
                    "Part {} missing from classification response",
                    record.part.part_code
                );
                record.record_stage(StageName::Classification, "missing", 0);
                record.mark_failed("part missing from classification response");
                continue;
            };

            // Validated above; both lookups are infallible here.
            let routing = check_routing(self.name(), &entry.part_code, &entry.routing)?;
            let confidence = check_confidence(self.name(), &entry.part_code, entry.confidence)?;
            let system_code = entry.vmrs_system_code.trim().to_string();

            record.routing = Some(routing);
            record.confidence = confidence;
            record.record_stage(StageName::Classification, routing.as_str(), confidence);
            if !entry.reasoning.is_empty() {
                record.push_note(entry.reasoning.clone());
            }

            if known_systems.contains(&system_code) {
                record.system_code = Some(system_code);
            } else {
                record.system_code = Some(system_code.clone());
                record.mark_needs_review(format!(
                    "system {} has no entries in the customer catalog",
                    system_code
                ));
            }
        }

        Ok(())
    }
}
