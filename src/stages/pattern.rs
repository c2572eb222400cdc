// file: src/stages/pattern.rs
// description: stage 2 - rule-driven pattern matching within a single system

use crate::data::ValidatedExample;
use crate::error::Result;
use crate::models::{ClassificationRecord, MatchType, StageName};
use crate::oracle::OracleError;
use crate::stages::StageSpec;
use crate::stages::schema::{
    self, PATTERN_MATCH_TYPES, PatternMatchPayload, check_confidence, check_enum,
    check_part_coverage,
};
use crate::utils::Validator;
use std::collections::HashMap;
use std::fmt::Write;

/// Resolves parts against the customer's per-system naming rules and
/// previously validated mappings. Parts the rules cannot resolve are
/// handed on to research.
pub struct PatternMatchStage<'a> {
    pub system_code: &'a str,
    pub rules_text: &'a str,
    pub examples: &'a [ValidatedExample],
    pub max_tokens: u32,
}

impl StageSpec for PatternMatchStage<'_> {
    type Payload = PatternMatchPayload;

    fn name(&self) -> StageName {
        StageName::PatternMatch
    }

    fn max_tokens(&self) -> u32 {
        self.max_tokens
    }

    fn build_prompt(&self, batch: &[ClassificationRecord]) -> String {
        let mut prompt = format!(
            "TASK: PATTERN MATCHING\n\
             Map each part in VMRS system {} to a VMRS code using the system \
             rules below. Use match_type \"exact\" when a rule names the part \
             directly, \"pattern\" when a rule family applies, and \"none\" with \
             web_search_needed=true when the rules cannot resolve the part.\n\n",
            self.system_code
        );

        if self.rules_text.trim().is_empty() {
            prompt.push_str("SYSTEM RULES: (none on file)\n");
        } else {
            let _ = writeln!(prompt, "SYSTEM RULES:\n{}", self.rules_text.trim());
        }

        if !self.examples.is_empty() {
            prompt.push_str("\nPREVIOUSLY VALIDATED MAPPINGS:\n");
            for example in self.examples {
                let _ = writeln!(
                    prompt,
                    "  {} -> {}",
                    example.part_name, example.vmrs_code
                );
            }
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
             {\"mappings\": [{\"part_code\", \"part_name\", \"vmrs_code\" (null if none), \
             \"confidence\" (0-100), \"match_type\" (exact|pattern|none), \
             \"web_search_needed\" (bool), \"notes\"}]}\n",
        );

        prompt
    }

    fn parse(&self, content: &str) -> std::result::Result<Self::Payload, OracleError> {
        schema::parse_payload(content)
    }

    fn validate(&self, payload: &Self::Payload, batch: &[ClassificationRecord]) -> Result<()> {
        check_part_coverage(
            self.name(),
            payload.mappings.iter().map(|m| m.part_code.as_str()),
            batch,
            true,
        )?;

        for mapping in &payload.mappings {
            check_confidence(self.name(), &mapping.part_code, mapping.confidence)?;
            check_enum(
                self.name(),
                "match_type",
                &mapping.match_type,
                &PATTERN_MATCH_TYPES,
            )?;

            let has_code = mapping
                .vmrs_code
                .as_deref()
                .map(|c| !c.trim().is_empty())
                .unwrap_or(false);
            if mapping.match_type != "none" && !mapping.web_search_needed && !has_code {
                return Err(schema::schema_err(
                    self.name(),
                    format!(
                        "match_type {:?} for part {} without a vmrs_code",
                        mapping.match_type, mapping.part_code
                    ),
                ));
            }
        }

        Ok(())
    }

    fn apply(&self, payload: Self::Payload, batch: &mut [ClassificationRecord]) -> Result<()> {
        let by_code: HashMap<&str, &schema::PatternMapping> = payload
            .mappings
            .iter()
            .map(|m| (m.part_code.as_str(), m))
            .collect();

        for record in batch.iter_mut() {
            if record.is_terminal() {
                continue;
            }
            let Some(mapping) = by_code.get(record.part.part_code.as_str()) else {
                continue;
            };

            let confidence = check_confidence(self.name(), &mapping.part_code, mapping.confidence)?;
            record.confidence = confidence;
            if !mapping.notes.is_empty() {
                record.push_note(mapping.notes.clone());
            }

            if mapping.web_search_needed || mapping.match_type == "none" {
                // Unresolved by rules; research fills in the gap.
                record.vmrs_code = None;
                record.match_type = None;
                record.record_stage(StageName::PatternMatch, "unresolved", confidence);
                continue;
            }

            let vmrs_code = mapping
                .vmrs_code
                .as_deref()
                .map(str::trim)
                .unwrap_or_default()
                .to_string();

            // A rule hit from another system never proceeds with its code.
            if Validator::validate_code_prefix(&vmrs_code, self.system_code).is_err() {
                record.record_stage(StageName::PatternMatch, "wrong_system", confidence);
                record.mark_needs_review(format!(
                    "VMRS code {} belongs to a different system than {}",
                    vmrs_code, self.system_code
                ));
                continue;
            }

            record.vmrs_code = Some(vmrs_code);
            record.match_type = Some(match mapping.match_type.as_str() {
                "exact" => MatchType::ExactMatch,
                _ => MatchType::PatternMatch,
            });
            record.record_stage(StageName::PatternMatch, &mapping.match_type, confidence);
        }

        Ok(())
    }
}
