// file: src/pipeline/routing.rs
// description: confidence thresholds turned into path and disposition decisions

use crate::config::ThresholdConfig;
use crate::models::{ClassificationRecord, PartStatus, Routing};

/// Which stage a part visits next after classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StagePath {
    /// Straight to mapping; the classification was unambiguous.
    Mapping,
    PatternMatch,
    Research,
}

/// Where a part goes after pattern matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternOutcome {
    /// Rules resolved the part; it proceeds to validation with its code.
    Proceed,
    Research,
}

/// Disposition after a code was assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MappingDisposition {
    AutoApprove,
    /// Validated if stage 5 agrees, but listed in the flagged report.
    Flagged,
    /// Cannot auto-approve regardless of the stage-5 verdict.
    ForceReview,
}

/// All threshold comparisons live here so every stage agrees on where the
/// boundaries fall. Ties always take the more cautious path.
#[derive(Debug, Clone, Copy)]
pub struct RoutingPolicy {
    auto_approve: u8,
    require_web_search: u8,
    flag_for_review: u8,
}

impl From<&ThresholdConfig> for RoutingPolicy {
    fn from(thresholds: &ThresholdConfig) -> Self {
        Self {
            auto_approve: thresholds.auto_approve,
            require_web_search: thresholds.require_web_search,
            flag_for_review: thresholds.flag_for_review,
        }
    }
}

impl RoutingPolicy {
    pub fn new(auto_approve: u8, require_web_search: u8, flag_for_review: u8) -> Self {
        Self {
            auto_approve,
            require_web_search,
            flag_for_review,
        }
    }

    /// Path selection after stage 1 follows the oracle's routing field
    /// alone; an exact match skips pattern matching and research outright.
    pub fn after_classification(&self, record: &ClassificationRecord) -> StagePath {
        match record.routing {
            Some(Routing::ExactMatch) => StagePath::Mapping,
            Some(Routing::PatternMatchNeeded) => StagePath::PatternMatch,
            Some(Routing::WebSearchNeeded) | None => StagePath::Research,
        }
    }

    /// After pattern matching: a resolved code at or above the web-search
    /// bar keeps its code, anything else goes through research.
    pub fn after_pattern_match(&self, record: &ClassificationRecord) -> PatternOutcome {
        if record.vmrs_code.is_none() || record.confidence < self.require_web_search {
            PatternOutcome::Research
        } else {
            PatternOutcome::Proceed
        }
    }

    /// After mapping: at or above the auto-approve bar passes cleanly, at
    /// or above the review bar passes flagged, below it review is forced.
    /// When the two bars coincide, confidence exactly at them is a
    /// threshold tie and takes the flagged path.
    pub fn after_mapping(&self, confidence: u8) -> MappingDisposition {
        if confidence > self.auto_approve {
            return MappingDisposition::AutoApprove;
        }
        if confidence == self.auto_approve {
            return if self.auto_approve == self.flag_for_review {
                MappingDisposition::Flagged
            } else {
                MappingDisposition::AutoApprove
            };
        }
        if confidence >= self.flag_for_review {
            MappingDisposition::Flagged
        } else {
            MappingDisposition::ForceReview
        }
    }

    /// Final status from the stage-5 verdict plus the record's adjusted
    /// confidence. Returns the status and whether the part lands in the
    /// flagged report.
    pub fn final_status(
        &self,
        verdict: &str,
        adjusted_confidence: u8,
        review_forced: bool,
    ) -> (PartStatus, bool) {
        match verdict {
            "FAIL" => (PartStatus::Failed, false),
            "REVIEW" => (PartStatus::NeedsReview, false),
            _ => {
                if review_forced {
                    return (PartStatus::NeedsReview, false);
                }
                match self.after_mapping(adjusted_confidence) {
                    MappingDisposition::AutoApprove => (PartStatus::Validated, false),
                    MappingDisposition::Flagged => (PartStatus::Validated, true),
                    MappingDisposition::ForceReview => (PartStatus::NeedsReview, false),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Part;

    fn policy() -> RoutingPolicy {
        RoutingPolicy::new(90, 70, 90)
    }

    fn record(routing: Routing, confidence: u8) -> ClassificationRecord {
        let mut rec = ClassificationRecord::new(Part::new("P1", "Brake Pad"));
        rec.routing = Some(routing);
        rec.confidence = confidence;
        rec
    }

    #[test]
    fn test_after_classification_follows_routing() {
        let p = policy();
        assert_eq!(
            p.after_classification(&record(Routing::ExactMatch, 95)),
            StagePath::Mapping
        );
        assert_eq!(
            p.after_classification(&record(Routing::PatternMatchNeeded, 80)),
            StagePath::PatternMatch
        );
        assert_eq!(
            p.after_classification(&record(Routing::WebSearchNeeded, 80)),
            StagePath::Research
        );
    }

    #[test]
    fn test_exact_match_keeps_mapping_path_at_any_confidence() {
        let p = policy();
        assert_eq!(
            p.after_classification(&record(Routing::ExactMatch, 50)),
            StagePath::Mapping
        );
        assert_eq!(
            p.after_classification(&record(Routing::ExactMatch, 70)),
            StagePath::Mapping
        );
    }

    #[test]
    fn test_after_pattern_match() {
        let p = policy();

        let mut resolved = record(Routing::PatternMatchNeeded, 85);
        resolved.vmrs_code = Some("13-040".into());
        assert_eq!(p.after_pattern_match(&resolved), PatternOutcome::Proceed);

        let unresolved = record(Routing::PatternMatchNeeded, 85);
        assert_eq!(p.after_pattern_match(&unresolved), PatternOutcome::Research);

        // Exactly at the web-search bar a resolved code proceeds.
        let mut boundary = record(Routing::PatternMatchNeeded, 70);
        boundary.vmrs_code = Some("13-040".into());
        assert_eq!(p.after_pattern_match(&boundary), PatternOutcome::Proceed);

        let mut below = record(Routing::PatternMatchNeeded, 69);
        below.vmrs_code = Some("13-040".into());
        assert_eq!(p.after_pattern_match(&below), PatternOutcome::Research);
    }

    #[test]
    fn test_after_mapping_dispositions() {
        let p = policy();
        assert_eq!(p.after_mapping(95), MappingDisposition::AutoApprove);
        assert_eq!(p.after_mapping(91), MappingDisposition::AutoApprove);
        // Exactly at the tied thresholds passes flagged, never auto-approves.
        assert_eq!(p.after_mapping(90), MappingDisposition::Flagged);
        assert_eq!(p.after_mapping(89), MappingDisposition::ForceReview);
        assert_eq!(p.after_mapping(0), MappingDisposition::ForceReview);
    }

    #[test]
    fn test_after_mapping_untied_thresholds() {
        let p = RoutingPolicy::new(90, 70, 80);
        // With distinct bars, confidence at auto-approve passes cleanly.
        assert_eq!(p.after_mapping(90), MappingDisposition::AutoApprove);
        assert_eq!(p.after_mapping(89), MappingDisposition::Flagged);
        assert_eq!(p.after_mapping(80), MappingDisposition::Flagged);
        assert_eq!(p.after_mapping(79), MappingDisposition::ForceReview);
    }

    #[test]
    fn test_final_status() {
        let p = policy();
        assert_eq!(p.final_status("FAIL", 99, false), (PartStatus::Failed, false));
        assert_eq!(
            p.final_status("REVIEW", 99, false),
            (PartStatus::NeedsReview, false)
        );
        assert_eq!(
            p.final_status("PASS", 95, false),
            (PartStatus::Validated, false)
        );
        assert_eq!(
            p.final_status("PASS", 90, false),
            (PartStatus::Validated, true)
        );
        assert_eq!(
            p.final_status("PASS", 80, false),
            (PartStatus::NeedsReview, false)
        );
        // A forced review is never overturned by a PASS verdict.
        assert_eq!(
            p.final_status("PASS", 99, true),
            (PartStatus::NeedsReview, false)
        );
    }
}
