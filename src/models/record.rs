// file: src/models/record.rs
// description: per-part classification state accumulated across pipeline stages

use crate::models::Part;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stage-1 routing decision: which downstream path a part takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum Routing {
    #[serde(rename = "EXACT_MATCH")]
    ExactMatch,
    #[serde(rename = "PATTERN_MATCH_NEEDED")]
    PatternMatchNeeded,
    #[serde(rename = "WEB_SEARCH_NEEDED")]
    WebSearchNeeded,
}

impl Routing {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "EXACT_MATCH" => Some(Routing::ExactMatch),
            "PATTERN_MATCH_NEEDED" => Some(Routing::PatternMatchNeeded),
            "WEB_SEARCH_NEEDED" => Some(Routing::WebSearchNeeded),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Routing::ExactMatch => "EXACT_MATCH",
            Routing::PatternMatchNeeded => "PATTERN_MATCH_NEEDED",
            Routing::WebSearchNeeded => "WEB_SEARCH_NEEDED",
        }
    }
}

/// Terminal once anything other than `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum PartStatus {
    #[serde(rename = "PENDING")]
    Pending,
    #[serde(rename = "VALIDATED")]
    Validated,
    #[serde(rename = "NEEDS_REVIEW")]
    NeedsReview,
    #[serde(rename = "FAILED")]
    Failed,
}

impl PartStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PartStatus::Pending)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PartStatus::Pending => "PENDING",
            PartStatus::Validated => "VALIDATED",
            PartStatus::NeedsReview => "NEEDS_REVIEW",
            PartStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for PartStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the final VMRS code was arrived at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum MatchType {
    #[serde(rename = "exact_match")]
    ExactMatch,
    #[serde(rename = "pattern_match")]
    PatternMatch,
    #[serde(rename = "web_search")]
    WebSearch,
}

impl MatchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchType::ExactMatch => "exact_match",
            MatchType::PatternMatch => "pattern_match",
            MatchType::WebSearch => "web_search",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum StageName {
    Classification,
    PatternMatch,
    Research,
    Mapping,
    Validation,
}

impl StageName {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageName::Classification => "classification",
            StageName::PatternMatch => "pattern_match",
            StageName::Research => "research",
            StageName::Mapping => "mapping",
            StageName::Validation => "validation",
        }
    }
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One audit entry per stage a record passed through.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct StageEntry {
    pub stage: StageName,
    pub outcome: String,
    pub confidence: u8,
}

/// Per-part state accumulated across stages. `status`, `notes` and
/// `stage_history` are private so that terminality and append-only
/// discipline cannot be bypassed.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClassificationRecord {
    pub part: Part,
    pub system_code: Option<String>,
    pub routing: Option<Routing>,
    pub vmrs_code: Option<String>,
    pub confidence: u8,
    pub is_custom_code: bool,
    pub match_type: Option<MatchType>,
    pub enriched_description: Option<String>,
    /// Set when the post-mapping confidence fell below the review threshold;
    /// the record still runs through validation but cannot auto-approve.
    pub review_forced: bool,
    /// Validated but below the auto-approve bar; lands in the flagged
    /// report as well as the master output.
    pub flagged: bool,
    status: PartStatus,
    notes: Vec<String>,
    stage_history: Vec<StageEntry>,
}

impl ClassificationRecord {
    pub fn new(part: Part) -> Self {
        Self {
            part,
            system_code: None,
            routing: None,
            vmrs_code: None,
            confidence: 0,
            is_custom_code: false,
            match_type: None,
            enriched_description: None,
            review_forced: false,
            flagged: false,
            status: PartStatus::Pending,
            notes: Vec::new(),
            stage_history: Vec::new(),
        }
    }

    pub fn status(&self) -> PartStatus {
        self.status
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn notes(&self) -> &[String] {
        &self.notes
    }

    pub fn joined_notes(&self) -> String {
        self.notes.join("; ")
    }

    pub fn stage_history(&self) -> &[StageEntry] {
        &self.stage_history
    }

    pub fn visited_stage(&self, stage: StageName) -> bool {
        self.stage_history.iter().any(|e| e.stage == stage)
    }

    pub fn push_note(&mut self, note: impl Into<String>) {
        self.notes.push(note.into());
    }

    /// Appends an audit entry. Ignored once the record is terminal.
    pub fn record_stage(&mut self, stage: StageName, outcome: impl Into<String>, confidence: u8) {
        if self.is_terminal() {
            return;
        }
        self.stage_history.push(StageEntry {
            stage,
            outcome: outcome.into(),
            confidence,
        });
    }

    pub fn mark_validated(&mut self) {
        if !self.is_terminal() {
            self.status = PartStatus::Validated;
        }
    }

    pub fn mark_needs_review(&mut self, reason: impl Into<String>) {
        if !self.is_terminal() {
            self.notes.push(reason.into());
            self.status = PartStatus::NeedsReview;
        }
    }

    pub fn mark_failed(&mut self, reason: impl Into<String>) {
        if !self.is_terminal() {
            self.notes.push(reason.into());
            self.status = PartStatus::Failed;
        }
    }
}
