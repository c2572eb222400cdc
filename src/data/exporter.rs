// file: src/data/exporter.rs
// description: CSV and report output for completed classification runs

use crate::error::{PipelineError, Result};
use crate::models::{ClassificationRecord, PartStatus};
use crate::pipeline::RunSummary;
use chrono::Local;
use serde::Serialize;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Serialize)]
struct MasterRow<'a> {
    part_code: &'a str,
    part_name: &'a str,
    vmrs_code: &'a str,
    confidence: u8,
    status: &'a str,
    match_type: &'a str,
    notes: String,
    is_custom_code: bool,
}

#[derive(Debug, Serialize)]
struct FlaggedRow<'a> {
    part_code: &'a str,
    part_name: &'a str,
    suggested_vmrs_code: &'a str,
    confidence: u8,
    reason_flagged: &'a str,
    agent_notes: String,
}

/// Writes run outputs under a single output directory: the master results
/// CSV, the flagged-for-review CSV, and a plain-text processing report.
pub struct OutputWriter {
    output_dir: PathBuf,
}

impl OutputWriter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    fn ensure_output_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.output_dir).map_err(|source| PipelineError::FileOperation {
            path: self.output_dir.clone(),
            source,
        })
    }

    /// One row per input part, whatever its final status.
    pub fn write_master(&self, records: &[ClassificationRecord]) -> Result<PathBuf> {
        self.ensure_output_dir()?;
        let path = self.output_dir.join("classification_results.csv");

        let mut writer = csv::Writer::from_path(&path)?;
        for record in records {
            writer.serialize(MasterRow {
                part_code: &record.part.part_code,
                part_name: &record.part.part_name,
                vmrs_code: record.vmrs_code.as_deref().unwrap_or(""),
                confidence: record.confidence,
                status: record.status().as_str(),
                match_type: record.match_type.map(|m| m.as_str()).unwrap_or(""),
                notes: record.joined_notes(),
                is_custom_code: record.is_custom_code,
            })?;
        }
        writer.flush()?;

        info!("Wrote {} result row(s) to {}", records.len(), path.display());
        Ok(path)
    }

    /// Parts a human should look at: everything in NEEDS_REVIEW plus
    /// validated-but-flagged parts.
    pub fn write_flagged(&self, records: &[ClassificationRecord]) -> Result<PathBuf> {
        self.ensure_output_dir()?;
        let path = self.output_dir.join("flagged_for_review.csv");

        let mut writer = csv::Writer::from_path(&path)?;
        let mut count = 0;
        for record in records {
            let reason = match record.status() {
                PartStatus::NeedsReview => "needs_review",
                PartStatus::Validated if record.flagged => "below_auto_approve",
                _ => continue,
            };

            writer.serialize(FlaggedRow {
                part_code: &record.part.part_code,
                part_name: &record.part.part_name,
                suggested_vmrs_code: record.vmrs_code.as_deref().unwrap_or(""),
                confidence: record.confidence,
                reason_flagged: reason,
                agent_notes: record.joined_notes(),
            })?;
            count += 1;
        }
        writer.flush()?;

        info!("Wrote {} flagged row(s) to {}", count, path.display());
        Ok(path)
    }

    /// Human-readable summary of the run.
    pub fn write_report(&self, summary: &RunSummary) -> Result<PathBuf> {
        self.ensure_output_dir()?;
        let path = self.output_dir.join("processing_report.txt");

        fs::write(&path, render_report(summary)).map_err(|source| {
            PipelineError::FileOperation {
                path: path.clone(),
                source,
            }
        })?;

        info!("Wrote processing report to {}", path.display());
        Ok(path)
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }
}

fn render_report(summary: &RunSummary) -> String {
    let mut report = String::new();
    let _ = writeln!(report, "VMRS CLASSIFICATION REPORT");
    let _ = writeln!(
        report,
        "Generated: {}",
        Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    let _ = writeln!(report, "==========================================");
    let _ = writeln!(report, "Total parts:       {}", summary.total_parts);
    let _ = writeln!(report, "Validated:         {}", summary.validated);
    let _ = writeln!(report, "  of which flagged: {}", summary.flagged);
    let _ = writeln!(report, "Needs review:      {}", summary.needs_review);
    let _ = writeln!(report, "Failed:            {}", summary.failed);
    let _ = writeln!(report, "Cache hits:        {}", summary.cache_hits);
    let _ = writeln!(report, "Success rate:      {:.2}%", summary.success_rate());
    let _ = writeln!(report, "Duration:          {} seconds", summary.duration_secs);

    if !summary.failure_kinds.is_empty() {
        let _ = writeln!(report, "\nFailures by kind:");
        for (kind, count) in &summary.failure_kinds {
            let _ = writeln!(report, "  {}: {}", kind, count);
        }
    }

    report
}
