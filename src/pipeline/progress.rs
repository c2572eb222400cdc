// file: src/pipeline/progress.rs
// description: progress tracking and statistics reporting for pipeline execution
// reference: uses indicatif for progress bars and tracks per-status counts

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

/// Counts for one completed run. Statuses are mutually exclusive; `flagged`
/// is a subset of `validated`.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub total_parts: usize,
    pub validated: usize,
    pub flagged: usize,
    pub needs_review: usize,
    pub failed: usize,
    pub cache_hits: usize,
    pub failure_kinds: BTreeMap<String, usize>,
    pub duration_secs: u64,
}

impl RunSummary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn success_rate(&self) -> f64 {
        if self.total_parts == 0 {
            return 0.0;
        }
        (self.validated as f64 / self.total_parts as f64) * 100.0
    }

    pub fn parts_per_second(&self) -> f64 {
        if self.duration_secs == 0 {
            return 0.0;
        }
        self.total_parts as f64 / self.duration_secs as f64
    }

    /// Every part must land in exactly one status bucket.
    pub fn is_reconciled(&self) -> bool {
        self.validated + self.needs_review + self.failed == self.total_parts
    }
}

pub struct ProgressTracker {
    main_bar: ProgressBar,
    detail_bar: ProgressBar,
    validated: Arc<AtomicUsize>,
    flagged: Arc<AtomicUsize>,
    needs_review: Arc<AtomicUsize>,
    failed: Arc<AtomicUsize>,
    cache_hits: Arc<AtomicUsize>,
    failure_kinds: Mutex<BTreeMap<String, usize>>,
    total_parts: usize,
    start_time: Instant,
}

impl ProgressTracker {
    pub fn new(total_parts: usize) -> Self {
        Self::with_color(total_parts, true)
    }

    pub fn with_color(total_parts: usize, colored: bool) -> Self {
        let multi_progress = MultiProgress::new();

        let main_bar = create_progress_bar(&multi_progress, total_parts as u64, colored);
        let detail_bar = create_detail_bar(&multi_progress);

        Self {
            main_bar,
            detail_bar,
            validated: Arc::new(AtomicUsize::new(0)),
            flagged: Arc::new(AtomicUsize::new(0)),
            needs_review: Arc::new(AtomicUsize::new(0)),
            failed: Arc::new(AtomicUsize::new(0)),
            cache_hits: Arc::new(AtomicUsize::new(0)),
            failure_kinds: Mutex::new(BTreeMap::new()),
            total_parts,
            start_time: Instant::now(),
        }
    }

    pub fn inc_validated(&self, flagged: bool) {
        self.validated.fetch_add(1, Ordering::SeqCst);
        if flagged {
            self.flagged.fetch_add(1, Ordering::SeqCst);
        }
        self.main_bar.inc(1);
        self.update_detail_bar();
    }

    pub fn inc_needs_review(&self) {
        self.needs_review.fetch_add(1, Ordering::SeqCst);
        self.main_bar.inc(1);
        self.update_detail_bar();
    }

    pub fn inc_failed(&self, kind: &str) {
        self.failed.fetch_add(1, Ordering::SeqCst);
        *self
            .failure_kinds
            .lock()
            .unwrap()
            .entry(kind.to_string())
            .or_insert(0) += 1;
        self.main_bar.inc(1);
        self.update_detail_bar();
    }

    pub fn inc_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::SeqCst);
    }

    pub fn set_message(&self, message: String) {
        self.detail_bar.set_message(message);
    }

    pub fn finish(&self) {
        self.main_bar.finish_with_message("Classification complete");
        self.detail_bar.finish_and_clear();
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            total_parts: self.total_parts,
            validated: self.validated.load(Ordering::SeqCst),
            flagged: self.flagged.load(Ordering::SeqCst),
            needs_review: self.needs_review.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
            cache_hits: self.cache_hits.load(Ordering::SeqCst),
            failure_kinds: self.failure_kinds.lock().unwrap().clone(),
            duration_secs: self.start_time.elapsed().as_secs(),
        }
    }

    fn update_detail_bar(&self) {
        let validated = self.validated.load(Ordering::SeqCst);
        let review = self.needs_review.load(Ordering::SeqCst);
        let failed = self.failed.load(Ordering::SeqCst);

        let message = format!(
            "Validated: {} | Review: {} | Failed: {}",
            validated, review, failed
        );

        self.detail_bar.set_message(message);
    }
}

impl Drop for ProgressTracker {
    fn drop(&mut self) {
        self.finish();
    }
}

fn create_progress_bar(multi_progress: &MultiProgress, total: u64, colored: bool) -> ProgressBar {
    let bar = multi_progress.add(ProgressBar::new(total));
    if colored {
        bar.set_style(
            ProgressStyle::default_bar()
                .template(
                    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}",
                )
                .expect("Failed to create progress bar template")
                .progress_chars("█▓▒░"),
        );
    } else {
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner} [{elapsed_precise}] [{bar:40}] {pos}/{len} ({eta}) {msg}")
                .expect("Failed to create progress bar template")
                .progress_chars("=>-"),
        );
    }
    bar
}

fn create_detail_bar(multi_progress: &MultiProgress) -> ProgressBar {
    let bar = multi_progress.add(ProgressBar::new(0));
    let style = ProgressStyle::default_bar()
        .template("{msg}")
        .expect("Failed to create detail bar template");
    bar.set_style(style);
    bar
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_calculations() {
        let mut summary = RunSummary::new();
        summary.total_parts = 100;
        summary.validated = 80;
        summary.needs_review = 15;
        summary.failed = 5;
        summary.duration_secs = 10;

        assert_eq!(summary.success_rate(), 80.0);
        assert_eq!(summary.parts_per_second(), 10.0);
        assert!(summary.is_reconciled());
    }

    #[test]
    fn test_summary_zero_parts() {
        let summary = RunSummary::new();
        assert_eq!(summary.success_rate(), 0.0);
        assert_eq!(summary.parts_per_second(), 0.0);
        assert!(summary.is_reconciled());
    }

    #[test]
    fn test_unreconciled_counts_detected() {
        let mut summary = RunSummary::new();
        summary.total_parts = 10;
        summary.validated = 5;
        assert!(!summary.is_reconciled());
    }

    #[test]
    fn test_tracker_counts() {
        let tracker = ProgressTracker::with_color(10, false);

        tracker.inc_validated(false);
        tracker.inc_validated(true);
        tracker.inc_needs_review();
        tracker.inc_failed("oracle_malformed");
        tracker.inc_failed("oracle_malformed");
        tracker.inc_cache_hit();

        let summary = tracker.summary();
        assert_eq!(summary.validated, 2);
        assert_eq!(summary.flagged, 1);
        assert_eq!(summary.needs_review, 1);
        assert_eq!(summary.failed, 2);
        assert_eq!(summary.cache_hits, 1);
        assert_eq!(summary.failure_kinds.get("oracle_malformed"), Some(&2));
    }
}
