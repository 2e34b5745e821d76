use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use keepsake_core::ProgressReporter;
use std::sync::Mutex;
use std::time::Duration;

const TICKS: &str = "⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏";

/// CLI progress reporter using indicatif progress bars.
///
/// - Crawl phase: spinner (unknown total files upfront)
/// - Hash phase: progress bar (total files known from the crawl)
/// - Analyze phase: spinner
pub struct CliReporter {
    bar: Mutex<Option<ProgressBar>>,
}

impl CliReporter {
    pub fn new() -> Self {
        Self {
            bar: Mutex::new(None),
        }
    }

    fn spinner(&self, message: &str) {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap()
                .tick_chars(TICKS),
        );
        pb.set_message(message.to_string());
        pb.enable_steady_tick(Duration::from_millis(80));
        self.set_bar(pb);
    }

    fn set_bar(&self, pb: ProgressBar) {
        let mut guard = self.bar.lock().unwrap();
        if let Some(old) = guard.take() {
            old.finish_and_clear();
        }
        *guard = Some(pb);
    }

    fn finish_bar(&self) {
        let mut guard = self.bar.lock().unwrap();
        if let Some(pb) = guard.take() {
            pb.finish_and_clear();
        }
    }

    fn done(&self, message: String) {
        self.finish_bar();
        eprintln!("  {} {}", "✓".green(), message);
    }
}

impl ProgressReporter for CliReporter {
    fn on_crawl_start(&self) {
        self.spinner("Crawling source roots...");
    }

    fn on_crawl_progress(&self, files_found: usize, _current_path: &str) {
        let guard = self.bar.lock().unwrap();
        if let Some(pb) = guard.as_ref() {
            pb.set_message(format!("Crawling... {} files found", files_found));
        }
    }

    fn on_crawl_complete(&self, total_files: usize, duration_secs: f64) {
        self.done(format!(
            "Crawl complete: {} files in {:.2}s",
            total_files, duration_secs
        ));
    }

    fn on_hash_start(&self) {
        // Total is set on the first on_hash_progress
        let pb = ProgressBar::new(0);
        pb.set_style(
            ProgressStyle::with_template(
                "  {spinner:.cyan} Hashing [{bar:30.cyan/dim}] {pos}/{len} files ({eta} remaining)",
            )
            .unwrap()
            .progress_chars("━╸─")
            .tick_chars(TICKS),
        );
        pb.enable_steady_tick(Duration::from_millis(80));
        self.set_bar(pb);
    }

    fn on_hash_progress(&self, files_hashed: usize, total_files: usize) {
        let guard = self.bar.lock().unwrap();
        if let Some(pb) = guard.as_ref() {
            if pb.length() != Some(total_files as u64) {
                pb.set_length(total_files as u64);
            }
            pb.set_position(files_hashed as u64);
        }
    }

    fn on_hash_complete(&self, files_keyed: usize, duration_secs: f64) {
        self.done(format!(
            "Funnel complete: {} files keyed in {:.2}s",
            files_keyed, duration_secs
        ));
    }

    fn on_analyze_start(&self) {
        self.spinner("Choosing keepers...");
    }

    fn on_analyze_complete(&self, decisions: usize, duration_secs: f64) {
        self.done(format!(
            "Analysis complete: {} keepers in {:.2}s",
            decisions, duration_secs
        ));
    }

    fn on_plan_complete(&self, plans: usize, conflicts: usize, duration_secs: f64) {
        self.done(format!(
            "Planning complete: {} plans, {} conflicts in {:.2}s",
            plans, conflicts, duration_secs
        ));
    }
}
