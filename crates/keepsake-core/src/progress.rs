/// Trait for reporting pipeline progress.
///
/// The CLI implements it with indicatif bars. All methods have default no-op
/// implementations.
pub trait ProgressReporter: Send + Sync {
    fn on_crawl_start(&self) {}
    fn on_crawl_progress(&self, _files_found: usize, _current_path: &str) {}
    fn on_crawl_complete(&self, _total_files: usize, _duration_secs: f64) {}
    fn on_hash_start(&self) {}
    fn on_hash_progress(&self, _files_hashed: usize, _total_files: usize) {}
    fn on_hash_complete(&self, _files_keyed: usize, _duration_secs: f64) {}
    fn on_analyze_start(&self) {}
    fn on_analyze_complete(&self, _decisions: usize, _duration_secs: f64) {}
    fn on_plan_complete(&self, _plans: usize, _conflicts: usize, _duration_secs: f64) {}
}

/// No-op progress reporter for silent operation.
pub struct SilentReporter;

impl ProgressReporter for SilentReporter {}
