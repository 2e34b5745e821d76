pub mod classify;
pub mod walk;

pub use classify::{EntryInfo, PathClassifier, RejectReason, Verdict};
pub use walk::{Crawl, CrawlOutput, CrawlWarning, Crawler};
