use super::classify::{EntryInfo, PathClassifier, RejectReason, Verdict};
use crate::config::AppConfig;
use crate::error::Error;
use crate::models::FileDescriptor;
use crate::platform;
use crate::progress::ProgressReporter;
use chrono::{DateTime, Utc};
use rayon::prelude::*;
use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::fs::{self, Metadata};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tracing::{trace, warn};

/// A subtree or entry the crawler had to skip. Never fatal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlWarning {
    pub path: PathBuf,
    pub message: String,
}

impl fmt::Display for CrawlWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path.display(), self.message)
    }
}

pub type CrawlItem = Result<FileDescriptor, CrawlWarning>;

#[derive(Debug, Default)]
pub struct CrawlOutput {
    pub files: Vec<FileDescriptor>,
    pub warnings: Vec<CrawlWarning>,
}

#[derive(Debug, Default)]
struct DirListing {
    files: Vec<FileDescriptor>,
    subdirs: Vec<PendingDir>,
    warnings: Vec<CrawlWarning>,
}

/// A directory still to be listed, with the scan root it was reached from.
#[derive(Debug, Clone)]
struct PendingDir {
    root: PathBuf,
    dir: PathBuf,
}

/// Walks source roots with an explicit queue of pending directories, pruning
/// anything the classifier rejects before descending into it.
pub struct Crawler {
    classifier: PathClassifier,
    extensions: Vec<String>,
}

impl Crawler {
    /// `extensions` are matched case-insensitively without the dot. An empty
    /// list accepts every file.
    pub fn new(classifier: PathClassifier, extensions: &[String]) -> Self {
        Self {
            classifier,
            extensions: extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_lowercase())
                .collect(),
        }
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, Error> {
        Ok(Crawler::new(
            PathClassifier::from_config(config)?,
            &config.extensions,
        ))
    }

    /// Lazy, single-threaded traversal. Each call starts from scratch.
    pub fn crawl(&self, roots: &[PathBuf]) -> Crawl<'_> {
        let (pending, warnings) = seed_roots(roots);
        Crawl {
            crawler: self,
            visited: pending.iter().map(|p| p.dir.clone()).collect(),
            pending: pending.into(),
            ready: warnings.into_iter().map(Err).collect(),
        }
    }

    /// Level-by-level traversal where every directory of the current frontier
    /// is listed on the rayon pool. The pool size bounds open directory handles.
    pub fn crawl_parallel(
        &self,
        roots: &[PathBuf],
        reporter: &dyn ProgressReporter,
    ) -> CrawlOutput {
        let (mut frontier, mut warnings) = seed_roots(roots);
        let mut visited: HashSet<PathBuf> = frontier.iter().map(|p| p.dir.clone()).collect();
        let mut files = Vec::new();

        while !frontier.is_empty() {
            let listings: Vec<DirListing> = frontier
                .par_iter()
                .map(|pending| self.read_directory(pending))
                .collect();

            let mut next = Vec::new();
            for listing in listings {
                files.extend(listing.files);
                warnings.extend(listing.warnings);
                next.extend(
                    listing
                        .subdirs
                        .into_iter()
                        .filter(|sub| visited.insert(sub.dir.clone())),
                );
            }
            if let Some(pending) = frontier.last() {
                reporter.on_crawl_progress(files.len(), &pending.dir.to_string_lossy());
            }
            frontier = next;
        }

        files.sort_by(|a, b| a.path.cmp(&b.path));
        CrawlOutput { files, warnings }
    }

    fn wants(&self, path: &Path) -> bool {
        if self.extensions.is_empty() {
            return true;
        }
        path.extension()
            .map(|ext| self.extensions.contains(&ext.to_string_lossy().to_lowercase()))
            .unwrap_or(false)
    }

    fn read_directory(&self, pending: &PendingDir) -> DirListing {
        let mut listing = DirListing::default();
        let dir = pending.dir.as_path();

        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(err) => {
                warn!("Skipping directory {}: {}", dir.display(), err);
                listing.warnings.push(CrawlWarning {
                    path: dir.to_path_buf(),
                    message: err.to_string(),
                });
                return listing;
            }
        };

        for entry_result in entries {
            let entry = match entry_result {
                Ok(entry) => entry,
                Err(err) => {
                    warn!("Error reading entry in {}: {}", dir.display(), err);
                    listing.warnings.push(CrawlWarning {
                        path: dir.to_path_buf(),
                        message: err.to_string(),
                    });
                    continue;
                }
            };

            let path = entry.path();
            // DirEntry::metadata does not traverse symlinks.
            let metadata = entry.metadata().ok();
            let info = EntryInfo {
                path: &path,
                root: &pending.root,
                is_dir: metadata.as_ref().map(|m| m.is_dir()).unwrap_or(false),
                flags: metadata.as_ref().map(platform::attribute_flags),
            };

            let metadata = match (self.classifier.classify(&info), metadata) {
                (Verdict::Accept, Some(metadata)) => metadata,
                (Verdict::Reject(RejectReason::Unreadable), _) | (Verdict::Accept, None) => {
                    warn!("Unreadable attributes, skipping {}", path.display());
                    listing.warnings.push(CrawlWarning {
                        path,
                        message: "attributes could not be read".into(),
                    });
                    continue;
                }
                (Verdict::Reject(reason), _) => {
                    trace!("Rejected {} ({:?})", path.display(), reason);
                    continue;
                }
            };

            if metadata.is_dir() {
                listing.subdirs.push(PendingDir {
                    root: pending.root.clone(),
                    dir: path,
                });
            } else if metadata.is_file() && metadata.len() > 0 && self.wants(&path) {
                listing.files.push(describe(path, &metadata));
            }
        }

        listing.files.sort_by(|a, b| a.path.cmp(&b.path));
        listing.subdirs.sort_by(|a, b| a.dir.cmp(&b.dir));
        listing
    }
}

/// Iterator returned by [`Crawler::crawl`].
pub struct Crawl<'a> {
    crawler: &'a Crawler,
    pending: VecDeque<PendingDir>,
    ready: VecDeque<CrawlItem>,
    visited: HashSet<PathBuf>,
}

impl Iterator for Crawl<'_> {
    type Item = CrawlItem;

    fn next(&mut self) -> Option<CrawlItem> {
        loop {
            if let Some(item) = self.ready.pop_front() {
                return Some(item);
            }
            let dir = self.pending.pop_front()?;
            let listing = self.crawler.read_directory(&dir);
            self.ready.extend(listing.warnings.into_iter().map(Err));
            self.ready.extend(listing.files.into_iter().map(Ok));
            for sub in listing.subdirs {
                if self.visited.insert(sub.dir.clone()) {
                    self.pending.push_back(sub);
                }
            }
        }
    }
}

/// Roots are resolved through symlinks; only entries found below them are
/// subject to the reparse rule.
fn seed_roots(roots: &[PathBuf]) -> (Vec<PendingDir>, Vec<CrawlWarning>) {
    let mut pending = Vec::new();
    let mut warnings = Vec::new();

    for root in roots {
        match fs::metadata(root) {
            Ok(meta) if meta.is_dir() => pending.push(PendingDir {
                root: root.clone(),
                dir: root.clone(),
            }),
            Ok(_) => warnings.push(CrawlWarning {
                path: root.clone(),
                message: "root is not a directory".into(),
            }),
            Err(err) => {
                warn!("Path not found: {}", root.display());
                warnings.push(CrawlWarning {
                    path: root.clone(),
                    message: err.to_string(),
                });
            }
        }
    }

    (pending, warnings)
}

fn describe(path: PathBuf, metadata: &Metadata) -> FileDescriptor {
    let folder_name = path
        .parent()
        .and_then(|p| p.file_name())
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_default();

    FileDescriptor {
        folder_name,
        size: metadata.len(),
        created: platform::created_time(metadata),
        modified: platform::modified_time(metadata)
            .unwrap_or_else(|| DateTime::<Utc>::from(UNIX_EPOCH)),
        flags: platform::attribute_flags(metadata),
        path,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::SilentReporter;
    use tempfile::tempdir;

    fn crawler() -> Crawler {
        Crawler::new(
            PathClassifier::new(&["node_modules".to_string()], vec![]),
            &["jpg".to_string(), "MOV".to_string()],
        )
    }

    #[test]
    fn test_crawl_prunes_and_filters() {
        let tmp = tempdir().unwrap();
        let root = tmp.path().join("root");
        fs::create_dir_all(root.join("trip/deep/deeper")).unwrap();
        fs::create_dir_all(root.join("node_modules/pkg")).unwrap();
        fs::create_dir_all(root.join(".git")).unwrap();
        fs::write(root.join("trip/a.jpg"), b"a").unwrap();
        fs::write(root.join("trip/deep/deeper/b.JPG"), b"b").unwrap();
        fs::write(root.join("trip/clip.mov"), b"c").unwrap();
        fs::write(root.join("trip/notes.txt"), b"d").unwrap();
        fs::write(root.join("trip/empty.jpg"), b"").unwrap();
        fs::write(root.join("node_modules/pkg/logo.jpg"), b"e").unwrap();
        fs::write(root.join(".git/x.jpg"), b"f").unwrap();

        let items: Vec<CrawlItem> = crawler().crawl(&[root.clone()]).collect();
        let mut names: Vec<String> = items
            .iter()
            .filter_map(|i| i.as_ref().ok())
            .map(|f| f.file_name())
            .collect();
        names.sort();
        assert_eq!(names, vec!["a.jpg", "b.JPG", "clip.mov"]);
        assert!(items.iter().all(|i| i.is_ok()));

        let parallel = crawler().crawl_parallel(&[root], &SilentReporter);
        assert_eq!(parallel.files.len(), 3);
        assert!(parallel.warnings.is_empty());
        let deep = parallel
            .files
            .iter()
            .find(|f| f.file_name() == "b.JPG")
            .unwrap();
        assert_eq!(deep.folder_name, "deeper");
        assert_eq!(deep.size, 1);
    }

    #[test]
    fn test_missing_root_is_a_warning() {
        let tmp = tempdir().unwrap();
        let good = tmp.path().join("good");
        fs::create_dir_all(&good).unwrap();
        fs::write(good.join("a.jpg"), b"a").unwrap();
        let missing = tmp.path().join("missing");

        let out = crawler().crawl_parallel(&[missing.clone(), good], &SilentReporter);
        assert_eq!(out.files.len(), 1);
        assert_eq!(out.warnings.len(), 1);
        assert_eq!(out.warnings[0].path, missing);
    }

    #[test]
    fn test_blocklisted_ancestor_of_root_is_ignored() {
        let tmp = tempdir().unwrap();
        let root = tmp.path().join("AppData").join("photos");
        fs::create_dir_all(root.join("trip")).unwrap();
        fs::create_dir_all(root.join("appdata")).unwrap();
        fs::write(root.join("trip/a.jpg"), b"a").unwrap();
        fs::write(root.join("appdata/b.jpg"), b"b").unwrap();

        let crawler = Crawler::new(PathClassifier::new(&["AppData".to_string()], vec![]), &[]);
        let out = crawler.crawl_parallel(&[root], &SilentReporter);
        assert!(out.warnings.is_empty());
        assert_eq!(out.files.len(), 1);
        assert_eq!(out.files[0].file_name(), "a.jpg");
    }

    #[test]
    fn test_directory_vanishing_mid_crawl_skips_only_that_subtree() {
        let tmp = tempdir().unwrap();
        let root = tmp.path().to_path_buf();
        fs::create_dir_all(root.join("gone")).unwrap();
        fs::create_dir_all(root.join("kept")).unwrap();
        fs::write(root.join("a.jpg"), b"a").unwrap();
        fs::write(root.join("gone/b.jpg"), b"b").unwrap();
        fs::write(root.join("kept/c.jpg"), b"c").unwrap();

        let c = crawler();
        let roots = [root.clone()];
        let mut crawl = c.crawl(&roots);

        // The root listing has been taken; its subdirectories are queued.
        let first = crawl.next().unwrap().unwrap();
        assert_eq!(first.file_name(), "a.jpg");
        fs::remove_dir_all(root.join("gone")).unwrap();

        let rest: Vec<CrawlItem> = crawl.collect();
        let warnings: Vec<&CrawlWarning> = rest.iter().filter_map(|i| i.as_ref().err()).collect();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].path, root.join("gone"));

        let names: Vec<String> = rest
            .iter()
            .filter_map(|i| i.as_ref().ok())
            .map(|f| f.file_name())
            .collect();
        assert_eq!(names, vec!["c.jpg"]);
    }

    #[test]
    fn test_crawl_is_restartable() {
        let tmp = tempdir().unwrap();
        fs::write(tmp.path().join("a.jpg"), b"a").unwrap();
        let c = crawler();
        let roots = [tmp.path().to_path_buf()];
        assert_eq!(c.crawl(&roots).count(), 1);
        assert_eq!(c.crawl(&roots).count(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinked_root_is_crawled() {
        let tmp = tempdir().unwrap();
        let real = tmp.path().join("data").join("pics");
        fs::create_dir_all(&real).unwrap();
        fs::write(real.join("a.jpg"), b"a").unwrap();
        let alias = tmp.path().join("Pictures");
        std::os::unix::fs::symlink(&real, &alias).unwrap();

        let out = crawler().crawl_parallel(&[alias.clone()], &SilentReporter);
        assert!(out.warnings.is_empty());
        assert_eq!(out.files.len(), 1);
        assert_eq!(out.files[0].path, alias.join("a.jpg"));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinks_are_not_followed() {
        let tmp = tempdir().unwrap();
        let real = tmp.path().join("real");
        fs::create_dir_all(&real).unwrap();
        fs::write(real.join("a.jpg"), b"a").unwrap();
        std::os::unix::fs::symlink(&real, real.join("loop")).unwrap();
        std::os::unix::fs::symlink(real.join("a.jpg"), real.join("alias.jpg")).unwrap();

        let out = crawler().crawl_parallel(&[real], &SilentReporter);
        assert_eq!(out.files.len(), 1);
        assert_eq!(out.files[0].file_name(), "a.jpg");
    }
}
