use crate::config::AppConfig;
use crate::error::Error;
use crate::models::AttributeFlags;
use glob::Pattern;
use std::path::{Component, Path, PathBuf};

/// Directory names the OS uses for deleted files or volume bookkeeping.
const TRASH_NAMES: &[&str] = &[
    "$recycle.bin",
    "recycler",
    "recycled",
    "system volume information",
    ".trash",
    ".trashes",
    "lost+found",
];

/// What the classifier gets to look at. Attributes come from
/// `symlink_metadata`; `None` means they could not be read.
#[derive(Debug, Clone, Copy)]
pub struct EntryInfo<'a> {
    pub path: &'a Path,
    /// Scan root the entry was found under. Name rules only look at the
    /// components below it.
    pub root: &'a Path,
    pub is_dir: bool,
    pub flags: Option<AttributeFlags>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    Unreadable,
    Reparse,
    System,
    Trash,
    Blocked,
    Ignored,
    Hidden,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Accept,
    Reject(RejectReason),
}

impl Verdict {
    pub fn is_accept(&self) -> bool {
        matches!(self, Verdict::Accept)
    }
}

/// Pure eligibility predicate for crawled entries. Rules are checked in order
/// and the first match wins.
#[derive(Debug, Clone, Default)]
pub struct PathClassifier {
    blocklist: Vec<String>,
    blocked_prefixes: Vec<PathBuf>,
    ignore_patterns: Vec<Pattern>,
}

impl PathClassifier {
    pub fn new(blocklist: &[String], blocked_prefixes: Vec<PathBuf>) -> Self {
        Self {
            blocklist: blocklist.iter().map(|b| b.to_lowercase()).collect(),
            blocked_prefixes,
            ignore_patterns: Vec::new(),
        }
    }

    pub fn with_ignore_patterns(mut self, globs: &[String]) -> Result<Self, Error> {
        for glob in globs {
            let pattern = Pattern::new(glob).map_err(|e| {
                Error::InvalidConfig(format!("invalid ignore pattern '{}': {}", glob, e))
            })?;
            self.ignore_patterns.push(pattern);
        }
        Ok(self)
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, Error> {
        let prefixes = config
            .trash_folder
            .iter()
            .filter(|t| !t.trim().is_empty())
            .map(PathBuf::from)
            .collect();
        PathClassifier::new(&config.blocklist, prefixes).with_ignore_patterns(&config.ignore_patterns)
    }

    pub fn is_eligible(&self, entry: &EntryInfo) -> bool {
        self.classify(entry).is_accept()
    }

    pub fn classify(&self, entry: &EntryInfo) -> Verdict {
        let flags = match entry.flags {
            Some(flags) => flags,
            None => return Verdict::Reject(RejectReason::Unreadable),
        };
        let name = match entry.path.file_name() {
            Some(name) => name.to_string_lossy().to_lowercase(),
            None => return Verdict::Reject(RejectReason::Unreadable),
        };

        if flags.reparse {
            return Verdict::Reject(RejectReason::Reparse);
        }

        if flags.system {
            return Verdict::Reject(RejectReason::System);
        }
        let below_root = entry.path.strip_prefix(entry.root).unwrap_or(entry.path);
        let components = lowercase_components(below_root);
        if components.iter().any(|c| is_trash_name(c)) {
            return Verdict::Reject(RejectReason::Trash);
        }

        if components.iter().any(|c| self.blocklist.contains(c))
            || self
                .blocked_prefixes
                .iter()
                .any(|prefix| entry.path.starts_with(prefix))
        {
            return Verdict::Reject(RejectReason::Blocked);
        }
        if self
            .ignore_patterns
            .iter()
            .any(|pattern| pattern.matches_path(entry.path))
        {
            return Verdict::Reject(RejectReason::Ignored);
        }

        if flags.hidden || name.starts_with('.') || name.starts_with('$') {
            return Verdict::Reject(RejectReason::Hidden);
        }

        Verdict::Accept
    }
}

fn lowercase_components(path: &Path) -> Vec<String> {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().to_lowercase()),
            _ => None,
        })
        .collect()
}

fn is_trash_name(name: &str) -> bool {
    TRASH_NAMES.contains(&name) || name.starts_with(".trash-")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain() -> Option<AttributeFlags> {
        Some(AttributeFlags::default())
    }

    fn entry(path: &str) -> EntryInfo<'_> {
        EntryInfo {
            path: Path::new(path),
            root: Path::new("/"),
            is_dir: false,
            flags: plain(),
        }
    }

    fn classifier_with_defaults() -> PathClassifier {
        PathClassifier::new(&["Windows".to_string(), "AppData".to_string()], vec![])
    }

    fn classifier() -> PathClassifier {
        PathClassifier::new(
            &["Program Files".to_string(), "node_modules".to_string()],
            vec![PathBuf::from("/data/trash")],
        )
    }

    #[test]
    fn test_accepts_ordinary_file() {
        assert!(classifier().is_eligible(&entry("/data/photos/IMG_0001.jpg")));
    }

    #[test]
    fn test_rejects_unreadable_attributes() {
        let e = EntryInfo {
            path: Path::new("/data/photos/a.jpg"),
            root: Path::new("/"),
            is_dir: false,
            flags: None,
        };
        assert_eq!(
            classifier().classify(&e),
            Verdict::Reject(RejectReason::Unreadable)
        );
    }

    #[test]
    fn test_reparse_wins_over_everything() {
        let e = EntryInfo {
            path: Path::new("/data/.hidden/node_modules/link"),
            root: Path::new("/"),
            is_dir: true,
            flags: Some(AttributeFlags {
                reparse: true,
                system: true,
                hidden: true,
            }),
        };
        assert_eq!(classifier().classify(&e), Verdict::Reject(RejectReason::Reparse));
    }

    #[test]
    fn test_rejects_system_and_trash() {
        let e = EntryInfo {
            path: Path::new("/data/pagefile.sys"),
            root: Path::new("/"),
            is_dir: false,
            flags: Some(AttributeFlags {
                system: true,
                ..Default::default()
            }),
        };
        assert_eq!(classifier().classify(&e), Verdict::Reject(RejectReason::System));
        assert_eq!(
            classifier().classify(&entry("/mnt/d/$RECYCLE.BIN/S-1-5/x.jpg")),
            Verdict::Reject(RejectReason::Trash)
        );
        assert_eq!(
            classifier().classify(&entry("/mnt/usb/System Volume Information")),
            Verdict::Reject(RejectReason::Trash)
        );
    }

    #[test]
    fn test_blocklist_is_case_insensitive_per_component() {
        assert_eq!(
            classifier().classify(&entry("/c/PROGRAM FILES/App/icon.png")),
            Verdict::Reject(RejectReason::Blocked)
        );
        assert!(classifier().is_eligible(&entry("/c/Program Files Photos/icon.png")));
        assert_eq!(
            classifier().classify(&entry("/data/trash/42_x.jpg")),
            Verdict::Reject(RejectReason::Blocked)
        );
    }

    #[test]
    fn test_root_ancestors_are_not_judged() {
        let root = Path::new("/media/u/Windows/Users/me/AppData/photos");
        let e = EntryInfo {
            path: Path::new("/media/u/Windows/Users/me/AppData/photos/trip"),
            root,
            is_dir: true,
            flags: plain(),
        };
        assert!(classifier_with_defaults().is_eligible(&e));

        let below = EntryInfo {
            path: Path::new("/media/u/Windows/Users/me/AppData/photos/trip/appdata"),
            root,
            is_dir: true,
            flags: plain(),
        };
        assert_eq!(
            classifier_with_defaults().classify(&below),
            Verdict::Reject(RejectReason::Blocked)
        );
    }

    #[test]
    fn test_hidden_markers() {
        assert_eq!(
            classifier().classify(&entry("/data/photos/.DS_Store")),
            Verdict::Reject(RejectReason::Hidden)
        );
        assert_eq!(
            classifier().classify(&entry("/data/$tmp")),
            Verdict::Reject(RejectReason::Hidden)
        );
        let e = EntryInfo {
            path: Path::new("/data/thumbs.db"),
            root: Path::new("/"),
            is_dir: false,
            flags: Some(AttributeFlags {
                hidden: true,
                ..Default::default()
            }),
        };
        assert_eq!(classifier().classify(&e), Verdict::Reject(RejectReason::Hidden));
    }

    #[test]
    fn test_ignore_globs() {
        let c = classifier()
            .with_ignore_patterns(&["*.tmp".to_string()])
            .unwrap();
        assert_eq!(
            c.classify(&entry("/data/photos/upload.tmp")),
            Verdict::Reject(RejectReason::Ignored)
        );
    }
}
