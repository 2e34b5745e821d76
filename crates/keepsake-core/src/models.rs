use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Attribute bits that matter to the path classifier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AttributeFlags {
    pub system: bool,
    pub hidden: bool,
    /// Symlink, junction or any other reparse point.
    pub reparse: bool,
}

/// A file discovered by the crawler. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDescriptor {
    pub path: PathBuf,
    pub folder_name: String,
    pub size: u64,
    pub created: Option<DateTime<Utc>>,
    pub modified: DateTime<Utc>,
    pub flags: AttributeFlags,
}

impl FileDescriptor {
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn stem(&self) -> String {
        self.path
            .file_stem()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn extension(&self) -> Option<String> {
        self.path
            .extension()
            .map(|e| e.to_string_lossy().into_owned())
    }

    /// The cheap invalidation signature used by the hash cache.
    pub fn signature(&self) -> CacheSignature {
        CacheSignature {
            path: self.path.to_string_lossy().into_owned(),
            size: self.size,
            modified_secs: self.modified.timestamp(),
            modified_nanos: self.modified.timestamp_subsec_nanos(),
        }
    }

    pub fn parent(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new(""))
    }
}

/// How far through the funnel a file travelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FunnelStage {
    Size,
    Partial,
    Full,
}

/// Accumulated fingerprint. Fields are only ever filled in, never cleared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EquivalenceKey {
    pub size: u64,
    pub partial: Option<u64>,
    pub full: Option<u64>,
}

impl EquivalenceKey {
    pub fn from_size(size: u64) -> Self {
        Self {
            size,
            partial: None,
            full: None,
        }
    }

    pub fn with_partial(self, partial: u64) -> Self {
        Self {
            partial: Some(partial),
            ..self
        }
    }

    pub fn with_full(self, full: u64) -> Self {
        Self {
            full: Some(full),
            ..self
        }
    }

    pub fn stage(&self) -> FunnelStage {
        match (self.partial, self.full) {
            (_, Some(_)) => FunnelStage::Full,
            (Some(_), None) => FunnelStage::Partial,
            (None, None) => FunnelStage::Size,
        }
    }
}

/// Identity of a file as seen by the persistent hash cache.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheSignature {
    pub path: String,
    pub size: u64,
    pub modified_secs: i64,
    pub modified_nanos: u32,
}

/// A persisted full-file hash together with the signature it was computed under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub size: u64,
    pub modified_secs: i64,
    pub modified_nanos: u32,
    pub full_hash: u64,
    pub algorithm_version: u32,
}

impl CacheEntry {
    pub fn matches(&self, signature: &CacheSignature, algorithm_version: u32) -> bool {
        self.size == signature.size
            && self.modified_secs == signature.modified_secs
            && self.modified_nanos == signature.modified_nanos
            && self.algorithm_version == algorithm_version
    }
}

/// A file paired with the key the funnel settled on.
#[derive(Debug, Clone)]
pub struct KeyedFile {
    pub file: FileDescriptor,
    pub key: EquivalenceKey,
}
