use crate::analysis::cleanliness::CleanlinessRules;
use crate::error::Error;
use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use config::{Config, ConfigError, File as ConfigFile};
use glob::Pattern;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Name of the sidecar hash cache created inside the target root when no
/// explicit `hash_cache_path` is configured.
pub const DEFAULT_HASH_CACHE_NAME: &str = ".keepsake_hash_cache";

/// Calendar used to turn an effective date into `YYYY/YYYY-MM` folders.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DateZone {
    #[default]
    Local,
    Utc,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub source_roots: Vec<String>,
    #[serde(default)]
    pub target_root: String,
    #[serde(default = "default_blocklist")]
    pub blocklist: Vec<String>,
    #[serde(default)]
    pub ignore_patterns: Vec<String>,
    #[serde(default)]
    pub trash_folder: Option<String>,
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
    #[serde(default = "default_sanity_threshold")]
    pub sanity_threshold: NaiveDate,
    #[serde(default = "default_cleanliness_patterns")]
    pub cleanliness_patterns: Vec<String>,
    #[serde(default = "default_partial_chunk_size")]
    pub partial_chunk_size: usize,
    #[serde(default)]
    pub hash_cache_path: Option<String>,
    #[serde(default)]
    pub date_zone: DateZone,
}

fn default_blocklist() -> Vec<String> {
    [
        "windows",
        "program files",
        "program files (x86)",
        "programdata",
        "appdata",
        "$windows.~bt",
        "node_modules",
        "__pycache__",
        "site-packages",
        ".cache",
        ".npm",
        ".cargo",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_extensions() -> Vec<String> {
    [
        "jpg", "jpeg", "png", "gif", "bmp", "tif", "tiff", "webp", "heic", "heif", "dng", "cr2",
        "nef", "arw", "orf", "rw2", "mp4", "mov", "m4v", "avi", "mkv", "3gp", "mts", "wmv",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_sanity_threshold() -> NaiveDate {
    NaiveDate::from_ymd_opt(1980, 1, 2).unwrap_or_default()
}

fn default_cleanliness_patterns() -> Vec<String> {
    [
        r"(?i)^copy\s+of\s+",
        r"(?i)\s*-\s*copy(\s*\(\d+\))?$",
        r"(?i)[ _]copy\d*$",
        r"\s*\(\d+\)$",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_partial_chunk_size() -> usize {
    4096
}

impl AppConfig {
    /// Config with every optional field at its default.
    pub fn new(source_roots: Vec<String>, target_root: impl Into<String>) -> Self {
        Self {
            source_roots,
            target_root: target_root.into(),
            blocklist: default_blocklist(),
            ignore_patterns: Vec::new(),
            trash_folder: None,
            extensions: default_extensions(),
            sanity_threshold: default_sanity_threshold(),
            cleanliness_patterns: default_cleanliness_patterns(),
            partial_chunk_size: default_partial_chunk_size(),
            hash_cache_path: None,
            date_zone: DateZone::Local,
        }
    }

    /// Fatal configuration gate. Runs before anything touches the disk.
    pub fn validate(&self) -> Result<(), Error> {
        if self.source_roots.is_empty() {
            return Err(Error::InvalidConfig("no source roots configured".into()));
        }
        if self.target_root.trim().is_empty() {
            return Err(Error::InvalidConfig("target root is empty".into()));
        }
        for root in &self.source_roots {
            if !Path::new(root).is_dir() {
                return Err(Error::InvalidConfig(format!(
                    "source root '{}' does not exist or is not a directory",
                    root
                )));
            }
        }
        if self.partial_chunk_size == 0 {
            return Err(Error::InvalidConfig(
                "partial_chunk_size must be greater than zero".into(),
            ));
        }
        for glob in &self.ignore_patterns {
            Pattern::new(glob).map_err(|e| {
                Error::InvalidConfig(format!("invalid ignore pattern '{}': {}", glob, e))
            })?;
        }
        CleanlinessRules::new(&self.cleanliness_patterns)?;
        Ok(())
    }

    /// Validates, creates the target root when missing and returns a copy
    /// whose roots are canonical absolute paths. Every later phase works on
    /// the resolved copy so containment checks compare like with like.
    pub fn resolved(&self) -> Result<AppConfig, Error> {
        self.validate()?;

        let target_root = self.target_root_path();
        if !target_root.exists() {
            info!("Creating target root {}", target_root.display());
            fs::create_dir_all(&target_root)?;
        }

        let mut resolved = self.clone();
        resolved.source_roots = self
            .source_roots
            .iter()
            .map(|root| canonical_string(Path::new(root)))
            .collect::<Result<_, _>>()?;
        resolved.target_root = canonical_string(&target_root)?;
        if let Some(path) = &self.hash_cache_path {
            let path = Path::new(path);
            if path.is_relative() {
                let absolute = std::env::current_dir()?.join(path);
                resolved.hash_cache_path = Some(absolute.to_string_lossy().into_owned());
            }
        }
        Ok(resolved)
    }

    pub fn target_root_path(&self) -> PathBuf {
        PathBuf::from(&self.target_root)
    }

    pub fn hash_cache_location(&self) -> PathBuf {
        match &self.hash_cache_path {
            Some(path) => PathBuf::from(path),
            None => self.target_root_path().join(DEFAULT_HASH_CACHE_NAME),
        }
    }

    /// Source roots plus the target root, collapsed so no root is crawled twice.
    /// The target root is always in scope so earlier output gets re-examined.
    pub fn scan_roots(&self) -> Vec<String> {
        let mut roots = self.source_roots.clone();
        roots.push(self.target_root.clone());
        roots.sort();
        roots.dedup();
        non_overlapping_directories(roots)
    }

    /// Timestamps at or before this instant are filesystem artifacts.
    pub fn sanity_cutoff(&self) -> DateTime<Utc> {
        Utc.from_utc_datetime(&self.sanity_threshold.and_time(NaiveTime::default()))
    }
}

pub fn load_configuration() -> Result<AppConfig, ConfigError> {
    load_configuration_from("Keepsake")
}

pub fn load_configuration_from(name: &str) -> Result<AppConfig, ConfigError> {
    let builder = Config::builder()
        .add_source(ConfigFile::with_name(name).required(false))
        .build()?;
    builder.try_deserialize::<AppConfig>()
}

fn canonical_string(path: &Path) -> Result<String, Error> {
    let canonical = fs::canonicalize(path).map_err(|e| {
        Error::InvalidConfig(format!("cannot resolve '{}': {}", path.display(), e))
    })?;
    Ok(canonical.to_string_lossy().into_owned())
}

/// Remove directories that are subdirectories of other directories in the list.
pub fn non_overlapping_directories(dirs: Vec<String>) -> Vec<String> {
    let mut result: Vec<String> = Vec::new();

    for dir in dirs {
        let dir_path = Path::new(&dir);
        if result.iter().any(|kept| dir_path.starts_with(kept)) {
            continue;
        }
        result.retain(|kept| !Path::new(kept).starts_with(dir_path));
        result.push(dir);
    }

    result
}
