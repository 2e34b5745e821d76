use super::cache::HashCache;
use super::xxhash::{self, ALGORITHM_VERSION};
use crate::models::{EquivalenceKey, FileDescriptor, KeyedFile};
use crate::progress::ProgressReporter;
use ahash::AHashMap;
use rayon::prelude::*;
use std::fmt;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use tracing::{debug, info, trace, warn};

/// A file dropped from the funnel because it could not be read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunnelWarning {
    pub path: PathBuf,
    pub message: String,
}

impl fmt::Display for FunnelWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path.display(), self.message)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FunnelStats {
    pub files_in: usize,
    pub unique_by_size: usize,
    pub partial_hashes: usize,
    pub unique_by_partial: usize,
    pub cache_hits: usize,
    pub stale_cache_entries: usize,
    pub full_hashes: usize,
    pub bytes_read: u64,
    pub unreadable: usize,
}

#[derive(Debug, Default)]
pub struct FunnelOutput {
    /// Every readable input file with the key it settled on, sorted by path.
    pub files: Vec<KeyedFile>,
    pub warnings: Vec<FunnelWarning>,
    pub stats: FunnelStats,
}

/// Result of running one stage over one still-ambiguous group.
#[derive(Default)]
struct StageOutcome {
    resolved: Vec<KeyedFile>,
    ambiguous: Vec<Vec<KeyedFile>>,
    warnings: Vec<FunnelWarning>,
}

#[derive(Default)]
struct Counters {
    partial_hashes: AtomicUsize,
    unique_by_partial: AtomicUsize,
    cache_hits: AtomicUsize,
    stale_cache_entries: AtomicUsize,
    full_hashes: AtomicUsize,
    bytes_read: AtomicU64,
    processed: AtomicUsize,
}

/// Four-stage duplicate funnel: size, partial hash, cache lookup, full hash.
/// A file only advances while it still shares its key with another file.
pub struct Funnel<'a> {
    cache: &'a dyn HashCache,
    chunk_size: usize,
}

impl<'a> Funnel<'a> {
    pub fn new(cache: &'a dyn HashCache, chunk_size: usize) -> Self {
        Self {
            cache,
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn run(&self, files: Vec<FileDescriptor>, reporter: &dyn ProgressReporter) -> FunnelOutput {
        let total = files.len();
        let counters = Counters::default();

        // Stage 1: size
        let mut by_size: AHashMap<u64, Vec<FileDescriptor>> = AHashMap::new();
        for file in files {
            by_size.entry(file.size).or_default().push(file);
        }

        let mut resolved = Vec::with_capacity(total);
        let mut buckets = Vec::new();
        for (size, mut members) in by_size {
            if members.len() == 1 {
                let file = members.remove(0);
                resolved.push(KeyedFile {
                    key: EquivalenceKey::from_size(size),
                    file,
                });
            } else {
                buckets.push(members);
            }
        }
        let unique_by_size = resolved.len();
        counters.processed.fetch_add(unique_by_size, Ordering::Relaxed);
        info!(
            "{} files with unique sizes, {} size buckets need hashing",
            unique_by_size,
            buckets.len()
        );

        // Stages 2-4 run per size bucket; buckets never wait on each other.
        let outcomes: Vec<StageOutcome> = buckets
            .into_par_iter()
            .map(|bucket| self.resolve_bucket(bucket, &counters, total, reporter))
            .collect();

        let mut warnings = Vec::new();
        for outcome in outcomes {
            resolved.extend(outcome.resolved);
            warnings.extend(outcome.warnings);
        }
        resolved.sort_by(|a, b| a.file.path.cmp(&b.file.path));
        warnings.sort_by(|a, b| a.path.cmp(&b.path));

        let stats = FunnelStats {
            files_in: total,
            unique_by_size,
            partial_hashes: counters.partial_hashes.into_inner(),
            unique_by_partial: counters.unique_by_partial.into_inner(),
            cache_hits: counters.cache_hits.into_inner(),
            stale_cache_entries: counters.stale_cache_entries.into_inner(),
            full_hashes: counters.full_hashes.into_inner(),
            bytes_read: counters.bytes_read.into_inner(),
            unreadable: warnings.len(),
        };
        debug!("Funnel stats: {:?}", stats);

        FunnelOutput {
            files: resolved,
            warnings,
            stats,
        }
    }

    fn resolve_bucket(
        &self,
        bucket: Vec<FileDescriptor>,
        counters: &Counters,
        total: usize,
        reporter: &dyn ProgressReporter,
    ) -> StageOutcome {
        let keyed: Vec<KeyedFile> = bucket
            .into_iter()
            .map(|file| KeyedFile {
                key: EquivalenceKey::from_size(file.size),
                file,
            })
            .collect();

        // Stage 2: partial hash
        let partial = split_by(keyed, |kf| self.partial_key(kf, counters));
        counters
            .unique_by_partial
            .fetch_add(partial.resolved.len(), Ordering::Relaxed);

        let mut outcome = StageOutcome {
            resolved: partial.resolved,
            ambiguous: Vec::new(),
            warnings: partial.warnings,
        };
        let done = outcome.resolved.len() + outcome.warnings.len();
        report(counters, done, total, reporter);

        // Stages 3 and 4: cache lookup, then full hash on a miss.
        for group in partial.ambiguous {
            let full = split_by(group, |kf| self.full_key(kf, counters));
            let done = full.resolved.len()
                + full.warnings.len()
                + full.ambiguous.iter().map(Vec::len).sum::<usize>();
            outcome.resolved.extend(full.resolved);
            outcome.resolved.extend(full.ambiguous.into_iter().flatten());
            outcome.warnings.extend(full.warnings);
            report(counters, done, total, reporter);
        }

        outcome
    }

    fn partial_key(&self, kf: &KeyedFile, counters: &Counters) -> io::Result<EquivalenceKey> {
        let (hash, read) = xxhash::partial_hash(&kf.file.path, kf.file.size, self.chunk_size)?;
        counters.partial_hashes.fetch_add(1, Ordering::Relaxed);
        counters.bytes_read.fetch_add(read, Ordering::Relaxed);
        Ok(kf.key.with_partial(hash))
    }

    fn full_key(&self, kf: &KeyedFile, counters: &Counters) -> io::Result<EquivalenceKey> {
        let signature = kf.file.signature();

        match self.cache.lookup(&signature) {
            Ok(Some(entry)) if entry.matches(&signature, ALGORITHM_VERSION) => {
                trace!("Found hash for {} in cache", kf.file.path.display());
                counters.cache_hits.fetch_add(1, Ordering::Relaxed);
                return Ok(kf.key.with_full(entry.full_hash));
            }
            Ok(Some(_)) => {
                trace!("Stale cache entry for {}", kf.file.path.display());
                counters.stale_cache_entries.fetch_add(1, Ordering::Relaxed);
            }
            Ok(None) => {}
            Err(e) => warn!("Cache lookup failed for {}: {}", kf.file.path.display(), e),
        }

        let (hash, read) = xxhash::full_hash(&kf.file.path)?;
        counters.full_hashes.fetch_add(1, Ordering::Relaxed);
        counters.bytes_read.fetch_add(read, Ordering::Relaxed);

        if let Err(e) = self.cache.upsert(&signature, hash) {
            warn!("Failed to cache hash for {}: {}", kf.file.path.display(), e);
        }
        Ok(kf.key.with_full(hash))
    }
}

/// Refine one group by `key_of`. Members whose new key is unique are
/// resolved; the rest stay grouped. Unreadable members become warnings.
fn split_by<F>(group: Vec<KeyedFile>, key_of: F) -> StageOutcome
where
    F: Fn(&KeyedFile) -> io::Result<EquivalenceKey> + Sync,
{
    let results: Vec<(KeyedFile, io::Result<EquivalenceKey>)> = group
        .into_par_iter()
        .map(|kf| {
            let key = key_of(&kf);
            (kf, key)
        })
        .collect();

    let mut outcome = StageOutcome::default();
    let mut by_key: AHashMap<EquivalenceKey, Vec<KeyedFile>> = AHashMap::new();

    for (mut kf, key) in results {
        match key {
            Ok(key) => {
                kf.key = key;
                by_key.entry(key).or_default().push(kf);
            }
            Err(e) => {
                warn!("Error processing file '{}': {}", kf.file.path.display(), e);
                outcome.warnings.push(FunnelWarning {
                    path: kf.file.path,
                    message: e.to_string(),
                });
            }
        }
    }

    for (_, members) in by_key {
        if members.len() == 1 {
            outcome.resolved.extend(members);
        } else {
            outcome.ambiguous.push(members);
        }
    }
    outcome
}

fn report(counters: &Counters, done: usize, total: usize, reporter: &dyn ProgressReporter) {
    let processed = counters.processed.fetch_add(done, Ordering::Relaxed) + done;
    reporter.on_hash_progress(processed, total);
}
