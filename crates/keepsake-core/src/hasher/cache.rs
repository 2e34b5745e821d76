use super::xxhash::ALGORITHM_VERSION;
use crate::error::Error;
use crate::models::{CacheEntry, CacheSignature};
use dashmap::DashMap;
use rocksdb::{IteratorMode, Options, WriteBatch, DB};
use std::path::Path;
use tracing::{debug, info};

/// Persistent store of full-file hashes, keyed by absolute path. The stored
/// entry carries the signature it was computed under; callers decide whether
/// it still matches the live file.
pub trait HashCache: Send + Sync {
    fn lookup(&self, signature: &CacheSignature) -> Result<Option<CacheEntry>, Error>;

    /// Insert or replace. Last writer wins.
    fn upsert(&self, signature: &CacheSignature, full_hash: u64) -> Result<(), Error>;

    fn len(&self) -> Result<usize, Error>;

    fn is_empty(&self) -> Result<bool, Error> {
        Ok(self.len()? == 0)
    }

    fn clear(&self) -> Result<(), Error>;

    fn flush(&self) -> Result<(), Error> {
        Ok(())
    }
}

fn entry_for(signature: &CacheSignature, full_hash: u64) -> CacheEntry {
    CacheEntry {
        size: signature.size,
        modified_secs: signature.modified_secs,
        modified_nanos: signature.modified_nanos,
        full_hash,
        algorithm_version: ALGORITHM_VERSION,
    }
}

/// RocksDB-backed cache; values are bincode-encoded [`CacheEntry`]s.
pub struct RocksDbCache {
    db: DB,
}

impl RocksDbCache {
    pub fn open(path: &Path) -> Result<Self, Error> {
        let mut db_options = Options::default();
        db_options.create_if_missing(true);
        let db = DB::open(&db_options, path)?;
        debug!("Using '{}' for hash cache", path.display());
        Ok(Self { db })
    }
}

impl HashCache for RocksDbCache {
    fn lookup(&self, signature: &CacheSignature) -> Result<Option<CacheEntry>, Error> {
        match self.db.get(signature.path.as_bytes())? {
            Some(value) => Ok(Some(bincode::deserialize(&value)?)),
            None => Ok(None),
        }
    }

    fn upsert(&self, signature: &CacheSignature, full_hash: u64) -> Result<(), Error> {
        let value = bincode::serialize(&entry_for(signature, full_hash))?;
        self.db.put(signature.path.as_bytes(), value)?;
        Ok(())
    }

    fn len(&self) -> Result<usize, Error> {
        let mut count = 0usize;
        for item in self.db.iterator(IteratorMode::Start) {
            item?;
            count += 1;
        }
        Ok(count)
    }

    fn clear(&self) -> Result<(), Error> {
        let mut batch = WriteBatch::default();
        for item in self.db.iterator(IteratorMode::Start) {
            let (key, _) = item?;
            batch.delete(&key);
        }
        self.db.write(batch)?;
        info!("Hash cache cleared");
        Ok(())
    }

    fn flush(&self) -> Result<(), Error> {
        self.db.flush()?;
        Ok(())
    }
}

/// In-process cache for tests and cache-less runs.
#[derive(Default)]
pub struct MemoryCache {
    entries: DashMap<String, CacheEntry>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl HashCache for MemoryCache {
    fn lookup(&self, signature: &CacheSignature) -> Result<Option<CacheEntry>, Error> {
        Ok(self
            .entries
            .get(&signature.path)
            .map(|entry| entry.value().clone()))
    }

    fn upsert(&self, signature: &CacheSignature, full_hash: u64) -> Result<(), Error> {
        self.entries
            .insert(signature.path.clone(), entry_for(signature, full_hash));
        Ok(())
    }

    fn len(&self) -> Result<usize, Error> {
        Ok(self.entries.len())
    }

    fn clear(&self) -> Result<(), Error> {
        self.entries.clear();
        Ok(())
    }
}
