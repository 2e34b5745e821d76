use std::fs::File;
use std::hash::Hasher as _;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;
use twox_hash::XxHash64;

/// Bumped whenever the full-hash function changes so old cache entries stop
/// matching.
pub const ALGORITHM_VERSION: u32 = 1;

const FULL_READ_BUFFER: usize = 64 * 1024;

/// Hash of the first and last `chunk` bytes. Files no larger than two chunks
/// are hashed whole. Returns the hash and the number of bytes read.
pub fn partial_hash(file: &Path, size: u64, chunk: usize) -> io::Result<(u64, u64)> {
    let mut f = File::open(file)?;

    if size <= (chunk as u64) * 2 {
        let mut buffer = Vec::with_capacity(size as usize);
        f.read_to_end(&mut buffer)?;
        return Ok((hash_data(&buffer), buffer.len() as u64));
    }

    let mut hasher = XxHash64::with_seed(0);
    let mut buffer = vec![0; chunk];
    f.read_exact(&mut buffer)?;
    hasher.write(&buffer);
    f.seek(SeekFrom::End(-(chunk as i64)))?;
    f.read_exact(&mut buffer)?;
    hasher.write(&buffer);
    Ok((hasher.finish(), (chunk as u64) * 2))
}

/// Streaming hash of the whole file. Returns the hash and the number of bytes read.
pub fn full_hash(file: &Path) -> io::Result<(u64, u64)> {
    let mut f = File::open(file)?;
    let mut hasher = XxHash64::with_seed(0);
    let mut buffer = vec![0; FULL_READ_BUFFER];
    let mut total = 0u64;

    loop {
        let read = match f.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.write(&buffer[..read]);
        total += read as u64;
    }

    Ok((hasher.finish(), total))
}

pub fn hash_data(data: &[u8]) -> u64 {
    let mut hasher = XxHash64::with_seed(0);
    hasher.write(data);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_full_hash_matches_in_memory_hash() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("blob.bin");
        let data: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        fs::write(&path, &data).unwrap();

        let (hash, read) = full_hash(&path).unwrap();
        assert_eq!(read, data.len() as u64);
        assert_eq!(hash, hash_data(&data));
    }

    #[test]
    fn test_partial_hash_small_file_reads_everything() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("small.bin");
        fs::write(&path, vec![7u8; 6000]).unwrap();

        let (hash, read) = partial_hash(&path, 6000, 4096).unwrap();
        assert_eq!(read, 6000);
        assert_eq!(hash, hash_data(&vec![7u8; 6000]));
    }

    #[test]
    fn test_partial_hash_ignores_middle_bytes() {
        let tmp = tempdir().unwrap();
        let a = tmp.path().join("a.bin");
        let b = tmp.path().join("b.bin");
        let mut data = vec![1u8; 20_000];
        fs::write(&a, &data).unwrap();
        data[10_000] = 2;
        fs::write(&b, &data).unwrap();

        let (ha, read) = partial_hash(&a, 20_000, 4096).unwrap();
        let (hb, _) = partial_hash(&b, 20_000, 4096).unwrap();
        assert_eq!(read, 8192);
        assert_eq!(ha, hb);
        assert_ne!(full_hash(&a).unwrap().0, full_hash(&b).unwrap().0);
    }
}
