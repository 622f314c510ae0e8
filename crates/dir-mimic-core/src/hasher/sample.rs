use crate::model::HashMode;
use sha1::{Digest, Sha1};
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

pub const SAMPLE_LENGTH: u64 = 64 * 1024; // 64KB

const READ_BUFFER: usize = 64 * 1024;

/// Hash a file according to `mode`. Returns `None` for [`HashMode::None`].
pub fn hash_file(file: &Path, size: u64, mode: HashMode) -> io::Result<Option<String>> {
    match mode {
        HashMode::None => Ok(None),
        HashMode::Sample => sample_hash(file, size).map(Some),
        HashMode::Full => full_hash(file).map(Some),
    }
}

/// SHA-1 of the whole file when it fits in one sample, otherwise of the
/// first 64KB followed by the last 64KB through a single running digest.
pub fn sample_hash(file: &Path, size: u64) -> io::Result<String> {
    let mut f = File::open(file)?;
    let mut hasher = Sha1::new();

    if size <= SAMPLE_LENGTH {
        let mut data = Vec::with_capacity(size as usize);
        f.read_to_end(&mut data)?;
        hasher.update(&data);
    } else {
        let mut buffer = vec![0u8; SAMPLE_LENGTH as usize];
        f.read_exact(&mut buffer)?;
        hasher.update(&buffer);

        f.seek(SeekFrom::End(-(SAMPLE_LENGTH as i64)))?;
        f.read_exact(&mut buffer)?;
        hasher.update(&buffer);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Streaming SHA-1 of the entire file.
pub fn full_hash(file: &Path) -> io::Result<String> {
    let mut f = File::open(file)?;
    let mut hasher = Sha1::new();
    let mut buffer = vec![0u8; READ_BUFFER];

    loop {
        let read = f.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn sha1_hex(data: &[u8]) -> String {
        hex::encode(Sha1::digest(data))
    }

    #[test]
    fn test_small_file_hashes_whole_content() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("small.txt");
        fs::write(&path, b"hello world").unwrap();

        let hash = sample_hash(&path, 11).unwrap();
        assert_eq!(hash, sha1_hex(b"hello world"));
        assert_eq!(hash.len(), 40);
        assert_eq!(hash, full_hash(&path).unwrap());
    }

    #[test]
    fn test_large_file_hashes_head_then_tail() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("large.bin");
        let len = 3 * SAMPLE_LENGTH as usize;
        let data: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
        fs::write(&path, &data).unwrap();

        let mut expected = Vec::new();
        expected.extend_from_slice(&data[..SAMPLE_LENGTH as usize]);
        expected.extend_from_slice(&data[len - SAMPLE_LENGTH as usize..]);

        let hash = sample_hash(&path, len as u64).unwrap();
        assert_eq!(hash, sha1_hex(&expected));
        assert_ne!(hash, full_hash(&path).unwrap());
    }

    #[test]
    fn test_sample_ignores_middle_but_full_does_not() {
        let dir = tempdir().unwrap();
        let len = 3 * SAMPLE_LENGTH as usize;
        let a = vec![7u8; len];
        let mut b = a.clone();
        b[len / 2] = 8;
        fs::write(dir.path().join("a.bin"), &a).unwrap();
        fs::write(dir.path().join("b.bin"), &b).unwrap();

        let sample_a = sample_hash(&dir.path().join("a.bin"), len as u64).unwrap();
        let sample_b = sample_hash(&dir.path().join("b.bin"), len as u64).unwrap();
        assert_eq!(sample_a, sample_b);

        let full_a = full_hash(&dir.path().join("a.bin")).unwrap();
        let full_b = full_hash(&dir.path().join("b.bin")).unwrap();
        assert_ne!(full_a, full_b);
    }

    #[test]
    fn test_hash_file_none_mode_skips_io() {
        let missing = Path::new("/definitely/not/here.bin");
        assert_eq!(hash_file(missing, 10, HashMode::None).unwrap(), None);
        assert!(hash_file(missing, 10, HashMode::Sample).is_err());
    }
}
