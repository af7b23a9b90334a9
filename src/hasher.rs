//! Content hashing.
//!
//! A document's identity is the SHA-256 digest of its raw bytes, rendered as
//! 64 lowercase hex characters. Input is streamed in fixed-size chunks so
//! memory use stays bounded no matter how large the file is.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use sha2::{Digest, Sha256};

/// Read buffer size used while hashing (1 MiB).
pub const HASH_CHUNK_BYTES: usize = 1024 * 1024;

/// Hash everything readable from `reader`.
///
/// I/O errors are propagated unchanged; a partial digest is never returned.
pub fn hash_reader<R: Read>(mut reader: R) -> io::Result<String> {
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; HASH_CHUNK_BYTES];
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Hash an in-memory byte slice.
pub fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Hash the file at `path` by streaming it from disk.
pub fn hash_file(path: &Path) -> io::Result<String> {
    let file = File::open(path)?;
    hash_reader(file)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingReader;

    impl Read for FailingReader {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::Other, "disk on fire"))
        }
    }

    #[test]
    fn known_digest_of_empty_input() {
        assert_eq!(
            hash_bytes(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn digest_is_64_lowercase_hex() {
        let h = hash_bytes(b"hello world");
        assert_eq!(h.len(), 64);
        assert!(h.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn stable_and_sensitive_to_single_byte() {
        let a = b"Jane Doe\nSenior Engineer".to_vec();
        let mut b = a.clone();
        b[3] ^= 0x01;
        assert_eq!(hash_bytes(&a), hash_bytes(&a));
        assert_ne!(hash_bytes(&a), hash_bytes(&b));
    }

    #[test]
    fn streaming_matches_in_memory_across_chunk_boundary() {
        let data: Vec<u8> = (0..(HASH_CHUNK_BYTES * 2 + 17))
            .map(|i| (i % 251) as u8)
            .collect();
        let streamed = hash_reader(std::io::Cursor::new(&data)).unwrap();
        assert_eq!(streamed, hash_bytes(&data));
    }

    #[test]
    fn file_hash_matches_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cv.txt");
        std::fs::write(&path, b"SUMMARY:\nRust engineer").unwrap();
        assert_eq!(
            hash_file(&path).unwrap(),
            hash_bytes(b"SUMMARY:\nRust engineer")
        );
    }

    #[test]
    fn read_errors_propagate() {
        let err = hash_reader(FailingReader).unwrap_err();
        assert_eq!(err.to_string(), "disk on fire");
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(hash_file(&dir.path().join("nope.pdf")).is_err());
    }
}
