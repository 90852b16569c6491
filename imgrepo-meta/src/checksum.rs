//! Streaming checksums for disk images
//!
//! Images are routinely several gigabytes, so files are hashed through a
//! fixed-size buffer and every digest is fed from the same read.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use sha2::{Digest, Sha256, Sha512};

const BUFFER_SIZE: usize = 65536;

/// Digests and byte count of one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checksums {
    pub sha256: String,
    pub sha512: String,
    pub size: u64,
}

/// Compute SHA-256 and SHA-512 of a file in a single pass
pub fn compute_checksums<P: AsRef<Path>>(path: P) -> std::io::Result<Checksums> {
    checksum_reader(File::open(path)?)
}

/// Hash everything `source` yields until EOF
pub fn checksum_reader<R: Read>(source: R) -> std::io::Result<Checksums> {
    let mut reader = BufReader::with_capacity(BUFFER_SIZE, source);
    let mut sha256 = Sha256::new();
    let mut sha512 = Sha512::new();
    let mut size = 0u64;

    let mut buffer = vec![0u8; BUFFER_SIZE];
    loop {
        let bytes_read = reader.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        sha256.update(&buffer[..bytes_read]);
        sha512.update(&buffer[..bytes_read]);
        size += bytes_read as u64;
    }

    Ok(Checksums {
        sha256: format!("{:x}", sha256.finalize()),
        sha512: format!("{:x}", sha512.finalize()),
        size,
    })
}

/// Compute the SHA-512 hex digest of a file
pub fn sha512sum<P: AsRef<Path>>(path: P) -> std::io::Result<String> {
    compute_checksums(path).map(|c| c.sha512)
}

/// Compute the SHA-256 hex digest of a file
pub fn sha256sum<P: AsRef<Path>>(path: P) -> std::io::Result<String> {
    compute_checksums(path).map(|c| c.sha256)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_sha256sum() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"hello world").unwrap();
        file.flush().unwrap();

        let hash = sha256sum(file.path()).unwrap();
        assert_eq!(
            hash,
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn test_sha512sum() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"hello world").unwrap();
        file.flush().unwrap();

        let hash = sha512sum(file.path()).unwrap();
        assert_eq!(
            hash,
            "309ecc489c12d6eb4cc40f50c902f2b4d0ed77ee511a7c7a9bcd3ca86d4cd86f\
             989dd35bc5ff499670da34255b45b0cfd830e81f605dcf7dc5542e93ae9cd76f"
        );
    }

    #[test]
    fn test_multi_buffer_file() {
        // Spans several reads so the chunked loop is exercised
        let data = vec![0xabu8; BUFFER_SIZE * 3 + 17];
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&data).unwrap();
        file.flush().unwrap();

        let checksums = compute_checksums(file.path()).unwrap();
        assert_eq!(checksums.size, data.len() as u64);
        assert_eq!(checksums.sha256, format!("{:x}", Sha256::digest(&data)));
        assert_eq!(checksums.sha512, format!("{:x}", Sha512::digest(&data)));
    }

    #[test]
    fn test_empty_file() {
        let file = NamedTempFile::new().unwrap();
        let checksums = compute_checksums(file.path()).unwrap();
        assert_eq!(checksums.size, 0);
        assert_eq!(
            checksums.sha256,
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
