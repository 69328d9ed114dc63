//! Checksum calculation and verification for downloaded artifacts.
//!
//! A [`ChecksumSet`] holds the digests a caller expects a file to have, one per
//! algorithm. Two entry points cover the two ways callers use it:
//!
//! - [`validate`] is authoritative and reports the first mismatch as an error.
//!   The orchestrator runs it on every freshly fetched file.
//! - [`is_valid`] is exploratory and collapses any failure to `false`. The
//!   download cache uses it so a tampered entry reads as a miss.
//!
//! Every checked algorithm streams the whole file once, so a set with several
//! algorithms reads the file several times.

use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use sha2::digest::DynDigest;
use thiserror::Error;
use tracing::warn;

/// Buffer size for reading files during checksum calculation (64KB).
const BUFFER_SIZE: usize = 64 * 1024;

/// Errors raised while computing or comparing digests.
#[derive(Debug, Error)]
pub enum ChecksumError {
    /// The file content does not match the expected digest.
    #[error("{algorithm} checksum mismatch for {}: expected {expected}, got {actual}", .path.display())]
    Mismatch {
        algorithm: ChecksumAlgorithm,
        path: PathBuf,
        expected: String,
        actual: String,
    },

    /// The file could not be read.
    #[error("failed to read {} for checksum calculation: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The algorithm name is not one we support.
    #[error("unsupported checksum algorithm '{0}' (expected one of md5, sha-1, sha-256, sha-384, sha-512)")]
    UnknownAlgorithm(String),

    /// The expected digest is not a hex string of the right length.
    #[error("malformed {algorithm} digest '{digest}': expected {expected_len} hex characters")]
    MalformedDigest {
        algorithm: ChecksumAlgorithm,
        digest: String,
        expected_len: usize,
    },
}

/// Digest algorithms accepted in a [`ChecksumSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ChecksumAlgorithm {
    Md5,
    Sha1,
    Sha256,
    Sha384,
    Sha512,
}

impl ChecksumAlgorithm {
    /// Canonical display name, e.g. `SHA-256`.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Md5 => "MD5",
            Self::Sha1 => "SHA-1",
            Self::Sha256 => "SHA-256",
            Self::Sha384 => "SHA-384",
            Self::Sha512 => "SHA-512",
        }
    }

    /// Length of the lowercase hex digest produced by this algorithm.
    pub fn hex_len(&self) -> usize {
        match self {
            Self::Md5 => 32,
            Self::Sha1 => 40,
            Self::Sha256 => 64,
            Self::Sha384 => 96,
            Self::Sha512 => 128,
        }
    }

    /// All supported algorithms.
    pub fn all() -> &'static [Self] {
        &[
            Self::Md5,
            Self::Sha1,
            Self::Sha256,
            Self::Sha384,
            Self::Sha512,
        ]
    }

    fn hasher(&self) -> Box<dyn DynDigest> {
        match self {
            Self::Md5 => Box::new(md5::Md5::default()),
            Self::Sha1 => Box::new(sha1::Sha1::default()),
            Self::Sha256 => Box::new(sha2::Sha256::default()),
            Self::Sha384 => Box::new(sha2::Sha384::default()),
            Self::Sha512 => Box::new(sha2::Sha512::default()),
        }
    }
}

impl fmt::Display for ChecksumAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ChecksumAlgorithm {
    type Err = ChecksumError;

    /// Accepts `sha256`, `SHA-256`, `sha_256` and similar spellings.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let folded: String = s
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .collect::<String>()
            .to_ascii_lowercase();

        match folded.as_str() {
            "md5" => Ok(Self::Md5),
            "sha1" => Ok(Self::Sha1),
            "sha256" => Ok(Self::Sha256),
            "sha384" => Ok(Self::Sha384),
            "sha512" => Ok(Self::Sha512),
            _ => Err(ChecksumError::UnknownAlgorithm(s.to_string())),
        }
    }
}

/// Expected digests for a file, at most one per algorithm.
///
/// An empty set makes no integrity claim and every file satisfies it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChecksumSet {
    digests: BTreeMap<ChecksumAlgorithm, String>,
}

impl ChecksumSet {
    /// Create an empty checksum set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an expected digest, replacing any previous one for the algorithm.
    pub fn insert(&mut self, algorithm: ChecksumAlgorithm, digest: impl Into<String>) {
        let digest = digest.into().trim().to_ascii_lowercase();
        self.digests.insert(algorithm, digest);
    }

    /// Builder-style variant of [`insert`](Self::insert).
    pub fn with(mut self, algorithm: ChecksumAlgorithm, digest: impl Into<String>) -> Self {
        self.insert(algorithm, digest);
        self
    }

    /// Parse an `algorithm:hexdigest` pair and add it to the set.
    pub fn insert_spec(&mut self, spec: &str) -> Result<(), ChecksumError> {
        let (algorithm, digest) = spec
            .split_once(':')
            .or_else(|| spec.split_once('='))
            .ok_or_else(|| ChecksumError::UnknownAlgorithm(spec.to_string()))?;
        self.insert(algorithm.trim().parse()?, digest);
        Ok(())
    }

    /// Expected digest for an algorithm, if any.
    pub fn get(&self, algorithm: ChecksumAlgorithm) -> Option<&str> {
        self.digests.get(&algorithm).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.digests.is_empty()
    }

    pub fn len(&self) -> usize {
        self.digests.len()
    }

    /// Iterate over `(algorithm, expected digest)` pairs in algorithm order.
    pub fn iter(&self) -> impl Iterator<Item = (ChecksumAlgorithm, &str)> {
        self.digests.iter().map(|(a, d)| (*a, d.as_str()))
    }

    /// Check that every expected digest is well-formed hex of the right length.
    pub fn check_format(&self) -> Result<(), ChecksumError> {
        for (algorithm, digest) in self.iter() {
            let well_formed = digest.len() == algorithm.hex_len()
                && digest.bytes().all(|b| b.is_ascii_hexdigit());
            if !well_formed {
                return Err(ChecksumError::MalformedDigest {
                    algorithm,
                    digest: digest.to_string(),
                    expected_len: algorithm.hex_len(),
                });
            }
        }
        Ok(())
    }
}

/// Calculate the digest of a file, streaming it in fixed-size chunks.
///
/// Returns the lowercase hexadecimal digest.
pub fn digest_file(path: &Path, algorithm: ChecksumAlgorithm) -> Result<String, ChecksumError> {
    let read_failed = |e| ChecksumError::Read {
        path: path.to_path_buf(),
        source: e,
    };

    let mut file = File::open(path).map_err(read_failed)?;
    let mut hasher = algorithm.hasher();
    let mut buffer = vec![0u8; BUFFER_SIZE];

    loop {
        let bytes_read = file.read(&mut buffer).map_err(read_failed)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Verify a file against every digest in the set.
///
/// Fails on the first mismatch with the algorithm and both digests.
pub fn validate(path: &Path, checksums: &ChecksumSet) -> Result<(), ChecksumError> {
    if checksums.len() > 1 {
        warn!(
            path = %path.display(),
            algorithms = checksums.len(),
            "Multiple checksum algorithms supplied; each one re-reads the whole file, prefer a single checksum"
        );
    }
    verify_all(path, checksums)
}

/// Like [`validate`], but reports any failure as `false`.
pub fn is_valid(path: &Path, checksums: &ChecksumSet) -> bool {
    verify_all(path, checksums).is_ok()
}

fn verify_all(path: &Path, checksums: &ChecksumSet) -> Result<(), ChecksumError> {
    for (algorithm, expected) in checksums.iter() {
        let actual = digest_file(path, algorithm)?;
        if !actual.eq_ignore_ascii_case(expected) {
            return Err(ChecksumError::Mismatch {
                algorithm,
                path: path.to_path_buf(),
                expected: expected.to_string(),
                actual,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    const HELLO_SHA256: &str = "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9";
    const HELLO_MD5: &str = "5eb63bbbe01eeed093cb22bb8f5acdc3";
    const HELLO_SHA1: &str = "2aae6c35c94fcfb415dbe95f408b9ce91ee846ed";

    fn hello_file(temp: &TempDir) -> PathBuf {
        let file_path = temp.path().join("test.txt");
        let mut file = File::create(&file_path).unwrap();
        file.write_all(b"hello world").unwrap();
        file_path
    }

    #[test]
    fn test_digest_file_sha256() {
        let temp = TempDir::new().unwrap();
        let path = hello_file(&temp);

        let checksum = digest_file(&path, ChecksumAlgorithm::Sha256).unwrap();
        assert_eq!(checksum, HELLO_SHA256);
    }

    #[test]
    fn test_digest_file_md5_and_sha1() {
        let temp = TempDir::new().unwrap();
        let path = hello_file(&temp);

        assert_eq!(digest_file(&path, ChecksumAlgorithm::Md5).unwrap(), HELLO_MD5);
        assert_eq!(digest_file(&path, ChecksumAlgorithm::Sha1).unwrap(), HELLO_SHA1);
    }

    #[test]
    fn test_digest_empty_file() {
        let temp = TempDir::new().unwrap();
        let file_path = temp.path().join("empty.txt");
        File::create(&file_path).unwrap();

        let checksum = digest_file(&file_path, ChecksumAlgorithm::Sha256).unwrap();
        assert_eq!(
            checksum,
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_digest_nonexistent_file() {
        let result = digest_file(Path::new("/nonexistent/file.txt"), ChecksumAlgorithm::Md5);
        assert!(matches!(result, Err(ChecksumError::Read { .. })));
    }

    #[test]
    fn test_digest_lengths_match_algorithm() {
        let temp = TempDir::new().unwrap();
        let path = hello_file(&temp);

        for algorithm in ChecksumAlgorithm::all() {
            let digest = digest_file(&path, *algorithm).unwrap();
            assert_eq!(digest.len(), algorithm.hex_len(), "{}", algorithm);
        }
    }

    #[test]
    fn test_large_file_spans_buffers() {
        let temp = TempDir::new().unwrap();
        let file_path = temp.path().join("large.bin");
        let mut file = File::create(&file_path).unwrap();
        file.write_all(&vec![0xABu8; BUFFER_SIZE * 2 + 17]).unwrap();

        let first = digest_file(&file_path, ChecksumAlgorithm::Sha512).unwrap();
        let second = digest_file(&file_path, ChecksumAlgorithm::Sha512).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_is_valid_checksum_gate() {
        let temp = TempDir::new().unwrap();
        let path = hello_file(&temp);

        let correct = ChecksumSet::new().with(ChecksumAlgorithm::Sha256, HELLO_SHA256);
        let wrong = ChecksumSet::new().with(ChecksumAlgorithm::Sha256, "0".repeat(64));

        assert!(is_valid(&path, &correct));
        assert!(!is_valid(&path, &wrong));
        assert!(is_valid(&path, &ChecksumSet::new()));
    }

    #[test]
    fn test_is_valid_missing_file_with_checksum() {
        let set = ChecksumSet::new().with(ChecksumAlgorithm::Md5, HELLO_MD5);
        assert!(!is_valid(Path::new("/nonexistent/file.txt"), &set));
    }

    /// Formatted tracing output captured from the current thread.
    #[derive(Clone, Default)]
    struct CapturedLogs(std::sync::Arc<parking_lot::Mutex<Vec<u8>>>);

    impl io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl CapturedLogs {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock()).into_owned()
        }
    }

    fn validate_with_captured_logs(path: &Path, checksums: &ChecksumSet) -> String {
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::WARN)
            .finish();

        tracing::subscriber::with_default(subscriber, || validate(path, checksums).unwrap());
        logs.contents()
    }

    #[test]
    fn test_multiple_algorithms_warning_only_for_several() {
        let temp = TempDir::new().unwrap();
        let path = hello_file(&temp);

        let single = ChecksumSet::new().with(ChecksumAlgorithm::Sha256, HELLO_SHA256);
        assert!(!validate_with_captured_logs(&path, &single).contains("prefer a single checksum"));

        let several = single.with(ChecksumAlgorithm::Md5, HELLO_MD5);
        let logs = validate_with_captured_logs(&path, &several);
        assert!(logs.contains("prefer a single checksum"));
        assert!(logs.contains("algorithms=2"));
    }

    #[test]
    fn test_validate_reports_mismatch_details() {
        let temp = TempDir::new().unwrap();
        let path = hello_file(&temp);
        let set = ChecksumSet::new()
            .with(ChecksumAlgorithm::Md5, HELLO_MD5)
            .with(ChecksumAlgorithm::Sha256, "a".repeat(64));

        match validate(&path, &set) {
            Err(ChecksumError::Mismatch {
                algorithm,
                expected,
                actual,
                ..
            }) => {
                assert_eq!(algorithm, ChecksumAlgorithm::Sha256);
                assert_eq!(expected, "a".repeat(64));
                assert_eq!(actual, HELLO_SHA256);
            }
            other => panic!("Expected Mismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_validate_is_case_insensitive() {
        let temp = TempDir::new().unwrap();
        let path = hello_file(&temp);
        let set = ChecksumSet::new().with(ChecksumAlgorithm::Sha256, HELLO_SHA256.to_uppercase());

        assert!(validate(&path, &set).is_ok());
    }

    #[test]
    fn test_algorithm_parsing() {
        assert_eq!("sha256".parse::<ChecksumAlgorithm>().unwrap(), ChecksumAlgorithm::Sha256);
        assert_eq!("SHA-256".parse::<ChecksumAlgorithm>().unwrap(), ChecksumAlgorithm::Sha256);
        assert_eq!("Sha_1".parse::<ChecksumAlgorithm>().unwrap(), ChecksumAlgorithm::Sha1);
        assert_eq!("MD5".parse::<ChecksumAlgorithm>().unwrap(), ChecksumAlgorithm::Md5);
        assert!("crc32".parse::<ChecksumAlgorithm>().is_err());
    }

    #[test]
    fn test_insert_spec() {
        let mut set = ChecksumSet::new();
        set.insert_spec("sha-256:ABCDEF").unwrap();
        set.insert_spec("md5=0123").unwrap();

        assert_eq!(set.get(ChecksumAlgorithm::Sha256), Some("abcdef"));
        assert_eq!(set.get(ChecksumAlgorithm::Md5), Some("0123"));
        assert!(set.insert_spec("nocolon").is_err());
        assert!(set.insert_spec("whirlpool:00").is_err());
    }

    #[test]
    fn test_check_format() {
        let good = ChecksumSet::new().with(ChecksumAlgorithm::Sha1, HELLO_SHA1);
        assert!(good.check_format().is_ok());

        let short = ChecksumSet::new().with(ChecksumAlgorithm::Sha1, "abc");
        assert!(matches!(
            short.check_format(),
            Err(ChecksumError::MalformedDigest { expected_len: 40, .. })
        ));

        let not_hex = ChecksumSet::new().with(ChecksumAlgorithm::Md5, "z".repeat(32));
        assert!(not_hex.check_format().is_err());
    }

    #[test]
    fn test_insert_replaces_existing_algorithm() {
        let set = ChecksumSet::new()
            .with(ChecksumAlgorithm::Md5, "aa")
            .with(ChecksumAlgorithm::Md5, "bb");
        assert_eq!(set.len(), 1);
        assert_eq!(set.get(ChecksumAlgorithm::Md5), Some("bb"));
    }
}
