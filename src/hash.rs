// src/hash.rs

//! Content hashing primitives
//!
//! Two algorithms are supported:
//! - **SHA-256**: cryptographic, the default for manifests and verification
//! - **XXH128**: non-cryptographic, only for trusted local content addressing
//!
//! A [`ContentHash`] is the hex rendering of a digest. Two files with equal
//! hashes are treated as byte-identical everywhere in this crate, and
//! comparison is always exact string equality.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::io::{self, Read};
use std::str::FromStr;
use xxhash_rust::xxh3::Xxh3;

/// Hash algorithm selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum HashAlgorithm {
    /// SHA-256 (256-bit cryptographic hash)
    #[default]
    Sha256,

    /// XXH128 (128-bit non-cryptographic hash)
    Xxh128,
}

impl HashAlgorithm {
    /// Get the hash output length in bytes
    #[inline]
    pub const fn output_len(&self) -> usize {
        match self {
            Self::Sha256 => 32,
            Self::Xxh128 => 16,
        }
    }

    /// Get the hash output length as a hex string
    #[inline]
    pub const fn hex_len(&self) -> usize {
        self.output_len() * 2
    }

    /// Get the algorithm name as a string
    #[inline]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
            Self::Xxh128 => "xxh128",
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for HashAlgorithm {
    type Err = HashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sha256" | "sha-256" => Ok(Self::Sha256),
            "xxh128" | "xxhash" | "xxh3" => Ok(Self::Xxh128),
            _ => Err(HashError::UnknownAlgorithm(s.to_string())),
        }
    }
}

impl TryFrom<String> for HashAlgorithm {
    type Error = HashError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<HashAlgorithm> for String {
    fn from(algorithm: HashAlgorithm) -> Self {
        algorithm.name().to_string()
    }
}

/// Hash parsing errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HashError {
    /// Unknown hash algorithm name
    UnknownAlgorithm(String),
    /// Hash string is empty
    Empty,
    /// Hash string contains characters other than lowercase hex
    InvalidHex(String),
}

impl fmt::Display for HashError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownAlgorithm(name) => write!(f, "unknown hash algorithm: {}", name),
            Self::Empty => write!(f, "empty hash"),
            Self::InvalidHex(s) => write!(f, "invalid hex in hash: {}", s),
        }
    }
}

impl std::error::Error for HashError {}

/// A content identifier: the lowercase hex digest of a file
///
/// The length is not fixed by the type; callers that need a specific
/// algorithm's length (the delta name codec) check it themselves.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentHash(String);

impl ContentHash {
    /// Validate and wrap a hex digest
    pub fn new(value: impl Into<String>) -> Result<Self, HashError> {
        let value = value.into();
        if value.is_empty() {
            return Err(HashError::Empty);
        }
        if !value.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')) {
            return Err(HashError::InvalidHex(value));
        }
        Ok(Self(value))
    }

    /// Get the hash value as a hex string
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short form for log lines
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(12)]
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ContentHash {
    type Err = HashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for ContentHash {
    type Error = HashError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ContentHash> for String {
    fn from(hash: ContentHash) -> Self {
        hash.0
    }
}

/// Hasher that can compute hashes using any supported algorithm
pub struct Hasher {
    state: HasherState,
}

enum HasherState {
    Sha256(Sha256),
    Xxh128(Box<Xxh3>),
}

impl Hasher {
    /// Create a new hasher with the specified algorithm
    pub fn new(algorithm: HashAlgorithm) -> Self {
        let state = match algorithm {
            HashAlgorithm::Sha256 => HasherState::Sha256(Sha256::new()),
            HashAlgorithm::Xxh128 => HasherState::Xxh128(Box::new(Xxh3::new())),
        };
        Self { state }
    }

    /// Update the hasher with more data
    pub fn update(&mut self, data: &[u8]) {
        match &mut self.state {
            HasherState::Sha256(hasher) => hasher.update(data),
            HasherState::Xxh128(hasher) => hasher.update(data),
        }
    }

    /// Finalize and return the hash
    pub fn finalize(self) -> ContentHash {
        let value = match self.state {
            HasherState::Sha256(hasher) => format!("{:x}", hasher.finalize()),
            HasherState::Xxh128(hasher) => format!("{:032x}", hasher.digest128()),
        };
        ContentHash(value)
    }
}

/// Compute hash of a byte slice
pub fn hash_bytes(algorithm: HashAlgorithm, data: &[u8]) -> ContentHash {
    let mut hasher = Hasher::new(algorithm);
    hasher.update(data);
    hasher.finalize()
}

/// Feed everything from a reader into an existing hasher
pub fn update_from_reader<R: Read>(hasher: &mut Hasher, reader: &mut R) -> io::Result<u64> {
    let mut buffer = [0u8; 8192];
    let mut total = 0u64;

    loop {
        let n = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buffer[..n]);
        total += n as u64;
    }

    Ok(total)
}

/// Compute hash of data from a reader
pub fn hash_reader<R: Read>(algorithm: HashAlgorithm, reader: &mut R) -> io::Result<ContentHash> {
    let mut hasher = Hasher::new(algorithm);
    update_from_reader(&mut hasher, reader)?;
    Ok(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_hash() {
        let hash = hash_bytes(HashAlgorithm::Sha256, b"Hello, World!");
        assert_eq!(
            hash.as_str(),
            "dffd6021bb2bd5b0af676290809ec3a53191dd81c7f70a4b28688a362182986f"
        );
        assert_eq!(hash.as_str().len(), HashAlgorithm::Sha256.hex_len());
    }

    #[test]
    fn test_xxh128_hash() {
        let hash = hash_bytes(HashAlgorithm::Xxh128, b"Hello, World!");
        assert_eq!(hash.as_str().len(), HashAlgorithm::Xxh128.hex_len());
        assert!(ContentHash::new(hash.as_str()).is_ok());
    }

    #[test]
    fn test_hasher_incremental() {
        for algorithm in [HashAlgorithm::Sha256, HashAlgorithm::Xxh128] {
            let full = hash_bytes(algorithm, b"Hello, World!");

            let mut hasher = Hasher::new(algorithm);
            hasher.update(b"Hello, ");
            hasher.update(b"World!");

            assert_eq!(full, hasher.finalize());
        }
    }

    #[test]
    fn test_hash_reader() {
        let data = b"Hello, World!";
        let mut cursor = std::io::Cursor::new(data);

        let hash = hash_reader(HashAlgorithm::Sha256, &mut cursor).unwrap();
        assert_eq!(hash, hash_bytes(HashAlgorithm::Sha256, data));
    }

    #[test]
    fn test_algorithm_parse() {
        assert_eq!("sha256".parse::<HashAlgorithm>().unwrap(), HashAlgorithm::Sha256);
        assert_eq!("SHA-256".parse::<HashAlgorithm>().unwrap(), HashAlgorithm::Sha256);
        assert_eq!("xxh128".parse::<HashAlgorithm>().unwrap(), HashAlgorithm::Xxh128);
        assert!("md5".parse::<HashAlgorithm>().is_err());
    }

    #[test]
    fn test_content_hash_validation() {
        assert!(ContentHash::new("0123456789abcdef").is_ok());
        assert_eq!(ContentHash::new(""), Err(HashError::Empty));
        assert!(matches!(
            ContentHash::new("ABCDEF"),
            Err(HashError::InvalidHex(_))
        ));
        assert!(matches!(
            ContentHash::new("../etc"),
            Err(HashError::InvalidHex(_))
        ));
    }

    #[test]
    fn test_content_hash_serde() {
        let hash: ContentHash = serde_json::from_str("\"abc123\"").unwrap();
        assert_eq!(hash.as_str(), "abc123");
        assert!(serde_json::from_str::<ContentHash>("\"xyz\"").is_err());
        assert_eq!(serde_json::to_string(&hash).unwrap(), "\"abc123\"");
    }

    #[test]
    fn test_short() {
        let hash = hash_bytes(HashAlgorithm::Sha256, b"test");
        assert_eq!(hash.short().len(), 12);
        assert_eq!(ContentHash::new("ab").unwrap().short(), "ab");
    }
}
