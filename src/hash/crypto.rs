//! Cryptographic digests over decoded pixel bytes.
//!
//! Hashing decoded pixels instead of file bytes makes `id` invariant to
//! metadata-only edits (EXIF rewrites, XMP star ratings) while still changing
//! whenever the actual image content changes. A separate [`file_sha256`] is
//! provided for callers who also want an exact-file duplicate signal; it is
//! never conflated with the pixel-based digests (open question (b)).

use blake2::Blake2bVar;
use blake2::digest::VariableOutput;
use sha2::{Digest, Sha224, Sha256};
use std::io::Read;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CryptoHashError {
    #[error("unknown crypto hash name: {0}")]
    UnknownAlgorithm(String),
    #[error("invalid digest size: {0} (must be >= 6)")]
    InvalidDigestSize(usize),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CryptoHash {
    Blake2b,
    Sha224,
    Sha256,
}

impl CryptoHash {
    pub fn name(self) -> &'static str {
        match self {
            CryptoHash::Blake2b => "blake2b",
            CryptoHash::Sha224 => "sha224",
            CryptoHash::Sha256 => "sha256",
        }
    }

    pub fn parse(name: &str) -> Result<Self, CryptoHashError> {
        match name {
            "blake2b" => Ok(CryptoHash::Blake2b),
            "sha224" => Ok(CryptoHash::Sha224),
            "sha256" => Ok(CryptoHash::Sha256),
            other => Err(CryptoHashError::UnknownAlgorithm(other.to_string())),
        }
    }
}

/// Hash raw decoded pixel bytes with the given algorithm, returning lowercase hex.
///
/// `digest_size` only applies to `blake2b` (variable-length digest, in bytes);
/// the fixed-size algorithms ignore it.
pub fn pixel_digest(
    pixels: &[u8],
    algo: CryptoHash,
    digest_size: usize,
) -> Result<String, CryptoHashError> {
    match algo {
        CryptoHash::Blake2b => {
            if digest_size < 6 {
                return Err(CryptoHashError::InvalidDigestSize(digest_size));
            }
            let mut hasher = Blake2bVar::new(digest_size)
                .map_err(|_| CryptoHashError::InvalidDigestSize(digest_size))?;
            blake2::digest::Update::update(&mut hasher, pixels);
            let mut out = vec![0u8; digest_size];
            hasher
                .finalize_variable(&mut out)
                .map_err(|_| CryptoHashError::InvalidDigestSize(digest_size))?;
            Ok(hex::encode(&out))
        }
        CryptoHash::Sha224 => {
            let mut hasher = Sha224::new();
            Digest::update(&mut hasher, pixels);
            Ok(hex::encode(hasher.finalize()))
        }
        CryptoHash::Sha256 => {
            let mut hasher = Sha256::new();
            Digest::update(&mut hasher, pixels);
            Ok(hex::encode(hasher.finalize()))
        }
    }
}

/// SHA-256 over the raw file bytes on disk. Distinct attribute from every
/// pixel-based [`pixel_digest`] — exact-file dedup wants the bytes on disk,
/// not the decoded image.
pub fn file_sha256(path: &std::path::Path) -> Result<String, CryptoHashError> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        Digest::update(&mut hasher, &buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Minimal hex encoder so we don't need a dedicated `hex` crate dependency.
mod hex {
    pub fn encode(bytes: impl AsRef<[u8]>) -> String {
        let bytes = bytes.as_ref();
        let mut s = String::with_capacity(bytes.len() * 2);
        for b in bytes {
            s.push_str(&format!("{:02x}", b));
        }
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_is_deterministic() {
        let a = pixel_digest(b"hello", CryptoHash::Sha256, 24).unwrap();
        let b = pixel_digest(b"hello", CryptoHash::Sha256, 24).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn sha224_length() {
        let h = pixel_digest(b"hello", CryptoHash::Sha224, 24).unwrap();
        assert_eq!(h.len(), 56);
    }

    #[test]
    fn blake2b_respects_digest_size() {
        let h = pixel_digest(b"hello", CryptoHash::Blake2b, 24).unwrap();
        assert_eq!(h.len(), 48);
        let h2 = pixel_digest(b"hello", CryptoHash::Blake2b, 32).unwrap();
        assert_eq!(h2.len(), 64);
    }

    #[test]
    fn blake2b_rejects_tiny_digest_size() {
        let err = pixel_digest(b"hello", CryptoHash::Blake2b, 4).unwrap_err();
        assert!(matches!(err, CryptoHashError::InvalidDigestSize(4)));
    }

    #[test]
    fn different_pixels_produce_different_hash() {
        let a = pixel_digest(b"hello", CryptoHash::Sha256, 24).unwrap();
        let b = pixel_digest(b"world", CryptoHash::Sha256, 24).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn parse_rejects_unknown_name() {
        assert!(matches!(
            CryptoHash::parse("md5"),
            Err(CryptoHashError::UnknownAlgorithm(_))
        ));
    }

    #[test]
    fn parse_roundtrips_name() {
        for algo in [CryptoHash::Blake2b, CryptoHash::Sha224, CryptoHash::Sha256] {
            assert_eq!(CryptoHash::parse(algo.name()).unwrap(), algo);
        }
    }

    #[test]
    fn file_sha256_reads_whole_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.bin");
        std::fs::write(&path, b"content-bytes").unwrap();
        let h1 = file_sha256(&path).unwrap();
        let h2 = pixel_digest(b"content-bytes", CryptoHash::Sha256, 24).unwrap();
        assert_eq!(h1, h2);
    }
}
