//! Hashing primitives: cryptographic digests and perceptual hashes.
//!
//! Both families are pure functions over decoded pixel buffers — no I/O, no
//! config threading — so they are unit-testable in isolation from the extractor
//! pipeline that calls them.

pub mod crypto;
pub mod perceptual;

pub use crypto::{file_sha256, pixel_digest, CryptoHash};
pub use perceptual::{
    average_hash, blur_hash, combined_hash, diff_hash_horizontal, diff_hash_vertical,
    row_column_hash,
};
