//! # imgdb
//!
//! A content-addressed image catalog. Point it at one or more directories and
//! it fingerprints every image with perceptual and cryptographic hashes,
//! extracts EXIF/XMP metadata, and stores one record per unique image in a
//! self-contained archive document that is both a database and a viewable
//! gallery.
//!
//! # Architecture
//!
//! ```text
//! walk roots ──▶ extract (metadata) ──▶ journal ──▶ merge ──▶ archive.htm
//! ```
//!
//! Ingestion never mutates the in-memory archive directly — every extracted
//! record is appended to a crash-safe journal first ([`journal`]), and only
//! the final merge ([`archive::merge`]) reconciles journal entries with
//! whatever was already on disk. A crash mid-ingest loses nothing already
//! extracted; the next run resumes from the journal.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`config`] | `imgdb.toml` loading, defaults, option-list expansion |
//! | [`archive`] | The archive document: parse, merge, save, filter |
//! | [`journal`] | Crash-safe append log used during ingestion |
//! | [`scheduler`] | Parallel walk → extract → journal → merge pipeline |
//! | [`metadata`] | Per-image meta extraction: EXIF/XMP, date, maker-model |
//! | [`imaging`] | Pure-Rust decode and thumbnail generation |
//! | [`hash`] | Perceptual and cryptographic fingerprinting |
//! | [`color`] | Per-pixel statistics: illumination, saturation, contrast |
//! | [`query`] | The filter expression language |
//! | [`template`] | Restricted `{field}` template engine for id/rename/links |
//! | [`ops`] | The operations layer: add, del, rename, export, gallery, links, info |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Pixel hashes, not file hashes
//!
//! Every cryptographic and perceptual hash is computed over decoded pixel
//! bytes, not the file on disk. This makes `id` (and dedup) invariant to
//! metadata-only edits — an EXIF rewrite or an XMP star rating never changes
//! identity. A separate `file-sha256` attribute is recorded for callers who
//! want exact-file duplicate detection; it is never conflated with the
//! pixel-based digests.
//!
//! ## A restricted template language for `id`
//!
//! `id`, rename targets, and link paths are all derived from a small,
//! closed-vocabulary placeholder language ([`template`]) rather than
//! evaluating a user string in a host interpreter — no arbitrary code can be
//! expressed through a template string.
//!
//! ## The archive is a document, not a database file
//!
//! [`archive::Archive`] stores its records in the same HTML file a browser
//! can open directly, with one `<img>` element per record. This keeps the
//! catalog legible without tooling and makes the save path trivial: one
//! document, written atomically.

pub mod archive;
pub mod color;
pub mod config;
pub mod hash;
pub mod imaging;
pub mod journal;
pub mod metadata;
pub mod ops;
pub mod output;
pub mod query;
pub mod scheduler;
pub mod template;
