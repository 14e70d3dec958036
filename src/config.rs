//! Catalog configuration module.
//!
//! Handles loading and parsing the `imgdb.toml` file from the content root
//! directory. Configuration is optional — sensible defaults are used when no
//! config file exists.
//!
//! ## Config File Location
//!
//! Place `imgdb.toml` at the content root:
//!
//! ```text
//! photos/
//! ├── imgdb.toml         # Catalog configuration
//! ├── archive.htm        # Archive document (default dbname)
//! └── 2024/
//!     └── ...
//! ```
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! dbname = "archive.htm"
//! exts = ["jpg", "jpeg", "png", "webp", "gif", "bmp", "tiff"]
//! deep = true
//! shuffle = false
//! sort_by = "date"
//!
//! [hashing]
//! c_hashes = ["blake2b"]
//! v_hashes = []
//! digest_size = 24
//!
//! [thumbnails]
//! thumb_sz = 164
//! thumb_qual = 75
//! thumb_type = "jpeg"
//!
//! [processing]
//! max_processes = 4   # omit for auto = CPU cores
//!
//! [gallery]
//! wrap_at = 1000
//! ```
//!
//! Layering (lowest to highest precedence): compiled-in defaults, `imgdb.toml`
//! at the content root, then CLI flag overrides applied by the caller.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Catalog-wide configuration loaded from `imgdb.toml`.
///
/// Immutable once constructed; operations receive it by reference (or behind
/// an `Arc` when shared across worker threads).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Archive document filename, relative to the content root unless absolute.
    #[serde(default = "default_dbname")]
    pub dbname: String,
    /// Filesystem destination root for materialized files (`add`'s
    /// copy/move/link target, distinct from `dbname`).
    pub output: Option<PathBuf>,
    /// Sharding width (0-4) for the one-to-four-character subdirectory
    /// derived from the target filename when materializing into `output`.
    #[serde(default = "default_subfolder_len")]
    pub archive_subfolder_len: usize,
    /// File-side-effect to perform when materializing into `output`.
    #[serde(default)]
    pub operation: FileOperation,
    /// Use symbolic links instead of hard links when `operation` is `link`.
    pub sym_links: bool,
    /// Accepted file extensions (lowercase, no leading dot).
    #[serde(default = "default_exts")]
    pub exts: Vec<String>,
    /// Recurse into subdirectories when walking input paths.
    #[serde(default = "default_true")]
    pub deep: bool,
    /// Shuffle the walk order before applying `limit`.
    pub shuffle: bool,
    /// Cap the number of files considered by a single walk (0 = unlimited).
    pub limit: usize,
    /// Overwrite existing files/records instead of skipping them.
    pub force: bool,
    /// Skip extraction for files whose id is already present in the archive.
    pub skip_imported: bool,
    /// Attribute used to sort the archive body on save (default `date`).
    #[serde(default = "default_sort_by")]
    pub sort_by: String,
    /// Template used to derive a record's `id`.
    #[serde(default = "default_id_template")]
    pub id_template: String,
    /// Query expression applied during extraction and by `filter`-consuming
    /// operations (export, gallery, links, delete).
    pub filter: Option<String>,
    /// Optional EXIF/XMP-derived fields to extract, beyond the mandatory
    /// set (e.g. `iso`, `aperture`, `lens`). `["*"]` requests all known.
    pub metadata: Vec<String>,
    /// Extra per-pixel algorithms to run (`illumination`, `saturation`,
    /// `contrast`, `top-colors`). `["*"]` requests all known.
    pub algorithms: Vec<String>,
    /// Template used by `rename` and `links` to derive output names/paths.
    pub tmpl: Option<String>,
    /// Attributes to inject before gallery rendering.
    pub add_attrs: Vec<String>,
    /// Attributes to strip before gallery rendering.
    pub del_attrs: Vec<String>,
    /// Destination template for `links` materialization.
    pub links: Option<String>,
    /// Worker thread count for ingestion. `None` (or absent) uses all
    /// available cores; takes precedence over `processing.max_processes`.
    pub threads: Option<usize>,
    /// Default `env_logger` filter level (`error`/`warn`/`info`/`debug`/
    /// `trace`), overridden by `-v`/`-q` CLI flags.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    pub hashing: HashingConfig,
    pub thumbnails: ThumbnailsConfig,
    pub processing: ProcessingConfig,
    pub gallery: GalleryConfig,
    pub top_colors: TopColorsConfig,
    /// CLI-only: skip every filesystem mutation an operation would perform,
    /// while it still logs and reports as if it had. Never read from or
    /// written to `imgdb.toml`.
    #[serde(skip)]
    pub dry_run: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

/// File-side-effect performed when materializing a record into `output`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileOperation {
    /// Record-only import: no filesystem side-effect.
    #[default]
    Noop,
    Copy,
    Move,
    Link,
}

fn default_subfolder_len() -> usize {
    2
}

fn default_dbname() -> String {
    "archive.htm".to_string()
}

fn default_exts() -> Vec<String> {
    ["jpg", "jpeg", "png", "webp", "gif", "bmp", "tiff"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_true() -> bool {
    true
}

fn default_sort_by() -> String {
    "date".to_string()
}

fn default_id_template() -> String {
    "{blake2b}".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dbname: default_dbname(),
            output: None,
            archive_subfolder_len: default_subfolder_len(),
            operation: FileOperation::default(),
            sym_links: false,
            exts: default_exts(),
            deep: true,
            shuffle: false,
            limit: 0,
            force: false,
            skip_imported: false,
            sort_by: default_sort_by(),
            id_template: default_id_template(),
            filter: None,
            metadata: Vec::new(),
            algorithms: Vec::new(),
            tmpl: None,
            add_attrs: Vec::new(),
            del_attrs: Vec::new(),
            links: None,
            threads: None,
            log_level: default_log_level(),
            hashing: HashingConfig::default(),
            thumbnails: ThumbnailsConfig::default(),
            processing: ProcessingConfig::default(),
            gallery: GalleryConfig::default(),
            top_colors: TopColorsConfig::default(),
            dry_run: false,
        }
    }
}

/// Every known perceptual hash name, in the order `v_hashes = ["*"]` expands to.
pub const ALL_V_HASHES: &[&str] = &["ahash", "dhash", "dhash-vert", "combined", "row-col", "blurhash"];
/// Every known cryptographic hash name.
pub const ALL_C_HASHES: &[&str] = &["blake2b", "sha224", "sha256"];
/// Every known per-pixel algorithm name.
pub const ALL_ALGORITHMS: &[&str] = &["illumination", "saturation", "contrast", "top-colors"];
/// Every known optional metadata field name.
pub const ALL_METADATA: &[&str] = &["aperture", "shutter-speed", "focal-length", "iso", "lens"];

fn expand_star(requested: &[String], all: &[&str]) -> Vec<String> {
    if requested.iter().any(|r| r == "*") {
        all.iter().map(|s| s.to_string()).collect()
    } else {
        requested.to_vec()
    }
}

impl Config {
    /// Resolve `dbname` against a content root, unless it is already absolute.
    pub fn db_path(&self, root: &Path) -> PathBuf {
        let p = Path::new(&self.dbname);
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            root.join(p)
        }
    }

    pub fn c_hashes(&self) -> Vec<String> {
        expand_star(&self.hashing.c_hashes, ALL_C_HASHES)
    }

    pub fn v_hashes(&self) -> Vec<String> {
        expand_star(&self.hashing.v_hashes, ALL_V_HASHES)
    }

    pub fn algorithms(&self) -> Vec<String> {
        expand_star(&self.algorithms, ALL_ALGORITHMS)
    }

    pub fn metadata_fields(&self) -> Vec<String> {
        expand_star(&self.metadata, ALL_METADATA)
    }
}

/// Hashing settings: which algorithms to run and at what digest size.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HashingConfig {
    /// Cryptographic digest names (e.g. `blake2b`, `sha224`, `sha256`).
    pub c_hashes: Vec<String>,
    /// Perceptual hash names (e.g. `ahash`, `dhash`, `dhash-vert`, `combined`,
    /// `row-col`, `blurhash`).
    pub v_hashes: Vec<String>,
    /// Variable digest size in bytes, applies to `blake2b` only.
    #[serde(default = "default_digest_size")]
    pub digest_size: usize,
}

fn default_digest_size() -> usize {
    24
}

impl Default for HashingConfig {
    fn default() -> Self {
        Self {
            c_hashes: vec!["blake2b".to_string()],
            v_hashes: Vec::new(),
            digest_size: default_digest_size(),
        }
    }
}

/// Thumbnail and embedded-preview settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThumbnailsConfig {
    /// Size (in pixels, square) of the embedded preview thumbnail.
    #[serde(default = "default_thumb_sz")]
    pub thumb_sz: u32,
    /// JPEG/WebP quality (0-100) of the embedded preview thumbnail.
    #[serde(default = "default_thumb_qual")]
    pub thumb_qual: u8,
    /// Encoding used for the embedded preview (`jpeg`, `png`, `webp`).
    #[serde(default = "default_thumb_type")]
    pub thumb_type: String,
}

fn default_thumb_sz() -> u32 {
    164
}

fn default_thumb_qual() -> u8 {
    75
}

fn default_thumb_type() -> String {
    "jpeg".to_string()
}

impl Default for ThumbnailsConfig {
    fn default() -> Self {
        Self {
            thumb_sz: default_thumb_sz(),
            thumb_qual: default_thumb_qual(),
            thumb_type: default_thumb_type(),
        }
    }
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// Maximum number of ingestion worker threads.
    /// When absent or null, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_processes: Option<usize>,
}

/// Resolve the effective thread count from config.
///
/// `Config.threads` takes precedence over the legacy nested
/// `processing.max_processes`; either way, `None` uses all available cores
/// and a requested count larger than the core count is clamped down, never up.
pub fn effective_threads(config: &Config) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config
        .threads
        .or(config.processing.max_processes)
        .map(|n| n.min(cores))
        .unwrap_or(cores)
}

/// Top-colors quantization settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TopColorsConfig {
    /// Number of quantization steps per channel.
    #[serde(default = "default_top_color_channels")]
    pub channels: usize,
    /// Minimum share (percent) a color bucket needs to be reported.
    #[serde(default = "default_top_color_cut")]
    pub cut: f64,
}

fn default_top_color_channels() -> usize {
    5
}

fn default_top_color_cut() -> f64 {
    25.0
}

impl Default for TopColorsConfig {
    fn default() -> Self {
        Self {
            channels: default_top_color_channels(),
            cut: default_top_color_cut(),
        }
    }
}

/// Gallery materialization settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GalleryConfig {
    /// Records per page (0 = unlimited, single page).
    #[serde(default = "default_wrap_at")]
    pub wrap_at: usize,
}

fn default_wrap_at() -> usize {
    1000
}

impl Default for GalleryConfig {
    fn default() -> Self {
        Self {
            wrap_at: default_wrap_at(),
        }
    }
}

/// Load config from `imgdb.toml` in the given content root directory.
pub fn load_config(root: &Path) -> Result<Config, ConfigError> {
    let config_path = root.join("imgdb.toml");
    if !config_path.exists() {
        return Ok(Config::default());
    }

    let content = fs::read_to_string(&config_path)?;
    let config: Config = toml::from_str(&content)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_config_has_expected_basics() {
        let config = Config::default();
        assert_eq!(config.dbname, "archive.htm");
        assert_eq!(config.sort_by, "date");
        assert_eq!(config.id_template, "{blake2b}");
        assert!(config.deep);
    }

    #[test]
    fn default_exts_cover_common_formats() {
        let config = Config::default();
        assert!(config.exts.contains(&"jpg".to_string()));
        assert!(config.exts.contains(&"png".to_string()));
    }

    #[test]
    fn db_path_joins_relative_dbname_to_root() {
        let config = Config::default();
        let root = Path::new("/photos");
        assert_eq!(config.db_path(root), Path::new("/photos/archive.htm"));
    }

    #[test]
    fn db_path_keeps_absolute_dbname() {
        let mut config = Config::default();
        config.dbname = "/elsewhere/archive.htm".to_string();
        let root = Path::new("/photos");
        assert_eq!(config.db_path(root), Path::new("/elsewhere/archive.htm"));
    }

    #[test]
    fn load_config_returns_default_when_no_file() {
        let tmp = TempDir::new().unwrap();
        let config = load_config(tmp.path()).unwrap();
        assert_eq!(config.dbname, "archive.htm");
    }

    #[test]
    fn load_config_reads_file() {
        let tmp = TempDir::new().unwrap();
        fs::write(
            tmp.path().join("imgdb.toml"),
            r#"
dbname = "catalog.htm"
sort_by = "id"

[hashing]
c_hashes = ["sha256"]
digest_size = 32
"#,
        )
        .unwrap();

        let config = load_config(tmp.path()).unwrap();
        assert_eq!(config.dbname, "catalog.htm");
        assert_eq!(config.sort_by, "id");
        assert_eq!(config.hashing.c_hashes, vec!["sha256".to_string()]);
        assert_eq!(config.hashing.digest_size, 32);
        // Unspecified values fall back to defaults
        assert_eq!(config.thumbnails.thumb_sz, 164);
    }

    #[test]
    fn load_config_invalid_toml_is_error() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("imgdb.toml"), "this is not valid toml [[[").unwrap();
        let result = load_config(tmp.path());
        assert!(matches!(result, Err(ConfigError::Toml(_))));
    }

    #[test]
    fn default_processing_config() {
        let config = ProcessingConfig::default();
        assert_eq!(config.max_processes, None);
    }

    #[test]
    fn effective_threads_auto() {
        let config = Config::default();
        let threads = effective_threads(&config);
        let cores = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
        assert_eq!(threads, cores);
    }

    #[test]
    fn effective_threads_clamped_to_cores() {
        let mut config = Config::default();
        config.threads = Some(99999);
        let threads = effective_threads(&config);
        let cores = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
        assert_eq!(threads, cores);
    }

    #[test]
    fn effective_threads_user_constrains_down() {
        let mut config = Config::default();
        config.threads = Some(1);
        assert_eq!(effective_threads(&config), 1);
    }

    #[test]
    fn effective_threads_falls_back_to_processing_max_processes() {
        let mut config = Config::default();
        config.processing.max_processes = Some(1);
        assert_eq!(effective_threads(&config), 1);
    }

    #[test]
    fn default_log_level_is_info() {
        assert_eq!(Config::default().log_level, "info");
    }

    #[test]
    fn gallery_default_wrap_at() {
        assert_eq!(GalleryConfig::default().wrap_at, 1000);
    }
}
