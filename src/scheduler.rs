//! Ingestion scheduler: walk input paths, extract metadata in parallel,
//! journal every record as it completes, then merge the journal into the
//! archive once the walk is exhausted.
//!
//! Walk semantics cover deep vs. shallow, shuffle, a global limit, and an
//! extension filter. Fan-out uses `rayon` rather than a process pool, since
//! extraction is CPU-bound pure Rust with no GIL to work around.

use crate::archive::Record;
use crate::config::{self, Config};
use crate::journal::Journal;
use crate::metadata;
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

/// Outcome of one ingestion run.
#[derive(Debug, Default)]
pub struct IngestReport {
    pub scanned: usize,
    pub imported: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Set when `cancel` fired mid-run. The returned record set is then the
    /// unmodified `existing` set: the journal holds whatever was extracted
    /// before cancellation, but it is deliberately left unmerged.
    pub cancelled: bool,
}

/// Walk `roots`, extract every matching file not already present (when
/// `skip_imported` is set), journal each record, then merge the journal into
/// `existing` and return the merged record set plus a report. Does not save;
/// callers own when to write the archive to disk.
///
/// `cancel` is polled between dispatches; once set, no further extraction
/// tasks start, the journal is left on disk unmerged (closed, not deleted),
/// and the report comes back with `cancelled: true` and the original
/// (unmerged) record set.
pub fn ingest(
    roots: &[PathBuf],
    config: &Config,
    archive_path: &Path,
    existing: &[Record],
    cancel: &AtomicBool,
) -> std::io::Result<(Vec<Record>, IngestReport)> {
    let known_ids: std::collections::HashSet<&str> = existing.iter().map(|r| r.id.as_str()).collect();
    let known_paths: std::collections::HashSet<&str> =
        existing.iter().filter_map(|r| r.get("pth")).collect();

    let mut files = walk(roots, config);
    if config.shuffle {
        shuffle(&mut files);
    }
    if config.limit > 0 && files.len() > config.limit {
        files.truncate(config.limit);
    }
    let scanned = files.len();

    if config.skip_imported {
        files.retain(|p| !known_paths.contains(p.display().to_string().as_str()));
    }
    let skipped = scanned - files.len();

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config::effective_threads(config))
        .build()
        .unwrap_or_else(|_| rayon::ThreadPoolBuilder::new().build().unwrap());

    let journal = Journal::open(archive_path).map_err(std::io::Error::other)?;
    let results: Vec<Option<Record>> = pool.install(|| {
        files
            .par_iter()
            .map(|path| {
                if cancel.load(Ordering::Relaxed) {
                    return None;
                }
                match metadata::extract(path, config) {
                    Ok(Some(record)) if !record.id.is_empty() => {
                        if let Err(err) = journal.append(&record) {
                            log::error!("journal append failed for {}: {err}", path.display());
                        }
                        Some(record)
                    }
                    Ok(Some(_)) => None,
                    Ok(None) => None,
                    Err(err) => {
                        log::warn!("extraction failed for {}: {err}", path.display());
                        None
                    }
                }
            })
            .collect()
    });

    if cancel.load(Ordering::Relaxed) {
        log::warn!("ingestion cancelled; journal at {} left unmerged", archive_path.display());
        return Ok((
            existing.to_vec(),
            IngestReport {
                scanned,
                imported: 0,
                skipped,
                failed: 0,
                cancelled: true,
            },
        ));
    }

    let mut imported = 0;
    let mut failed = 0;
    let mut new_records = Vec::new();
    for (path, result) in files.iter().zip(results) {
        match result {
            Some(record) => {
                imported += 1;
                new_records.push(record);
            }
            None => {
                if std::fs::metadata(path).is_ok() {
                    failed += 1;
                }
            }
        }
    }

    let from_journal = journal.read_all().unwrap_or_default();
    journal.delete().ok();

    let merged = if config.force {
        crate::archive::merge::merge([existing.to_vec(), from_journal])
    } else {
        let filtered: Vec<Record> = from_journal.into_iter().filter(|r| !known_ids.contains(r.id.as_str())).collect();
        crate::archive::merge::merge([existing.to_vec(), filtered])
    };

    Ok((
        merged,
        IngestReport {
            scanned,
            imported,
            skipped,
            failed,
            cancelled: false,
        },
    ))
}

/// Collect image files under `roots` matching `config.exts`, recursing when
/// `config.deep` is set. Non-directory/non-file entries (broken symlinks,
/// permission errors) are logged and skipped, not fatal.
pub(crate) fn walk(roots: &[PathBuf], config: &Config) -> Vec<PathBuf> {
    let mut out = Vec::new();
    for root in roots {
        if root.is_file() {
            if has_accepted_ext(root, &config.exts) {
                out.push(root.clone());
            }
            continue;
        }
        if !root.is_dir() {
            log::warn!("skipping {}: not a file or directory", root.display());
            continue;
        }
        let mut walker = walkdir::WalkDir::new(root);
        if !config.deep {
            walker = walker.max_depth(1);
        }
        for entry in walker.into_iter().filter_map(|e| e.ok()) {
            if entry.file_type().is_file() && has_accepted_ext(entry.path(), &config.exts) {
                out.push(entry.path().to_path_buf());
            }
        }
    }
    out
}

fn has_accepted_ext(path: &Path, exts: &[String]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| exts.iter().any(|want| want.eq_ignore_ascii_case(e)))
        .unwrap_or(false)
}

/// Deterministic-within-a-run shuffle (xorshift seeded from the path list
/// itself) — avoids pulling in a `rand` dependency for a cosmetic ordering
/// knob.
fn shuffle(files: &mut [PathBuf]) {
    let mut seed: u64 = files.len() as u64 ^ 0x9E3779B97F4A7C15;
    for i in (1..files.len()).rev() {
        seed ^= seed << 13;
        seed ^= seed >> 7;
        seed ^= seed << 17;
        let j = (seed as usize) % (i + 1);
        files.swap(i, j);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_png(path: &Path) {
        write_png_colored(path, [5, 6, 7]);
    }

    fn write_png_colored(path: &Path, color: [u8; 3]) {
        let img = image::RgbImage::from_fn(8, 8, |_, _| image::Rgb(color));
        image::DynamicImage::ImageRgb8(img).save(path).unwrap();
    }

    #[test]
    fn walk_finds_matching_files_recursively() {
        let dir = tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        write_png(&dir.path().join("a.png"));
        write_png(&dir.path().join("sub/b.png"));
        std::fs::write(dir.path().join("ignore.txt"), b"x").unwrap();

        let config = Config::default();
        let files = walk(&[dir.path().to_path_buf()], &config);
        assert_eq!(files.len(), 2);
    }

    #[test]
    fn walk_shallow_skips_subdirectories() {
        let dir = tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        write_png(&dir.path().join("a.png"));
        write_png(&dir.path().join("sub/b.png"));

        let mut config = Config::default();
        config.deep = false;
        let files = walk(&[dir.path().to_path_buf()], &config);
        assert_eq!(files.len(), 1);
    }

    #[test]
    fn ingest_populates_archive_and_report() {
        let dir = tempdir().unwrap();
        write_png_colored(&dir.path().join("a.png"), [5, 6, 7]);
        write_png_colored(&dir.path().join("b.png"), [100, 150, 200]);

        let config = Config::default();
        let archive_path = dir.path().join("archive.htm");
        let cancel = AtomicBool::new(false);
        let (records, report) = ingest(&[dir.path().to_path_buf()], &config, &archive_path, &[], &cancel).unwrap();

        assert_eq!(report.scanned, 2);
        assert_eq!(report.imported, 2);
        assert!(!report.cancelled);
        assert_eq!(records.len(), 2);
        assert!(!archive_path.with_extension("htm~").exists());
    }

    #[test]
    fn ingest_skip_imported_avoids_reextraction() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.png");
        write_png(&path);

        let mut config = Config::default();
        config.skip_imported = true;
        let archive_path = dir.path().join("archive.htm");
        let existing = vec![Record::new("deadbeefcafebabe").with_attr("pth", path.display().to_string())];

        let cancel = AtomicBool::new(false);
        let (records, report) = ingest(&[dir.path().to_path_buf()], &config, &archive_path, &existing, &cancel).unwrap();
        assert_eq!(report.skipped, 1);
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn ingest_cancelled_before_start_leaves_existing_unmerged() {
        let dir = tempdir().unwrap();
        write_png_colored(&dir.path().join("a.png"), [5, 6, 7]);

        let config = Config::default();
        let archive_path = dir.path().join("archive.htm");
        let existing = vec![Record::new("deadbeefcafebabe").with_attr("pth", "/elsewhere.png")];
        let cancel = AtomicBool::new(true);

        let (records, report) =
            ingest(&[dir.path().to_path_buf()], &config, &archive_path, &existing, &cancel).unwrap();
        assert!(report.cancelled);
        assert_eq!(records.len(), existing.len());
        assert_eq!(records[0].id, "deadbeefcafebabe");
    }
}
