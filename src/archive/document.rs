//! The archive document: a self-contained catalog that is both database and
//! viewable gallery.
//!
//! Covers `open`/`save`/`filter`/`rem_elem`/
//! `sync_folders`. The in-memory representation is an owned `Vec<Record>`, so
//! multiple readers can safely hold independent copies; ingestion never
//! mutates this structure directly (it appends to the journal instead, see
//! `journal.rs`), and only the final merge reconciles.

use super::merge;
use super::parse::{parse_head_meta, parse_records, rescue_records};
use super::record::Record;
use crate::query::{self, Query};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("query error: {0}")]
    Query(#[from] crate::query::QueryError),
}

/// An in-memory, owned snapshot of an archive document.
#[derive(Debug, Clone, Default)]
pub struct Archive {
    pub path: PathBuf,
    pub head: BTreeMap<String, String>,
    pub records: Vec<Record>,
}

impl Archive {
    /// Start a brand-new, empty archive bound to `path` (not yet on disk).
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let mut head = BTreeMap::new();
        head.insert("date-created".to_string(), now_minute());
        Self {
            path: path.into(),
            head,
            records: Vec::new(),
        }
    }

    /// Open an existing archive file. Invalid records (see
    /// [`Record::is_valid`]) are silently discarded, logged as a warning.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, ArchiveError> {
        let path = path.into();
        if !path.exists() {
            return Ok(Self::new(path));
        }
        let html = fs::read_to_string(&path)?;
        let mut head = parse_head_meta(&html);
        head.entry("date-created".to_string()).or_insert_with(now_minute);

        let mut records = Vec::new();
        for record in parse_records(&html) {
            if record.is_valid() {
                records.push(record);
            } else {
                log::warn!("invalid record in archive, discarding: id={:?}", record.id);
            }
        }
        Ok(Self { path, head, records })
    }

    /// Re-scan the document line-by-line, recovering any record-shaped
    /// fragment. Only invoked on demand when a full parse is suspected corrupt.
    pub fn rescue(path: impl Into<PathBuf>) -> Result<Self, ArchiveError> {
        let path = path.into();
        let html = fs::read_to_string(&path)?;
        let head = parse_head_meta(&html);
        let records = rescue_records(&html)
            .into_iter()
            .filter(Record::is_valid)
            .collect();
        Ok(Self { path, head, records })
    }

    /// Merge another set of record streams into this archive (newer wins).
    pub fn merge_in(&mut self, streams: impl IntoIterator<Item = Vec<Record>>) {
        let mut all = vec![std::mem::take(&mut self.records)];
        all.extend(streams);
        self.records = merge::merge(all);
    }

    /// Render and write the archive to `path` (or `self.path` if `None`),
    /// sorted descending by `sort_by`, ties broken by id. Written atomically
    /// via a temp sibling + rename.
    pub fn save(&mut self, path: Option<&Path>, sort_by: &str) -> Result<(), ArchiveError> {
        let target = path.unwrap_or(&self.path).to_path_buf();
        self.head.insert("date-updated".to_string(), now_minute());

        let mut records = self.records.clone();
        records.sort_by_key(|r| std::cmp::Reverse(r.sort_key(sort_by)));

        let html = render_document(&self.head, &records);
        let tmp = target.with_extension("tmp");
        fs::write(&tmp, &html)?;
        fs::rename(&tmp, &target)?;
        log::debug!("saved {} records, {} KB", records.len(), html.len() / 1024);
        Ok(())
    }

    /// Filter records by extension list and an optional query expression.
    pub fn filter(&self, query_expr: Option<&str>, exts: &[String], limit: usize) -> Result<Vec<&Record>, ArchiveError> {
        let query: Option<Query> = query_expr.map(query::parse).transpose()?;
        let mut out = Vec::new();
        for record in &self.records {
            if !exts.is_empty() {
                let ext = record
                    .get("pth")
                    .and_then(|p| Path::new(p).extension())
                    .and_then(|e| e.to_str())
                    .map(|e| e.to_lowercase())
                    .unwrap_or_default();
                if !exts.iter().any(|e| e.trim_start_matches('.') == ext) {
                    continue;
                }
            }
            if let Some(q) = &query
                && !q.matches(&record.attrs) {
                    continue;
                }
            out.push(record);
            if limit > 0 && out.len() >= limit {
                break;
            }
        }
        Ok(out)
    }

    /// Remove all records matching `query_expr`. Returns the number removed.
    /// Does not save to disk.
    pub fn remove_matching(&mut self, query_expr: &str) -> Result<usize, ArchiveError> {
        let query = query::parse(query_expr)?;
        let before = self.records.len();
        self.records.retain(|r| !query.matches(&r.attrs));
        Ok(before - self.records.len())
    }

    /// Remove records by explicit id.
    pub fn remove_ids(&mut self, ids: &[String]) -> usize {
        let before = self.records.len();
        self.records.retain(|r| !ids.contains(&r.id));
        before - self.records.len()
    }

    /// Sync against folders: mark+purge broken paths (file no longer exists),
    /// report (but don't auto-import) files on disk not present in the
    /// archive. Returns (working, broken, not_imported).
    pub fn sync_folders(&mut self, files_on_disk: &[PathBuf]) -> (usize, usize, usize) {
        let mut working = Vec::new();
        let mut broken = 0;
        self.records.retain(|r| {
            let pth = r.get("pth").unwrap_or_default();
            if Path::new(pth).is_file() {
                working.push(pth.to_string());
                true
            } else {
                log::warn!("path {pth} is broken, purging from archive");
                broken += 1;
                false
            }
        });
        let not_imported = files_on_disk
            .iter()
            .filter(|p| !working.iter().any(|w| Path::new(w) == p.as_path()))
            .count();
        (working.len(), broken, not_imported)
    }
}

fn render_document(head: &BTreeMap<String, String>, records: &[Record]) -> String {
    let meta_tags: String = head
        .iter()
        .map(|(k, v)| format!(r#"<meta name="{}" content="{}">"#, escape(k), escape(v)))
        .collect::<Vec<_>>()
        .join("\n");
    let head_block = format!(
        "<head>\n<meta charset=\"utf-8\">\n<meta name=\"robots\" content=\"noindex, nofollow\">\n<meta name=\"application-name\" content=\"img-DB\">\n<meta name=\"generator\" content=\"imgdb v1.0\">\n{meta_tags}\n</head>"
    );
    let body: String = records.iter().map(render_record).collect::<Vec<_>>().join("\n");
    format!("<!DOCTYPE html><html lang=\"en\">\n{head_block}\n<body>\n{body}\n</body></html>")
}

fn render_record(record: &Record) -> String {
    let mut attrs = format!(r#"id="{}""#, escape(&record.id));
    for (k, v) in &record.attrs {
        attrs.push_str(&format!(r#" data-{}="{}""#, k, escape(v)));
    }
    if let Some(thumb) = &record.thumb {
        attrs.push_str(&format!(r#" src="{}""#, escape(thumb)));
    }
    format!("<img {attrs}>")
}

fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn now_minute() -> String {
    crate::metadata::now_iso_minute()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample_record(id: &str, date: &str) -> Record {
        Record::new(id)
            .with_attr("pth", "/a.jpg")
            .with_attr("bytes", "100")
            .with_attr("mode", "RGB")
            .with_attr("format", "JPEG")
            .with_attr("date", date)
    }

    #[test]
    fn new_archive_has_date_created() {
        let archive = Archive::new("/tmp/x.htm");
        assert!(archive.head.contains_key("date-created"));
    }

    #[test]
    fn open_missing_file_returns_empty_archive() {
        let dir = tempdir().unwrap();
        let archive = Archive::open(dir.path().join("archive.htm")).unwrap();
        assert!(archive.records.is_empty());
    }

    #[test]
    fn save_then_open_round_trips_records() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("archive.htm");
        let mut archive = Archive::new(&path);
        archive.records.push(sample_record("abcdef01", "2024-01-01T00:00:00"));
        archive.save(None, "date").unwrap();

        let reopened = Archive::open(&path).unwrap();
        assert_eq!(reopened.records.len(), 1);
        assert_eq!(reopened.records[0].id, "abcdef01");
    }

    #[test]
    fn save_sorts_descending_by_attribute() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("archive.htm");
        let mut archive = Archive::new(&path);
        archive.records.push(sample_record("a1111111", "2020-01-01T00:00:00"));
        archive.records.push(sample_record("b2222222", "2024-01-01T00:00:00"));
        archive.save(None, "date").unwrap();

        let reopened = Archive::open(&path).unwrap();
        assert_eq!(reopened.records[0].id, "b2222222");
        assert_eq!(reopened.records[1].id, "a1111111");
    }

    #[test]
    fn invalid_records_are_discarded_on_open() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("archive.htm");
        fs::write(&path, r#"<html><body><img id="abcdef01" data-pth="/a.jpg"></body></html>"#).unwrap();
        let archive = Archive::open(&path).unwrap();
        assert!(archive.records.is_empty());
    }

    #[test]
    fn filter_by_extension() {
        let mut archive = Archive::new("/tmp/x.htm");
        archive.records.push(
            Record::new("a1111111")
                .with_attr("pth", "/a.jpg")
                .with_attr("format", "JPEG"),
        );
        archive.records.push(
            Record::new("b2222222")
                .with_attr("pth", "/b.png")
                .with_attr("format", "PNG"),
        );
        let filtered = archive.filter(None, &["jpg".to_string()], 0).unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].id, "a1111111");
    }

    #[test]
    fn remove_matching_deletes_records() {
        let mut archive = Archive::new("/tmp/x.htm");
        archive.records.push(Record::new("a1111111").with_attr("width", "5"));
        archive.records.push(Record::new("b2222222").with_attr("width", "1"));
        let removed = archive.remove_matching("width > 3").unwrap();
        assert_eq!(removed, 1);
        assert_eq!(archive.records.len(), 1);
        assert_eq!(archive.records[0].id, "b2222222");
    }

    #[test]
    fn remove_ids_deletes_by_id() {
        let mut archive = Archive::new("/tmp/x.htm");
        archive.records.push(Record::new("a1111111"));
        archive.records.push(Record::new("b2222222"));
        let removed = archive.remove_ids(&["a1111111".to_string()]);
        assert_eq!(removed, 1);
        assert_eq!(archive.records.len(), 1);
    }

    #[test]
    fn sync_folders_purges_broken_paths() {
        let mut archive = Archive::new("/tmp/x.htm");
        archive.records.push(Record::new("a1111111").with_attr("pth", "/does/not/exist.jpg"));
        let (working, broken, not_imported) = archive.sync_folders(&[]);
        assert_eq!(working, 0);
        assert_eq!(broken, 1);
        assert_eq!(not_imported, 0);
        assert!(archive.records.is_empty());
    }

    #[test]
    fn merge_in_combines_with_existing_records() {
        let mut archive = Archive::new("/tmp/x.htm");
        archive.records.push(Record::new("a1111111").with_attr("rating", "1"));
        archive.merge_in([vec![Record::new("a1111111").with_attr("rating", "5")]]);
        assert_eq!(archive.records[0].get("rating"), Some("5"));
    }
}
