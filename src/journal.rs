//! Crash-safe journal: a sibling append-only file used during ingestion.
//!
//! Ingestion never mutates the in-memory archive directly; every extracted
//! record is appended here first, and only the final merge reconciles the
//! journal with the archive. Filename is the archive's filename suffixed
//! with `~`. Every append is a complete, newline-terminated record, so a
//! crash mid-run never leaves a half-written entry for the next run to choke
//! on.

use crate::archive::Record;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum JournalError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Derive the journal path for a given archive path: same filename, `~` appended.
pub fn journal_path(archive_path: &Path) -> PathBuf {
    let mut name = archive_path.as_os_str().to_os_string();
    name.push("~");
    PathBuf::from(name)
}

/// An append-only, writer-locked journal file.
pub struct Journal {
    path: PathBuf,
    file: Mutex<File>,
}

impl Journal {
    pub fn open(archive_path: &Path) -> Result<Self, JournalError> {
        let path = journal_path(archive_path);
        let file = OpenOptions::new().create(true).append(true).read(true).open(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    /// Append one record as a single line. Safe to call concurrently.
    pub fn append(&self, record: &Record) -> Result<(), JournalError> {
        let line = serialize(record);
        let mut file = self.file.lock().unwrap();
        file.write_all(line.as_bytes())?;
        file.write_all(b"\n")?;
        file.flush()?;
        Ok(())
    }

    /// Read every record currently on disk.
    pub fn read_all(&self) -> Result<Vec<Record>, JournalError> {
        read_all(&self.path)
    }

    /// Delete the journal file after a successful merge.
    pub fn delete(self) -> Result<(), JournalError> {
        if self.path.exists() {
            std::fs::remove_file(&self.path)?;
        }
        Ok(())
    }
}

fn read_all(path: &Path) -> Result<Vec<Record>, JournalError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let mut out = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        if let Some(record) = deserialize(&line) {
            out.push(record);
        }
    }
    Ok(out)
}

/// Tab-delimited `id\tkey=value\tkey=value...` line format — simple to append
/// and to parse back a line at a time, independent of the archive's own
/// (HTML-flavored) record format.
fn serialize(record: &Record) -> String {
    let mut parts = vec![record.id.clone()];
    for (k, v) in &record.attrs {
        parts.push(format!("{k}={}", v.replace(['\t', '\n'], " ")));
    }
    if let Some(thumb) = &record.thumb {
        parts.push(format!("__thumb={thumb}"));
    }
    parts.join("\t")
}

fn deserialize(line: &str) -> Option<Record> {
    let mut parts = line.split('\t');
    let id = parts.next()?.to_string();
    if id.is_empty() {
        return None;
    }
    let mut record = Record::new(id);
    for part in parts {
        if let Some((k, v)) = part.split_once('=') {
            if k == "__thumb" {
                record.thumb = Some(v.to_string());
            } else {
                record.attrs.insert(k.to_string(), v.to_string());
            }
        }
    }
    Some(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn journal_path_appends_tilde() {
        let p = journal_path(Path::new("/photos/archive.htm"));
        assert_eq!(p, Path::new("/photos/archive.htm~"));
    }

    #[test]
    fn append_then_read_all_round_trips() {
        let dir = tempdir().unwrap();
        let archive_path = dir.path().join("archive.htm");
        let journal = Journal::open(&archive_path).unwrap();
        journal
            .append(&Record::new("abcdef01").with_attr("pth", "/a.jpg"))
            .unwrap();
        journal
            .append(&Record::new("bcdefa02").with_attr("pth", "/b.jpg"))
            .unwrap();

        let records = journal.read_all().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, "abcdef01");
        assert_eq!(records[0].get("pth"), Some("/a.jpg"));
    }

    #[test]
    fn delete_removes_the_file() {
        let dir = tempdir().unwrap();
        let archive_path = dir.path().join("archive.htm");
        let journal = Journal::open(&archive_path).unwrap();
        journal.append(&Record::new("abcdef01")).unwrap();
        let path = journal_path(&archive_path);
        assert!(path.exists());
        journal.delete().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn read_all_on_missing_journal_is_empty() {
        let dir = tempdir().unwrap();
        let records = read_all(&dir.path().join("nope.htm~")).unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn serialize_round_trips_thumb() {
        let mut record = Record::new("abcdef01");
        record.thumb = Some("data:image/jpeg;base64,AAAA".to_string());
        let line = serialize(&record);
        let parsed = deserialize(&line).unwrap();
        assert_eq!(parsed.thumb.as_deref(), Some("data:image/jpeg;base64,AAAA"));
    }
}
