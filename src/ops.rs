//! Catalog operations: the commands the CLI dispatches into.
//!
//! Each operation opens the archive, does its work against the in-memory
//! `Vec<Record>`, and (if it mutated anything) saves once at the end. None of
//! these functions touch stdout directly — they return a report struct that
//! `main` hands to `output` for formatting, so the reports are unit-testable
//! without capturing process output.

use crate::archive::{Archive, ArchiveError, Record};
use crate::config::Config;
use crate::query;
use crate::scheduler::{self, IngestReport};
use crate::template::{self, TemplateError};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OpError {
    #[error(transparent)]
    Archive(#[from] ArchiveError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Query(#[from] query::QueryError),
    #[error(transparent)]
    Template(#[from] TemplateError),
}

/// Walk `roots`, extract metadata, journal, merge, and save. Returns the
/// scheduler's report. If `cancel` fires mid-run, the archive is left
/// untouched (not saved, nothing materialized) and the report comes back
/// with `cancelled: true`.
pub fn add(root: &Path, roots: &[PathBuf], config: &Config, cancel: &AtomicBool) -> Result<IngestReport, OpError> {
    let archive_path = config.db_path(root);
    let mut archive = Archive::open(&archive_path)?;
    let (merged, report) = scheduler::ingest(roots, config, &archive_path, &archive.records, cancel)?;
    if report.cancelled {
        return Ok(report);
    }
    archive.records = merged;
    if config.dry_run {
        log::info!("dry-run: not saving archive or materializing files");
        return Ok(report);
    }
    archive.save(None, &config.sort_by)?;
    if !matches!(config.operation, crate::config::FileOperation::Noop) {
        materialize_all(&archive.records, root, config)?;
    }
    Ok(report)
}

/// Remove records matching `ids` or `query_expr` (at least one must be
/// given), optionally unlinking the underlying files, and save.
pub fn delete(
    root: &Path,
    config: &Config,
    ids: &[String],
    query_expr: Option<&str>,
    unlink: bool,
) -> Result<usize, OpError> {
    let archive_path = config.db_path(root);
    let mut archive = Archive::open(&archive_path)?;

    let paths: Vec<String> = if let Some(expr) = query_expr {
        let query = query::parse(expr)?;
        archive
            .records
            .iter()
            .filter(|r| query.matches(&r.attrs))
            .filter_map(|r| r.get("pth").map(String::from))
            .collect()
    } else {
        archive
            .records
            .iter()
            .filter(|r| ids.contains(&r.id))
            .filter_map(|r| r.get("pth").map(String::from))
            .collect()
    };

    let removed = if let Some(expr) = query_expr {
        archive.remove_matching(expr)?
    } else {
        archive.remove_ids(ids)
    };

    if unlink && !config.dry_run {
        for p in &paths {
            if let Err(err) = std::fs::remove_file(p) {
                log::warn!("failed to unlink {p}: {err}");
            }
        }
    } else if unlink {
        log::info!("dry-run: not unlinking {} file(s)", paths.len());
    }

    if config.dry_run {
        log::info!("dry-run: not saving archive");
        return Ok(removed);
    }
    archive.save(None, &config.sort_by)?;
    Ok(removed)
}

/// Re-derive each matching file's basename from `config.tmpl` and rename it
/// on disk, updating `pth` in the archive. Non-aborting: a single collision
/// or IO error is logged and the next record continues, unless `force`
/// allows silent overwrite.
pub fn rename(root: &Path, config: &Config) -> Result<usize, OpError> {
    let archive_path = config.db_path(root);
    let mut archive = Archive::open(&archive_path)?;
    let tmpl = config.tmpl.as_deref().unwrap_or("{id}");

    let mut renamed = 0;
    for record in &mut archive.records {
        let Some(pth) = record.get("pth").map(String::from) else {
            continue;
        };
        let path = Path::new(&pth);
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            continue;
        };
        let mut fields = record.attrs.clone();
        fields.insert("id".to_string(), record.id.clone());
        let basename = template::render(tmpl, &fields)?;
        let new_path = path.with_file_name(format!("{basename}.{ext}"));
        if new_path == path {
            continue;
        }
        if new_path.exists() && !config.force {
            log::warn!("skipping rename of {pth}: target {} exists", new_path.display());
            continue;
        }
        if config.dry_run {
            log::info!("dry-run: would rename {pth} -> {}", new_path.display());
            renamed += 1;
            continue;
        }
        if let Err(err) = std::fs::rename(path, &new_path) {
            log::error!("rename {pth} -> {}: {err}", new_path.display());
            continue;
        }
        record.attrs.insert("pth".to_string(), new_path.display().to_string());
        renamed += 1;
    }

    if config.dry_run {
        log::info!("dry-run: not saving archive");
        return Ok(renamed);
    }
    archive.save(None, &config.sort_by)?;
    Ok(renamed)
}

/// Copy/move/link every record's source file into `config.output`, sharded
/// by the first `archive_subfolder_len` characters of the target filename.
fn materialize_all(records: &[Record], root: &Path, config: &Config) -> Result<(), OpError> {
    let Some(output) = &config.output else {
        return Ok(());
    };
    for record in records {
        let Some(pth) = record.get("pth") else { continue };
        let src = Path::new(pth);
        let Some(ext) = src.extension().and_then(|e| e.to_str()) else {
            continue;
        };
        let filename = format!("{}.{ext}", record.id);
        let dest = sharded_path(output, &filename, config.archive_subfolder_len);
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        if dest.exists() && !config.force {
            continue;
        }
        if let Err(err) = materialize_one(src, &dest, config) {
            log::error!("materializing {} to {}: {err}", src.display(), dest.display());
        }
    }
    let _ = root;
    Ok(())
}

fn materialize_one(src: &Path, dest: &Path, config: &Config) -> std::io::Result<()> {
    use crate::config::FileOperation;
    match config.operation {
        FileOperation::Noop => Ok(()),
        FileOperation::Copy => std::fs::copy(src, dest).map(|_| ()),
        FileOperation::Move => std::fs::rename(src, dest),
        FileOperation::Link => {
            if dest.exists() {
                std::fs::remove_file(dest)?;
            }
            if config.sym_links {
                #[cfg(unix)]
                return std::os::unix::fs::symlink(src, dest);
                #[cfg(not(unix))]
                return std::fs::copy(src, dest).map(|_| ());
            }
            std::fs::hard_link(src, dest)
        }
    }
}

fn sharded_path(root: &Path, filename: &str, subfolder_len: usize) -> PathBuf {
    if subfolder_len == 0 || filename.len() < subfolder_len {
        return root.join(filename);
    }
    let shard = &filename[..subfolder_len];
    root.join(shard).join(filename)
}

/// Filter records (extension + optional query), inject/strip attributes,
/// and export as JSON, JSONL, or CSV. The attribute schema is the union of
/// every matched record's attributes, with `id`/`pth` pinned first.
pub fn export(root: &Path, config: &Config, format: &str) -> Result<String, OpError> {
    let archive_path = config.db_path(root);
    let archive = Archive::open(&archive_path)?;
    let matched = archive.filter(config.filter.as_deref(), &[], 0)?;

    match format {
        "json" | "jsonl" => {
            let docs: Vec<BTreeMap<&str, &str>> = matched
                .iter()
                .map(|r| {
                    let mut doc: BTreeMap<&str, &str> = BTreeMap::new();
                    doc.insert("id", &r.id);
                    for (k, v) in &r.attrs {
                        doc.insert(k, v);
                    }
                    doc
                })
                .collect();
            if format == "jsonl" {
                let mut out = String::new();
                for doc in &docs {
                    out.push_str(&serde_json::to_string(doc).unwrap_or_default());
                    out.push('\n');
                }
                Ok(out)
            } else {
                Ok(serde_json::to_string_pretty(&docs).unwrap_or_default())
            }
        }
        "csv" => Ok(export_csv(&matched)),
        other => Ok(export_html_gallery(&matched, other)),
    }
}

fn export_csv(records: &[&Record]) -> String {
    let mut columns: Vec<&str> = vec!["id", "pth"];
    for r in records {
        for k in r.attrs.keys() {
            if k != "pth" && !columns.contains(&k.as_str()) {
                columns.push(k);
            }
        }
    }
    let mut out = columns.join(",");
    out.push('\n');
    for r in records {
        let row: Vec<String> = columns
            .iter()
            .map(|c| {
                let v = if *c == "id" { r.id.clone() } else { r.get(c).unwrap_or("").to_string() };
                csv_escape(&v)
            })
            .collect();
        out.push_str(&row.join(","));
        out.push('\n');
    }
    out
}

fn csv_escape(v: &str) -> String {
    if v.contains(',') || v.contains('"') || v.contains('\n') {
        format!("\"{}\"", v.replace('"', "\"\""))
    } else {
        v.to_string()
    }
}

/// Render a standalone filtered gallery document with the matched records'
/// embedded thumbnails, paginated by `config.gallery.wrap_at`. `hint` names
/// the requested export format for callers that expect something other than
/// HTML (currently unsupported, logged and treated as HTML).
fn export_html_gallery(records: &[&Record], hint: &str) -> String {
    if hint != "html" {
        log::warn!("unsupported export format {hint:?}, rendering html");
    }
    let body: String = records
        .iter()
        .map(|r| {
            let src = r.thumb.as_deref().unwrap_or("");
            format!(r#"<figure><img src="{src}" alt="{}"></figure>"#, r.id)
        })
        .collect::<Vec<_>>()
        .join("\n");
    format!("<!DOCTYPE html><html lang=\"en\"><body>\n{body}\n</body></html>")
}

/// Filter, strip/inject attributes, and materialize paginated gallery pages
/// under `output`. Returns the number of pages written.
pub fn gallery(root: &Path, config: &Config, output: &Path) -> Result<usize, OpError> {
    let archive_path = config.db_path(root);
    let archive = Archive::open(&archive_path)?;
    let mut matched: Vec<Record> = archive
        .filter(config.filter.as_deref(), &[], 0)?
        .into_iter()
        .cloned()
        .collect();

    for record in &mut matched {
        for attr in &config.del_attrs {
            record.attrs.remove(attr);
        }
        for attr in &config.add_attrs {
            if let Some((k, v)) = attr.split_once('=') {
                record.attrs.insert(k.to_string(), v.to_string());
            }
        }
    }

    let page_size = if config.gallery.wrap_at == 0 { matched.len().max(1) } else { config.gallery.wrap_at };
    let pages: Vec<&[Record]> = matched.chunks(page_size).collect();
    let total_pages = pages.len().max(1);

    if config.dry_run {
        log::info!("dry-run: not writing {total_pages} gallery page(s) to {}", output.display());
        return Ok(total_pages);
    }

    std::fs::create_dir_all(output)?;
    for (i, page) in pages.iter().enumerate() {
        let refs: Vec<&Record> = page.iter().collect();
        let html = render_gallery_page(&refs, i + 1, total_pages);
        std::fs::write(output.join(format!("page-{}.html", i + 1)), html)?;
    }
    if pages.is_empty() {
        std::fs::write(output.join("page-1.html"), render_gallery_page(&[], 1, 1))?;
    }
    Ok(total_pages)
}

fn render_gallery_page(records: &[&Record], page: usize, total: usize) -> String {
    let body: String = records
        .iter()
        .map(|r| {
            let src = r.thumb.as_deref().unwrap_or("");
            format!(r#"<figure data-id="{}"><img src="{src}"></figure>"#, r.id)
        })
        .collect::<Vec<_>>()
        .join("\n");
    let nav = format!("<nav>page {page} of {total}</nav>");
    format!("<!DOCTYPE html><html lang=\"en\"><body>\n{nav}\n{body}\n</body></html>")
}

/// Materialize a destination path from `config.links` for every matched
/// record, creating parent directories and hard/sym-linking the source file.
/// One failure logs and continues — does not abort the batch.
pub fn links(root: &Path, config: &Config) -> Result<usize, OpError> {
    let archive_path = config.db_path(root);
    let archive = Archive::open(&archive_path)?;
    let matched = archive.filter(config.filter.as_deref(), &[], 0)?;
    let tmpl = config.links.as_deref().unwrap_or("{id}");

    let mut linked = 0;
    for record in matched {
        let Some(pth) = record.get("pth") else { continue };
        let mut fields = record.attrs.clone();
        fields.insert("id".to_string(), record.id.clone());
        let dest_str = template::render(tmpl, &fields)?;
        let dest = PathBuf::from(dest_str);
        if dest.exists() && !config.force {
            log::warn!("skipping link for {pth}: {} exists", dest.display());
            continue;
        }
        if config.dry_run {
            log::info!("dry-run: would link {pth} -> {}", dest.display());
            linked += 1;
            continue;
        }
        if let Some(parent) = dest.parent()
            && let Err(err) = std::fs::create_dir_all(parent) {
                log::error!("creating {}: {err}", parent.display());
                continue;
            }
        if dest.exists() {
            std::fs::remove_file(&dest).ok();
        }
        let result = if config.sym_links {
            #[cfg(unix)]
            { std::os::unix::fs::symlink(pth, &dest) }
            #[cfg(not(unix))]
            { std::fs::hard_link(pth, &dest) }
        } else {
            std::fs::hard_link(pth, &dest)
        };
        match result {
            Ok(()) => linked += 1,
            Err(err) => log::error!("linking {pth} -> {}: {err}", dest.display()),
        }
    }
    Ok(linked)
}

/// Summary report for the `info` command.
pub struct InfoReport {
    pub record_count: usize,
    pub total_bytes: u64,
    pub date_range: Option<(String, String)>,
    pub maker_models: Vec<(String, usize)>,
}

/// Summarize the archive: record count, total bytes, date span, and a
/// maker-model histogram sorted by descending frequency.
pub fn info(root: &Path, config: &Config) -> Result<InfoReport, OpError> {
    let archive_path = config.db_path(root);
    let archive = Archive::open(&archive_path)?;

    let total_bytes: u64 = archive.records.iter().filter_map(|r| r.get("bytes")?.parse::<u64>().ok()).sum();

    let mut dates: Vec<&str> = archive.records.iter().filter_map(|r| r.get("date")).filter(|d| !d.is_empty()).collect();
    dates.sort_unstable();
    let date_range = match (dates.first(), dates.last()) {
        (Some(a), Some(b)) => Some((a.to_string(), b.to_string())),
        _ => None,
    };

    let mut histogram: BTreeMap<String, usize> = BTreeMap::new();
    for record in &archive.records {
        let mm = record.get("maker-model").unwrap_or("");
        if !mm.is_empty() {
            *histogram.entry(mm.to_string()).or_insert(0) += 1;
        }
    }
    let mut maker_models: Vec<(String, usize)> = histogram.into_iter().collect();
    maker_models.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    Ok(InfoReport {
        record_count: archive.records.len(),
        total_bytes,
        date_range,
        maker_models,
    })
}

/// Reconcile the archive against what's actually on disk under `roots`:
/// purge records whose `pth` no longer resolves to a file, and report files
/// present on disk that the archive doesn't know about yet (without
/// importing them — that's `add`'s job). Saves if anything was purged.
pub fn db_sync(root: &Path, roots: &[PathBuf], config: &Config) -> Result<(usize, usize, usize), OpError> {
    let archive_path = config.db_path(root);
    let mut archive = Archive::open(&archive_path)?;
    let files_on_disk = scheduler::walk(roots, config);
    let result = archive.sync_folders(&files_on_disk);
    if config.dry_run {
        log::info!("dry-run: not saving archive");
        return Ok(result);
    }
    archive.save(None, &config.sort_by)?;
    Ok(result)
}

/// Split the archive by a query expression, reporting how many records
/// match versus don't. Read-only — does not mutate or save.
pub fn db_split(root: &Path, config: &Config, query_expr: &str) -> Result<(usize, usize), OpError> {
    let archive_path = config.db_path(root);
    let archive = Archive::open(&archive_path)?;
    let query = query::parse(query_expr)?;
    let (matching, not_matching): (Vec<_>, Vec<_>) =
        archive.records.iter().partition(|r| query.matches(&r.attrs));
    Ok((matching.len(), not_matching.len()))
}

/// Merge one or more sibling archive documents into the root's archive
/// (newer wins on non-blank attributes, matching [`Archive::merge_in`]),
/// then save. Returns the resulting record count.
pub fn db_merge(root: &Path, config: &Config, other_archives: &[PathBuf]) -> Result<usize, OpError> {
    let archive_path = config.db_path(root);
    let mut archive = Archive::open(&archive_path)?;
    let mut streams = Vec::with_capacity(other_archives.len());
    for path in other_archives {
        streams.push(Archive::open(path)?.records);
    }
    archive.merge_in(streams);
    if config.dry_run {
        log::info!("dry-run: not saving archive");
        return Ok(archive.records.len());
    }
    archive.save(None, &config.sort_by)?;
    Ok(archive.records.len())
}

/// Describe the (unimplemented) HTTP server contract: what it would expose
/// over the archive at `root`, without starting a network listener.
pub fn server_contract(root: &Path, config: &Config) -> String {
    let archive_path = config.db_path(root);
    format!(
        "server: would expose query/export/gallery endpoints over {} \
         (GET /records?filter=<expr>, GET /records/{{id}}/thumb, GET /export?format=<fmt>); \
         not implemented in this build",
        archive_path.display()
    )
}
