//! Permissive, streaming tag tokenizer for the archive document format.
//!
//! The archive is deliberately not parsed as a full DOM:
//! records are self-contained `<img ...>` tags, so a single regex scan over
//! `key="value"` attribute pairs inside each tag is enough, and is resilient
//! to surrounding markup this tool doesn't care about (it never needs to
//! round-trip arbitrary HTML, only its own tags).

use super::record::Record;
use regex::Regex;
use std::sync::OnceLock;

fn img_tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<img\b([^>]*)>").unwrap())
}

fn attr_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"([a-zA-Z_:][a-zA-Z0-9_:.-]*)\s*=\s*"([^"]*)""#).unwrap())
}

fn meta_tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<meta\b([^>]*)>").unwrap())
}

/// Parse every `<img ...>` tag in `html` into a [`Record`]. Records that fail
/// [`Record::is_valid`] are not filtered here — that is the caller's job, so
/// it can log which ones it dropped.
pub fn parse_records(html: &str) -> Vec<Record> {
    img_tag_re()
        .captures_iter(html)
        .filter_map(|caps| record_from_attrs(&caps[1]))
        .collect()
}

fn record_from_attrs(attr_blob: &str) -> Option<Record> {
    let mut id = None;
    let mut thumb = None;
    let mut attrs = std::collections::BTreeMap::new();
    for caps in attr_re().captures_iter(attr_blob) {
        let key = &caps[1];
        let value = html_unescape(&caps[2]);
        if key == "id" {
            id = Some(value);
        } else if key == "src" {
            thumb = Some(value);
        } else if let Some(name) = key.strip_prefix("data-") {
            attrs.insert(name.to_string(), value);
        }
    }
    let id = id?;
    Some(Record { id, attrs, thumb })
}

/// Extract head `<meta name="..." content="...">` tags into a key/value map.
pub fn parse_head_meta(html: &str) -> std::collections::BTreeMap<String, String> {
    let head_end = html.find("<body").unwrap_or(html.len());
    let head = &html[..head_end];
    let mut meta = std::collections::BTreeMap::new();
    for caps in meta_tag_re().captures_iter(head) {
        let attr_blob = &caps[1];
        let mut name = None;
        let mut content = None;
        for attr_caps in attr_re().captures_iter(attr_blob) {
            match &attr_caps[1] {
                "name" => name = Some(attr_caps[2].to_string()),
                "content" => content = Some(html_unescape(&attr_caps[2])),
                _ => {}
            }
        }
        if let (Some(name), Some(content)) = (name, content) {
            meta.insert(name, content);
        }
    }
    meta
}

/// Rescue path: when parsing the whole document fails (or is suspected
/// corrupt), re-scan line by line, keeping any line that looks like a record
/// fragment, and deduplicate by id. Only invoked on demand.
pub fn rescue_records(html: &str) -> Vec<Record> {
    let mut seen = std::collections::BTreeSet::new();
    let mut out = Vec::new();
    for line in html.lines() {
        if !line.contains("<img") {
            continue;
        }
        for record in parse_records(line) {
            if seen.insert(record.id.clone()) {
                out.push(record);
            }
        }
    }
    out
}

fn html_unescape(s: &str) -> String {
    s.replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}
