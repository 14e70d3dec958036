//! The `Record` type: one catalog entry's attribute map.
//!
//! Mirrors the original's `<img id="..." data-*="...">` element: a stable
//! `id` plus an ordered bag of attributes, stored here without the `data-`
//! prefix (added back only when rendering to the archive document format).

use std::collections::BTreeMap;

/// A single catalog entry.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Record {
    pub id: String,
    pub attrs: BTreeMap<String, String>,
    /// Base-64 embedded thumbnail, kept separate from `attrs` since it is
    /// binary-ish payload rather than a queryable attribute.
    pub thumb: Option<String>,
}

impl Record {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            attrs: BTreeMap::new(),
            thumb: None,
        }
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.attrs.get(key).map(String::as_str)
    }

    /// Mirrors `_is_valid_img`: id/path must be non-trivial, bytes/mode/format
    /// must be present and non-blank.
    pub fn is_valid(&self) -> bool {
        self.id.len() > 3
            && self.get("pth").map(|v| v.len() > 3).unwrap_or(false)
            && self.get("bytes").map(|v| !v.is_empty()).unwrap_or(false)
            && self.get("mode").map(|v| !v.is_empty()).unwrap_or(false)
            && self.get("format").map(|v| !v.is_empty()).unwrap_or(false)
    }

    /// The sort key used when saving the archive: the named attribute if
    /// present and non-blank, otherwise `"00" + id` — matches `ImgDB.save`'s
    /// sort lambda exactly so re-saves don't needlessly reorder records.
    pub fn sort_key(&self, sort_by: &str) -> String {
        match self.get(sort_by) {
            Some(v) if !v.is_empty() => v.to_string(),
            _ => format!("00{}", self.id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_record_passes() {
        let r = Record::new("abcdef")
            .with_attr("pth", "/photos/a.jpg")
            .with_attr("bytes", "1024")
            .with_attr("mode", "RGB")
            .with_attr("format", "JPEG");
        assert!(r.is_valid());
    }

    #[test]
    fn short_id_is_invalid() {
        let r = Record::new("abc")
            .with_attr("pth", "/photos/a.jpg")
            .with_attr("bytes", "1024")
            .with_attr("mode", "RGB")
            .with_attr("format", "JPEG");
        assert!(!r.is_valid());
    }

    #[test]
    fn missing_format_is_invalid() {
        let r = Record::new("abcdef")
            .with_attr("pth", "/photos/a.jpg")
            .with_attr("bytes", "1024")
            .with_attr("mode", "RGB");
        assert!(!r.is_valid());
    }

    #[test]
    fn sort_key_uses_attribute_when_present() {
        let r = Record::new("abcdef").with_attr("date", "2024-01-01T00:00:00");
        assert_eq!(r.sort_key("date"), "2024-01-01T00:00:00");
    }

    #[test]
    fn sort_key_falls_back_to_zero_padded_id() {
        let r = Record::new("abcdef");
        assert_eq!(r.sort_key("date"), "00abcdef");
    }

    #[test]
    fn sort_key_falls_back_when_attribute_blank() {
        let r = Record::new("abcdef").with_attr("date", "");
        assert_eq!(r.sort_key("date"), "00abcdef");
    }
}
