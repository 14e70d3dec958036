//! The per-image meta extractor.
//!
//! Decodes an image, pulls EXIF/XMP tags into a flat dictionary, derives the
//! canonical fields (date, maker-model, and any configured optional fields),
//! evaluates a configured filter, builds the thumbnail set, runs the
//! configured hashes and algorithms, and finally derives `id` by rendering
//! the configured template. One call produces one [`crate::archive::Record`].

use crate::archive::Record;
use crate::color;
use crate::config::Config;
use crate::hash::crypto::{self, CryptoHash};
use crate::hash::perceptual;
use crate::imaging::{self, DecodeError};
use crate::query;
use crate::template;
use chrono::{Local, TimeZone};
use exif::In;
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MetadataError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Query(#[from] query::QueryError),
    #[error(transparent)]
    Template(#[from] template::TemplateError),
}

const EXIF_DATE_FMT: &str = "%Y:%m:%d %H:%M:%S";

/// Extract one image file into a meta record. `Ok(None)` means decoding
/// genuinely failed (already logged); a configured filter miss still returns
/// a record, just with an empty `id` so the caller can drop it.
pub fn extract(path: &Path, config: &Config) -> Result<Option<Record>, MetadataError> {
    let decoded = match imaging::decode(path) {
        Ok(d) => d,
        Err(err) => {
            log::warn!("decode error for {}: {err}", path.display());
            return Ok(None);
        }
    };

    let tags = read_exif_xmp(path);
    let bytes = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
    let (width, height) = (decoded.image.width(), decoded.image.height());

    let mut fields: BTreeMap<String, String> = BTreeMap::new();
    fields.insert("pth".to_string(), path.display().to_string());
    fields.insert("format".to_string(), decoded.format.clone());
    fields.insert("mode".to_string(), decoded.mode.clone());
    fields.insert("width".to_string(), width.to_string());
    fields.insert("height".to_string(), height.to_string());
    fields.insert("bytes".to_string(), bytes.to_string());
    fields.insert("date".to_string(), derive_date(&tags, path));
    fields.insert(
        "maker-model".to_string(),
        derive_maker_model(tags.get("Make"), tags.get("Model")),
    );

    for field in config.metadata_fields() {
        if let Some(value) = derive_extra_field(&field, &tags) {
            fields.insert(field, value);
        }
    }

    if let Some(expr) = &config.filter {
        let query = query::parse(expr)?;
        if !query.matches(&fields) {
            return Ok(Some(Record::new(String::new())));
        }
    }

    let thumb64 = imaging::square_thumbnail(&decoded.image, 64);
    let thumb256 = imaging::square_thumbnail(&decoded.image, 256);

    for algo in config.algorithms() {
        let value = match algo.as_str() {
            "illumination" => format!("{:.1}", color::illumination(&thumb64)),
            "saturation" => format!("{:.1}", color::saturation(&thumb64)),
            "contrast" => format!("{:.1}", color::contrast(&thumb256)),
            "top-colors" => color::top_colors(&thumb256, config.top_colors.cut).join(","),
            other => {
                log::warn!("unknown algorithm {other:?}, skipping");
                continue;
            }
        };
        fields.insert(algo, value);
    }

    for name in config.v_hashes() {
        let value = match name.as_str() {
            "ahash" => perceptual::average_hash(&thumb64, 8),
            "dhash" => perceptual::diff_hash_horizontal(&thumb64, 8),
            "dhash-vert" => perceptual::diff_hash_vertical(&thumb64, 8),
            "combined" => perceptual::combined_hash(&thumb64, 8),
            "row-col" => perceptual::row_column_hash(&thumb64, 8),
            "blurhash" => match perceptual::blur_hash(&thumb256, 4, 4) {
                Ok(v) => v,
                Err(err) => {
                    log::warn!("blurhash failed for {}: {err}", path.display());
                    continue;
                }
            },
            other => {
                log::warn!("unknown perceptual hash {other:?}, skipping");
                continue;
            }
        };
        fields.insert(name, value);
    }

    let pixel_bytes = decoded.image.to_rgb8().into_raw();
    for name in config.c_hashes() {
        let Ok(algo) = CryptoHash::parse(&name) else {
            log::warn!("unknown crypto hash {name:?}, skipping");
            continue;
        };
        match crypto::pixel_digest(&pixel_bytes, algo, config.hashing.digest_size) {
            Ok(digest) => {
                fields.insert(name, digest);
            }
            Err(err) => log::warn!("hashing error for {}: {err}", path.display()),
        }
    }
    if let Ok(file_hash) = crypto::file_sha256(path) {
        fields.insert("file-sha256".to_string(), file_hash);
    }

    let id = template::render(&config.id_template, &fields)?;

    let mut record = Record::new(id);
    record.attrs = fields;

    let user_thumb = imaging::square_thumbnail(&decoded.image, config.thumbnails.thumb_sz);
    match imaging::encode_thumbnail(&user_thumb, &config.thumbnails.thumb_type, config.thumbnails.thumb_qual) {
        Ok((bytes, mime)) => {
            record.thumb = Some(format!("data:{mime};base64,{}", base64_encode(&bytes)));
        }
        Err(err) => log::warn!("thumbnail encode failed for {}: {err}", path.display()),
    }

    Ok(Some(record))
}

fn base64_encode(bytes: &[u8]) -> String {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

/// A flat EXIF ∪ XMP tag dictionary, keyed by human tag name. EXIF wins when
/// both provide the same conceptual tag.
fn read_exif_xmp(path: &Path) -> BTreeMap<String, String> {
    let mut tags = BTreeMap::new();
    if let Ok(file) = std::fs::File::open(path) {
        let mut reader = std::io::BufReader::new(&file);
        if let Ok(exif) = exif::Reader::new().read_from_container(&mut reader) {
            for field in exif.fields() {
                if field.ifd_num == In::PRIMARY {
                    tags.insert(
                        format!("{}", field.tag),
                        field.display_value().with_unit(&exif).to_string(),
                    );
                }
            }
        }
    }
    for (k, v) in read_xmp(path) {
        tags.entry(k).or_insert(v);
    }
    tags
}

/// Pull a handful of XMP create/metadata-date tags out of an embedded XMP
/// packet, if present. JPEG/TIFF don't guarantee one; absence is normal.
fn read_xmp(path: &Path) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    let Ok(bytes) = std::fs::read(path) else {
        return out;
    };
    let Some(start) = find_subslice(&bytes, b"<x:xmpmeta") else {
        return out;
    };
    let Some(end_rel) = find_subslice(&bytes[start..], b"</x:xmpmeta>") else {
        return out;
    };
    let packet = &bytes[start..start + end_rel + "</x:xmpmeta>".len()];
    let Ok(xml) = std::str::from_utf8(packet) else {
        return out;
    };
    let mut reader = quick_xml::Reader::from_str(xml);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Empty(ref e)) | Ok(quick_xml::events::Event::Start(ref e)) => {
                for attr in e.attributes().flatten() {
                    let key = String::from_utf8_lossy(attr.key.as_ref()).to_string();
                    if let Some(name) = key.strip_prefix("xmp:")
                        && (name == "CreateDate" || name == "MetadataDate") {
                            let value = attr.unescape_value().unwrap_or_default().to_string();
                            out.insert(format!("XMP:{name}"), value);
                        }
                }
            }
            Ok(quick_xml::events::Event::Eof) | Err(_) => break,
            _ => {}
        }
        buf.clear();
    }
    out
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Derive `date` as a fixed-format ISO string: first non-empty of EXIF
/// DateTimeOriginal/DateTimeDigitized/DateTime, then XMP create/metadata
/// dates, then the earlier of filesystem mtime/ctime.
fn derive_date(tags: &BTreeMap<String, String>, path: &Path) -> String {
    for key in ["DateTimeOriginal", "DateTimeDigitized", "DateTime"] {
        if let Some(raw) = tags.get(key)
            && let Some(iso) = parse_exif_datetime(raw) {
                return iso;
            }
    }
    for key in ["XMP:CreateDate", "XMP:MetadataDate"] {
        if let Some(raw) = tags.get(key)
            && let Ok(dt) = chrono::DateTime::parse_from_rfc3339(raw) {
                return dt.format("%Y-%m-%dT%H:%M:%S").to_string();
            }
    }
    fs_date(path)
}

fn parse_exif_datetime(raw: &str) -> Option<String> {
    chrono::NaiveDateTime::parse_from_str(raw.trim(), EXIF_DATE_FMT)
        .ok()
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%S").to_string())
}

fn fs_date(path: &Path) -> String {
    let meta = match std::fs::metadata(path) {
        Ok(m) => m,
        Err(_) => return String::new(),
    };
    let mtime = meta.modified().ok();
    let ctime = meta.created().ok();
    let earliest = match (mtime, ctime) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (Some(a), None) => Some(a),
        (None, Some(b)) => Some(b),
        (None, None) => None,
    };
    earliest
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .and_then(|d| Local.timestamp_opt(d.as_secs() as i64, 0).single())
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%S").to_string())
        .unwrap_or_default()
}

/// Normalize `Make`/`Model` into a single token: strip punctuation/NULs,
/// replace spaces with hyphens, drop a manufacturer prefix duplicated in the
/// model, canonicalize a handful of known vendors, and treat the literal
/// "Unknown" as absent.
pub fn derive_maker_model(make: Option<&String>, model: Option<&String>) -> String {
    let make = normalize_token(make.map(String::as_str).unwrap_or(""));
    let model = normalize_token(model.map(String::as_str).unwrap_or(""));
    let make = canonicalize_vendor(&make);

    if make.eq_ignore_ascii_case("unknown") || make.is_empty() {
        if model.eq_ignore_ascii_case("unknown") || model.is_empty() {
            return String::new();
        }
        return model;
    }
    if model.eq_ignore_ascii_case("unknown") || model.is_empty() {
        return make;
    }

    let model = if model.to_lowercase().starts_with(&make.to_lowercase()) {
        model[make.len()..].trim_start_matches('-').to_string()
    } else {
        model
    };

    if model.is_empty() {
        make
    } else {
        format!("{make}-{model}")
    }
}

fn normalize_token(raw: &str) -> String {
    raw.chars()
        .filter(|c| *c != '\0')
        .map(|c| if c.is_ascii_punctuation() && c != '-' { ' ' } else { c })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
}

fn canonicalize_vendor(make: &str) -> String {
    let lower = make.to_lowercase();
    let stripped = lower
        .trim_end_matches("-corporation")
        .trim_end_matches("-company")
        .trim_end_matches("-corp");
    match stripped {
        s if s.starts_with("olympus") => "Olympus".to_string(),
        s if s.starts_with("sanyo") => "Sanyo".to_string(),
        s if s.starts_with("eastman-kodak") || s.starts_with("kodak") => "Kodak".to_string(),
        s if s.starts_with("samsung") => "Samsung".to_string(),
        _ => title_case(stripped),
    }
}

fn title_case(s: &str) -> String {
    s.split('-')
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join("-")
}

fn derive_extra_field(field: &str, tags: &BTreeMap<String, String>) -> Option<String> {
    match field {
        "aperture" => tags.get("FNumber").and_then(|v| parse_rational_prefix(v)).map(|f| format!("f/{:.1}", f)),
        "shutter-speed" => derive_shutter_speed(tags),
        "focal-length" => tags
            .get("FocalLength")
            .and_then(|v| parse_rational_prefix(v))
            .map(|f| format!("{}mm", trim_trailing_zero(f))),
        "iso" => tags
            .get("PhotographicSensitivity")
            .or_else(|| tags.get("ISOSpeedRatings"))
            .map(|v| v.split_whitespace().next().unwrap_or(v).to_string()),
        "lens" => {
            let lens = derive_maker_model(tags.get("LensMake"), tags.get("LensModel"));
            if lens.is_empty() { None } else { Some(lens) }
        }
        _ => None,
    }
}

fn derive_shutter_speed(tags: &BTreeMap<String, String>) -> Option<String> {
    if let Some(v) = tags.get("ExposureTime")
        && let Some(f) = parse_rational_prefix(v)
            && f > 0.0 {
                return Some(format!("1/{}s", (1.0 / f).round() as u64));
            }
    if let Some(v) = tags.get("ShutterSpeedValue")
        && let Some(apex) = parse_rational_prefix(v) {
            let seconds = 2f64.powf(-apex);
            if seconds > 0.0 {
                return Some(format!("1/{}s", (1.0 / seconds).round() as u64));
            }
        }
    None
}

fn trim_trailing_zero(f: f64) -> String {
    if f.fract().abs() < f64::EPSILON {
        format!("{}", f as i64)
    } else {
        format!("{:.1}", f)
    }
}

/// kamadak-exif's `display_value` renders rationals as e.g. `"2.8"` or
/// `"1/200"`; parse the leading number out of either form.
fn parse_rational_prefix(s: &str) -> Option<f64> {
    let token = s.split_whitespace().next()?;
    if let Some((num, den)) = token.split_once('/') {
        let n: f64 = num.parse().ok()?;
        let d: f64 = den.parse().ok()?;
        if d == 0.0 {
            return None;
        }
        return Some(n / d);
    }
    token.parse().ok()
}

/// Current local time, minute precision — used for archive head
/// `date-created`/`date-updated` timestamps.
pub fn now_iso_minute() -> String {
    Local::now().format("%Y-%m-%dT%H:%M").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maker_model_strips_duplicated_prefix() {
        assert_eq!(derive_maker_model(Some(&"Nikon".to_string()), Some(&"Nikon D90".to_string())), "Nikon-D90");
    }

    #[test]
    fn maker_model_unknown_model_is_just_make() {
        assert_eq!(derive_maker_model(Some(&"Canon".to_string()), Some(&"Unknown".to_string())), "Canon");
    }

    #[test]
    fn maker_model_both_unknown_is_empty() {
        assert_eq!(derive_maker_model(Some(&"Unknown".to_string()), Some(&"Unknown".to_string())), "");
    }

    #[test]
    fn maker_model_canonicalizes_olympus() {
        assert_eq!(
            derive_maker_model(Some(&"OLYMPUS CORPORATION".to_string()), Some(&"E-M1".to_string())),
            "Olympus-E-M1"
        );
    }

    #[test]
    fn maker_model_empty_inputs_are_empty() {
        assert_eq!(derive_maker_model(None, None), "");
    }

    #[test]
    fn parse_rational_prefix_handles_fraction() {
        assert_eq!(parse_rational_prefix("1/200"), Some(0.005));
    }

    #[test]
    fn parse_rational_prefix_handles_plain_number() {
        assert_eq!(parse_rational_prefix("2.8"), Some(2.8));
    }

    #[test]
    fn fs_date_on_missing_file_is_empty() {
        assert_eq!(fs_date(Path::new("/does/not/exist.jpg")), "");
    }

    #[test]
    fn now_iso_minute_has_expected_shape() {
        let s = now_iso_minute();
        assert!(s.contains('T'));
        assert_eq!(s.len(), 16);
    }

    #[test]
    fn extract_on_missing_file_returns_none() {
        let config = Config::default();
        let result = extract(Path::new("/does/not/exist.jpg"), &config).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn extract_produces_a_record_with_core_attrs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.png");
        let img = image::RgbImage::from_fn(32, 32, |_, _| image::Rgb([10, 20, 30]));
        image::DynamicImage::ImageRgb8(img).save(&path).unwrap();

        let config = Config::default();
        let record = extract(&path, &config).unwrap().unwrap();
        assert!(record.id.len() > 3);
        assert_eq!(record.get("format"), Some("PNG"));
        assert_eq!(record.get("width"), Some("32"));
        assert!(record.thumb.is_some());
    }

    #[test]
    fn extract_respects_filter_miss() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.png");
        let img = image::RgbImage::from_fn(8, 8, |_, _| image::Rgb([1, 1, 1]));
        image::DynamicImage::ImageRgb8(img).save(&path).unwrap();

        let mut config = Config::default();
        config.filter = Some("width > 1000".to_string());
        let record = extract(&path, &config).unwrap().unwrap();
        assert!(record.id.is_empty());
    }
}
