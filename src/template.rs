//! Restricted template engine for deriving `id`, rename targets, and link paths.
//!
//! Rather than evaluating a user-supplied string in a host-language interpreter,
//! rendering here is restricted to a small, safe placeholder vocabulary:
//! `{field}` or `{field:format}`, where `field` is any key present in the meta
//! record and `format` is one of a closed set of formatters. No arbitrary code can
//! be expressed through a template string.
//!
//! ## Syntax
//!
//! - `{field}` — substitute the field's value verbatim.
//! - `{field:upper}` / `{field:lower}` — case-fold the value.
//! - `{field:slice:N}` — take the first `N` characters.
//! - Unknown fields substitute to an empty string; literal text outside `{}` passes
//!   through unchanged; an unmatched `{` is a [`TemplateError`].

use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum TemplateError {
    #[error("unterminated placeholder starting at byte {0}")]
    Unterminated(usize),
    #[error("unknown format specifier: {0}")]
    UnknownFormat(String),
}

/// Render a template string against a flat field map.
///
/// Missing fields render as the empty string, matching the original's permissive
/// `dict.get` based substitution.
pub fn render(template: &str, fields: &BTreeMap<String, String>) -> Result<String, TemplateError> {
    let mut out = String::with_capacity(template.len());
    let bytes = template.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'{' => {
                let Some(rel_end) = template[i..].find('}') else {
                    return Err(TemplateError::Unterminated(i));
                };
                let placeholder = &template[i + 1..i + rel_end];
                out.push_str(&render_placeholder(placeholder, fields)?);
                i += rel_end + 1;
            }
            _ => {
                // Find the next literal run up to the next '{' (or end).
                let next_brace = template[i..].find('{').map(|p| i + p).unwrap_or(bytes.len());
                out.push_str(&template[i..next_brace]);
                i = next_brace;
            }
        }
    }
    Ok(out)
}

fn render_placeholder(
    placeholder: &str,
    fields: &BTreeMap<String, String>,
) -> Result<String, TemplateError> {
    let mut parts = placeholder.splitn(2, ':');
    let field = parts.next().unwrap_or_default();
    let value = fields.get(field).cloned().unwrap_or_default();
    match parts.next() {
        None => Ok(value),
        Some(fmt) => apply_format(&value, fmt),
    }
}

fn apply_format(value: &str, fmt: &str) -> Result<String, TemplateError> {
    if fmt == "upper" {
        return Ok(value.to_uppercase());
    }
    if fmt == "lower" {
        return Ok(value.to_lowercase());
    }
    if let Some(n) = fmt.strip_prefix("slice:") {
        let n: usize = n
            .parse()
            .map_err(|_| TemplateError::UnknownFormat(fmt.to_string()))?;
        return Ok(value.chars().take(n).collect());
    }
    Err(TemplateError::UnknownFormat(fmt.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn plain_substitution() {
        let f = fields(&[("blake2b", "abc123")]);
        assert_eq!(render("{blake2b}", &f).unwrap(), "abc123");
    }

    #[test]
    fn literal_text_around_placeholder() {
        let f = fields(&[("id", "xyz")]);
        assert_eq!(render("img-{id}.jpg", &f).unwrap(), "img-xyz.jpg");
    }

    #[test]
    fn missing_field_is_empty() {
        let f = fields(&[]);
        assert_eq!(render("{missing}", &f).unwrap(), "");
    }

    #[test]
    fn upper_and_lower() {
        let f = fields(&[("maker-model", "Nikon-D90")]);
        assert_eq!(render("{maker-model:upper}", &f).unwrap(), "NIKON-D90");
        assert_eq!(render("{maker-model:lower}", &f).unwrap(), "nikon-d90");
    }

    #[test]
    fn slice_format() {
        let f = fields(&[("blake2b", "abcdefgh")]);
        assert_eq!(render("{blake2b:slice:4}", &f).unwrap(), "abcd");
    }

    #[test]
    fn slice_longer_than_value_returns_whole_value() {
        let f = fields(&[("id", "ab")]);
        assert_eq!(render("{id:slice:10}", &f).unwrap(), "ab");
    }

    #[test]
    fn unterminated_placeholder_is_error() {
        let f = fields(&[]);
        assert_eq!(render("{oops", &f), Err(TemplateError::Unterminated(0)));
    }

    #[test]
    fn unknown_format_is_error() {
        let f = fields(&[("id", "x")]);
        assert_eq!(
            render("{id:reverse}", &f),
            Err(TemplateError::UnknownFormat("reverse".to_string()))
        );
    }

    #[test]
    fn no_placeholders_passes_through() {
        let f = fields(&[]);
        assert_eq!(render("plain-text", &f).unwrap(), "plain-text");
    }

    #[test]
    fn multiple_placeholders() {
        let f = fields(&[("maker-model", "Canon"), ("id", "deadbeef")]);
        assert_eq!(
            render("{maker-model}-{id:slice:6}", &f).unwrap(),
            "Canon-deadbe"
        );
    }
}
