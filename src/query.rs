//! Query expression parsing and evaluation.
//!
//! Handles tokenization, an operator table, int-typed fields, and an AND-chain
//! evaluation against a record's attribute map).

use regex::Regex;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum QueryError {
    #[error("query expression must be a multiple of 3 tokens, got {0}")]
    BadLength(usize),
    #[error("unknown comparator: {0}")]
    UnknownComparator(String),
    #[error("invalid integer literal for field {field}: {value}")]
    BadInt { field: String, value: String },
    #[error("invalid regex pattern: {0}")]
    BadRegex(#[from] regex::Error),
    #[error("unknown property name: {0}")]
    UnknownField(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparator {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    Match,
    MatchCi,
    NotMatch,
    NotMatchCi,
}

impl Comparator {
    fn parse(s: &str) -> Result<Self, QueryError> {
        Ok(match s {
            "<" => Comparator::Lt,
            "<=" => Comparator::Le,
            ">" => Comparator::Gt,
            ">=" => Comparator::Ge,
            "=" | "==" => Comparator::Eq,
            "!=" => Comparator::Ne,
            "~~" => Comparator::MatchCi,
            "~" => Comparator::Match,
            "!~~" => Comparator::NotMatchCi,
            "!~" => Comparator::NotMatch,
            other => return Err(QueryError::UnknownComparator(other.to_string())),
        })
    }
}

/// A single `(field, comparator, literal)` clause.
#[derive(Debug, Clone)]
pub struct Clause {
    pub field: String,
    pub comparator: Comparator,
    pub literal: String,
}

/// An AND-chain of clauses, parsed from a query string.
#[derive(Debug, Clone)]
pub struct Query {
    pub clauses: Vec<Clause>,
}

/// Fields whose literal is coerced to an integer before comparison, matching
/// the original's `get_attr_type` table for numeric attributes.
const INT_FIELDS: &[&str] = &["bytes", "width", "height", "iso", "size"];

fn is_int_field(field: &str) -> bool {
    INT_FIELDS.contains(&field)
}

/// Mandatory and optional record attribute names a query clause may address,
/// matching the original's `IMG_ATTRS` set: the always-present fields, the
/// configurable per-pixel algorithms, the optional metadata fields, and every
/// hash name (cryptographic or perceptual) a record might carry.
const BASE_FIELDS: &[&str] =
    &["id", "pth", "format", "mode", "bytes", "size", "width", "height", "date", "maker-model", "file-sha256"];

fn is_known_field(field: &str) -> bool {
    BASE_FIELDS.contains(&field)
        || crate::config::ALL_C_HASHES.contains(&field)
        || crate::config::ALL_V_HASHES.contains(&field)
        || crate::config::ALL_ALGORITHMS.contains(&field)
        || crate::config::ALL_METADATA.contains(&field)
}

/// Parse a query expression: split on comma/semicolon/space, group into
/// `(field, op, value)` triples.
pub fn parse(expr: &str) -> Result<Query, QueryError> {
    let tokens: Vec<&str> = expr.split([',', ';', ' ']).filter(|s| !s.is_empty()).collect();
    if !tokens.len().is_multiple_of(3) {
        return Err(QueryError::BadLength(tokens.len()));
    }
    let mut clauses = Vec::new();
    for chunk in tokens.chunks(3) {
        let field = chunk[0].to_string();
        if !is_known_field(&field) {
            return Err(QueryError::UnknownField(field));
        }
        let comparator = Comparator::parse(chunk[1])?;
        if is_int_field(&field) {
            chunk[2]
                .parse::<i64>()
                .map_err(|_| QueryError::BadInt { field: field.clone(), value: chunk[2].to_string() })?;
        }
        clauses.push(Clause {
            field,
            comparator,
            literal: chunk[2].to_string(),
        });
    }
    Ok(Query { clauses })
}

impl Query {
    /// Evaluate the AND-chain against a record's attribute map. A missing
    /// field is treated as its zero value (empty string / 0).
    pub fn matches(&self, attrs: &BTreeMap<String, String>) -> bool {
        self.clauses.iter().all(|clause| eval_clause(clause, attrs))
    }
}

fn eval_clause(clause: &Clause, attrs: &BTreeMap<String, String>) -> bool {
    let actual = attrs.get(&clause.field).map(String::as_str).unwrap_or("");
    match clause.comparator {
        Comparator::Match | Comparator::MatchCi | Comparator::NotMatch | Comparator::NotMatchCi => {
            let ci = matches!(clause.comparator, Comparator::MatchCi | Comparator::NotMatchCi);
            let pattern = if ci {
                format!("(?i){}", clause.literal)
            } else {
                clause.literal.clone()
            };
            let is_match = Regex::new(&pattern).map(|re| re.is_match(actual)).unwrap_or(false);
            match clause.comparator {
                Comparator::Match | Comparator::MatchCi => is_match,
                _ => !is_match,
            }
        }
        _ if is_int_field(&clause.field) => {
            let actual_n: i64 = actual.parse().unwrap_or(0);
            let literal_n: i64 = clause.literal.parse().unwrap_or(0);
            compare_ord(clause.comparator, actual_n.cmp(&literal_n))
        }
        _ => {
            if let (Ok(a), Ok(b)) = (actual.parse::<f64>(), clause.literal.parse::<f64>()) {
                compare_ord(clause.comparator, a.partial_cmp(&b).unwrap_or(std::cmp::Ordering::Equal))
            } else {
                compare_ord(clause.comparator, actual.cmp(&clause.literal))
            }
        }
    }
}

fn compare_ord(comparator: Comparator, ord: std::cmp::Ordering) -> bool {
    use std::cmp::Ordering::*;
    match comparator {
        Comparator::Lt => ord == Less,
        Comparator::Le => ord != Greater,
        Comparator::Gt => ord == Greater,
        Comparator::Ge => ord != Less,
        Comparator::Eq => ord == Equal,
        Comparator::Ne => ord != Equal,
        _ => unreachable!("regex comparators handled separately"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attrs(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn parses_single_triple() {
        let q = parse("iso > 100").unwrap();
        assert_eq!(q.clauses.len(), 1);
        assert_eq!(q.clauses[0].field, "iso");
    }

    #[test]
    fn splits_on_comma_semicolon_and_space() {
        let q = parse("iso,>,100").unwrap();
        assert_eq!(q.clauses.len(), 1);
        assert_eq!(q.clauses[0].field, "iso");

        let q2 = parse("iso > 100 maker-model = Nikon").unwrap();
        assert_eq!(q2.clauses.len(), 2);

        let q3 = parse("iso;>;100").unwrap();
        assert_eq!(q3.clauses.len(), 1);
    }

    #[test]
    fn rejects_non_multiple_of_three() {
        assert!(matches!(parse("iso > 100 extra"), Err(QueryError::BadLength(4))));
    }

    #[test]
    fn rejects_unknown_comparator() {
        assert!(matches!(parse("iso <> 100"), Err(QueryError::UnknownComparator(_))));
    }

    #[test]
    fn int_field_comparison() {
        let q = parse("iso > 100").unwrap();
        assert!(q.matches(&attrs(&[("iso", "200")])));
        assert!(!q.matches(&attrs(&[("iso", "50")])));
    }

    #[test]
    fn string_equality() {
        let q = parse("maker-model = Nikon-D90").unwrap();
        assert!(q.matches(&attrs(&[("maker-model", "Nikon-D90")])));
        assert!(!q.matches(&attrs(&[("maker-model", "Canon-5D")])));
    }

    #[test]
    fn missing_field_treated_as_zero_value() {
        let q = parse("iso > 0").unwrap();
        assert!(!q.matches(&attrs(&[])));
    }

    #[test]
    fn regex_match_and_negation() {
        let q = parse("pth ~ \\.jpg$").unwrap();
        assert!(q.matches(&attrs(&[("pth", "/a/b.jpg")])));
        assert!(!q.matches(&attrs(&[("pth", "/a/b.png")])));

        let q2 = parse("pth !~ \\.jpg$").unwrap();
        assert!(!q2.matches(&attrs(&[("pth", "/a/b.jpg")])));
    }

    #[test]
    fn case_insensitive_match() {
        let q = parse("maker-model ~~ nikon").unwrap();
        assert!(q.matches(&attrs(&[("maker-model", "Nikon-D90")])));
    }

    #[test]
    fn multiple_clauses_are_anded() {
        let q = parse("iso > 100 maker-model = Nikon").unwrap();
        assert!(q.matches(&attrs(&[("iso", "200"), ("maker-model", "Nikon")])));
        assert!(!q.matches(&attrs(&[("iso", "50"), ("maker-model", "Nikon")])));
    }

    #[test]
    fn rejects_bad_int_literal_for_int_field() {
        assert!(matches!(parse("iso > abc"), Err(QueryError::BadInt { .. })));
    }

    #[test]
    fn rejects_unknown_field() {
        assert!(matches!(parse("nonexistent = 1"), Err(QueryError::UnknownField(f)) if f == "nonexistent"));
    }

    #[test]
    fn accepts_hash_and_algorithm_field_names() {
        assert!(parse("blake2b = abc123").is_ok());
        assert!(parse("top-colors = #000000=100.0").is_ok());
    }
}
