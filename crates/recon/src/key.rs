use std::fmt;

use serde::Serialize;

use crate::error::KeyError;
use crate::raw::{format_number, RawValue};

/// Canonical join key: `{cleaned_document}_{page}`.
///
/// Document names that differ only in case, punctuation, quoting or a
/// trailing `.pdf` collapse onto the same key. Two genuinely different
/// documents whose names differ only that way are merged too; that collision
/// is accepted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct JoinKey(String);

impl JoinKey {
    pub fn new(document: &str, page: u32) -> Self {
        Self(format!("{document}_{page}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JoinKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Build the join key for a row from its document and page cells.
pub fn normalize_key(document: &RawValue, page: &RawValue) -> Result<JoinKey, KeyError> {
    let document = clean_document(document).ok_or(KeyError::MissingIdentifier)?;
    let page = parse_page(page)?;
    Ok(JoinKey::new(&document, page))
}

/// Lower-case, trim, drop quotes and a trailing `.pdf`, keep `[a-z0-9]`.
/// `None` when nothing survives.
pub fn clean_document(raw: &RawValue) -> Option<String> {
    let text = match raw {
        RawValue::List(items) if items.len() == 1 => return clean_document(&items[0]),
        other => other.as_text()?,
    };

    let lowered = text.to_lowercase();
    let unquoted = lowered
        .trim()
        .trim_matches(|c| c == '\'' || c == '"')
        .trim();
    let stem = unquoted.strip_suffix(".pdf").unwrap_or(unquoted);

    let cleaned: String = stem
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        .collect();

    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

/// Permissive page parse: `3`, `3.0`, `"3"`, `[3]`, `p.3`, `第3页`.
/// Fractional pages truncate toward zero.
pub fn parse_page(raw: &RawValue) -> Result<u32, KeyError> {
    match raw {
        _ if raw.is_blank() => Err(KeyError::MissingPage),
        RawValue::Number(n) => page_from_f64(*n).ok_or_else(|| KeyError::UnparsablePage(format_number(*n))),
        RawValue::Text(s) => parse_page_text(s).ok_or_else(|| KeyError::UnparsablePage(s.clone())),
        RawValue::List(items) if items.len() == 1 => parse_page(&items[0]),
        RawValue::List(items) => Err(KeyError::UnparsablePage(format!("list of {} values", items.len()))),
        RawValue::Absent => Err(KeyError::MissingPage),
    }
}

fn parse_page_text(s: &str) -> Option<u32> {
    let stripped: String = s
        .chars()
        .filter(|c| !c.is_whitespace() && !matches!(c, '\'' | '"' | '[' | ']' | '(' | ')' | ','))
        .collect::<String>()
        .to_lowercase();

    let mut body = stripped.as_str();
    body = body.strip_prefix('第').unwrap_or(body);
    body = body.strip_suffix('页').unwrap_or(body);
    for prefix in ["page", "pg", "p"] {
        if let Some(rest) = body.strip_prefix(prefix) {
            body = rest.strip_prefix('.').unwrap_or(rest);
            break;
        }
    }

    body.parse::<f64>().ok().and_then(page_from_f64)
}

fn page_from_f64(n: f64) -> Option<u32> {
    if !n.is_finite() || n < 0.0 || n > u32::MAX as f64 {
        return None;
    }
    Some(n.trunc() as u32)
}
