//! Raw cell → canonical typed value.
//!
//! Extraction output has been serialized several different ways over the
//! life of the pipeline: bracketed lists, lists of quoted lists, a pin list
//! paired with its ball-size list, a localized "not detected" marker. The
//! legacy forms are recognised by an ordered table of rewrite rules
//! ([`ENCODING_RULES`]) that run before the generic split. A new legacy form
//! is supported by appending a rule, not by branching in the comparator.
//!
//! Canonicalization is total: anything unrecognised degrades to `Missing`,
//! an absent slot or an empty pin set.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::config::FieldKind;
use crate::raw::{format_number, RawValue};

/// Marker the extractor writes when a dimension was not detected.
const NOT_DETECTED: &str = "未检测出";

/// Tokens that mean "nothing here", compared case-insensitively.
const NONE_TOKENS: [&str; 6] = ["none", "null", "nan", "n/a", "-", NOT_DETECTED];

// ---------------------------------------------------------------------------
// Canonical values
// ---------------------------------------------------------------------------

/// (min, nominal, max); `None` is an absent slot.
pub type Triple = [Option<f64>; 3];

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum CanonicalValue {
    NumericTriple(Triple),
    PinSet(BTreeSet<String>),
    Text(String),
    /// Nothing was recorded. Distinct from an empty pin set and from an
    /// all-absent triple.
    Missing,
}

impl CanonicalValue {
    pub fn kind(&self) -> Option<FieldKind> {
        match self {
            Self::NumericTriple(_) => Some(FieldKind::NumericTriple),
            Self::PinSet(_) => Some(FieldKind::PinSet),
            Self::Text(_) => Some(FieldKind::Text),
            Self::Missing => None,
        }
    }

    /// Structured raw form that canonicalizes back to `self`.
    pub fn to_raw(&self) -> RawValue {
        match self {
            Self::NumericTriple(slots) => RawValue::List(
                slots
                    .iter()
                    .map(|s| s.map(RawValue::Number).unwrap_or(RawValue::Absent))
                    .collect(),
            ),
            Self::PinSet(pins) => {
                RawValue::List(pins.iter().map(|p| RawValue::Text(p.clone())).collect())
            }
            Self::Text(s) => RawValue::Text(s.clone()),
            Self::Missing => RawValue::Absent,
        }
    }
}

impl fmt::Display for CanonicalValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NumericTriple(slots) => {
                let parts: Vec<String> = slots
                    .iter()
                    .map(|s| s.map(format_number).unwrap_or_else(|| "None".into()))
                    .collect();
                write!(f, "[{}]", parts.join(", "))
            }
            Self::PinSet(pins) => {
                let parts: Vec<&str> = pins.iter().map(String::as_str).collect();
                write!(f, "[{}]", parts.join(", "))
            }
            Self::Text(s) => f.write_str(s),
            Self::Missing => f.write_str("None"),
        }
    }
}

// ---------------------------------------------------------------------------
// Legacy encoding rules
// ---------------------------------------------------------------------------

/// Outcome of a rule that recognised its pattern.
#[derive(Debug, Clone, PartialEq)]
pub enum Rewrite {
    /// Continue with this text.
    Text(String),
    /// The cell is a known "nothing" sentinel.
    Empty,
}

pub struct EncodingRule {
    pub name: &'static str,
    pub kinds: &'static [FieldKind],
    pub apply: fn(&str) -> Option<Rewrite>,
}

/// Applied in order; each rule sees the previous rule's output.
pub const ENCODING_RULES: &[EncodingRule] = &[
    EncodingRule {
        name: "not-detected-marker",
        kinds: &[FieldKind::NumericTriple, FieldKind::PinSet],
        apply: replace_not_detected,
    },
    EncodingRule {
        name: "pin-tuple",
        kinds: &[FieldKind::PinSet],
        apply: unwrap_pin_tuple,
    },
    EncodingRule {
        name: "no-exclusions-sentinel",
        kinds: &[FieldKind::PinSet],
        apply: no_exclusions_sentinel,
    },
    EncodingRule {
        name: "nested-list",
        kinds: &[FieldKind::NumericTriple, FieldKind::PinSet],
        apply: unwrap_nested_list,
    },
];

// ["[B1, C7]", [3.0, 3.0]]  /  ["['A1', 'G18']", '[3.0, 3.0]', '-']
static PIN_TUPLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\s*\[\s*["']\[([^\]]*)\]["']\s*,"#).expect("pin tuple regex is valid")
});

// ["[0.5, 0.5, 0.5]"]  /  ['[0.5, 0.5, 0.5]']
static NESTED_LIST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\s*\[\s*(?:"(\[.*\])"|'(\[.*\])')\s*\]\s*$"#).expect("nested list regex is valid")
});

fn replace_not_detected(s: &str) -> Option<Rewrite> {
    s.contains(NOT_DETECTED)
        .then(|| Rewrite::Text(s.replace(NOT_DETECTED, "None")))
}

fn unwrap_pin_tuple(s: &str) -> Option<Rewrite> {
    let caps = PIN_TUPLE.captures(s)?;
    Some(Rewrite::Text(format!("[{}]", &caps[1])))
}

fn no_exclusions_sentinel(s: &str) -> Option<Rewrite> {
    (s.to_lowercase().contains("none") && s.contains("[]")).then_some(Rewrite::Empty)
}

fn unwrap_nested_list(s: &str) -> Option<Rewrite> {
    let caps = NESTED_LIST.captures(s)?;
    let inner = caps.get(1).or_else(|| caps.get(2))?;
    Some(Rewrite::Text(inner.as_str().to_string()))
}

/// Run every rule registered for `kind`. `None` means an empty sentinel.
fn apply_rules(text: &str, kind: FieldKind) -> Option<String> {
    let mut current = text.to_string();
    for rule in ENCODING_RULES.iter().filter(|r| r.kinds.contains(&kind)) {
        match (rule.apply)(&current) {
            Some(Rewrite::Empty) => return None,
            Some(Rewrite::Text(next)) => current = next,
            None => {}
        }
    }
    Some(current)
}

// ---------------------------------------------------------------------------
// Canonicalize
// ---------------------------------------------------------------------------

/// Canonical form of `raw` for a field of `kind`. Never fails.
pub fn canonicalize(raw: &RawValue, kind: FieldKind) -> CanonicalValue {
    match kind {
        FieldKind::NumericTriple => canonical_triple(raw),
        FieldKind::PinSet => CanonicalValue::PinSet(canonical_pins(raw)),
        FieldKind::Text => canonical_text(raw),
    }
}

fn canonical_triple(raw: &RawValue) -> CanonicalValue {
    if raw.is_blank() {
        return CanonicalValue::Missing;
    }
    match raw {
        RawValue::Number(n) => CanonicalValue::NumericTriple([finite(*n), None, None]),
        RawValue::Text(s) => triple_from_text(s),
        // A list holding one string is an older export of the string form.
        RawValue::List(items) => match items.as_slice() {
            [RawValue::Text(inner)] => triple_from_text(inner),
            _ => {
                let mut slots: Triple = [None; 3];
                for (slot, item) in slots.iter_mut().zip(items) {
                    *slot = slot_from_raw(item);
                }
                CanonicalValue::NumericTriple(slots)
            }
        },
        RawValue::Absent => CanonicalValue::Missing,
    }
}

fn triple_from_text(text: &str) -> CanonicalValue {
    if is_none_token(text) {
        return CanonicalValue::Missing;
    }
    let rewritten = match apply_rules(text, FieldKind::NumericTriple) {
        Some(t) => t,
        None => return CanonicalValue::NumericTriple([None; 3]),
    };
    let parts = split_parts(&rewritten);
    if parts.is_empty() {
        return CanonicalValue::Missing;
    }

    // Extra parts are trailing status columns from older exports.
    let mut slots: Triple = [None; 3];
    for (slot, part) in slots.iter_mut().zip(&parts) {
        *slot = parse_slot(part);
    }
    CanonicalValue::NumericTriple(slots)
}

fn slot_from_raw(raw: &RawValue) -> Option<f64> {
    match raw {
        RawValue::Number(n) => finite(*n),
        RawValue::Text(s) => {
            let stripped: String = s.chars().filter(|c| !is_list_punct(*c)).collect();
            parse_slot(stripped.trim())
        }
        RawValue::Absent | RawValue::List(_) => None,
    }
}

fn parse_slot(part: &str) -> Option<f64> {
    if part.is_empty() || is_none_token(part) {
        return None;
    }
    part.parse::<f64>().ok().and_then(finite)
}

fn canonical_pins(raw: &RawValue) -> BTreeSet<String> {
    match raw {
        RawValue::Absent => BTreeSet::new(),
        RawValue::Text(s) => pins_from_text(s),
        RawValue::Number(n) if n.is_nan() => BTreeSet::new(),
        RawValue::Number(n) => BTreeSet::from([format_number(*n)]),
        // A bracketed string first is the pin half of a (pins, sizes) pair.
        RawValue::List(items) => match items.first() {
            Some(RawValue::Text(first)) if looks_like_list(first) => pins_from_text(first),
            _ => items.iter().flat_map(canonical_pins).collect(),
        },
    }
}

fn pins_from_text(text: &str) -> BTreeSet<String> {
    let Some(rewritten) = apply_rules(text, FieldKind::PinSet) else {
        return BTreeSet::new();
    };
    split_parts(&rewritten)
        .iter()
        .filter(|part| !is_none_token(part))
        .map(|part| part.to_uppercase())
        .filter(|pin| !pin.is_empty())
        .collect()
}

fn canonical_text(raw: &RawValue) -> CanonicalValue {
    match raw {
        RawValue::List(items) if items.len() == 1 => canonical_text(&items[0]),
        RawValue::List(items) if !items.is_empty() => {
            let parts: Vec<String> = items
                .iter()
                .filter_map(|item| item.as_text().map(|t| t.trim().to_string()))
                .collect();
            text_value(&format!("[{}]", parts.join(", ")))
        }
        other => match other.as_text() {
            Some(t) => text_value(&t),
            None => CanonicalValue::Missing,
        },
    }
}

fn text_value(s: &str) -> CanonicalValue {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        CanonicalValue::Missing
    } else {
        CanonicalValue::Text(trimmed.to_uppercase())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn is_list_punct(c: char) -> bool {
    matches!(c, '[' | ']' | '\'' | '"')
}

/// Strip brackets and quotes, split on commas, trim. `[]` yields nothing.
fn split_parts(s: &str) -> Vec<String> {
    let stripped: String = s.chars().filter(|c| !is_list_punct(*c)).collect();
    if stripped.trim().is_empty() {
        return Vec::new();
    }
    stripped.split(',').map(|p| p.trim().to_string()).collect()
}

fn is_none_token(s: &str) -> bool {
    let t = s.trim().trim_matches(|c| c == '\'' || c == '"').trim();
    NONE_TOKENS.iter().any(|n| t.eq_ignore_ascii_case(n))
}

fn looks_like_list(s: &str) -> bool {
    let t = s.trim();
    t.starts_with('[') && t.ends_with(']')
}

fn finite(n: f64) -> Option<f64> {
    n.is_finite().then_some(n)
}
