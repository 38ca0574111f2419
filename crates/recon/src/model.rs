use serde::Serialize;

use crate::canonical::CanonicalValue;
use crate::config::FieldKind;
use crate::error::KeyError;
use crate::key::JoinKey;

// ---------------------------------------------------------------------------
// Sides + anchors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Reference,
    Candidate,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Reference => write!(f, "reference"),
            Self::Candidate => write!(f, "candidate"),
        }
    }
}

/// Which collection a run enumerates. Decides the match-rate denominator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinAnchor {
    /// Gold-set coverage: matched / reference rows.
    Reference,
    /// Extraction view: matched / candidate rows.
    Candidate,
}

impl JoinAnchor {
    pub fn side(self) -> Side {
        match self {
            Self::Reference => Side::Reference,
            Self::Candidate => Side::Candidate,
        }
    }
}

impl std::fmt::Display for JoinAnchor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.side().fmt(f)
    }
}

// ---------------------------------------------------------------------------
// Per-row
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldOutcome {
    pub field: String,
    pub matched: bool,
    pub reference: CanonicalValue,
    pub candidate: CanonicalValue,
}

/// One joined (reference, candidate) pair. Row numbers are input positions.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowOutcome {
    pub key: JoinKey,
    pub reference_row: usize,
    pub candidate_row: usize,
    pub fields: Vec<FieldOutcome>,
    pub mismatch_count: usize,
}

impl RowOutcome {
    pub fn mismatched_fields(&self) -> impl Iterator<Item = &str> {
        self.fields
            .iter()
            .filter(|f| !f.matched)
            .map(|f| f.field.as_str())
    }
}

/// A keyed row with no partner on the other side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnmatchedRow {
    pub side: Side,
    pub row: usize,
    pub key: JoinKey,
}

/// A row dropped because an earlier row on the same side had its key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicateRow {
    pub side: Side,
    pub row: usize,
    pub key: JoinKey,
    /// Position of the row that was kept.
    pub kept_row: usize,
}

/// A row whose document/page cells could not form a key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnparsableRow {
    pub side: Side,
    pub row: usize,
    pub error: KeyError,
}

// ---------------------------------------------------------------------------
// Per-field + dataset
// ---------------------------------------------------------------------------

/// Which sheet has no column at all for a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingColumn {
    Reference,
    Candidate,
    Both,
}

impl MissingColumn {
    /// `None` when both sheets carry the column.
    pub fn from_presence(in_reference: bool, in_candidate: bool) -> Option<Self> {
        match (in_reference, in_candidate) {
            (true, true) => None,
            (false, true) => Some(Self::Reference),
            (true, false) => Some(Self::Candidate),
            (false, false) => Some(Self::Both),
        }
    }
}

impl std::fmt::Display for MissingColumn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Reference => write!(f, "reference"),
            Self::Candidate => write!(f, "candidate"),
            Self::Both => write!(f, "both"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldStats {
    pub field: String,
    pub candidate_column: String,
    pub kind: FieldKind,
    /// Joined rows this field was compared on.
    pub compared: usize,
    pub mismatches: usize,
    /// Set when a sheet lacks the column; the field is then never compared.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub missing_column: Option<MissingColumn>,
}

impl FieldStats {
    pub fn matches(&self) -> usize {
        self.compared - self.mismatches
    }

    /// `None` when no rows were joined or the column is missing.
    pub fn match_rate(&self) -> Option<f64> {
        (self.compared > 0).then(|| self.matches() as f64 / self.compared as f64)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Totals {
    /// Keyed reference rows after de-duplication.
    pub reference_rows: usize,
    /// Keyed candidate rows after de-duplication.
    pub candidate_rows: usize,
    pub matched_rows: usize,
    pub unmatched_reference: usize,
    pub unmatched_candidate: usize,
    pub duplicate_reference: usize,
    pub duplicate_candidate: usize,
    pub unparsable_reference: usize,
    pub unparsable_candidate: usize,
    /// Sum of per-row mismatch counts.
    pub mismatched_cells: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconResult {
    pub config_name: String,
    pub anchor: JoinAnchor,
    pub totals: Totals,
    /// In field-table order.
    pub fields: Vec<FieldStats>,
    /// Ordered by join key.
    pub rows: Vec<RowOutcome>,
    pub unmatched: Vec<UnmatchedRow>,
    pub duplicates: Vec<DuplicateRow>,
    pub unparsable: Vec<UnparsableRow>,
}

impl ReconResult {
    /// matched / anchor-side rows. `None` when the anchor side is empty.
    pub fn match_rate(&self) -> Option<f64> {
        let denominator = match self.anchor {
            JoinAnchor::Reference => self.totals.reference_rows,
            JoinAnchor::Candidate => self.totals.candidate_rows,
        };
        (denominator > 0).then(|| self.totals.matched_rows as f64 / denominator as f64)
    }

    pub fn field(&self, name: &str) -> Option<&FieldStats> {
        self.fields.iter().find(|f| f.field == name)
    }

    pub fn row(&self, key: &str) -> Option<&RowOutcome> {
        self.rows
            .binary_search_by(|r| r.key.as_str().cmp(key))
            .ok()
            .map(|i| &self.rows[i])
    }
}
