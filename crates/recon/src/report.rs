//! Projections of a [`ReconResult`]: the accuracy summary and the annotated
//! candidate table. No comparison happens here.

use std::collections::HashMap;
use std::fmt;

use serde::Serialize;

use crate::config::FieldKind;
use crate::model::{JoinAnchor, MissingColumn, ReconResult, RowOutcome, Side, Totals};
use crate::raw::{Record, RawValue};

/// Column appended to every annotated row.
pub const MISMATCH_COUNT_COLUMN: &str = "mismatch_count";
/// First cell of the trailing per-field totals row.
pub const TOTALS_LABEL: &str = "per-field mismatches";

// ---------------------------------------------------------------------------
// Summary
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldSummary {
    pub field: String,
    pub kind: FieldKind,
    pub compared: usize,
    pub mismatches: usize,
    pub match_rate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub missing_column: Option<MissingColumn>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub config_name: String,
    pub anchor: JoinAnchor,
    pub match_rate: Option<f64>,
    pub totals: Totals,
    pub fields: Vec<FieldSummary>,
}

impl Summary {
    pub fn from_result(result: &ReconResult) -> Self {
        Self {
            config_name: result.config_name.clone(),
            anchor: result.anchor,
            match_rate: result.match_rate(),
            totals: result.totals.clone(),
            fields: result
                .fields
                .iter()
                .map(|f| FieldSummary {
                    field: f.field.clone(),
                    kind: f.kind,
                    compared: f.compared,
                    mismatches: f.mismatches,
                    match_rate: f.match_rate(),
                    missing_column: f.missing_column,
                })
                .collect(),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

fn percent(rate: Option<f64>) -> String {
    match rate {
        Some(r) => format!("{:.2}%", r * 100.0),
        None => "N/A".to_string(),
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let t = &self.totals;
        let anchor_rows = match self.anchor {
            JoinAnchor::Reference => t.reference_rows,
            JoinAnchor::Candidate => t.candidate_rows,
        };

        writeln!(f, "{} ({} anchored)", self.config_name, self.anchor)?;
        writeln!(f, "  {} rows:      {anchor_rows}", self.anchor)?;
        writeln!(f, "  matched rows:        {}", t.matched_rows)?;
        writeln!(f, "  match rate:          {}", percent(self.match_rate))?;
        writeln!(
            f,
            "  unmatched:           reference {}, candidate {}",
            t.unmatched_reference, t.unmatched_candidate
        )?;
        writeln!(
            f,
            "  duplicates dropped:  reference {}, candidate {}",
            t.duplicate_reference, t.duplicate_candidate
        )?;
        writeln!(
            f,
            "  unparsable keys:     reference {}, candidate {}",
            t.unparsable_reference, t.unparsable_candidate
        )?;
        writeln!(f)?;
        writeln!(f, "{:<30} | {:<10} | {}", "field", "match rate", "mismatches")?;
        writeln!(f, "{}", "-".repeat(56))?;
        for field in &self.fields {
            match field.missing_column {
                Some(side) => writeln!(
                    f,
                    "{:<30} | {:<10} | column missing ({side})",
                    field.field,
                    percent(None)
                )?,
                None => writeln!(
                    f,
                    "{:<30} | {:<10} | {}",
                    field.field,
                    percent(field.match_rate),
                    field.mismatches
                )?,
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Annotated table
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RowStatus {
    /// Joined and compared.
    Compared,
    /// Keyed, but the other side has no row with this key.
    Unmatched,
    /// An earlier row had the same key; this one was not compared.
    Duplicate,
    /// Document or page could not be read.
    UnparsableKey,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnnotatedRow {
    /// Position in the candidate input.
    pub row: usize,
    pub status: RowStatus,
    pub record: Record,
    /// Set for compared rows only.
    pub mismatch_count: Option<usize>,
    /// Candidate columns whose cell disagrees with the reference.
    pub flagged: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnTotal {
    pub column: String,
    pub mismatches: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnnotatedTable {
    /// Candidate columns in first-seen order, then [`MISMATCH_COUNT_COLUMN`].
    pub columns: Vec<String>,
    pub rows: Vec<AnnotatedRow>,
    /// Per-field mismatch totals keyed by candidate column.
    pub totals: Vec<ColumnTotal>,
}

/// Spreadsheet-shaped rendering: header, one line per candidate row, then the
/// totals line. `highlights` are (line, column) positions into `cells`.
#[derive(Debug, Clone, PartialEq)]
pub struct Grid {
    pub cells: Vec<Vec<RawValue>>,
    pub highlights: Vec<(usize, usize)>,
}

impl AnnotatedTable {
    /// Annotate `candidate` (the rows the result was computed from).
    pub fn build(result: &ReconResult, candidate: &[Record]) -> Self {
        let field_columns: HashMap<&str, &str> = result
            .fields
            .iter()
            .map(|f| (f.field.as_str(), f.candidate_column.as_str()))
            .collect();

        let mut status: HashMap<usize, RowStatus> = HashMap::new();
        for u in result.unmatched.iter().filter(|u| u.side == Side::Candidate) {
            status.insert(u.row, RowStatus::Unmatched);
        }
        for d in result.duplicates.iter().filter(|d| d.side == Side::Candidate) {
            status.insert(d.row, RowStatus::Duplicate);
        }
        for p in result.unparsable.iter().filter(|p| p.side == Side::Candidate) {
            status.insert(p.row, RowStatus::UnparsableKey);
        }
        let compared: HashMap<usize, &RowOutcome> =
            result.rows.iter().map(|r| (r.candidate_row, r)).collect();

        let mut columns: Vec<String> = Vec::new();
        for record in candidate {
            for column in record.columns() {
                if !columns.iter().any(|c| c == column) {
                    columns.push(column.to_string());
                }
            }
        }
        columns.push(MISMATCH_COUNT_COLUMN.to_string());

        let rows = candidate
            .iter()
            .enumerate()
            .map(|(row, record)| match compared.get(&row) {
                Some(outcome) => AnnotatedRow {
                    row,
                    status: RowStatus::Compared,
                    record: record.clone(),
                    mismatch_count: Some(outcome.mismatch_count),
                    flagged: outcome
                        .mismatched_fields()
                        .map(|field| field_columns.get(field).copied().unwrap_or(field).to_string())
                        .collect(),
                },
                None => AnnotatedRow {
                    row,
                    status: status.get(&row).copied().unwrap_or(RowStatus::Unmatched),
                    record: record.clone(),
                    mismatch_count: None,
                    flagged: Vec::new(),
                },
            })
            .collect();

        let totals = result
            .fields
            .iter()
            .map(|f| ColumnTotal {
                column: f.candidate_column.clone(),
                mismatches: f.mismatches,
            })
            .collect();

        Self { columns, rows, totals }
    }

    pub fn is_flagged(&self, row: usize, column: &str) -> bool {
        self.rows
            .get(row)
            .map(|r| r.flagged.iter().any(|c| c == column))
            .unwrap_or(false)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn to_grid(&self) -> Grid {
        let mut cells = Vec::with_capacity(self.rows.len() + 2);
        let mut highlights = Vec::new();

        cells.push(self.columns.iter().map(|c| RawValue::Text(c.clone())).collect());

        for (i, row) in self.rows.iter().enumerate() {
            let line = i + 1;
            let mut out: Vec<RawValue> = Vec::with_capacity(self.columns.len());
            for (col, column) in self.columns.iter().enumerate() {
                if column == MISMATCH_COUNT_COLUMN {
                    out.push(row.mismatch_count.map(|n| RawValue::Number(n as f64)).unwrap_or(RawValue::Absent));
                    continue;
                }
                if row.flagged.iter().any(|c| c == column) {
                    highlights.push((line, col));
                }
                out.push(row.record.get(column).clone());
            }
            cells.push(out);
        }

        // The label takes the first column that holds no total.
        let mut footer = vec![RawValue::Absent; self.columns.len()];
        let mut taken = vec![false; self.columns.len()];
        for total in &self.totals {
            if let Some(col) = self.columns.iter().position(|c| *c == total.column) {
                footer[col] = RawValue::Number(total.mismatches as f64);
                taken[col] = true;
            }
        }
        if let Some(col) = taken.iter().position(|t| !t) {
            footer[col] = RawValue::Text(TOTALS_LABEL.to_string());
        }
        cells.push(footer);

        Grid { cells, highlights }
    }
}
