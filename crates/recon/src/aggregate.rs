use crate::config::FieldSpec;
use crate::model::{FieldStats, MissingColumn, RowOutcome};

/// Per-field counters over joined rows.
///
/// `absorb` is plain counter addition, so tallies built over disjoint row
/// batches merge to the same result in any order.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldTally {
    stats: Vec<FieldStats>,
}

impl FieldTally {
    /// `missing` is positional with `specs`. Fields with a missing column
    /// stay in the table but are never counted.
    pub fn new(specs: &[&FieldSpec], missing: &[Option<MissingColumn>]) -> Self {
        Self {
            stats: specs
                .iter()
                .enumerate()
                .map(|(i, spec)| FieldStats {
                    field: spec.name.clone(),
                    candidate_column: spec.candidate_column().to_string(),
                    kind: spec.kind,
                    compared: 0,
                    mismatches: 0,
                    missing_column: missing.get(i).copied().flatten(),
                })
                .collect(),
        }
    }

    /// Count one joined row. Outcomes are positional with the compared
    /// fields, i.e. the table minus fields with a missing column.
    pub fn record(&mut self, row: &RowOutcome) {
        let compared = self.stats.iter_mut().filter(|s| s.missing_column.is_none());
        for (stats, outcome) in compared.zip(&row.fields) {
            stats.compared += 1;
            if !outcome.matched {
                stats.mismatches += 1;
            }
        }
    }

    pub fn absorb(&mut self, other: FieldTally) {
        for (mine, theirs) in self.stats.iter_mut().zip(other.stats) {
            mine.compared += theirs.compared;
            mine.mismatches += theirs.mismatches;
        }
    }

    pub fn into_stats(self) -> Vec<FieldStats> {
        self.stats
    }
}

/// Per-field statistics for a set of joined rows.
pub fn aggregate_fields(
    specs: &[&FieldSpec],
    missing: &[Option<MissingColumn>],
    rows: &[RowOutcome],
) -> Vec<FieldStats> {
    let mut tally = FieldTally::new(specs, missing);
    for row in rows {
        tally.record(row);
    }
    tally.into_stats()
}
