use tracing::{debug, info, warn};

use crate::aggregate::aggregate_fields;
use crate::canonical::canonicalize;
use crate::compare::compare;
use crate::config::{FieldSpec, ReconConfig};
use crate::error::Result;
use crate::matcher::{join, key_rows};
use crate::model::{
    FieldOutcome, JoinAnchor, MissingColumn, ReconResult, RowOutcome, Side, Totals, UnmatchedRow,
};
use crate::raw::Record;

/// Per-run knobs that don't belong in the field table.
#[derive(Debug, Clone, Default)]
pub struct ReconOptions {
    /// Restrict the run to these fields. Unknown names fail the run.
    pub fields: Option<Vec<String>>,
}

/// Gold-set coverage: how much of the reference set the candidates cover.
/// Match rate is matched / reference rows.
pub fn reconcile_against_reference(
    reference: &[Record],
    candidate: &[Record],
    config: &ReconConfig,
) -> Result<ReconResult> {
    reconcile(reference, candidate, config, JoinAnchor::Reference, &ReconOptions::default())
}

/// Extraction view: every candidate row checked against the reference.
/// Match rate is matched / candidate rows. Feeds the annotated table.
pub fn reconcile_candidates(
    reference: &[Record],
    candidate: &[Record],
    config: &ReconConfig,
) -> Result<ReconResult> {
    reconcile(reference, candidate, config, JoinAnchor::Candidate, &ReconOptions::default())
}

/// Key, de-duplicate, join and compare two row collections.
///
/// Data problems (unkeyable rows, duplicates, unreadable cells, a column
/// absent from a whole sheet) are counted in the result. Only an invalid
/// field table or a selection naming an unknown field fails.
pub fn reconcile(
    reference: &[Record],
    candidate: &[Record],
    config: &ReconConfig,
    anchor: JoinAnchor,
    options: &ReconOptions,
) -> Result<ReconResult> {
    config.validate()?;
    let specs: Vec<&FieldSpec> = match &options.fields {
        Some(names) => config.select(names)?,
        None => config.fields.iter().collect(),
    };

    let missing = missing_columns(&specs, reference, candidate);
    for (spec, side) in specs.iter().zip(&missing) {
        if let Some(side) = side {
            warn!(field = %spec.name, missing = %side, "column missing, field not compared");
        }
    }
    let compared: Vec<&FieldSpec> = specs
        .iter()
        .zip(&missing)
        .filter(|(_, side)| side.is_none())
        .map(|(spec, _)| *spec)
        .collect();

    let reference_side = key_rows(reference, &config.keys, Side::Reference);
    let candidate_side = key_rows(candidate, &config.keys, Side::Candidate);

    for bad in reference_side.unparsable.iter().chain(&candidate_side.unparsable) {
        warn!(side = %bad.side, row = bad.row, error = %bad.error, "row has no usable join key");
    }
    for dup in reference_side.duplicates.iter().chain(&candidate_side.duplicates) {
        debug!(side = %dup.side, row = dup.row, key = %dup.key, kept_row = dup.kept_row, "duplicate key dropped");
    }

    let joined = join(&reference_side, &candidate_side, anchor);

    let rows: Vec<RowOutcome> = joined
        .matched
        .iter()
        .map(|pair| {
            let fields = compare_rows(&reference[pair.reference_row], &candidate[pair.candidate_row], &compared);
            let mismatch_count = fields.iter().filter(|f| !f.matched).count();
            RowOutcome {
                key: pair.key.clone(),
                reference_row: pair.reference_row,
                candidate_row: pair.candidate_row,
                fields,
                mismatch_count,
            }
        })
        .collect();

    let fields = aggregate_fields(&specs, &missing, &rows);
    for stats in &fields {
        debug!(field = %stats.field, compared = stats.compared, mismatches = stats.mismatches, "field compared");
    }

    let unmatched: Vec<UnmatchedRow> = joined
        .reference_only
        .iter()
        .map(|(key, row)| UnmatchedRow { side: Side::Reference, row: *row, key: key.clone() })
        .chain(
            joined
                .candidate_only
                .iter()
                .map(|(key, row)| UnmatchedRow { side: Side::Candidate, row: *row, key: key.clone() }),
        )
        .collect();

    let totals = Totals {
        reference_rows: reference_side.rows.len(),
        candidate_rows: candidate_side.rows.len(),
        matched_rows: rows.len(),
        unmatched_reference: joined.reference_only.len(),
        unmatched_candidate: joined.candidate_only.len(),
        duplicate_reference: reference_side.duplicates.len(),
        duplicate_candidate: candidate_side.duplicates.len(),
        unparsable_reference: reference_side.unparsable.len(),
        unparsable_candidate: candidate_side.unparsable.len(),
        mismatched_cells: rows.iter().map(|r| r.mismatch_count).sum(),
    };

    info!(
        config = %config.name,
        %anchor,
        reference_rows = totals.reference_rows,
        candidate_rows = totals.candidate_rows,
        matched = totals.matched_rows,
        mismatched_cells = totals.mismatched_cells,
        "reconciliation finished"
    );

    let mut duplicates = reference_side.duplicates;
    duplicates.extend(candidate_side.duplicates);
    let mut unparsable = reference_side.unparsable;
    unparsable.extend(candidate_side.unparsable);

    Ok(ReconResult {
        config_name: config.name.clone(),
        anchor,
        totals,
        fields,
        rows,
        unmatched,
        duplicates,
        unparsable,
    })
}

/// Per field, which sheet has no row carrying its column.
fn missing_columns(
    specs: &[&FieldSpec],
    reference: &[Record],
    candidate: &[Record],
) -> Vec<Option<MissingColumn>> {
    specs
        .iter()
        .map(|spec| {
            MissingColumn::from_presence(
                reference.iter().any(|r| r.contains(spec.reference_column())),
                candidate.iter().any(|r| r.contains(spec.candidate_column())),
            )
        })
        .collect()
}

/// Canonicalize and compare every field of one joined pair.
pub fn compare_rows(reference: &Record, candidate: &Record, specs: &[&FieldSpec]) -> Vec<FieldOutcome> {
    specs
        .iter()
        .map(|spec| {
            let reference = canonicalize(reference.get(spec.reference_column()), spec.kind);
            let candidate = canonicalize(candidate.get(spec.candidate_column()), spec.kind);
            FieldOutcome {
                field: spec.name.clone(),
                matched: compare(&reference, &candidate, spec),
                reference,
                candidate,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ReconError;
    use crate::raw::RawValue;

    fn config() -> ReconConfig {
        ReconConfig {
            name: "test".into(),
            keys: crate::config::KeyColumns {
                document: "doc".into(),
                page: "page".into(),
            },
            fields: vec![FieldSpec::numeric("pitch"), FieldSpec::pin_set("pins")],
        }
    }

    fn rec(doc: &str, page: &str, pitch: &str, pins: &str) -> Record {
        [("doc", doc), ("page", page), ("pitch", pitch), ("pins", pins)]
            .into_iter()
            .collect()
    }

    #[test]
    fn matching_pair_has_no_mismatches() {
        let reference = vec![rec("Part-A.pdf", "3", "[0.5,0.5,0.5]", "['A1','B2']")];
        let candidate = vec![rec("part-a", "3", "[0.49,0.5,0.51]", "[B2, A1]")];

        // Bounds differ by 0.01; only the nominal slot is compared.
        let mut config = config();
        config.fields[0].slots = crate::config::SlotPolicy::Middle;

        let result = reconcile_against_reference(&reference, &candidate, &config).unwrap();
        assert_eq!(result.totals.matched_rows, 1);
        let row = result.row("parta_3").unwrap();
        assert_eq!(row.mismatch_count, 0);
        assert_eq!(result.match_rate(), Some(1.0));

        // Comparing every slot at 1e-3 flags the bounds.
        let strict = reconcile_against_reference(&reference, &candidate, &self::config()).unwrap();
        assert_eq!(strict.rows[0].mismatched_fields().collect::<Vec<_>>(), vec!["pitch"]);
    }

    #[test]
    fn all_absent_triple_mismatches_numeric() {
        let reference = vec![rec("doc", "1", "[0.4,0.5,0.6]", "")];
        let candidate = vec![rec("doc", "1", "[None, []]", "")];
        let result = reconcile_candidates(&reference, &candidate, &config()).unwrap();

        let row = &result.rows[0];
        assert_eq!(row.mismatch_count, 1);
        assert_eq!(row.mismatched_fields().collect::<Vec<_>>(), vec!["pitch"]);
        assert_eq!(result.field("pitch").unwrap().mismatches, 1);
        assert_eq!(result.field("pins").unwrap().mismatches, 0);
    }

    #[test]
    fn missing_on_both_sides_counts_as_match() {
        let mut reference = rec("doc", "1", "", "");
        reference.insert("pitch", RawValue::Absent);
        let mut candidate: Record = [("doc", "doc"), ("page", "1")].into_iter().collect();
        candidate.insert("pitch", RawValue::Absent);

        let result = reconcile_against_reference(&[reference], &[candidate], &config()).unwrap();
        let pitch = result.field("pitch").unwrap();
        assert_eq!(pitch.compared, 1);
        assert_eq!(pitch.matches(), 1);
        assert_eq!(pitch.match_rate(), Some(1.0));
    }

    #[test]
    fn unmatched_duplicate_and_unparsable_are_counted() {
        let reference = vec![
            rec("A", "1", "[1,1,1]", ""),
            rec("B", "2", "[1,1,1]", ""),
            rec("a", "1", "[9,9,9]", ""),
            rec("C", "page?", "[1,1,1]", ""),
        ];
        let candidate = vec![
            rec("A", "1", "[1,1,1]", ""),
            rec("Z", "9", "[1,1,1]", ""),
            rec("", "1", "[1,1,1]", ""),
        ];
        let result = reconcile_against_reference(&reference, &candidate, &config()).unwrap();

        let t = &result.totals;
        assert_eq!(t.reference_rows, 2);
        assert_eq!(t.candidate_rows, 2);
        assert_eq!(t.matched_rows, 1);
        assert_eq!(t.unmatched_reference, 1);
        assert_eq!(t.unmatched_candidate, 1);
        assert_eq!(t.duplicate_reference, 1);
        assert_eq!(t.unparsable_reference, 1);
        assert_eq!(t.unparsable_candidate, 1);
        assert_eq!(result.match_rate(), Some(0.5));

        // First occurrence wins: the [9,9,9] duplicate is never compared.
        assert_eq!(result.rows[0].mismatch_count, 0);
        assert_eq!(result.field("pitch").unwrap().compared, 1);
    }

    #[test]
    fn anchors_differ_only_in_denominator() {
        let reference = vec![rec("A", "1", "[1,1,1]", ""), rec("B", "2", "[1,1,1]", "")];
        let candidate = vec![
            rec("A", "1", "[1,1,2]", ""),
            rec("X", "1", "[1,1,1]", ""),
            rec("Y", "1", "[1,1,1]", ""),
            rec("Z", "1", "[1,1,1]", ""),
        ];
        let config = config();
        let gold = reconcile_against_reference(&reference, &candidate, &config).unwrap();
        let view = reconcile_candidates(&reference, &candidate, &config).unwrap();

        assert_eq!(gold.rows, view.rows);
        assert_eq!(gold.fields, view.fields);
        assert_eq!(gold.match_rate(), Some(0.5));
        assert_eq!(view.match_rate(), Some(0.25));
    }

    #[test]
    fn field_selection() {
        let reference = vec![rec("A", "1", "[1,1,1]", "[A1]")];
        let candidate = vec![rec("A", "1", "[2,2,2]", "[A1]")];
        let options = ReconOptions { fields: Some(vec!["pins".into()]) };
        let result =
            reconcile(&reference, &candidate, &config(), JoinAnchor::Reference, &options).unwrap();
        assert_eq!(result.fields.len(), 1);
        assert_eq!(result.rows[0].mismatch_count, 0);

        let bad = ReconOptions { fields: Some(vec!["lead_count".into()]) };
        let err = reconcile(&reference, &candidate, &config(), JoinAnchor::Reference, &bad).unwrap_err();
        assert!(matches!(err, ReconError::UnknownField(_)));
    }

    #[test]
    fn column_missing_from_a_sheet_is_not_compared() {
        let reference = vec![rec("A", "1", "[1,1,1]", "[A1]")];
        let candidate: Vec<Record> =
            vec![[("doc", "A"), ("page", "1"), ("pins", "[B1]")].into_iter().collect()];
        let result = reconcile_against_reference(&reference, &candidate, &config()).unwrap();

        let pitch = result.field("pitch").unwrap();
        assert_eq!(pitch.missing_column, Some(MissingColumn::Candidate));
        assert_eq!(pitch.compared, 0);
        assert_eq!(pitch.match_rate(), None);

        let row = &result.rows[0];
        assert_eq!(row.mismatched_fields().collect::<Vec<_>>(), vec!["pins"]);
        assert_eq!(row.mismatch_count, 1);
        assert_eq!(result.field("pins").unwrap().mismatches, 1);
    }

    #[test]
    fn column_missing_from_both_sheets() {
        let reference: Vec<Record> = vec![[("doc", "A"), ("page", "1"), ("pins", "[A1]")].into_iter().collect()];
        let candidate = reference.clone();
        let result = reconcile_candidates(&reference, &candidate, &config()).unwrap();

        let pitch = result.field("pitch").unwrap();
        assert_eq!(pitch.missing_column, Some(MissingColumn::Both));
        assert_eq!(pitch.match_rate(), None);
        assert_eq!(result.field("pins").unwrap().match_rate(), Some(1.0));
    }

    #[test]
    fn invalid_field_table_fails_the_run() {
        let config = ReconConfig {
            name: "broken".into(),
            keys: crate::config::KeyColumns { document: "doc".into(), page: "page".into() },
            fields: vec![
                FieldSpec::numeric("pitch").with_tolerance(f64::NAN),
                FieldSpec::text("pitch"),
            ],
        };
        let reference = vec![rec("A", "1", "[1,1,1]", "")];
        let err = reconcile_against_reference(&reference, &reference, &config).unwrap_err();
        assert!(matches!(err, ReconError::ConfigValidation(_)));

        let mut negative = self::config();
        negative.fields[0].tolerance = -1e-3;
        let err = reconcile_candidates(&reference, &reference, &negative).unwrap_err();
        assert!(matches!(err, ReconError::ConfigValidation(_)));
    }

    #[test]
    fn candidate_column_mapping() {
        let config = ReconConfig {
            name: "mapped".into(),
            keys: crate::config::KeyColumns { document: "doc".into(), page: "page".into() },
            fields: vec![FieldSpec::text("封装类型").with_candidate_column("package_type")],
        };
        let reference: Record = [("doc", "A"), ("page", "1"), ("封装类型", "BGA")].into_iter().collect();
        let candidate: Record = [("doc", "A"), ("page", "1"), ("package_type", " bga ")].into_iter().collect();
        let result = reconcile_against_reference(&[reference], &[candidate], &config).unwrap();
        assert_eq!(result.rows[0].mismatch_count, 0);
    }
}
