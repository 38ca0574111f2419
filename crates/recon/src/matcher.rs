use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use crate::config::KeyColumns;
use crate::key::{normalize_key, JoinKey};
use crate::model::{DuplicateRow, JoinAnchor, Side, UnparsableRow};
use crate::raw::Record;

/// One side of a join after keying and de-duplication.
#[derive(Debug, Default)]
pub struct KeyedSide {
    /// Key → input position of the first row carrying it.
    pub rows: BTreeMap<JoinKey, usize>,
    pub duplicates: Vec<DuplicateRow>,
    pub unparsable: Vec<UnparsableRow>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchedPair {
    pub key: JoinKey,
    pub reference_row: usize,
    pub candidate_row: usize,
}

#[derive(Debug, Default)]
pub struct JoinOutput {
    pub matched: Vec<MatchedPair>,
    pub reference_only: Vec<(JoinKey, usize)>,
    pub candidate_only: Vec<(JoinKey, usize)>,
}

/// Key every row on one side. First occurrence of a key wins; later rows
/// are reported as duplicates, unkeyable rows as unparsable.
pub fn key_rows(rows: &[Record], keys: &KeyColumns, side: Side) -> KeyedSide {
    let mut keyed = KeyedSide::default();

    for (row, record) in rows.iter().enumerate() {
        let key = match normalize_key(record.get(&keys.document), record.get(&keys.page)) {
            Ok(key) => key,
            Err(error) => {
                keyed.unparsable.push(UnparsableRow { side, row, error });
                continue;
            }
        };

        match keyed.rows.entry(key) {
            Entry::Vacant(slot) => {
                slot.insert(row);
            }
            Entry::Occupied(slot) => keyed.duplicates.push(DuplicateRow {
                side,
                row,
                key: slot.key().clone(),
                kept_row: *slot.get(),
            }),
        }
    }

    keyed
}

/// Exact-key join of two de-duplicated sides, walking the anchor side.
/// Output is ordered by key.
pub fn join(reference: &KeyedSide, candidate: &KeyedSide, anchor: JoinAnchor) -> JoinOutput {
    let (anchor_side, other_side) = match anchor {
        JoinAnchor::Reference => (reference, candidate),
        JoinAnchor::Candidate => (candidate, reference),
    };

    let mut out = JoinOutput::default();

    for (key, &anchor_row) in &anchor_side.rows {
        match other_side.rows.get(key) {
            Some(&other_row) => {
                let (reference_row, candidate_row) = match anchor {
                    JoinAnchor::Reference => (anchor_row, other_row),
                    JoinAnchor::Candidate => (other_row, anchor_row),
                };
                out.matched.push(MatchedPair {
                    key: key.clone(),
                    reference_row,
                    candidate_row,
                });
            }
            None => match anchor {
                JoinAnchor::Reference => out.reference_only.push((key.clone(), anchor_row)),
                JoinAnchor::Candidate => out.candidate_only.push((key.clone(), anchor_row)),
            },
        }
    }

    for (key, &other_row) in &other_side.rows {
        if !anchor_side.rows.contains_key(key) {
            match anchor {
                JoinAnchor::Reference => out.candidate_only.push((key.clone(), other_row)),
                JoinAnchor::Candidate => out.reference_only.push((key.clone(), other_row)),
            }
        }
    }

    out
}
