use crate::canonical::{canonicalize, CanonicalValue, Triple};
use crate::config::{FieldSpec, ReconConfig, SlotPolicy};
use crate::error::Result;
use crate::raw::RawValue;

/// True when two canonical values agree under the field's rules.
///
/// `Missing` only matches `Missing`. Values of a different kind than the
/// field declares never match.
pub fn compare(a: &CanonicalValue, b: &CanonicalValue, spec: &FieldSpec) -> bool {
    match (a, b) {
        (CanonicalValue::Missing, CanonicalValue::Missing) => true,
        (CanonicalValue::Missing, _) | (_, CanonicalValue::Missing) => false,
        _ if a.kind() != Some(spec.kind) || b.kind() != Some(spec.kind) => false,
        (CanonicalValue::NumericTriple(x), CanonicalValue::NumericTriple(y)) => {
            triples_match(x, y, spec.tolerance, spec.slots)
        }
        (CanonicalValue::PinSet(x), CanonicalValue::PinSet(y)) => x == y,
        (CanonicalValue::Text(x), CanonicalValue::Text(y)) => {
            x.trim().to_uppercase() == y.trim().to_uppercase()
        }
        _ => false,
    }
}

/// Canonicalize two raw cells for a named field and compare them.
/// Fails only when the field isn't in the table.
pub fn compare_field(
    config: &ReconConfig,
    field: &str,
    reference: &RawValue,
    candidate: &RawValue,
) -> Result<bool> {
    let spec = config.field(field)?;
    Ok(compare(
        &canonicalize(reference, spec.kind),
        &canonicalize(candidate, spec.kind),
        spec,
    ))
}

fn triples_match(x: &Triple, y: &Triple, tolerance: f64, slots: SlotPolicy) -> bool {
    match slots {
        SlotPolicy::All => x
            .iter()
            .zip(y.iter())
            .all(|(a, b)| slots_match(*a, *b, tolerance)),
        SlotPolicy::Middle => slots_match(x[1], y[1], tolerance),
    }
}

/// Absent matches absent. Numbers match when strictly closer than `tolerance`.
fn slots_match(a: Option<f64>, b: Option<f64>, tolerance: f64) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(x), Some(y)) => x == y || (x - y).abs() < tolerance,
        _ => false,
    }
}
