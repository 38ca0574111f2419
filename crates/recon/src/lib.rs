//! `pkgspec-recon` — reconciliation of extracted package-specification records.
//!
//! Pure engine crate: receives pre-loaded reference and candidate rows,
//! returns per-field, per-row and per-dataset discrepancy statistics.
//! No CLI or IO dependencies; reading and writing sheets is the caller's job.

pub mod aggregate;
pub mod canonical;
pub mod compare;
pub mod config;
pub mod engine;
pub mod error;
pub mod key;
pub mod matcher;
pub mod model;
pub mod raw;
pub mod report;

pub use canonical::{canonicalize, CanonicalValue};
pub use compare::{compare, compare_field};
pub use config::{FieldKind, FieldSpec, ReconConfig, SlotPolicy};
pub use engine::{reconcile, reconcile_against_reference, reconcile_candidates, ReconOptions};
pub use error::{KeyError, ReconError};
pub use key::{normalize_key, JoinKey};
pub use model::{JoinAnchor, MissingColumn, ReconResult, RowOutcome};
pub use raw::{RawValue, Record};
pub use report::{AnnotatedTable, Summary};
