use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{ReconError, Result};

/// Absolute tolerance used by the accuracy report.
pub const DEFAULT_TOLERANCE: f64 = 1e-3;
/// Absolute tolerance used by the cell highlighter (middle slot only).
pub const STRICT_TOLERANCE: f64 = 1e-6;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ReconConfig {
    pub name: String,
    #[serde(default)]
    pub keys: KeyColumns,
    pub fields: Vec<FieldSpec>,
}

/// Columns the join key is built from. Both sides use the same names.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct KeyColumns {
    pub document: String,
    pub page: String,
}

impl Default for KeyColumns {
    fn default() -> Self {
        Self {
            document: "PDF名称".into(),
            page: "页码".into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Field table
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    NumericTriple,
    PinSet,
    Text,
}

impl std::fmt::Display for FieldKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NumericTriple => write!(f, "numeric_triple"),
            Self::PinSet => write!(f, "pin_set"),
            Self::Text => write!(f, "text"),
        }
    }
}

/// Which slots of a numeric triple take part in the comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotPolicy {
    /// min, nominal and max must all agree.
    #[default]
    All,
    /// Only the nominal (middle) slot is compared.
    Middle,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct FieldSpec {
    /// Field name; also the reference-side column.
    pub name: String,
    /// Candidate-side column when the extractor names it differently.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub candidate_column: Option<String>,
    pub kind: FieldKind,
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
    #[serde(default)]
    pub slots: SlotPolicy,
}

fn default_tolerance() -> f64 {
    DEFAULT_TOLERANCE
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            candidate_column: None,
            kind,
            tolerance: DEFAULT_TOLERANCE,
            slots: SlotPolicy::All,
        }
    }

    pub fn numeric(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::NumericTriple)
    }

    pub fn pin_set(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::PinSet)
    }

    pub fn text(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Text)
    }

    pub fn with_candidate_column(mut self, column: impl Into<String>) -> Self {
        self.candidate_column = Some(column.into());
        self
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn with_slots(mut self, slots: SlotPolicy) -> Self {
        self.slots = slots;
        self
    }

    pub fn reference_column(&self) -> &str {
        &self.name
    }

    pub fn candidate_column(&self) -> &str {
        self.candidate_column.as_deref().unwrap_or(&self.name)
    }
}

// ---------------------------------------------------------------------------
// Built-in table
// ---------------------------------------------------------------------------

const BGA_GEOMETRY_COLUMNS: [&str; 10] = [
    "Pitch x (el)",
    "Pitch y (e)",
    "Number of pins along X",
    "Number of pins along Y",
    "Package Height (A)",
    "Standoff (A1)",
    "Body X (D)",
    "Body Y (E)",
    "Edge Fillet Radius",
    "Ball Diameter Normal (b)",
];

impl ReconConfig {
    /// The BGA extraction table: ten geometry triples, excluded pins and
    /// package type (named `package_type` by the extractor).
    pub fn bga_default() -> Self {
        let mut fields: Vec<FieldSpec> = BGA_GEOMETRY_COLUMNS
            .iter()
            .map(|name| FieldSpec::numeric(*name))
            .collect();
        fields.push(FieldSpec::pin_set("Exclude Pins"));
        fields.push(FieldSpec::text("封装类型").with_candidate_column("package_type"));

        Self {
            name: "BGA package geometry".into(),
            keys: KeyColumns::default(),
            fields,
        }
    }

    /// The highlighter's variant of the BGA table: geometry compared on the
    /// middle slot only, at the strict tolerance.
    pub fn bga_highlight() -> Self {
        let mut config = Self::bga_default();
        config.name = "BGA package geometry (highlight)".into();
        for field in &mut config.fields {
            if field.kind == FieldKind::NumericTriple {
                field.slots = SlotPolicy::Middle;
                field.tolerance = STRICT_TOLERANCE;
            }
        }
        config
    }
}

// ---------------------------------------------------------------------------
// Parse + Validate
// ---------------------------------------------------------------------------

impl ReconConfig {
    pub fn from_toml(input: &str) -> Result<Self> {
        let config: ReconConfig =
            toml::from_str(input).map_err(|e| ReconError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.keys.document.trim().is_empty() || self.keys.page.trim().is_empty() {
            return Err(ReconError::ConfigValidation(
                "key columns must not be empty".into(),
            ));
        }

        if self.fields.is_empty() {
            return Err(ReconError::ConfigValidation(
                "at least one field is required".into(),
            ));
        }

        let mut names = HashSet::new();
        let mut candidate_columns = HashSet::new();
        for field in &self.fields {
            if field.name.trim().is_empty() {
                return Err(ReconError::ConfigValidation("field name must not be empty".into()));
            }
            if !names.insert(field.name.as_str()) {
                return Err(ReconError::ConfigValidation(format!(
                    "duplicate field '{}'",
                    field.name
                )));
            }
            if !candidate_columns.insert(field.candidate_column()) {
                return Err(ReconError::ConfigValidation(format!(
                    "field '{}': candidate column '{}' is already mapped",
                    field.name,
                    field.candidate_column()
                )));
            }
            if !field.tolerance.is_finite() || field.tolerance < 0.0 {
                return Err(ReconError::ConfigValidation(format!(
                    "field '{}': tolerance must be a finite non-negative number, got {}",
                    field.name, field.tolerance
                )));
            }
        }

        Ok(())
    }

    /// Look up a field by name.
    pub fn field(&self, name: &str) -> Result<&FieldSpec> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .ok_or_else(|| ReconError::UnknownField(name.to_string()))
    }

    /// Resolve a subset of fields, keeping table order. Any unknown name fails.
    pub fn select(&self, names: &[String]) -> Result<Vec<&FieldSpec>> {
        for name in names {
            self.field(name)?;
        }
        Ok(self
            .fields
            .iter()
            .filter(|f| names.iter().any(|n| *n == f.name))
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = r#"
name = "BGA check"

[keys]
document = "PDF名称"
page = "页码"

[[fields]]
name = "Pitch x (el)"
kind = "numeric_triple"

[[fields]]
name = "Body X (D)"
kind = "numeric_triple"
tolerance = 0.000001
slots = "middle"

[[fields]]
name = "Exclude Pins"
kind = "pin_set"

[[fields]]
name = "封装类型"
candidate_column = "package_type"
kind = "text"
"#;

    #[test]
    fn parse_valid() {
        let config = ReconConfig::from_toml(VALID).unwrap();
        assert_eq!(config.name, "BGA check");
        assert_eq!(config.fields.len(), 4);

        let pitch = config.field("Pitch x (el)").unwrap();
        assert_eq!(pitch.kind, FieldKind::NumericTriple);
        assert_eq!(pitch.tolerance, DEFAULT_TOLERANCE);
        assert_eq!(pitch.slots, SlotPolicy::All);

        let body = config.field("Body X (D)").unwrap();
        assert_eq!(body.tolerance, STRICT_TOLERANCE);
        assert_eq!(body.slots, SlotPolicy::Middle);

        let package = config.field("封装类型").unwrap();
        assert_eq!(package.reference_column(), "封装类型");
        assert_eq!(package.candidate_column(), "package_type");
    }

    #[test]
    fn keys_default_when_omitted() {
        let input = r#"
name = "No keys"
[[fields]]
name = "Exclude Pins"
kind = "pin_set"
"#;
        let config = ReconConfig::from_toml(input).unwrap();
        assert_eq!(config.keys, KeyColumns::default());
    }

    #[test]
    fn reject_unknown_kind() {
        let input = r#"
name = "Bad"
[[fields]]
name = "Pitch"
kind = "triple"
"#;
        let err = ReconConfig::from_toml(input).unwrap_err();
        assert!(matches!(err, ReconError::ConfigParse(_)));
    }

    #[test]
    fn reject_duplicate_field() {
        let input = r#"
name = "Bad"
[[fields]]
name = "Pitch"
kind = "numeric_triple"
[[fields]]
name = "Pitch"
kind = "text"
"#;
        let err = ReconConfig::from_toml(input).unwrap_err();
        assert!(err.to_string().contains("duplicate field 'Pitch'"));
    }

    #[test]
    fn reject_colliding_candidate_column() {
        let input = r#"
name = "Bad"
[[fields]]
name = "a"
kind = "text"
[[fields]]
name = "b"
candidate_column = "a"
kind = "text"
"#;
        let err = ReconConfig::from_toml(input).unwrap_err();
        assert!(err.to_string().contains("already mapped"));
    }

    #[test]
    fn reject_negative_tolerance() {
        let input = r#"
name = "Bad"
[[fields]]
name = "Pitch"
kind = "numeric_triple"
tolerance = -0.1
"#;
        let err = ReconConfig::from_toml(input).unwrap_err();
        assert!(err.to_string().contains("tolerance"));
    }

    #[test]
    fn reject_empty_field_table() {
        let err = ReconConfig::from_toml("name = \"Empty\"\nfields = []\n").unwrap_err();
        assert!(err.to_string().contains("at least one field"));
    }

    #[test]
    fn unknown_field_is_configuration_error() {
        let config = ReconConfig::bga_default();
        let err = config.field("Lead Count").unwrap_err();
        assert!(matches!(err, ReconError::UnknownField(ref n) if n == "Lead Count"));
    }

    #[test]
    fn select_keeps_table_order() {
        let config = ReconConfig::bga_default();
        let picked = config
            .select(&["Exclude Pins".to_string(), "Pitch x (el)".to_string()])
            .unwrap();
        let names: Vec<_> = picked.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["Pitch x (el)", "Exclude Pins"]);

        assert!(config.select(&["nope".to_string()]).is_err());
    }

    #[test]
    fn bga_tables_are_valid() {
        let config = ReconConfig::bga_default();
        config.validate().unwrap();
        assert_eq!(config.fields.len(), 12);

        let highlight = ReconConfig::bga_highlight();
        highlight.validate().unwrap();
        let pitch = highlight.field("Pitch y (e)").unwrap();
        assert_eq!(pitch.slots, SlotPolicy::Middle);
        assert_eq!(pitch.tolerance, STRICT_TOLERANCE);
        assert_eq!(highlight.field("Exclude Pins").unwrap().tolerance, DEFAULT_TOLERANCE);
    }
}
