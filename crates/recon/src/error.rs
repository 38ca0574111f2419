use thiserror::Error;

/// Result alias for fallible engine operations.
pub type Result<T> = std::result::Result<T, ReconError>;

/// Fatal errors. Only misconfiguration ends a run; noisy data never does.
#[derive(Debug, Error)]
pub enum ReconError {
    /// TOML parse / deserialization error.
    #[error("config parse error: {0}")]
    ConfigParse(String),

    /// Structurally valid TOML that describes an unusable field table.
    #[error("config validation error: {0}")]
    ConfigValidation(String),

    /// A comparison was requested for a field the table doesn't define.
    #[error("unknown field '{0}': not present in the field table")]
    UnknownField(String),
}

/// Why a row could not be given a join key. Counted, never raised.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize)]
#[serde(tag = "reason", content = "value", rename_all = "snake_case")]
pub enum KeyError {
    #[error("document identifier is missing or has no alphanumeric characters")]
    MissingIdentifier,

    #[error("page number is missing")]
    MissingPage,

    #[error("cannot parse page number '{0}'")]
    UnparsablePage(String),
}
