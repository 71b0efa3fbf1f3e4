//! Structured error types for the marsi descriptor engine.

use thiserror::Error;

/// Unified error type for all marsi operations.
///
/// Every variant carries a human-readable message. Errors are surfaced to the
/// caller as-is; nothing in the engine retries.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MarsiError {
    /// Malformed molecule text (SMILES, InChI, MOL block)
    #[error("parse error: {0}")]
    Parse(String),

    /// 3-D coordinate generation or force-field relaxation failed
    #[error("embedding error: {0}")]
    Embedding(String),

    /// A molecule could not be written to the requested representation
    #[error("conversion error: {0}")]
    Conversion(String),

    /// Unknown format, fingerprint type, or force-field name
    #[error("invalid format: {0}")]
    InvalidFormat(String),

    /// Point set cannot enclose a volume (too few or coplanar points)
    #[error("degenerate geometry: {0}")]
    DegenerateGeometry(String),

    /// Descriptor requested for a molecule with no atoms
    #[error("empty molecule: {0}")]
    EmptyMolecule(String),

    /// Required metadata field is absent on the molecule record
    #[error("missing field: {0}")]
    MissingField(String),

    /// Invalid input (bad arguments, mismatched lengths, out-of-range values)
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

/// Convenience alias used throughout marsi.
pub type Result<T> = std::result::Result<T, MarsiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_kind_and_message() {
        let err = MarsiError::MissingField("DRUGBANK_ID".into());
        assert_eq!(err.to_string(), "missing field: DRUGBANK_ID");
        let err = MarsiError::DegenerateGeometry("3 points".into());
        assert!(err.to_string().starts_with("degenerate geometry"));
    }

    #[test]
    fn errors_compare_by_value() {
        assert_eq!(
            MarsiError::InvalidFormat("xyz".into()),
            MarsiError::InvalidFormat("xyz".into())
        );
        assert_ne!(
            MarsiError::Parse("a".into()),
            MarsiError::Conversion("a".into())
        );
    }
}
