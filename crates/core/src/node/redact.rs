//! Redaction of small groups.
//!
//! A redact node wraps an aggregate and removes every group supported by
//! fewer distinct subjects than the threshold. The floor is injected as
//! a `HAVING` clause inside the wrapped aggregate, so suppressed groups
//! are absent from the result rather than present with nulled values.

use serde_json::json;

use eventide_error::Result;

use crate::graph::NodeId;
use crate::sanitize::validate_identifier;

/// Groups must be supported by strictly more than this many distinct
/// subjects to survive redaction.
pub const DEFAULT_REDACTION_THRESHOLD: u32 = 15;

pub const DEFAULT_SUBJECT_COLUMN: &str = "subscriber";

#[derive(Debug, Clone)]
pub struct RedactParams {
    /// Child node; must be an aggregate.
    pub child: NodeId,
    pub threshold: u32,
    /// Column counted per group to measure support.
    pub subject_column: String,
}

impl RedactParams {
    pub fn new(child: NodeId) -> Self {
        Self {
            child,
            threshold: DEFAULT_REDACTION_THRESHOLD,
            subject_column: DEFAULT_SUBJECT_COLUMN.to_string(),
        }
    }

    pub fn with_threshold(mut self, threshold: u32) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_subject_column(mut self, column: impl Into<String>) -> Result<Self> {
        let column = column.into();
        validate_identifier(&column)?;
        self.subject_column = column;
        Ok(self)
    }

    pub(crate) fn canonical_params(&self) -> serde_json::Value {
        json!({
            "threshold": self.threshold,
            "subject_column": self.subject_column,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let params = RedactParams::new(NodeId::from_index(0));
        assert_eq!(params.threshold, DEFAULT_REDACTION_THRESHOLD);
        assert_eq!(params.subject_column, "subscriber");
    }

    #[test]
    fn threshold_changes_fingerprint_params() {
        let a = RedactParams::new(NodeId::from_index(0));
        let b = RedactParams::new(NodeId::from_index(0)).with_threshold(20);
        assert_ne!(a.canonical_params(), b.canonical_params());
    }
}
