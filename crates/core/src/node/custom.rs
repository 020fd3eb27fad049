//! Escape hatch for hand-written SQL leaves.
//!
//! A custom node carries a verbatim SQL statement and a declared column
//! list. It is not cacheable unless it opts in, since the engine cannot
//! see whether the statement is deterministic.

use serde_json::json;

use eventide_error::{ErrorCode, EventideError, Result};

use crate::sanitize::validate_identifier;

#[derive(Debug, Clone)]
pub struct CustomParams {
    pub sql: String,
    /// Columns the statement produces, in order.
    pub columns: Vec<String>,
    pub cacheable: bool,
}

impl CustomParams {
    pub fn new(sql: impl Into<String>, columns: Vec<String>) -> Result<Self> {
        let sql = sql.into();
        if sql.trim().is_empty() {
            return Err(EventideError::new(
                ErrorCode::InvalidParameter,
                "Custom SQL must not be empty",
            ));
        }
        if columns.is_empty() {
            return Err(EventideError::new(
                ErrorCode::InvalidParameter,
                "Custom node must declare its output columns",
            ));
        }
        for column in &columns {
            validate_identifier(column)?;
        }
        Ok(Self {
            sql,
            columns,
            cacheable: false,
        })
    }

    pub fn with_cacheable(mut self, cacheable: bool) -> Self {
        self.cacheable = cacheable;
        self
    }

    /// Cacheability affects where results live, never which rows come
    /// back, so it stays out of the fingerprint.
    pub(crate) fn canonical_params(&self) -> serde_json::Value {
        json!({
            "sql": self.sql,
            "columns": self.columns,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declares_columns() {
        let params = CustomParams::new(
            "SELECT location_id, pcod FROM geography.admin3",
            vec!["location_id".to_string(), "pcod".to_string()],
        )
        .unwrap();
        assert!(!params.cacheable);
        assert_eq!(params.columns.len(), 2);
    }

    #[test]
    fn rejects_empty_sql_and_columns() {
        assert!(CustomParams::new("  ", vec!["a".to_string()]).is_err());
        assert!(CustomParams::new("SELECT 1", vec![]).is_err());
    }

    #[test]
    fn cacheable_flag_is_not_fingerprinted() {
        let a = CustomParams::new("SELECT 1", vec!["one".to_string()]).unwrap();
        let b = a.clone().with_cacheable(true);
        assert_eq!(a.canonical_params(), b.canonical_params());
    }
}
