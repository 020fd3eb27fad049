//! Two-way joins over shared key columns.
//!
//! Joins use `USING` semantics: the key columns appear once in the
//! output, and the remaining columns of each side are exposed under
//! optional prefixes so both sides can carry the same column names
//! (e.g. `pcod` becoming `from_pcod` and `to_pcod` in a flow matrix).

use serde_json::json;

use eventide_error::{ErrorCode, ErrorContext, EventideError, Result};

use crate::graph::NodeId;
use crate::node::JoinType;
use crate::sanitize::validate_identifier;

#[derive(Debug, Clone)]
pub struct JoinParams {
    pub left: NodeId,
    pub right: NodeId,
    /// Key columns, present in both children.
    pub on: Vec<String>,
    pub join_type: JoinType,
    /// Prefix applied to non-key left columns. Empty means bare.
    pub left_prefix: String,
    /// Prefix applied to non-key right columns. Empty means bare.
    pub right_prefix: String,
}

impl JoinParams {
    pub fn new(left: NodeId, right: NodeId, on: Vec<String>, join_type: JoinType) -> Result<Self> {
        if on.is_empty() {
            return Err(EventideError::new(
                ErrorCode::InvalidParameter,
                "Join requires at least one key column",
            ));
        }
        for column in &on {
            validate_identifier(column)?;
        }
        Ok(Self {
            left,
            right,
            on,
            join_type,
            left_prefix: String::new(),
            right_prefix: String::new(),
        })
    }

    pub fn with_prefixes(
        mut self,
        left_prefix: impl Into<String>,
        right_prefix: impl Into<String>,
    ) -> Result<Self> {
        let left_prefix = left_prefix.into();
        let right_prefix = right_prefix.into();
        for prefix in [&left_prefix, &right_prefix] {
            if !prefix.is_empty() {
                validate_identifier(prefix)?;
            }
        }
        self.left_prefix = left_prefix;
        self.right_prefix = right_prefix;
        Ok(self)
    }

    pub(crate) fn canonical_params(&self) -> serde_json::Value {
        json!({
            "on": self.on,
            "join_type": self.join_type.to_string(),
            "left_prefix": self.left_prefix,
            "right_prefix": self.right_prefix,
        })
    }

    fn incompatible(&self, reason: &str, left: &[String], right: &[String]) -> EventideError {
        EventideError::new(ErrorCode::IncompatibleColumns, reason.to_string()).with_context(
            ErrorContext::IncompatibleColumns {
                operation: "join".to_string(),
                left_columns: left.to_vec(),
                right_columns: right.to_vec(),
            },
        )
    }

    /// Output column list: key columns first, then prefixed non-key
    /// columns of each side. Fails when a key column is absent from
    /// either side or the combined list contains duplicates.
    pub(crate) fn output_columns(
        &self,
        left_cols: &[String],
        right_cols: &[String],
    ) -> Result<Vec<String>> {
        for key in &self.on {
            if !left_cols.contains(key) || !right_cols.contains(key) {
                return Err(self.incompatible(
                    &format!("Join key '{}' is not present in both children", key),
                    left_cols,
                    right_cols,
                ));
            }
        }
        let mut out = self.on.clone();
        for col in left_cols.iter().filter(|c| !self.on.contains(c)) {
            out.push(format!("{}{}", self.left_prefix, col));
        }
        for col in right_cols.iter().filter(|c| !self.on.contains(c)) {
            out.push(format!("{}{}", self.right_prefix, col));
        }
        let mut seen = std::collections::HashSet::new();
        for col in &out {
            if !seen.insert(col) {
                return Err(self.incompatible(
                    &format!("Join output column '{}' is ambiguous", col),
                    left_cols,
                    right_cols,
                ));
            }
        }
        Ok(out)
    }

    pub(crate) fn render(
        &self,
        left_sql: &str,
        right_sql: &str,
        left_cols: &[String],
        right_cols: &[String],
    ) -> String {
        let mut select = self.on.clone();
        for col in left_cols.iter().filter(|c| !self.on.contains(c)) {
            select.push(format!("l.{} AS {}{}", col, self.left_prefix, col));
        }
        for col in right_cols.iter().filter(|c| !self.on.contains(c)) {
            select.push(format!("r.{} AS {}{}", col, self.right_prefix, col));
        }
        format!(
            "SELECT {} FROM ({}) AS l {} ({}) AS r USING ({})",
            select.join(", "),
            left_sql,
            self.join_type.sql(),
            right_sql,
            self.on.join(", ")
        )
    }
}
