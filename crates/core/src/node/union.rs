//! Union of column-compatible children.

use serde_json::json;

use eventide_error::{ErrorCode, EventideError, Result};

use crate::graph::NodeId;

#[derive(Debug, Clone)]
pub struct UnionParams {
    pub children: Vec<NodeId>,
    /// `UNION ALL` when true, deduplicating `UNION` otherwise.
    pub all: bool,
}

impl UnionParams {
    pub fn new(children: Vec<NodeId>, all: bool) -> Result<Self> {
        if children.is_empty() {
            return Err(EventideError::new(
                ErrorCode::InvalidParameter,
                "Union requires at least one child",
            ));
        }
        Ok(Self { children, all })
    }

    pub(crate) fn canonical_params(&self) -> serde_json::Value {
        json!({ "all": self.all })
    }

    /// Render from already-rendered child SQL. Children are wrapped in
    /// aliased subselects so the branches stay independent statements.
    pub(crate) fn render(&self, child_sqls: &[String]) -> String {
        let connector = if self.all { " UNION ALL " } else { " UNION " };
        child_sqls
            .iter()
            .enumerate()
            .map(|(i, sql)| format!("SELECT * FROM ({}) AS u{}", sql, i))
            .collect::<Vec<_>>()
            .join(connector)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_union_all() {
        let params = UnionParams::new(vec![NodeId::from_index(0), NodeId::from_index(1)], true)
            .unwrap();
        let sql = params.render(&["SELECT 1".to_string(), "SELECT 2".to_string()]);
        assert_eq!(
            sql,
            "SELECT * FROM (SELECT 1) AS u0 UNION ALL SELECT * FROM (SELECT 2) AS u1"
        );
    }

    #[test]
    fn renders_deduplicating_union() {
        let params = UnionParams::new(vec![NodeId::from_index(0), NodeId::from_index(1)], false)
            .unwrap();
        let sql = params.render(&["SELECT 1".to_string(), "SELECT 2".to_string()]);
        assert!(sql.contains(" UNION SELECT"));
    }

    #[test]
    fn rejects_empty_child_list() {
        assert!(UnionParams::new(vec![], true).is_err());
    }
}
