//! Grouped aggregation.
//!
//! An aggregate groups its child's rows and computes one statistic per
//! group, always exposed as a column named `value`. When the grouping
//! corresponds to a spatial unit the unit is remembered so results can
//! advertise their geometry column, but the unit itself is derived
//! entirely from the group columns and so never enters the fingerprint.

use serde_json::json;

use eventide_error::{ErrorCode, ErrorContext, EventideError, Result};

use crate::graph::NodeId;
use crate::node::Statistic;
use crate::sanitize::validate_identifier;
use crate::spatial::{SpatialUnit, ValueType};

#[derive(Debug, Clone)]
pub struct AggregateParams {
    pub child: NodeId,
    pub group_columns: Vec<String>,
    pub statistic: Statistic,
    /// Column the statistic is computed over; absent only for `count`.
    pub value_column: Option<String>,
    /// Spatial unit the grouping corresponds to, when known. Cosmetic
    /// with respect to the fingerprint.
    pub unit: Option<SpatialUnit>,
}

impl AggregateParams {
    pub fn new(
        child: NodeId,
        group_columns: Vec<String>,
        statistic: Statistic,
        value_column: Option<String>,
    ) -> Result<Self> {
        if group_columns.is_empty() {
            return Err(EventideError::new(
                ErrorCode::InvalidParameter,
                "Aggregate requires at least one group column",
            ));
        }
        for column in &group_columns {
            validate_identifier(column)?;
        }
        match (&value_column, statistic.requires_value_column()) {
            (None, true) => {
                return Err(EventideError::new(
                    ErrorCode::InvalidParameter,
                    format!("Statistic '{}' requires a value column", statistic),
                ))
            }
            (Some(_), false) => {
                return Err(EventideError::new(
                    ErrorCode::InvalidParameter,
                    "Statistic 'count' counts rows and takes no value column",
                ))
            }
            _ => {}
        }
        if let Some(column) = &value_column {
            validate_identifier(column)?;
        }
        Ok(Self {
            child,
            group_columns,
            statistic,
            value_column,
            unit: None,
        })
    }

    /// Convenience constructor grouping by the location columns of a
    /// spatial unit.
    pub fn per_unit(
        child: NodeId,
        unit: SpatialUnit,
        statistic: Statistic,
        value_column: Option<String>,
    ) -> Result<Self> {
        let group_columns = unit
            .location_columns()
            .iter()
            .map(|c| c.to_string())
            .collect();
        let mut params = Self::new(child, group_columns, statistic, value_column)?;
        params.unit = Some(unit);
        Ok(params)
    }

    pub fn output_columns(&self) -> Vec<String> {
        let mut out = self.group_columns.clone();
        out.push("value".to_string());
        out
    }

    /// Type of the `value` column, for result metadata.
    pub fn value_type(&self) -> ValueType {
        self.statistic.value_type()
    }

    /// Check group and value columns against the child's output.
    pub(crate) fn validate_against_child(&self, child_cols: &[String]) -> Result<()> {
        let mut referenced: Vec<&String> = self.group_columns.iter().collect();
        if let Some(column) = &self.value_column {
            referenced.push(column);
        }
        for column in referenced {
            if !child_cols.contains(column) {
                return Err(EventideError::new(
                    ErrorCode::IncompatibleColumns,
                    format!("Aggregate references '{}' which the child does not produce", column),
                )
                .with_context(ErrorContext::IncompatibleColumns {
                    operation: "aggregate".to_string(),
                    left_columns: self.group_columns.clone(),
                    right_columns: child_cols.to_vec(),
                }));
            }
        }
        Ok(())
    }

    pub(crate) fn canonical_params(&self) -> serde_json::Value {
        json!({
            "group_columns": self.group_columns,
            "statistic": self.statistic.to_string(),
            "value_column": self.value_column,
        })
    }

    /// Render over already-rendered child SQL. `having` injects a
    /// distinct-count floor into the grouped query; redaction uses this
    /// so suppressed groups vanish entirely rather than being nulled.
    pub(crate) fn render(&self, child_sql: &str, having: Option<(u32, &str)>) -> String {
        let group = self.group_columns.join(", ");
        let mut sql = format!(
            "SELECT {}, {} AS value FROM ({}) AS agg GROUP BY {}",
            group,
            self.statistic.render(self.value_column.as_deref()),
            child_sql,
            group
        );
        if let Some((threshold, subject)) = having {
            sql.push_str(&format!(
                " HAVING count(DISTINCT {}) > {}",
                subject, threshold
            ));
        }
        sql
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn renders_grouped_count() {
        let agg = AggregateParams::new(
            NodeId::from_index(0),
            cols(&["location_id"]),
            Statistic::Count,
            None,
        )
        .unwrap();
        assert_eq!(
            agg.render("SELECT 1", None),
            "SELECT location_id, count(*) AS value FROM (SELECT 1) AS agg GROUP BY location_id"
        );
        assert_eq!(agg.output_columns(), cols(&["location_id", "value"]));
    }

    #[test]
    fn renders_having_injection() {
        let agg = AggregateParams::new(
            NodeId::from_index(0),
            cols(&["pcod"]),
            Statistic::Count,
            None,
        )
        .unwrap();
        let sql = agg.render("SELECT 1", Some((15, "subscriber")));
        assert!(sql.ends_with("GROUP BY pcod HAVING count(DISTINCT subscriber) > 15"));
    }

    #[test]
    fn per_unit_groups_by_location_columns() {
        let agg = AggregateParams::per_unit(
            NodeId::from_index(0),
            SpatialUnit::VersionedSite,
            Statistic::Count,
            None,
        )
        .unwrap();
        assert_eq!(agg.group_columns, cols(&["site_id", "version"]));
        assert_eq!(agg.unit, Some(SpatialUnit::VersionedSite));
    }

    #[test]
    fn value_column_presence_is_enforced() {
        assert!(AggregateParams::new(
            NodeId::from_index(0),
            cols(&["pcod"]),
            Statistic::Sum,
            None
        )
        .is_err());
        assert!(AggregateParams::new(
            NodeId::from_index(0),
            cols(&["pcod"]),
            Statistic::Count,
            Some("duration".to_string())
        )
        .is_err());
    }

    #[test]
    fn child_column_check() {
        let agg = AggregateParams::new(
            NodeId::from_index(0),
            cols(&["pcod"]),
            Statistic::CountDistinct,
            Some("subscriber".to_string()),
        )
        .unwrap();
        assert!(agg
            .validate_against_child(&cols(&["pcod", "subscriber"]))
            .is_ok());
        let err = agg
            .validate_against_child(&cols(&["location_id", "subscriber"]))
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::IncompatibleColumns);
    }

    #[test]
    fn unit_is_not_fingerprinted() {
        let plain = AggregateParams::new(
            NodeId::from_index(0),
            cols(&["pcod"]),
            Statistic::Count,
            None,
        )
        .unwrap();
        let with_unit = AggregateParams::per_unit(
            NodeId::from_index(0),
            SpatialUnit::Admin(3),
            Statistic::Count,
            None,
        )
        .unwrap();
        assert_eq!(plain.canonical_params(), with_unit.canonical_params());
    }
}
