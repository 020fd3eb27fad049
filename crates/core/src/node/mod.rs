//! Query node variants and their shared vocabulary.
//!
//! Each variant's parameter struct lives in its own submodule and owns
//! its construction-time validation and (where self-contained) its SQL
//! rendering. Cross-node validation and rendering that needs child
//! output happens in [`crate::graph`].

pub mod aggregate;
pub mod custom;
pub mod join;
pub mod redact;
pub mod scan;
pub mod union;

use std::fmt;
use std::str::FromStr;

use serde_json::Value;

use eventide_error::{ErrorCode, ErrorContext, EventideError};

use crate::graph::NodeId;
use crate::spatial::ValueType;
use aggregate::AggregateParams;
use custom::CustomParams;
use join::JoinParams;
use redact::RedactParams;
use scan::ScanParams;
use union::UnionParams;

/// A single operator in the query graph.
#[derive(Debug, Clone)]
pub enum QueryNode {
    Scan(ScanParams),
    Union(UnionParams),
    Join(JoinParams),
    Aggregate(AggregateParams),
    Redact(RedactParams),
    Custom(CustomParams),
}

impl QueryNode {
    /// Stable tag mixed into the fingerprint digest.
    pub fn kind_tag(&self) -> &'static str {
        match self {
            QueryNode::Scan(_) => "scan",
            QueryNode::Union(_) => "union",
            QueryNode::Join(_) => "join",
            QueryNode::Aggregate(_) => "aggregate",
            QueryNode::Redact(_) => "redact",
            QueryNode::Custom(_) => "custom",
        }
    }

    /// Child node ids, in fingerprint order.
    pub fn children(&self) -> Vec<NodeId> {
        match self {
            QueryNode::Scan(_) | QueryNode::Custom(_) => Vec::new(),
            QueryNode::Union(p) => p.children.clone(),
            QueryNode::Join(p) => vec![p.left, p.right],
            QueryNode::Aggregate(p) => vec![p.child],
            QueryNode::Redact(p) => vec![p.child],
        }
    }

    /// Whether this node's result may be materialized into the cache.
    /// Raw event scans are never cached; custom SQL opts in explicitly.
    pub fn cacheable(&self) -> bool {
        match self {
            QueryNode::Scan(_) => false,
            QueryNode::Custom(p) => p.cacheable,
            _ => true,
        }
    }

    /// Parameters in canonical form for fingerprinting. Cosmetic
    /// attributes never appear here.
    pub fn canonical_params(&self) -> Value {
        match self {
            QueryNode::Scan(p) => p.canonical_params(),
            QueryNode::Union(p) => p.canonical_params(),
            QueryNode::Join(p) => p.canonical_params(),
            QueryNode::Aggregate(p) => p.canonical_params(),
            QueryNode::Redact(p) => p.canonical_params(),
            QueryNode::Custom(p) => p.canonical_params(),
        }
    }
}

/// Aggregation statistic applied to grouped rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Statistic {
    Count,
    CountDistinct,
    Sum,
    Avg,
    Max,
    Min,
    Median,
    Stddev,
    Variance,
}

impl Statistic {
    pub const ALL: &'static [&'static str] = &[
        "count",
        "count_distinct",
        "sum",
        "avg",
        "max",
        "min",
        "median",
        "stddev",
        "variance",
    ];

    /// Whether the statistic operates on a value column. `count` is the
    /// only row-counting statistic.
    pub fn requires_value_column(&self) -> bool {
        !matches!(self, Statistic::Count)
    }

    /// Type of the `value` column this statistic produces.
    pub fn value_type(&self) -> ValueType {
        match self {
            Statistic::Count | Statistic::CountDistinct => ValueType::Integer,
            Statistic::Sum
            | Statistic::Avg
            | Statistic::Max
            | Statistic::Min
            | Statistic::Median
            | Statistic::Stddev
            | Statistic::Variance => ValueType::Float,
        }
    }

    /// Render the aggregate expression. Constructors guarantee a value
    /// column is present whenever the statistic requires one.
    pub(crate) fn render(&self, column: Option<&str>) -> String {
        let col = column.unwrap_or("*");
        match self {
            Statistic::Count => "count(*)".to_string(),
            Statistic::CountDistinct => format!("count(DISTINCT {})", col),
            Statistic::Sum => format!("sum({})", col),
            Statistic::Avg => format!("avg({})", col),
            Statistic::Max => format!("max({})", col),
            Statistic::Min => format!("min({})", col),
            Statistic::Median => {
                format!("percentile_cont(0.5) WITHIN GROUP (ORDER BY {})", col)
            }
            Statistic::Stddev => format!("stddev({})", col),
            Statistic::Variance => format!("variance({})", col),
        }
    }
}

impl fmt::Display for Statistic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Statistic::Count => "count",
            Statistic::CountDistinct => "count_distinct",
            Statistic::Sum => "sum",
            Statistic::Avg => "avg",
            Statistic::Max => "max",
            Statistic::Min => "min",
            Statistic::Median => "median",
            Statistic::Stddev => "stddev",
            Statistic::Variance => "variance",
        };
        f.write_str(name)
    }
}

impl FromStr for Statistic {
    type Err = EventideError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "count" => Ok(Statistic::Count),
            "count_distinct" => Ok(Statistic::CountDistinct),
            "sum" => Ok(Statistic::Sum),
            "avg" => Ok(Statistic::Avg),
            "max" => Ok(Statistic::Max),
            "min" => Ok(Statistic::Min),
            "median" => Ok(Statistic::Median),
            "stddev" => Ok(Statistic::Stddev),
            "variance" => Ok(Statistic::Variance),
            other => Err(EventideError::new(
                ErrorCode::UnknownStatistic,
                format!("Statistic '{}' not known", other),
            )
            .with_context(ErrorContext::InvalidParameter {
                parameter: "statistic".to_string(),
                value: other.to_string(),
                allowed: Statistic::ALL.iter().map(|s| s.to_string()).collect(),
            })),
        }
    }
}

/// Join flavour. Full outer joins are what flow matrices are built on:
/// a subscriber present in only one window still yields a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    Inner,
    Left,
    Full,
}

impl JoinType {
    pub(crate) fn sql(&self) -> &'static str {
        match self {
            JoinType::Inner => "INNER JOIN",
            JoinType::Left => "LEFT OUTER JOIN",
            JoinType::Full => "FULL OUTER JOIN",
        }
    }
}

impl fmt::Display for JoinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JoinType::Inner => "inner",
            JoinType::Left => "left",
            JoinType::Full => "full",
        };
        f.write_str(name)
    }
}

impl FromStr for JoinType {
    type Err = EventideError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "inner" => Ok(JoinType::Inner),
            "left" => Ok(JoinType::Left),
            "full" => Ok(JoinType::Full),
            other => Err(EventideError::new(
                ErrorCode::InvalidParameter,
                format!("Join type '{}' not known", other),
            )
            .with_context(ErrorContext::InvalidParameter {
                parameter: "join_type".to_string(),
                value: other.to_string(),
                allowed: vec!["inner".to_string(), "left".to_string(), "full".to_string()],
            })),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statistic_parsing() {
        assert_eq!("count".parse::<Statistic>().unwrap(), Statistic::Count);
        assert_eq!("median".parse::<Statistic>().unwrap(), Statistic::Median);
        let err = "averge".parse::<Statistic>().unwrap_err();
        assert_eq!(err.code, ErrorCode::UnknownStatistic);
    }

    #[test]
    fn counting_statistics_yield_integers() {
        assert_eq!(Statistic::Count.value_type(), ValueType::Integer);
        assert_eq!(Statistic::CountDistinct.value_type(), ValueType::Integer);
        assert_eq!(Statistic::Avg.value_type(), ValueType::Float);
        assert_eq!(Statistic::Median.value_type(), ValueType::Float);
    }

    #[test]
    fn statistic_rendering() {
        assert_eq!(Statistic::Count.render(None), "count(*)");
        assert_eq!(
            Statistic::CountDistinct.render(Some("subscriber")),
            "count(DISTINCT subscriber)"
        );
        assert_eq!(
            Statistic::Median.render(Some("duration")),
            "percentile_cont(0.5) WITHIN GROUP (ORDER BY duration)"
        );
    }

    #[test]
    fn join_type_parsing() {
        assert_eq!("full".parse::<JoinType>().unwrap(), JoinType::Full);
        assert!("cross".parse::<JoinType>().is_err());
    }
}
