//! Query kinds and their compilation into graphs.
//!
//! A [`QuerySpec`] is the wire-level description of a query. Compiling
//! one produces a [`QueryGraph`] whose root is always a redacted
//! aggregate, so nothing reachable from the API can expose unredacted
//! or per-subscriber rows.

use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use eventide_core::{
    AggregateParams, CustomParams, HasGraphOutput, JoinParams, JoinType, NodeId, QueryGraph,
    QueryNode, RedactParams, ScanParams, SpatialUnit, Statistic, UnionParams,
};
use eventide_error::{ErrorCode, ErrorContext, EventideError, Result};

/// Queries the server knows how to compile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryKind {
    LocationEventCounts,
    UniqueSubscriberCounts,
    Flows,
}

impl QueryKind {
    pub const ALL: [QueryKind; 3] = [
        QueryKind::LocationEventCounts,
        QueryKind::UniqueSubscriberCounts,
        QueryKind::Flows,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            QueryKind::LocationEventCounts => "location_event_counts",
            QueryKind::UniqueSubscriberCounts => "unique_subscriber_counts",
            QueryKind::Flows => "flows",
        }
    }
}

impl FromStr for QueryKind {
    type Err = EventideError;

    fn from_str(s: &str) -> Result<Self> {
        QueryKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| {
                EventideError::new(
                    ErrorCode::UnknownQueryKind,
                    format!("Query kind '{}' not known", s),
                )
                .with_context(ErrorContext::InvalidParameter {
                    parameter: "query_kind".to_string(),
                    value: s.to_string(),
                    allowed: QueryKind::ALL.iter().map(|k| k.name().to_string()).collect(),
                })
            })
    }
}

/// A single observation window aggregated to a spatial unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowedUnitParams {
    pub start_date: NaiveDate,
    /// Exclusive.
    pub end_date: NaiveDate,
    pub aggregation_unit: String,
    #[serde(default)]
    pub event_table: Option<String>,
    #[serde(default)]
    pub event_tables: Option<Vec<String>>,
    #[serde(default)]
    pub subscriber_subset: Option<Vec<String>>,
    #[serde(default)]
    pub redaction_threshold: Option<u32>,
}

/// Two observation windows whose per-subscriber locations are joined
/// into a directed flow matrix.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowsParams {
    pub from_start_date: NaiveDate,
    pub from_end_date: NaiveDate,
    pub to_start_date: NaiveDate,
    pub to_end_date: NaiveDate,
    pub aggregation_unit: String,
    #[serde(default)]
    pub event_table: Option<String>,
    #[serde(default)]
    pub subscriber_subset: Option<Vec<String>>,
    #[serde(default)]
    pub redaction_threshold: Option<u32>,
}

/// Wire-level query description, tagged by kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "query_kind", rename_all = "snake_case")]
pub enum QuerySpec {
    LocationEventCounts(WindowedUnitParams),
    UniqueSubscriberCounts(WindowedUnitParams),
    Flows(FlowsParams),
}

/// A compiled spec: the graph, its redacted root, and the scan leaves
/// so callers can run calendar-date availability checks.
pub struct CompiledQuery {
    pub graph: QueryGraph,
    pub root: NodeId,
    pub scans: Vec<NodeId>,
}

const EVENT_COLUMNS: [&str; 3] = ["msisdn", "datetime", "location_id"];

fn window_scan(
    table: &str,
    start: NaiveDate,
    end: NaiveDate,
    subset: &Option<Vec<String>>,
) -> Result<ScanParams> {
    let start = start.and_hms_opt(0, 0, 0).ok_or_else(|| {
        EventideError::new(ErrorCode::InvalidParameter, "Date is out of range")
    })?;
    let end = end.and_hms_opt(0, 0, 0).ok_or_else(|| {
        EventideError::new(ErrorCode::InvalidParameter, "Date is out of range")
    })?;
    let mut scan = ScanParams::new(
        table,
        start,
        end,
        EVENT_COLUMNS.iter().map(|c| c.to_string()).collect(),
    )?;
    if let Some(subset) = subset {
        scan = scan.with_subscriber_subset(subset.clone())?;
    }
    Ok(scan)
}

/// Mapping from raw cell identifiers to the unit's location columns,
/// when the unit is not the raw cell itself.
fn unit_mapping(unit: SpatialUnit) -> Result<Option<CustomParams>> {
    let (sql, columns) = match unit {
        SpatialUnit::Cell => return Ok(None),
        SpatialUnit::Admin(level) => (
            format!("SELECT location_id, pcod FROM geography.admin{}", level),
            vec!["location_id", "pcod"],
        ),
        SpatialUnit::VersionedCell => (
            "SELECT id AS location_id, version FROM infrastructure.cells".to_string(),
            vec!["location_id", "version"],
        ),
        SpatialUnit::VersionedSite => (
            "SELECT id AS location_id, version, site_id FROM infrastructure.cells".to_string(),
            vec!["location_id", "version", "site_id"],
        ),
        SpatialUnit::Lonlat => (
            "SELECT id AS location_id, lon, lat FROM infrastructure.cells".to_string(),
            vec!["location_id", "lon", "lat"],
        ),
    };
    CustomParams::new(sql, columns.iter().map(|c| c.to_string()).collect()).map(Some)
}

/// Scan one window, joined onto the unit's location columns when the
/// unit needs a mapping table. Returns the node carrying
/// `subscriber` plus the unit's location columns.
fn located_events(
    graph: &mut QueryGraph,
    scan: ScanParams,
    unit: SpatialUnit,
    scans: &mut Vec<NodeId>,
) -> Result<NodeId> {
    let scan_id = graph.add(QueryNode::Scan(scan))?;
    scans.push(scan_id);
    let Some(mapping) = unit_mapping(unit)? else {
        return Ok(scan_id);
    };
    let mapping_id = graph.add(QueryNode::Custom(mapping))?;
    graph.add(QueryNode::Join(JoinParams::new(
        scan_id,
        mapping_id,
        vec!["location_id".to_string()],
        JoinType::Inner,
    )?))
}

fn redacted(
    graph: &mut QueryGraph,
    child: NodeId,
    threshold: Option<u32>,
) -> Result<NodeId> {
    let mut params = RedactParams::new(child);
    if let Some(threshold) = threshold {
        params = params.with_threshold(threshold);
    }
    graph.add(QueryNode::Redact(params))
}

fn compile_windowed(
    params: &WindowedUnitParams,
    statistic: Statistic,
    value_column: Option<String>,
    default_table: &str,
) -> Result<CompiledQuery> {
    let unit: SpatialUnit = params.aggregation_unit.parse()?;
    let mut graph = QueryGraph::new();
    let mut scans = Vec::new();

    // Multiple event tables union into one stream before aggregation.
    let tables: Vec<String> = match (&params.event_tables, &params.event_table) {
        (Some(tables), _) if !tables.is_empty() => tables.clone(),
        (_, Some(table)) => vec![table.clone()],
        _ => vec![default_table.to_string()],
    };
    let mut located = Vec::with_capacity(tables.len());
    for table in &tables {
        let scan = window_scan(
            table,
            params.start_date,
            params.end_date,
            &params.subscriber_subset,
        )?;
        located.push(located_events(&mut graph, scan, unit, &mut scans)?);
    }
    let events = if located.len() == 1 {
        located[0]
    } else {
        graph.add(QueryNode::Union(UnionParams::new(located, true)?))?
    };

    let aggregate = graph.add(QueryNode::Aggregate(AggregateParams::per_unit(
        events,
        unit,
        statistic,
        value_column,
    )?))?;
    let root = redacted(&mut graph, aggregate, params.redaction_threshold)?;
    Ok(CompiledQuery { graph, root, scans })
}

fn compile_flows(params: &FlowsParams, default_table: &str) -> Result<CompiledQuery> {
    let unit: SpatialUnit = params.aggregation_unit.parse()?;
    let table = params
        .event_table
        .clone()
        .unwrap_or_else(|| default_table.to_string());
    let mut graph = QueryGraph::new();
    let mut scans = Vec::new();

    // Per window: events per subscriber per location.
    let mut sides = Vec::with_capacity(2);
    for (start, end) in [
        (params.from_start_date, params.from_end_date),
        (params.to_start_date, params.to_end_date),
    ] {
        let scan = window_scan(&table, start, end, &params.subscriber_subset)?;
        let events = located_events(&mut graph, scan, unit, &mut scans)?;
        let mut group = vec!["subscriber".to_string()];
        group.extend(unit.location_columns().iter().map(|c| c.to_string()));
        sides.push(graph.add(QueryNode::Aggregate(AggregateParams::new(
            events,
            group,
            Statistic::Count,
            None,
        )?))?);
    }

    let join_params = JoinParams::new(
        sides[0],
        sides[1],
        vec!["subscriber".to_string()],
        JoinType::Inner,
    )?
    .with_prefixes("from_", "to_")?;

    // Directed edge counts: distinct subscribers per location pair,
    // the endpoints named by the join's advertised edge prefixes.
    let mut group = Vec::new();
    for prefix in [join_params.outflow_prefix(), join_params.inflow_prefix()] {
        for column in unit.location_columns() {
            group.push(format!("{}{}", prefix, column));
        }
    }
    let join = graph.add(QueryNode::Join(join_params))?;
    let aggregate = graph.add(QueryNode::Aggregate(AggregateParams::new(
        join,
        group,
        Statistic::CountDistinct,
        Some("subscriber".to_string()),
    )?))?;
    let root = redacted(&mut graph, aggregate, params.redaction_threshold)?;
    Ok(CompiledQuery { graph, root, scans })
}

impl QuerySpec {
    pub fn kind(&self) -> QueryKind {
        match self {
            QuerySpec::LocationEventCounts(_) => QueryKind::LocationEventCounts,
            QuerySpec::UniqueSubscriberCounts(_) => QueryKind::UniqueSubscriberCounts,
            QuerySpec::Flows(_) => QueryKind::Flows,
        }
    }

    /// Compile into a graph rooted at a redacted aggregate.
    pub fn compile(&self, default_table: &str) -> Result<CompiledQuery> {
        match self {
            QuerySpec::LocationEventCounts(params) => {
                compile_windowed(params, Statistic::Count, None, default_table)
            }
            QuerySpec::UniqueSubscriberCounts(params) => compile_windowed(
                params,
                Statistic::CountDistinct,
                Some("subscriber".to_string()),
                default_table,
            ),
            QuerySpec::Flows(params) => compile_flows(params, default_table),
        }
    }
}
