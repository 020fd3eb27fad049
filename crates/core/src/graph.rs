//! Arena-backed query graph.
//!
//! Nodes are appended to an arena and referenced by [`NodeId`]. A node's
//! children must already be in the arena when it is inserted, so ids
//! always point backwards and cycles cannot be expressed. Insertion is
//! where all cross-node validation happens; once a node is in the arena
//! its column list and fingerprint are fixed.

use serde::Serialize;

use eventide_error::{ErrorCode, ErrorContext, EventideError, Result};

use crate::fingerprint::Fingerprint;
use crate::node::QueryNode;

/// Handle to a node within one [`QueryGraph`]. Ids are arena-local and
/// mean nothing across graphs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct NodeId(u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }

    #[cfg(test)]
    pub(crate) fn from_index(index: usize) -> Self {
        NodeId(index as u32)
    }
}

#[derive(Debug)]
struct NodeRecord {
    node: QueryNode,
    columns: Vec<String>,
    fingerprint: Fingerprint,
    label: Option<String>,
}

#[derive(Debug, Default)]
pub struct QueryGraph {
    records: Vec<NodeRecord>,
}

impl QueryGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Insert a node. Children must already be present; the node is
    /// validated against them, and its output columns and fingerprint
    /// are computed once, here.
    pub fn add(&mut self, node: QueryNode) -> Result<NodeId> {
        self.add_labeled(node, None)
    }

    /// Insert a node with a display label. Labels are cosmetic: two
    /// nodes differing only in label share a fingerprint.
    pub fn add_labeled(&mut self, node: QueryNode, label: Option<String>) -> Result<NodeId> {
        for child in node.children() {
            if child.index() >= self.records.len() {
                return Err(EventideError::new(
                    ErrorCode::UnknownChild,
                    format!("Child node {} does not exist in this graph", child.index()),
                )
                .with_hint("Insert children before their parents"));
            }
        }
        let columns = self.validated_columns(&node)?;
        let children = node.children();
        let child_fps: Vec<&Fingerprint> = children
            .iter()
            .map(|c| &self.records[c.index()].fingerprint)
            .collect();
        let fingerprint = Fingerprint::digest(node.kind_tag(), &node.canonical_params(), &child_fps);
        let id = NodeId(self.records.len() as u32);
        self.records.push(NodeRecord {
            node,
            columns,
            fingerprint,
            label,
        });
        Ok(id)
    }

    fn record(&self, id: NodeId) -> Result<&NodeRecord> {
        self.records.get(id.index()).ok_or_else(|| {
            EventideError::new(
                ErrorCode::UnknownChild,
                format!("Node {} does not exist in this graph", id.index()),
            )
        })
    }

    /// Cross-node validation, returning the node's output columns.
    fn validated_columns(&self, node: &QueryNode) -> Result<Vec<String>> {
        match node {
            QueryNode::Scan(p) => Ok(p.output_columns()),
            QueryNode::Custom(p) => Ok(p.columns.clone()),
            QueryNode::Union(p) => {
                let first = &self.records[p.children[0].index()].columns;
                for child in &p.children[1..] {
                    let other = &self.records[child.index()].columns;
                    if other != first {
                        return Err(EventideError::new(
                            ErrorCode::IncompatibleColumns,
                            "Union children must produce identical column lists",
                        )
                        .with_context(ErrorContext::IncompatibleColumns {
                            operation: "union".to_string(),
                            left_columns: first.clone(),
                            right_columns: other.clone(),
                        }));
                    }
                }
                Ok(first.clone())
            }
            QueryNode::Join(p) => {
                let left = &self.records[p.left.index()].columns;
                let right = &self.records[p.right.index()].columns;
                p.output_columns(left, right)
            }
            QueryNode::Aggregate(p) => {
                let child = &self.records[p.child.index()].columns;
                p.validate_against_child(child)?;
                Ok(p.output_columns())
            }
            QueryNode::Redact(p) => {
                let child = &self.records[p.child.index()];
                match &child.node {
                    QueryNode::Aggregate(agg) => {
                        let source = &self.records[agg.child.index()].columns;
                        if !source.contains(&p.subject_column) {
                            return Err(EventideError::new(
                                ErrorCode::InvalidRedactionTarget,
                                format!(
                                    "Redaction subject '{}' is not produced by the aggregated rows",
                                    p.subject_column
                                ),
                            ));
                        }
                        Ok(child.columns.clone())
                    }
                    other => Err(EventideError::new(
                        ErrorCode::InvalidRedactionTarget,
                        format!("Redact wraps aggregates, not '{}' nodes", other.kind_tag()),
                    )
                    .with_hint("Aggregate the rows first, then redact the aggregate")),
                }
            }
        }
    }

    pub fn node(&self, id: NodeId) -> Result<&QueryNode> {
        Ok(&self.record(id)?.node)
    }

    pub fn columns(&self, id: NodeId) -> Result<&[String]> {
        Ok(&self.record(id)?.columns)
    }

    pub fn fingerprint(&self, id: NodeId) -> Result<&Fingerprint> {
        Ok(&self.record(id)?.fingerprint)
    }

    pub fn label(&self, id: NodeId) -> Result<Option<&str>> {
        Ok(self.record(id)?.label.as_deref())
    }

    pub fn cacheable(&self, id: NodeId) -> Result<bool> {
        Ok(self.record(id)?.node.cacheable())
    }

    /// Geometry column the node's results expose, when the node is (or
    /// redacts) a spatially grouped aggregate.
    pub fn geom_column(&self, id: NodeId) -> Result<Option<&'static str>> {
        use crate::capability::HasSpatialOutput;
        match &self.record(id)?.node {
            QueryNode::Aggregate(p) => Ok(p.geom_column()),
            QueryNode::Redact(p) => self.geom_column(p.child),
            _ => Ok(None),
        }
    }

    /// Render the subtree rooted at `id` into a single SQL statement.
    pub fn render(&self, id: NodeId) -> Result<String> {
        let record = self.record(id)?;
        match &record.node {
            QueryNode::Scan(p) => Ok(p.render()),
            QueryNode::Custom(p) => Ok(p.sql.clone()),
            QueryNode::Union(p) => {
                let mut child_sqls = Vec::with_capacity(p.children.len());
                for child in &p.children {
                    child_sqls.push(self.render(*child)?);
                }
                Ok(p.render(&child_sqls))
            }
            QueryNode::Join(p) => {
                let left_sql = self.render(p.left)?;
                let right_sql = self.render(p.right)?;
                let left_cols = &self.records[p.left.index()].columns;
                let right_cols = &self.records[p.right.index()].columns;
                Ok(p.render(&left_sql, &right_sql, left_cols, right_cols))
            }
            QueryNode::Aggregate(p) => {
                let child_sql = self.render(p.child)?;
                Ok(p.render(&child_sql, None))
            }
            QueryNode::Redact(p) => match self.node(p.child)? {
                QueryNode::Aggregate(agg) => {
                    let inner = self.render(agg.child)?;
                    Ok(agg.render(&inner, Some((p.threshold, p.subject_column.as_str()))))
                }
                // Guarded at insertion; an id for a non-aggregate child
                // cannot have been handed out under a redact node.
                _ => Err(EventideError::new(
                    ErrorCode::InvalidRedactionTarget,
                    "Redact child is not an aggregate",
                )),
            },
        }
    }
}
