//! Output capabilities advertised by node parameter types.
//!
//! Capabilities are small traits that describe what a node's result set
//! offers beyond plain rows. They are queried when shaping protocol
//! payload metadata, never during rendering.

use crate::node::aggregate::AggregateParams;
use crate::node::join::JoinParams;

/// Results carry a location geometry.
pub trait HasSpatialOutput {
    fn geom_column(&self) -> Option<&'static str>;
}

impl HasSpatialOutput for AggregateParams {
    fn geom_column(&self) -> Option<&'static str> {
        self.unit.and_then(|unit| unit.geom_column())
    }
}

/// Results describe directed edges, with the two endpoints
/// distinguished by column prefix.
pub trait HasGraphOutput {
    fn outflow_prefix(&self) -> &str;
    fn inflow_prefix(&self) -> &str;
}

impl HasGraphOutput for JoinParams {
    fn outflow_prefix(&self) -> &str {
        &self.left_prefix
    }

    fn inflow_prefix(&self) -> &str {
        &self.right_prefix
    }
}
