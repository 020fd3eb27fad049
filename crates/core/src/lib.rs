//! Eventide Core: query graphs, fingerprints and SQL rendering.
//!
//! This crate provides the pure, storage-agnostic half of the Eventide
//! analytics engine. Queries are built up as nodes in a [`QueryGraph`]
//! arena; each inserted node is validated against its children, assigned
//! its output column list, and given a content-addressed [`Fingerprint`]
//! that the runtime uses as its cache identity.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────┐   add()    ┌───────────────┐   render()   ┌─────────┐
//! │ Query    ├───────────►│  QueryGraph   ├─────────────►│  SQL    │
//! │ builders │            │ (arena, DAG)  │              │  text   │
//! └──────────┘            └───────┬───────┘              └─────────┘
//!                                 │
//!                          Fingerprint (sha256)
//! ```

pub mod capability;
pub mod dates;
pub mod fingerprint;
pub mod graph;
pub mod node;
pub mod sanitize;
pub mod spatial;

pub use capability::{HasGraphOutput, HasSpatialOutput};
pub use fingerprint::Fingerprint;
pub use graph::{NodeId, QueryGraph};
pub use node::aggregate::AggregateParams;
pub use node::custom::CustomParams;
pub use node::join::JoinParams;
pub use node::redact::{RedactParams, DEFAULT_REDACTION_THRESHOLD};
pub use node::scan::ScanParams;
pub use node::union::UnionParams;
pub use node::{JoinType, QueryNode, Statistic};
pub use spatial::{SpatialUnit, ValueType};
