//! Eventide Runtime: storage backends, execution context and the
//! materialization cache.
//!
//! The runtime is where query graphs meet a database. A
//! [`storage::StorageBackend`] executes rendered SQL; the
//! [`cache::CacheCoordinator`] materializes cacheable results into
//! fingerprint-named tables and guarantees at most one concurrent build
//! per fingerprint; [`context::ContextBinding`] makes a configured
//! [`context::ExecutionContext`] ambiently reachable, the way notebook
//! and server entry points expect.
//!
//! ```text
//! ┌──────────────┐   get_or_build   ┌──────────────────┐
//! │ Execution    ├─────────────────►│ CacheCoordinator │
//! │ Context      │                  │ (one build/fp)   │
//! └──────┬───────┘                  └────────┬─────────┘
//!        │                                   │ materialize
//!        ▼                                   ▼
//!   WorkerPool ──────────────────► StorageBackend (SQL)
//! ```

pub mod cache;
pub mod context;
pub mod pool;
pub mod storage;

pub use cache::{BuildState, CacheCoordinator, CacheEntry};
pub use context::{ContextBinding, ContextGuard, ExecutionContext};
pub use pool::WorkerPool;
pub use storage::{SqliteBackend, StorageBackend};
