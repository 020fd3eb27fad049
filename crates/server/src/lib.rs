//! Eventide Server: the HTTP API layer.
//!
//! Exposes the query engine via:
//! - **POST /api/v0/query**: protocol actions (run, poll, introspect).
//! - **GET /api/v0/get/{query_id}**: completed result rows.
//! - **GET /health, /ready**: liveness probes.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use eventide_common::config::AppConfig;
use eventide_common::telemetry::init_tracing;
use eventide_runtime::{
    CacheCoordinator, ContextBinding, ExecutionContext, SqliteBackend, StorageBackend, WorkerPool,
};

pub mod api;
pub mod dispatch;
pub mod protocol;

pub use api::{handle_action, get_query_result, ServerState};
pub use dispatch::{QueryKind, QuerySpec};
pub use protocol::{ProtocolReply, ProtocolRequest, QueryState, ReplyStatus};

pub struct EventideServer {
    config_path: String,
    storage: Option<Arc<dyn StorageBackend>>,
    log_dir: Option<String>,
}

impl Default for EventideServer {
    fn default() -> Self {
        Self {
            config_path: "config/eventide.yaml".to_string(),
            storage: None,
            log_dir: Some("logs".to_string()),
        }
    }
}

impl EventideServer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, config_path: &str) -> Self {
        self.config_path = config_path.to_string();
        self
    }

    /// Supply a storage backend instead of opening the configured one.
    pub fn with_storage(mut self, storage: Arc<dyn StorageBackend>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn with_log_dir(mut self, log_dir: Option<String>) -> Self {
        self.log_dir = log_dir;
        self
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let config = AppConfig::from_file(&self.config_path).unwrap_or_default();
        init_tracing(self.log_dir.as_deref().map(Path::new))?;

        let storage: Arc<dyn StorageBackend> = match self.storage {
            Some(storage) => storage,
            None => Arc::new(
                SqliteBackend::open(&config.storage.url)
                    .context("Failed to open storage backend")?,
            ),
        };
        let context = Arc::new(ExecutionContext::new(
            storage,
            WorkerPool::new(config.pool.workers),
            Arc::new(CacheCoordinator::new(config.cache.schema.clone())),
        ));

        // Same binding entry point notebook embeddings use; session
        // bindings stay disabled unless the config enables them.
        let binding = ContextBinding::new(config.interactive_host);
        binding.bind(Arc::clone(&context));
        let context = binding.current()?;

        let state = Arc::new(ServerState::new(context, config.storage.events_table.clone()));
        let app = api::router(state);

        let addr: SocketAddr = config.server.listen_addr.parse()?;
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .context(format!("Failed to bind to {}", addr))?;
        info!(
            name = %config.server.name,
            %addr,
            workers = config.pool.workers,
            "API server listening"
        );
        axum::serve(listener, app).await?;
        Ok(())
    }
}
