//! Ambient execution context.
//!
//! Library callers configure storage, a worker pool and a cache once,
//! then reach the bundle ambiently through a [`ContextBinding`] instead
//! of threading it through every call. A binding holds one primary
//! context, a stack of scoped overrides, and, when constructed for an
//! interactive host, a per-session side table so concurrent notebook
//! kernels can hold distinct contexts.
//!
//! Hosts declare interactivity at construction; the binding never
//! probes its environment.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use eventide_error::{ErrorCode, EventideError, Result};

use crate::cache::CacheCoordinator;
use crate::pool::WorkerPool;
use crate::storage::StorageBackend;

/// Everything needed to run queries: where the data lives, how many
/// builds run at once, and where materialized results are tracked.
#[derive(Clone)]
pub struct ExecutionContext {
    pub storage: Arc<dyn StorageBackend>,
    pub pool: WorkerPool,
    pub cache: Arc<CacheCoordinator>,
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext").finish_non_exhaustive()
    }
}

impl ExecutionContext {
    pub fn new(
        storage: Arc<dyn StorageBackend>,
        pool: WorkerPool,
        cache: Arc<CacheCoordinator>,
    ) -> Self {
        Self {
            storage,
            pool,
            cache,
        }
    }
}

pub struct ContextBinding {
    interactive_host: bool,
    primary: RwLock<Option<Arc<ExecutionContext>>>,
    overrides: RwLock<Vec<Arc<ExecutionContext>>>,
    sessions: RwLock<HashMap<String, Arc<ExecutionContext>>>,
}

impl ContextBinding {
    pub fn new(interactive_host: bool) -> Self {
        Self {
            interactive_host,
            primary: RwLock::new(None),
            overrides: RwLock::new(Vec::new()),
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub fn is_interactive_host(&self) -> bool {
        self.interactive_host
    }

    /// Install the primary context, replacing any previous one.
    pub fn bind(&self, context: Arc<ExecutionContext>) {
        *self.primary.write() = Some(context);
    }

    pub fn unbind(&self) {
        *self.primary.write() = None;
    }

    /// The innermost scoped override, or the primary context.
    pub fn current(&self) -> Result<Arc<ExecutionContext>> {
        if let Some(context) = self.overrides.read().last() {
            return Ok(Arc::clone(context));
        }
        self.primary.read().clone().ok_or_else(|| {
            EventideError::new(ErrorCode::ContextUnbound, "No execution context is bound")
                .with_hint("Bind a context before running queries")
        })
    }

    /// Bind a context for one interactive session. Refused on
    /// non-interactive hosts, where sessions have no meaning.
    pub fn bind_session(&self, session: impl Into<String>, context: Arc<ExecutionContext>) -> Result<()> {
        if !self.interactive_host {
            return Err(EventideError::new(
                ErrorCode::InvalidParameter,
                "Session bindings are only available on interactive hosts",
            ));
        }
        self.sessions.write().insert(session.into(), context);
        Ok(())
    }

    /// Resolve for a session: overrides first, then the session's own
    /// binding, then the primary.
    pub fn current_for_session(&self, session: &str) -> Result<Arc<ExecutionContext>> {
        if let Some(context) = self.overrides.read().last() {
            return Ok(Arc::clone(context));
        }
        if self.interactive_host {
            if let Some(context) = self.sessions.read().get(session) {
                return Ok(Arc::clone(context));
            }
        }
        self.current()
    }

    /// Push a scoped override, restored when the guard drops, including
    /// during unwinding.
    pub fn scoped(&self, context: Arc<ExecutionContext>) -> ContextGuard<'_> {
        self.overrides.write().push(context);
        ContextGuard { binding: self }
    }

    /// Run a closure with a scoped override in place.
    pub fn with_context<R>(&self, context: Arc<ExecutionContext>, f: impl FnOnce() -> R) -> R {
        let _guard = self.scoped(context);
        f()
    }
}

pub struct ContextGuard<'a> {
    binding: &'a ContextBinding,
}

impl Drop for ContextGuard<'_> {
    fn drop(&mut self) {
        self.binding.overrides.write().pop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::SqliteBackend;

    fn context(schema: &str) -> Arc<ExecutionContext> {
        Arc::new(ExecutionContext::new(
            Arc::new(SqliteBackend::open_in_memory().unwrap()),
            WorkerPool::new(2),
            Arc::new(CacheCoordinator::new(schema)),
        ))
    }

    #[test]
    fn unbound_lookup_fails() {
        let binding = ContextBinding::new(false);
        let err = binding.current().unwrap_err();
        assert_eq!(err.code, ErrorCode::ContextUnbound);
    }

    #[test]
    fn bind_and_rebind() {
        let binding = ContextBinding::new(false);
        binding.bind(context("a"));
        assert!(binding.current().is_ok());
        binding.unbind();
        assert!(binding.current().is_err());
    }

    #[test]
    fn scoped_override_shadows_and_restores() {
        let binding = ContextBinding::new(false);
        let primary = context("primary");
        let scoped = context("scoped");
        binding.bind(Arc::clone(&primary));
        {
            let _guard = binding.scoped(Arc::clone(&scoped));
            assert!(Arc::ptr_eq(&binding.current().unwrap(), &scoped));
        }
        assert!(Arc::ptr_eq(&binding.current().unwrap(), &primary));
    }

    #[test]
    fn override_is_restored_on_panic() {
        let binding = ContextBinding::new(false);
        let primary = context("primary");
        binding.bind(Arc::clone(&primary));
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            binding.with_context(context("scoped"), || panic!("boom"));
        }));
        assert!(result.is_err());
        assert!(Arc::ptr_eq(&binding.current().unwrap(), &primary));
    }

    #[test]
    fn sessions_require_an_interactive_host() {
        let server = ContextBinding::new(false);
        assert!(server.bind_session("kernel-1", context("s")).is_err());

        let notebook = ContextBinding::new(true);
        let session = context("session");
        let primary = context("primary");
        notebook.bind(Arc::clone(&primary));
        notebook
            .bind_session("kernel-1", Arc::clone(&session))
            .unwrap();
        assert!(Arc::ptr_eq(
            &notebook.current_for_session("kernel-1").unwrap(),
            &session
        ));
        // Unknown sessions fall back to the primary.
        assert!(Arc::ptr_eq(
            &notebook.current_for_session("kernel-2").unwrap(),
            &primary
        ));
    }
}
