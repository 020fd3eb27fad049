//! HTTP surface.
//!
//! Two routes carry the whole protocol: `POST /api/v0/query` takes an
//! action envelope and always answers 200 with a [`ProtocolReply`];
//! `GET /api/v0/get/{query_id}` pages results out, with its HTTP status
//! derived from the reply status and query state. The handlers proper
//! are plain async functions over [`ServerState`] so tests drive them
//! without a socket.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tracing::{info, warn};

use eventide_core::dates::check_dates;
use eventide_core::QueryNode;
use eventide_error::{ErrorCode, EventideError};
use eventide_runtime::{BuildState, ExecutionContext};

use crate::dispatch::{QueryKind, QuerySpec};
use crate::protocol::{http_status, ProtocolReply, ProtocolRequest, QueryState, ReplyStatus};

/// A query the server has accepted, kept so its kind, parameters and
/// result metadata can be recalled by id.
pub struct RegisteredQuery {
    pub kind: QueryKind,
    pub params: Value,
    /// Geometry column the result rows reference, for spatial units
    /// that carry one.
    pub geom_column: Option<&'static str>,
}

pub struct ServerState {
    pub context: Arc<ExecutionContext>,
    pub events_table: String,
    queries: Mutex<HashMap<String, RegisteredQuery>>,
}

impl ServerState {
    pub fn new(context: Arc<ExecutionContext>, events_table: impl Into<String>) -> Self {
        Self {
            context,
            events_table: events_table.into(),
            queries: Mutex::new(HashMap::new()),
        }
    }

    fn register(&self, query_id: &str, kind: QueryKind, params: Value, geom_column: Option<&'static str>) {
        self.queries.lock().insert(
            query_id.to_string(),
            RegisteredQuery {
                kind,
                params,
                geom_column,
            },
        );
    }

    fn registered(&self, query_id: &str) -> Option<(QueryKind, Value)> {
        self.queries
            .lock()
            .get(query_id)
            .map(|q| (q.kind, q.params.clone()))
    }

    fn geom_column(&self, query_id: &str) -> Option<&'static str> {
        self.queries
            .lock()
            .get(query_id)
            .and_then(|q| q.geom_column)
    }

    /// Client-visible state for an id: the live cache entry if there is
    /// one, otherwise `known` for registered ids and `awol` for ids
    /// never seen.
    fn query_state(&self, query_id: &str) -> QueryState {
        if let Some(entry) = self.context.cache.lookup(query_id) {
            return QueryState::from(&entry.state());
        }
        if self.registered(query_id).is_some() {
            QueryState::Known
        } else {
            QueryState::Awol
        }
    }
}

pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/api/v0/query", post(query_handler))
        .route("/api/v0/get/{query_id}", get(result_handler))
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler))
        .with_state(state)
}

async fn query_handler(
    State(state): State<Arc<ServerState>>,
    Json(request): Json<ProtocolRequest>,
) -> Json<ProtocolReply> {
    Json(handle_action(&state, request).await)
}

async fn result_handler(
    State(state): State<Arc<ServerState>>,
    Path(query_id): Path<String>,
) -> (StatusCode, Json<ProtocolReply>) {
    let (status, reply) = get_query_result(&state, &query_id).await;
    (status, Json(reply))
}

async fn health_handler() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn ready_handler() -> Json<Value> {
    Json(json!({ "status": "ready" }))
}

fn error_reply(err: &EventideError, payload: Value) -> ProtocolReply {
    let mut reply = ProtocolReply::error(err.to_string(), payload);
    if let Value::Object(map) = &mut reply.payload {
        map.insert("error_code".to_string(), json!(err.code));
    }
    reply
}

fn unknown_id_reply(query_id: &str) -> ProtocolReply {
    let err = EventideError::new(
        ErrorCode::UnknownQueryId,
        format!("Unknown query id: '{}'", query_id),
    );
    error_reply(
        &err,
        json!({ "query_id": query_id, "query_state": QueryState::Awol }),
    )
}

fn query_id_param(params: &Value) -> Result<String, ProtocolReply> {
    params
        .get("query_id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| {
            ProtocolReply::error("Request is missing a 'query_id' parameter", json!({}))
        })
}

/// Dispatch one protocol action.
pub async fn handle_action(state: &ServerState, request: ProtocolRequest) -> ProtocolReply {
    match request.action.as_str() {
        "ping" => ProtocolReply::success(json!({
            "server": "eventide",
            "version": env!("CARGO_PKG_VERSION"),
        })),
        "run_query" => run_query(state, request.params).await,
        "get_query_kind" => match query_id_param(&request.params) {
            Ok(query_id) => match state.registered(&query_id) {
                Some((kind, _)) => ProtocolReply::success(json!({
                    "query_id": query_id,
                    "query_kind": kind.name(),
                })),
                None => unknown_id_reply(&query_id),
            },
            Err(reply) => reply,
        },
        "get_query_params" => match query_id_param(&request.params) {
            Ok(query_id) => match state.registered(&query_id) {
                Some((_, params)) => ProtocolReply::success(json!({
                    "query_id": query_id,
                    "query_params": params,
                })),
                None => unknown_id_reply(&query_id),
            },
            Err(reply) => reply,
        },
        "get_query_status" => match query_id_param(&request.params) {
            Ok(query_id) => {
                let query_state = state.query_state(&query_id);
                ProtocolReply::success(json!({
                    "query_id": query_id,
                    "query_state": query_state,
                }))
            }
            Err(reply) => reply,
        },
        "get_sql_for_query_result" => match query_id_param(&request.params) {
            Ok(query_id) => sql_for_result(state, &query_id),
            Err(reply) => reply,
        },
        other => {
            warn!(action = other, "unknown protocol action");
            let err = EventideError::new(
                ErrorCode::UnknownAction,
                format!("Action '{}' not known", other),
            );
            error_reply(&err, json!({}))
        }
    }
}

/// Compile, date-check and schedule a query, answering immediately with
/// its id. Polling happens through `get_query_status`.
async fn run_query(state: &ServerState, params: Value) -> ProtocolReply {
    let spec: QuerySpec = match serde_json::from_value(params.clone()) {
        Ok(spec) => spec,
        Err(err) => {
            let err = EventideError::new(
                ErrorCode::MalformedRequest,
                format!("Could not parse query spec: {}", err),
            );
            return error_reply(&err, json!({}));
        }
    };
    let kind = spec.kind();
    let compiled = match spec.compile(&state.events_table) {
        Ok(compiled) => compiled,
        Err(err) => return error_reply(&err, json!({})),
    };

    for scan_id in &compiled.scans {
        let Ok(QueryNode::Scan(scan)) = compiled.graph.node(*scan_id) else {
            continue;
        };
        let available = match state.context.storage.available_dates(&scan.table).await {
            Ok(dates) => dates,
            Err(err) => return error_reply(&err, json!({})),
        };
        if let Err(err) = check_dates(scan, &available) {
            return error_reply(&err, json!({}));
        }
    }

    let entry = match state
        .context
        .cache
        .get_or_build(
            Arc::clone(&state.context.storage),
            &state.context.pool,
            &compiled.graph,
            compiled.root,
        )
        .await
    {
        Ok(entry) => entry,
        Err(err) => return error_reply(&err, json!({})),
    };

    let query_id = entry.fingerprint().to_string();
    // The root is always valid for its own graph.
    let geom_column = compiled.graph.geom_column(compiled.root).unwrap_or_default();
    state.register(&query_id, kind, params, geom_column);
    info!(query_id, kind = kind.name(), "accepted query");
    ProtocolReply::success(json!({ "query_id": query_id }))
}

/// SQL to read a completed result. Anything short of completed is an
/// error reply carrying the current state.
fn sql_for_result(state: &ServerState, query_id: &str) -> ProtocolReply {
    match state.context.cache.lookup(query_id).map(|e| e.state()) {
        Some(BuildState::Completed { table }) => ProtocolReply::success(json!({
            "query_id": query_id,
            "sql": format!("SELECT * FROM {}", table),
        })),
        _ => {
            let query_state = state.query_state(query_id);
            ProtocolReply::error(
                format!("Query '{}' is not completed", query_id),
                json!({ "query_id": query_id, "query_state": query_state }),
            )
        }
    }
}

/// Fetch a completed query's rows, mapping reply status and query state
/// onto the HTTP status.
pub async fn get_query_result(state: &ServerState, query_id: &str) -> (StatusCode, ProtocolReply) {
    let query_state = state.query_state(query_id);
    match state.context.cache.lookup(query_id).map(|e| e.state()) {
        Some(BuildState::Completed { table }) => {
            let sql = format!("SELECT * FROM {}", table);
            match state.context.storage.fetch(&sql).await {
                Ok(rows) => (
                    http_status(ReplyStatus::Success, QueryState::Completed),
                    ProtocolReply::success(json!({
                        "query_id": query_id,
                        "query_result": rows,
                        "geom_column": state.geom_column(query_id),
                    })),
                ),
                // Completed but unreadable is a server-side failure.
                Err(err) => (
                    http_status(ReplyStatus::Error, QueryState::Completed),
                    error_reply(
                        &err,
                        json!({ "query_id": query_id, "query_state": query_state }),
                    ),
                ),
            }
        }
        _ => (
            http_status(ReplyStatus::Error, query_state),
            ProtocolReply::error(
                format!("No result available for query '{}'", query_id),
                json!({ "query_id": query_id, "query_state": query_state }),
            ),
        ),
    }
}
