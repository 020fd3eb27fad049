//! Poll-based query protocol types.
//!
//! Clients submit an action and poll for state; the reply body always
//! carries a status and a JSON payload, and the HTTP status of the
//! result endpoint is a pure function of (reply status, query state).

use std::fmt;
use std::str::FromStr;

use axum::http::StatusCode;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

use eventide_error::{ErrorCode, ErrorContext, EventideError};
use eventide_runtime::BuildState;

/// Client-visible state of a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryState {
    Queued,
    Executing,
    Completed,
    Errored,
    Cancelled,
    /// The query has been seen before but holds no live cache entry.
    Known,
    /// Nothing is known about this query id.
    Awol,
}

impl QueryState {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryState::Queued => "queued",
            QueryState::Executing => "executing",
            QueryState::Completed => "completed",
            QueryState::Errored => "errored",
            QueryState::Cancelled => "cancelled",
            QueryState::Known => "known",
            QueryState::Awol => "awol",
        }
    }
}

impl fmt::Display for QueryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueryState {
    type Err = EventideError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(QueryState::Queued),
            "executing" => Ok(QueryState::Executing),
            "completed" => Ok(QueryState::Completed),
            "errored" => Ok(QueryState::Errored),
            "cancelled" => Ok(QueryState::Cancelled),
            "known" => Ok(QueryState::Known),
            "awol" => Ok(QueryState::Awol),
            other => Err(EventideError::new(
                ErrorCode::UnknownState,
                format!("Query state '{}' not known", other),
            )
            .with_context(ErrorContext::Protocol {
                action: None,
                query_id: None,
            })),
        }
    }
}

impl Serialize for QueryState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl From<&BuildState> for QueryState {
    fn from(state: &BuildState) -> Self {
        match state {
            BuildState::Queued => QueryState::Queued,
            BuildState::Executing => QueryState::Executing,
            BuildState::Completed { .. } => QueryState::Completed,
            BuildState::Errored { .. } => QueryState::Errored,
            BuildState::Cancelled => QueryState::Cancelled,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplyStatus {
    Success,
    Error,
}

/// One protocol request: an action name plus action-specific params.
#[derive(Debug, Clone, Deserialize)]
pub struct ProtocolRequest {
    pub action: String,
    #[serde(default)]
    pub params: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProtocolReply {
    pub status: ReplyStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub msg: Option<String>,
    pub payload: Value,
}

impl ProtocolReply {
    pub fn success(payload: Value) -> Self {
        Self {
            status: ReplyStatus::Success,
            msg: None,
            payload,
        }
    }

    pub fn error(msg: impl Into<String>, payload: Value) -> Self {
        Self {
            status: ReplyStatus::Error,
            msg: Some(msg.into()),
            payload,
        }
    }
}

/// HTTP status for the result endpoint. Rows come back only for a
/// successful completed reply; a completed query whose rows could not
/// be produced is a server-side failure.
pub fn http_status(status: ReplyStatus, state: QueryState) -> StatusCode {
    match (status, state) {
        (ReplyStatus::Success, QueryState::Completed) => StatusCode::OK,
        (_, QueryState::Queued | QueryState::Executing) => StatusCode::ACCEPTED,
        (_, QueryState::Awol | QueryState::Known) => StatusCode::NOT_FOUND,
        (_, QueryState::Errored | QueryState::Cancelled) => StatusCode::FORBIDDEN,
        (ReplyStatus::Error, QueryState::Completed) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
