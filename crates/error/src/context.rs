//! # Error Contexts
//!
//! Structured metadata for errors to enable programmatic analysis.

use serde::{Deserialize, Serialize};

/// Structured context for machine-readable errors.
///
/// Each variant provides specific fields relevant to that error type.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ErrorContext {
    /// Context for EVENTIDE-1001/1005/1006 (invalid node parameters)
    InvalidParameter {
        parameter: String,
        value: String,
        allowed: Vec<String>,
    },

    /// Context for EVENTIDE-1002 (InvalidIdentifier)
    InvalidIdentifier { identifier: String, reason: String },

    /// Context for EVENTIDE-1007 (IncompatibleColumns)
    IncompatibleColumns {
        operation: String,
        left_columns: Vec<String>,
        right_columns: Vec<String>,
    },

    /// Context for EVENTIDE-2001 (MissingDates)
    MissingDates {
        table: String,
        requested: usize,
        present: usize,
        earliest_present: Option<String>,
        latest_present: Option<String>,
    },

    /// Context for EVENTIDE-3001/3002 (cache errors)
    Cache {
        fingerprint: String,
        state: Option<String>,
    },

    /// Context for EVENTIDE-4001/4002 (execution errors)
    Execution {
        table: Option<String>,
        engine_message: String,
    },

    /// Context for EVENTIDE-5001..5005 (protocol errors)
    Protocol {
        action: Option<String>,
        query_id: Option<String>,
    },

    /// Generic key-value context for extensibility
    Generic {
        #[serde(flatten)]
        data: std::collections::HashMap<String, serde_json::Value>,
    },
}
