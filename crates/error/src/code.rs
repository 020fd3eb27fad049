use serde::{Deserialize, Serialize};
use std::fmt;

/// Numeric error codes following EVENTIDE-XXXX format.
///
/// ## Code Ranges
/// - **1000-1999**: Construction errors (invalid node parameters, caught at graph-build time)
/// - **2000-2999**: Data errors (requested data not present in storage)
/// - **3000-3999**: Cache errors
/// - **4000-4999**: Execution errors (the storage engine rejected or failed a query)
/// - **5000-5999**: Protocol/internal errors
///
/// Codes are stable across versions (semver contract).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
#[non_exhaustive]
pub enum ErrorCode {
    // === Construction Errors (1000-1999) ===
    /// EVENTIDE-1001: A node parameter failed validation
    InvalidParameter = 1001,
    /// EVENTIDE-1002: A table or column name contains forbidden characters
    InvalidIdentifier = 1002,
    /// EVENTIDE-1003: Subscriber subset provided but empty
    EmptySubscriberSet = 1003,
    /// EVENTIDE-1004: A child node id does not exist in the arena
    UnknownChild = 1004,
    /// EVENTIDE-1005: Statistic name not in the supported set
    UnknownStatistic = 1005,
    /// EVENTIDE-1006: Spatial unit name not in the supported set
    UnknownSpatialUnit = 1006,
    /// EVENTIDE-1007: Child column lists are incompatible for this operation
    IncompatibleColumns = 1007,
    /// EVENTIDE-1008: Node cannot be the target of this wrapper
    InvalidRedactionTarget = 1008,

    // === Data Errors (2000-2999) ===
    /// EVENTIDE-2001: No backing data for any requested date
    MissingDates = 2001,

    // === Cache Errors (3000-3999) ===
    /// EVENTIDE-3001: Two builders raced on the same fingerprint
    CacheConflict = 3001,
    /// EVENTIDE-3002: Node is a trivial pass-through and must not be materialized
    NotCacheable = 3002,

    // === Execution Errors (4000-4999) ===
    /// EVENTIDE-4001: The storage engine rejected or failed the rendered query
    ExecutionFailed = 4001,
    /// EVENTIDE-4002: The storage backend is unreachable
    StorageUnavailable = 4002,

    // === Protocol/Internal Errors (5000-5999) ===
    /// EVENTIDE-5001: Unrecognized protocol action
    UnknownAction = 5001,
    /// EVENTIDE-5002: Unrecognized query state string
    UnknownState = 5002,
    /// EVENTIDE-5003: Request body failed to deserialize
    MalformedRequest = 5003,
    /// EVENTIDE-5004: Query kind not in the dispatch table
    UnknownQueryKind = 5004,
    /// EVENTIDE-5005: Query id not known to the server
    UnknownQueryId = 5005,
    /// EVENTIDE-5006: Execution context accessed while unbound
    ContextUnbound = 5006,

    /// EVENTIDE-9999: Unknown/unclassified error
    Unknown = 9999,
}

impl ErrorCode {
    /// Get the numeric code value
    pub fn as_u16(&self) -> u16 {
        *self as u16
    }

    /// Get the formatted code string (e.g., "EVENTIDE-1001")
    pub fn as_str(&self) -> String {
        format!("EVENTIDE-{:04}", self.as_u16())
    }

    /// Get the error category
    pub fn category(&self) -> ErrorCategory {
        match self.as_u16() {
            1000..=1999 => ErrorCategory::Construction,
            2000..=2999 => ErrorCategory::Data,
            3000..=3999 => ErrorCategory::Cache,
            4000..=4999 => ErrorCategory::Execution,
            5000..=5999 => ErrorCategory::Protocol,
            _ => ErrorCategory::Protocol,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<ErrorCode> for String {
    fn from(code: ErrorCode) -> String {
        code.as_str()
    }
}

impl TryFrom<String> for ErrorCode {
    type Error = String;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        let num: u16 = s
            .strip_prefix("EVENTIDE-")
            .and_then(|n| n.parse().ok())
            .ok_or_else(|| "Invalid format".to_string())?;
        Self::try_from(num).map_err(|_| "Unknown code".to_string())
    }
}

impl TryFrom<u16> for ErrorCode {
    type Error = String;

    fn try_from(n: u16) -> std::result::Result<Self, Self::Error> {
        match n {
            1001 => Ok(Self::InvalidParameter),
            1002 => Ok(Self::InvalidIdentifier),
            1003 => Ok(Self::EmptySubscriberSet),
            1004 => Ok(Self::UnknownChild),
            1005 => Ok(Self::UnknownStatistic),
            1006 => Ok(Self::UnknownSpatialUnit),
            1007 => Ok(Self::IncompatibleColumns),
            1008 => Ok(Self::InvalidRedactionTarget),
            2001 => Ok(Self::MissingDates),
            3001 => Ok(Self::CacheConflict),
            3002 => Ok(Self::NotCacheable),
            4001 => Ok(Self::ExecutionFailed),
            4002 => Ok(Self::StorageUnavailable),
            5001 => Ok(Self::UnknownAction),
            5002 => Ok(Self::UnknownState),
            5003 => Ok(Self::MalformedRequest),
            5004 => Ok(Self::UnknownQueryKind),
            5005 => Ok(Self::UnknownQueryId),
            5006 => Ok(Self::ContextUnbound),
            9999 => Ok(Self::Unknown),
            _ => Err(format!("Unknown error code: {}", n)),
        }
    }
}

/// High-level error category for boundary mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum ErrorCategory {
    Construction,
    Data,
    Cache,
    Execution,
    Protocol,
}
