//! Statement options, fetch directions and capabilities.

use crate::channel::messages::ResultSetType;
use crate::error::QueryError;

/// Fetch direction hint.
///
/// The numeric codes match the values exchanged by database APIs
/// (`FETCH_FORWARD = 1000`, `FETCH_REVERSE = 1001`, `FETCH_UNKNOWN = 1002`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FetchDirection {
    /// Rows are processed first to last
    #[default]
    Forward,
    /// Rows are processed last to first
    Reverse,
    /// Processing order is unknown
    Unknown,
}

impl FetchDirection {
    /// Numeric code of the forward direction.
    pub const FORWARD_CODE: i32 = 1000;
    /// Numeric code of the reverse direction.
    pub const REVERSE_CODE: i32 = 1001;
    /// Numeric code of the unknown direction.
    pub const UNKNOWN_CODE: i32 = 1002;

    /// Get the numeric code.
    pub fn code(&self) -> i32 {
        match self {
            FetchDirection::Forward => Self::FORWARD_CODE,
            FetchDirection::Reverse => Self::REVERSE_CODE,
            FetchDirection::Unknown => Self::UNKNOWN_CODE,
        }
    }
}

impl From<FetchDirection> for i32 {
    fn from(direction: FetchDirection) -> Self {
        direction.code()
    }
}

impl TryFrom<i32> for FetchDirection {
    type Error = QueryError;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        match code {
            Self::FORWARD_CODE => Ok(FetchDirection::Forward),
            Self::REVERSE_CODE => Ok(FetchDirection::Reverse),
            Self::UNKNOWN_CODE => Ok(FetchDirection::Unknown),
            other => Err(QueryError::invalid_argument(
                "fetchDirection",
                format!("{} is not a valid fetch direction", other),
            )),
        }
    }
}

/// Optional statement capabilities that callers can check before use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Retrieval of the execution plan of the last execution
    ExecutionPlan,
    /// Queued batch execution
    BatchExecution,
    /// Multiple results from one execution
    MultipleResults,
    /// Scroll-insensitive cursors
    ScrollInsensitiveCursors,
    /// Reverse fetch direction
    ReverseFetch,
    /// Statement pooling
    Pooling,
    /// Cancelling a running execution
    Cancel,
}

/// Mutable statement configuration, validated on every change.
///
/// A zero value means "unlimited" (or "channel default" for the fetch size).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatementConfig {
    /// Maximum number of bytes delivered for a character value
    pub max_field_size: u32,
    /// Maximum number of rows delivered per cursor
    pub max_rows: u32,
    /// Rows requested per page
    pub fetch_size: u32,
    /// Query timeout in seconds
    pub query_timeout: u32,
    /// Whether escape sequences are rewritten before dispatch
    pub escape_processing: bool,
    /// Scrollability requested for new cursors
    pub result_set_type: ResultSetType,
}

impl Default for StatementConfig {
    fn default() -> Self {
        Self {
            max_field_size: 0,
            max_rows: 0,
            fetch_size: 0,
            query_timeout: 0,
            escape_processing: true,
            result_set_type: ResultSetType::ForwardOnly,
        }
    }
}

impl StatementConfig {
    /// Validate a non-negative setting value.
    ///
    /// # Errors
    /// Returns `QueryError::InvalidArgument` if `value` is negative.
    pub(crate) fn non_negative(parameter: &str, value: i32) -> Result<u32, QueryError> {
        u32::try_from(value).map_err(|_| {
            QueryError::invalid_argument(parameter, format!("{} must be >= 0", value))
        })
    }
}

/// Settings copied into a cursor when its execution starts.
///
/// Later statement changes never affect an already produced cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CursorSettings {
    /// Row limit; 0 means unlimited
    pub row_limit: usize,
    /// Rows requested per page; always at least 1
    pub fetch_size: usize,
    /// Character value truncation in bytes; 0 means unlimited
    pub max_field_size: usize,
}

impl CursorSettings {
    /// Snapshot the statement configuration.
    ///
    /// A zero fetch size falls back to `default_fetch_size`.
    pub fn snapshot(config: &StatementConfig, default_fetch_size: u32) -> Self {
        let fetch_size = match config.fetch_size {
            0 => default_fetch_size,
            n => n,
        };
        Self {
            row_limit: config.max_rows as usize,
            fetch_size: fetch_size.max(1) as usize,
            max_field_size: config.max_field_size as usize,
        }
    }
}
