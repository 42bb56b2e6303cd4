//! Error types for sqlcursor-rs.
//!
//! This module defines domain-specific error types organized by functional area,
//! and the symbolic [`ErrorKind`] taxonomy every error maps onto.

use std::fmt;
use thiserror::Error;

/// Top-level error type encompassing all possible errors.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Connection-related errors
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// Statement and cursor errors
    #[error(transparent)]
    Query(#[from] QueryError),

    /// Data conversion errors
    #[error(transparent)]
    Conversion(#[from] ConversionError),

    /// Administrative service errors
    #[error(transparent)]
    Service(#[from] ServiceError),
}

/// Symbolic error kinds surfaced to the caller.
///
/// The first five kinds are usage errors detected locally; the rest describe
/// failures reported through the execution channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Operation on a closed statement
    StatementClosed,
    /// Operation on a closed cursor
    CursorClosed,
    /// Invalid configuration or argument value
    InvalidArgumentValue,
    /// A result set was required but the execution produced none
    NoResultSet,
    /// The requested capability is not supported
    UnsupportedCapability,
    /// Execution plan requested before any execution
    NoStatementExecuted,
    /// Operation not valid in the current state
    InvalidState,
    /// SQL syntax error reported by the engine
    SyntaxError,
    /// Constraint violation reported by the engine
    ConstraintViolation,
    /// Any other engine-side exception
    EngineException,
    /// Query timeout reported by the channel
    Timeout,
    /// Execution was cancelled
    Cancelled,
    /// Channel or transport failure
    ChannelFailure,
    /// Value conversion failure
    Conversion,
}

impl ErrorKind {
    /// Default SQLSTATE for this kind.
    pub fn sql_state(&self) -> &'static str {
        match self {
            ErrorKind::StatementClosed => "HY010",
            ErrorKind::CursorClosed => "24000",
            ErrorKind::InvalidArgumentValue => "HY024",
            ErrorKind::NoResultSet => "07005",
            ErrorKind::UnsupportedCapability => "0A000",
            ErrorKind::NoStatementExecuted => "HY000",
            ErrorKind::InvalidState => "HY000",
            ErrorKind::SyntaxError => "42000",
            ErrorKind::ConstraintViolation => "23000",
            ErrorKind::EngineException => "HY000",
            ErrorKind::Timeout => "HYT00",
            ErrorKind::Cancelled => "HY008",
            ErrorKind::ChannelFailure => "08006",
            ErrorKind::Conversion => "22018",
        }
    }

    /// Whether this kind is a local usage error (never involves the channel).
    pub fn is_usage_error(&self) -> bool {
        matches!(
            self,
            ErrorKind::StatementClosed
                | ErrorKind::CursorClosed
                | ErrorKind::InvalidArgumentValue
                | ErrorKind::NoResultSet
                | ErrorKind::UnsupportedCapability
                | ErrorKind::NoStatementExecuted
                | ErrorKind::InvalidState
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::StatementClosed => "STATEMENT_CLOSED",
            ErrorKind::CursorClosed => "CURSOR_CLOSED",
            ErrorKind::InvalidArgumentValue => "INVALID_ARGUMENT_VALUE",
            ErrorKind::NoResultSet => "NO_RESULT_SET",
            ErrorKind::UnsupportedCapability => "UNSUPPORTED_CAPABILITY",
            ErrorKind::NoStatementExecuted => "NO_STATEMENT_EXECUTED",
            ErrorKind::InvalidState => "INVALID_STATE",
            ErrorKind::SyntaxError => "SYNTAX_ERROR",
            ErrorKind::ConstraintViolation => "CONSTRAINT_VIOLATION",
            ErrorKind::EngineException => "ENGINE_EXCEPTION",
            ErrorKind::Timeout => "TIMEOUT",
            ErrorKind::Cancelled => "CANCELLED",
            ErrorKind::ChannelFailure => "CHANNEL_FAILURE",
            ErrorKind::Conversion => "CONVERSION",
        };
        f.write_str(name)
    }
}

/// Category of a failure reported by the database engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureCategory {
    /// SQL syntax error
    Syntax,
    /// Constraint violation
    Constraint,
    /// Engine-side exception (including user-defined exceptions)
    Exception,
    /// Statement exceeded its deadline
    Timeout,
    /// Statement was cancelled
    Cancelled,
}

/// One message part of an engine failure.
///
/// `template` may contain positional placeholders `@1`, `@2`, ... which the
/// error decoder expands with `parameters`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageFragment {
    /// Message template
    pub template: String,
    /// Positional substitution values
    pub parameters: Vec<String>,
}

impl MessageFragment {
    /// A fragment without parameters.
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            template: text.into(),
            parameters: Vec::new(),
        }
    }

    /// A fragment with positional parameters.
    pub fn with_parameters(template: impl Into<String>, parameters: Vec<String>) -> Self {
        Self {
            template: template.into(),
            parameters,
        }
    }
}

/// Structured failure reported by the database engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineFailure {
    /// Failure category
    pub category: FailureCategory,
    /// Engine-specific error code
    pub error_code: i32,
    /// SQLSTATE reported by the engine, if any
    pub sql_state: Option<String>,
    /// Message parts, in order
    pub fragments: Vec<MessageFragment>,
}

impl EngineFailure {
    /// Create a failure with a single plain message.
    pub fn new(category: FailureCategory, error_code: i32, message: impl Into<String>) -> Self {
        Self {
            category,
            error_code,
            sql_state: None,
            fragments: vec![MessageFragment::plain(message)],
        }
    }

    /// Set the SQLSTATE.
    pub fn with_sql_state(mut self, sql_state: impl Into<String>) -> Self {
        self.sql_state = Some(sql_state.into());
        self
    }

    /// Append a message fragment.
    pub fn with_fragment(mut self, fragment: MessageFragment) -> Self {
        self.fragments.push(fragment);
        self
    }
}

impl fmt::Display for EngineFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let templates: Vec<&str> = self.fragments.iter().map(|m| m.template.as_str()).collect();
        write!(f, "[{}] {}", self.error_code, templates.join("; "))
    }
}

/// Errors reported by an execution channel, before decoding.
#[derive(Error, Debug, Clone)]
pub enum ChannelError {
    /// The engine rejected or failed the request
    #[error("Engine failure: {0}")]
    Engine(EngineFailure),

    /// Network I/O error
    #[error("Channel I/O error: {0}")]
    Io(String),

    /// Protocol violation or unexpected response
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The referenced handle is not known to the channel
    #[error("Invalid handle: {0}")]
    InvalidHandle(String),

    /// The channel is closed
    #[error("Channel is closed")]
    Closed,
}

/// A channel failure after decoding into the symbolic taxonomy.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct DecodedError {
    /// Symbolic kind
    pub kind: ErrorKind,
    /// SQLSTATE (engine-reported or the kind's default)
    pub sql_state: String,
    /// Engine error code, 0 when not applicable
    pub error_code: i32,
    /// Rendered human-readable message
    pub message: String,
}

/// Errors related to the connection owner and its configuration.
#[derive(Error, Debug)]
pub enum ConnectionError {
    /// Connection is closed
    #[error("Connection is closed")]
    ConnectionClosed,

    /// Invalid connection property
    #[error("Invalid connection property '{parameter}': {message}")]
    InvalidParameter { parameter: String, message: String },

    /// Property string parsing error
    #[error("Failed to parse connection properties: {0}")]
    ParseError(String),

    /// Channel failure while operating on the connection
    #[error("Channel failure: {0}")]
    Channel(DecodedError),
}

/// Errors related to statement execution and cursor handling.
#[derive(Error, Debug)]
pub enum QueryError {
    /// Statement has been closed
    #[error("Statement is already closed")]
    StatementClosed,

    /// Cursor has been closed
    #[error("The result set is closed")]
    CursorClosed,

    /// Invalid argument value
    #[error("Invalid value for {parameter}: {message}")]
    InvalidArgument { parameter: String, message: String },

    /// Result set not available
    #[error("Result set not available: {0}")]
    NoResultSet(String),

    /// Capability not supported
    #[error("Unsupported capability: {0}")]
    UnsupportedCapability(String),

    /// Execution plan requested before any execution
    #[error("No statement was executed, plan cannot be obtained.")]
    NoStatementExecuted,

    /// Expected an update count but only result sets were produced
    #[error("Expected update count but received only result sets")]
    UnexpectedResultSet,

    /// Invalid state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Decoded failure reported by the execution channel
    #[error("{0}")]
    Execution(DecodedError),

    /// One or more releases failed while closing
    #[error("Failed to release resources on close: {}", .failures.join("; "))]
    CloseFailed { failures: Vec<String> },

    /// Value conversion failed
    #[error(transparent)]
    Conversion(#[from] ConversionError),
}

/// Errors related to value and Arrow conversion.
#[derive(Error, Debug)]
pub enum ConversionError {
    /// Unsupported column type
    #[error("Unsupported column type: {type_name}")]
    UnsupportedType { type_name: String },

    /// Failed to convert value
    #[error("Failed to convert value at row {row}, column {column}: {message}")]
    ValueConversionFailed {
        row: usize,
        column: usize,
        message: String,
    },

    /// Column index out of range
    #[error("Column index {index} out of range (column count {count})")]
    ColumnIndex { index: usize, count: usize },

    /// Schema mismatch
    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    /// Arrow error
    #[error("Arrow error: {0}")]
    ArrowError(String),
}

/// Errors raised by administrative service actions.
#[derive(Error, Debug)]
pub enum ServiceError {
    /// Invalid action argument
    #[error("Invalid service argument: {0}")]
    InvalidArgument(String),

    /// Decoded failure reported by the service channel
    #[error("Service failure: {0}")]
    Service(DecodedError),

    /// Writing service output failed
    #[error("Failed to write service output: {0}")]
    Output(#[from] std::io::Error),
}

impl EngineError {
    /// Map to the symbolic error kind.
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Connection(e) => e.kind(),
            EngineError::Query(e) => e.kind(),
            EngineError::Conversion(_) => ErrorKind::Conversion,
            EngineError::Service(e) => e.kind(),
        }
    }
}

impl ConnectionError {
    /// Map to the symbolic error kind.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ConnectionError::ConnectionClosed => ErrorKind::InvalidState,
            ConnectionError::InvalidParameter { .. } | ConnectionError::ParseError(_) => {
                ErrorKind::InvalidArgumentValue
            }
            ConnectionError::Channel(e) => e.kind,
        }
    }
}

impl QueryError {
    /// Map to the symbolic error kind.
    pub fn kind(&self) -> ErrorKind {
        match self {
            QueryError::StatementClosed => ErrorKind::StatementClosed,
            QueryError::CursorClosed => ErrorKind::CursorClosed,
            QueryError::InvalidArgument { .. } => ErrorKind::InvalidArgumentValue,
            QueryError::NoResultSet(_) => ErrorKind::NoResultSet,
            QueryError::UnsupportedCapability(_) => ErrorKind::UnsupportedCapability,
            QueryError::NoStatementExecuted => ErrorKind::NoStatementExecuted,
            QueryError::UnexpectedResultSet | QueryError::InvalidState(_) => {
                ErrorKind::InvalidState
            }
            QueryError::Execution(e) => e.kind,
            QueryError::CloseFailed { .. } => ErrorKind::ChannelFailure,
            QueryError::Conversion(_) => ErrorKind::Conversion,
        }
    }

    /// SQLSTATE for this error.
    pub fn sql_state(&self) -> &str {
        match self {
            QueryError::Execution(e) => &e.sql_state,
            other => other.kind().sql_state(),
        }
    }

    pub(crate) fn invalid_argument(parameter: &str, message: impl Into<String>) -> Self {
        QueryError::InvalidArgument {
            parameter: parameter.to_string(),
            message: message.into(),
        }
    }
}

impl ServiceError {
    /// Map to the symbolic error kind.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ServiceError::InvalidArgument(_) => ErrorKind::InvalidArgumentValue,
            ServiceError::Service(e) => e.kind,
            ServiceError::Output(_) => ErrorKind::ChannelFailure,
        }
    }
}

impl From<arrow::error::ArrowError> for ConversionError {
    fn from(err: arrow::error::ArrowError) -> Self {
        ConversionError::ArrowError(err.to_string())
    }
}
