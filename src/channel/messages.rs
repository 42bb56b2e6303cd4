//! Request and response types exchanged with an execution channel.
//!
//! These types describe the boundary between the statement engine and the
//! component that actually talks to the database engine. Descriptor types
//! derive `serde` traits so channel implementations speaking a JSON protocol
//! can reuse them directly.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A single row as delivered by the channel.
pub type Row = Vec<serde_json::Value>;

/// Opaque handle of a statement allocated on the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StatementHandle(pub u64);

impl StatementHandle {
    /// Create a new statement handle.
    pub fn new(handle: u64) -> Self {
        Self(handle)
    }

    /// Get the raw handle value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl From<u64> for StatementHandle {
    fn from(handle: u64) -> Self {
        Self(handle)
    }
}

/// Opaque handle of one row-producing result item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RowSetHandle(pub u64);

impl RowSetHandle {
    /// Create a new row set handle.
    pub fn new(handle: u64) -> Self {
        Self(handle)
    }

    /// Get the raw handle value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl From<u64> for RowSetHandle {
    fn from(handle: u64) -> Self {
        Self(handle)
    }
}

/// Scrollability of a cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResultSetType {
    /// Rows can only be read once, front to back
    #[default]
    ForwardOnly,
    /// Rows are materialized and insensitive to concurrent changes
    ScrollInsensitive,
}

/// Column type descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataType {
    /// Type name
    #[serde(rename = "type")]
    pub type_name: String,
    /// Precision (for numeric types)
    pub precision: Option<u8>,
    /// Scale (for decimal types)
    pub scale: Option<i8>,
    /// Size (for character types)
    pub size: Option<u32>,
}

impl DataType {
    /// A type descriptor with only a name.
    pub fn named(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            precision: None,
            scale: None,
            size: None,
        }
    }
}

/// Column metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnInfo {
    /// Column name
    pub name: String,
    /// Data type
    pub data_type: DataType,
}

impl ColumnInfo {
    /// Create column metadata.
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
        }
    }
}

/// Parameter value sent along with a command.
#[derive(Debug, Clone, PartialEq)]
pub enum Parameter {
    /// NULL value
    Null,
    /// Boolean value
    Boolean(bool),
    /// Integer value
    Integer(i64),
    /// Float value
    Float(f64),
    /// String value
    String(String),
    /// Binary data
    Binary(Vec<u8>),
}

impl Parameter {
    /// Convert to a JSON value for channels that encode parameters as JSON.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Parameter::Null => serde_json::Value::Null,
            Parameter::Boolean(b) => serde_json::Value::Bool(*b),
            Parameter::Integer(i) => serde_json::json!(i),
            Parameter::Float(f) => serde_json::json!(f),
            Parameter::String(s) => serde_json::Value::String(s.clone()),
            Parameter::Binary(b) => {
                serde_json::Value::Array(b.iter().map(|byte| serde_json::json!(byte)).collect())
            }
        }
    }
}

impl From<bool> for Parameter {
    fn from(value: bool) -> Self {
        Parameter::Boolean(value)
    }
}

impl From<i32> for Parameter {
    fn from(value: i32) -> Self {
        Parameter::Integer(value as i64)
    }
}

impl From<i64> for Parameter {
    fn from(value: i64) -> Self {
        Parameter::Integer(value)
    }
}

impl From<f64> for Parameter {
    fn from(value: f64) -> Self {
        Parameter::Float(value)
    }
}

impl From<String> for Parameter {
    fn from(value: String) -> Self {
        Parameter::String(value)
    }
}

impl From<&str> for Parameter {
    fn from(value: &str) -> Self {
        Parameter::String(value.to_string())
    }
}

impl From<Vec<u8>> for Parameter {
    fn from(value: Vec<u8>) -> Self {
        Parameter::Binary(value)
    }
}

/// Execute request sent to the channel.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecuteRequest {
    /// SQL text, after escape processing
    pub sql: String,
    /// Positional parameters
    pub parameters: Vec<Parameter>,
    /// Requested cursor scrollability
    pub result_set_type: ResultSetType,
    /// Deadline forwarded to the channel; `None` means unlimited
    pub query_timeout: Option<Duration>,
    /// Row limit hint; cursors enforce the limit regardless
    pub max_rows: Option<u32>,
}

impl ExecuteRequest {
    /// Create a new execute request.
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            parameters: Vec::new(),
            result_set_type: ResultSetType::ForwardOnly,
            query_timeout: None,
            max_rows: None,
        }
    }

    /// Set positional parameters.
    pub fn with_parameters(mut self, parameters: Vec<Parameter>) -> Self {
        self.parameters = parameters;
        self
    }

    /// Set the requested scrollability.
    pub fn with_result_set_type(mut self, result_set_type: ResultSetType) -> Self {
        self.result_set_type = result_set_type;
        self
    }

    /// Set the query timeout in seconds; 0 means unlimited.
    pub fn with_timeout_secs(mut self, seconds: u32) -> Self {
        self.query_timeout = (seconds > 0).then(|| Duration::from_secs(u64::from(seconds)));
        self
    }

    /// Set the row limit hint; 0 means unlimited.
    pub fn with_max_rows(mut self, max_rows: u32) -> Self {
        self.max_rows = (max_rows > 0).then_some(max_rows);
        self
    }
}

/// One item of a result sequence.
#[derive(Debug, Clone, PartialEq)]
pub enum ResultItem {
    /// A row-producing result
    RowSet {
        /// Handle for fetching pages
        handle: RowSetHandle,
        /// Column metadata
        columns: Vec<ColumnInfo>,
        /// Scrollability granted by the engine
        scrollability: ResultSetType,
    },
    /// A data-modification count
    UpdateCount(i64),
}

impl ResultItem {
    /// Check if this item produces rows.
    pub fn is_row_set(&self) -> bool {
        matches!(self, ResultItem::RowSet { .. })
    }
}

/// Everything produced by one execution, delivered atomically.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ExecutionOutcome {
    /// Ordered result items
    pub items: Vec<ResultItem>,
    /// Execution plan, when the engine produced one
    pub plan: Option<String>,
}

impl ExecutionOutcome {
    /// Create an outcome from items.
    pub fn new(items: Vec<ResultItem>) -> Self {
        Self { items, plan: None }
    }

    /// Attach an execution plan.
    pub fn with_plan(mut self, plan: impl Into<String>) -> Self {
        self.plan = Some(plan.into());
        self
    }
}

/// One page of rows fetched from a row set.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Page {
    /// Rows in delivery order
    pub rows: Vec<Row>,
    /// Whether the row set has no rows beyond this page
    pub exhausted: bool,
}

impl Page {
    /// Create a page.
    pub fn new(rows: Vec<Row>, exhausted: bool) -> Self {
        Self { rows, exhausted }
    }
}
