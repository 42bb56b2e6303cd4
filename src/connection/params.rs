//! Connection property parsing and validation.
//!
//! Properties supply the defaults every statement of a connection starts
//! with. They can be built fluently or parsed from a property string of the
//! form `key=value&key=value`.

use crate::channel::messages::ResultSetType;
use crate::error::ConnectionError;
use crate::query::options::StatementConfig;
use crate::query::statement::DEFAULT_FETCH_SIZE;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Upper bound accepted for the default fetch size.
pub const MAX_FETCH_SIZE: u32 = 1_000_000;

/// Connection-wide defaults for new statements.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConnectionProperties {
    /// Rows per page when a statement's fetch size is 0 (default: 400)
    pub default_fetch_size: u32,

    /// Scrollability requested by new statements
    pub default_result_set_type: ResultSetType,

    /// Whether new statements translate escape sequences
    pub escape_processing: bool,

    /// Initial query timeout in seconds (0 = unlimited)
    pub query_timeout: u32,

    /// Initial row limit (0 = unlimited)
    pub max_rows: u32,

    /// Initial character value limit in bytes (0 = unlimited)
    pub max_field_size: u32,

    /// Unrecognised properties, passed through untouched
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub attributes: HashMap<String, String>,
}

impl Default for ConnectionProperties {
    fn default() -> Self {
        Self {
            default_fetch_size: DEFAULT_FETCH_SIZE,
            default_result_set_type: ResultSetType::ForwardOnly,
            escape_processing: true,
            query_timeout: 0,
            max_rows: 0,
            max_field_size: 0,
            attributes: HashMap::new(),
        }
    }
}

impl ConnectionProperties {
    /// Create a new ConnectionPropertiesBuilder.
    pub fn builder() -> ConnectionPropertiesBuilder {
        ConnectionPropertiesBuilder::new()
    }

    /// Initial configuration of a new statement.
    pub fn statement_config(&self) -> StatementConfig {
        StatementConfig {
            max_field_size: self.max_field_size,
            max_rows: self.max_rows,
            fetch_size: 0,
            query_timeout: self.query_timeout,
            escape_processing: self.escape_processing,
            result_set_type: self.default_result_set_type,
        }
    }
}

impl FromStr for ConnectionProperties {
    type Err = ConnectionError;

    /// Parse a property string in the format `key=value[&key=value...]`.
    ///
    /// # Examples
    ///
    /// ```
    /// # use sqlcursor::connection::ConnectionProperties;
    /// # use std::str::FromStr;
    /// let props = ConnectionProperties::from_str("defaultFetchSize=50&escapeProcessing=false")?;
    /// assert_eq!(props.default_fetch_size, 50);
    /// assert!(!props.escape_processing);
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let params = parse_property_string(s.trim())?;
        apply_properties(ConnectionPropertiesBuilder::new(), params)?.build()
    }
}

impl fmt::Display for ConnectionProperties {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ConnectionProperties {{ defaultFetchSize: {}, defaultResultSetType: {:?}, escapeProcessing: {} }}",
            self.default_fetch_size, self.default_result_set_type, self.escape_processing
        )
    }
}

/// Builder for constructing ConnectionProperties with validation.
#[derive(Debug, Clone, Default)]
pub struct ConnectionPropertiesBuilder {
    default_fetch_size: Option<u32>,
    default_result_set_type: Option<ResultSetType>,
    escape_processing: Option<bool>,
    query_timeout: Option<u32>,
    max_rows: Option<u32>,
    max_field_size: Option<u32>,
    attributes: HashMap<String, String>,
}

impl ConnectionPropertiesBuilder {
    /// Create a new builder with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the default fetch size.
    pub fn default_fetch_size(mut self, rows: u32) -> Self {
        self.default_fetch_size = Some(rows);
        self
    }

    /// Set the default cursor scrollability.
    pub fn default_result_set_type(mut self, result_set_type: ResultSetType) -> Self {
        self.default_result_set_type = Some(result_set_type);
        self
    }

    /// Enable or disable escape processing.
    pub fn escape_processing(mut self, enable: bool) -> Self {
        self.escape_processing = Some(enable);
        self
    }

    /// Set the initial query timeout in seconds.
    pub fn query_timeout(mut self, seconds: u32) -> Self {
        self.query_timeout = Some(seconds);
        self
    }

    /// Set the initial row limit.
    pub fn max_rows(mut self, rows: u32) -> Self {
        self.max_rows = Some(rows);
        self
    }

    /// Set the initial character value limit.
    pub fn max_field_size(mut self, bytes: u32) -> Self {
        self.max_field_size = Some(bytes);
        self
    }

    /// Add a custom property.
    pub fn attribute(mut self, key: &str, value: &str) -> Self {
        self.attributes.insert(key.to_string(), value.to_string());
        self
    }

    /// Build the ConnectionProperties with validation.
    pub fn build(self) -> Result<ConnectionProperties, ConnectionError> {
        let default_fetch_size = self.default_fetch_size.unwrap_or(DEFAULT_FETCH_SIZE);

        if default_fetch_size == 0 {
            return Err(ConnectionError::InvalidParameter {
                parameter: "defaultFetchSize".to_string(),
                message: "Default fetch size must be greater than 0".to_string(),
            });
        }

        if default_fetch_size > MAX_FETCH_SIZE {
            return Err(ConnectionError::InvalidParameter {
                parameter: "defaultFetchSize".to_string(),
                message: format!("Default fetch size cannot exceed {}", MAX_FETCH_SIZE),
            });
        }

        Ok(ConnectionProperties {
            default_fetch_size,
            default_result_set_type: self.default_result_set_type.unwrap_or_default(),
            escape_processing: self.escape_processing.unwrap_or(true),
            query_timeout: self.query_timeout.unwrap_or(0),
            max_rows: self.max_rows.unwrap_or(0),
            max_field_size: self.max_field_size.unwrap_or(0),
            attributes: self.attributes,
        })
    }
}

/// Split a property string into decoded key/value pairs.
fn parse_property_string(input: &str) -> Result<HashMap<String, String>, ConnectionError> {
    let mut params = HashMap::new();

    for pair in input.split('&') {
        if pair.is_empty() {
            continue;
        }

        let (key, value) = pair.split_once('=').ok_or_else(|| {
            ConnectionError::ParseError(format!("Invalid property format: {}", pair))
        })?;

        let key = urlencoding::decode(key)
            .map_err(|e| ConnectionError::ParseError(format!("Failed to decode key: {}", e)))?
            .into_owned();
        let value = urlencoding::decode(value)
            .map_err(|e| ConnectionError::ParseError(format!("Failed to decode value: {}", e)))?
            .into_owned();

        params.insert(key, value);
    }

    Ok(params)
}

/// Apply parsed properties to the builder.
fn apply_properties(
    mut builder: ConnectionPropertiesBuilder,
    params: HashMap<String, String>,
) -> Result<ConnectionPropertiesBuilder, ConnectionError> {
    for (key, value) in params {
        match key.as_str() {
            "defaultFetchSize" => {
                builder = builder.default_fetch_size(parse_count(&key, &value)?);
            }
            "defaultResultSetType" => {
                builder = builder.default_result_set_type(parse_result_set_type(&value)?);
            }
            "escapeProcessing" => {
                builder = builder.escape_processing(parse_bool(&key, &value)?);
            }
            "queryTimeout" => {
                builder = builder.query_timeout(parse_count(&key, &value)?);
            }
            "maxRows" => {
                builder = builder.max_rows(parse_count(&key, &value)?);
            }
            "maxFieldSize" => {
                builder = builder.max_field_size(parse_count(&key, &value)?);
            }
            _ => {
                builder = builder.attribute(&key, &value);
            }
        }
    }

    Ok(builder)
}

fn parse_count(key: &str, value: &str) -> Result<u32, ConnectionError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConnectionError::InvalidParameter {
            parameter: key.to_string(),
            message: format!("Expected a non-negative integer, got: {}", value),
        })
}

fn parse_result_set_type(value: &str) -> Result<ResultSetType, ConnectionError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "forward_only" | "forwardonly" | "1003" => Ok(ResultSetType::ForwardOnly),
        "scroll_insensitive" | "scrollinsensitive" | "1004" => {
            Ok(ResultSetType::ScrollInsensitive)
        }
        _ => Err(ConnectionError::InvalidParameter {
            parameter: "defaultResultSetType".to_string(),
            message: format!("Unknown result set type: {}", value),
        }),
    }
}

/// Parse boolean value from string.
fn parse_bool(key: &str, value: &str) -> Result<bool, ConnectionError> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConnectionError::InvalidParameter {
            parameter: key.to_string(),
            message: format!("Invalid boolean value: {}", value),
        }),
    }
}
