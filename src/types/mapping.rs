//! Type mapping between engine column types and Apache Arrow data types.

use crate::channel::messages::{ColumnInfo, DataType as ColumnType};
use crate::error::ConversionError;
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Largest decimal precision that fits in `Decimal128`.
const MAX_DECIMAL128_PRECISION: u8 = 38;

/// Engine column type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "UPPERCASE")]
pub enum SqlType {
    /// BOOLEAN type
    Boolean,

    /// SMALLINT type
    #[serde(rename = "SMALLINT")]
    SmallInt,

    /// INTEGER type
    Integer,

    /// BIGINT type
    #[serde(rename = "BIGINT")]
    BigInt,

    /// FLOAT type
    Float,

    /// DOUBLE PRECISION type
    Double,

    /// DECIMAL(p, s) / NUMERIC(p, s) type
    Decimal { precision: u8, scale: i8 },

    /// CHAR(n) type
    Char { size: u32 },

    /// VARCHAR(n) type
    Varchar { size: u32 },

    /// DATE type
    Date,

    /// TIME type
    Time,

    /// TIMESTAMP type
    Timestamp,

    /// BLOB and other binary types
    Binary,
}

impl SqlType {
    /// Parse a column type descriptor delivered by the channel.
    ///
    /// # Errors
    /// Returns `ConversionError::UnsupportedType` for unknown type names.
    pub fn from_column_type(data_type: &ColumnType) -> Result<Self, ConversionError> {
        let name = data_type.type_name.trim().to_ascii_uppercase();
        match name.as_str() {
            "BOOLEAN" => Ok(SqlType::Boolean),
            "SMALLINT" => Ok(SqlType::SmallInt),
            "INTEGER" | "INT" => Ok(SqlType::Integer),
            "BIGINT" | "INT64" => Ok(SqlType::BigInt),
            "FLOAT" => Ok(SqlType::Float),
            "DOUBLE" | "DOUBLE PRECISION" => Ok(SqlType::Double),
            "DECIMAL" | "NUMERIC" => Ok(SqlType::Decimal {
                precision: data_type.precision.unwrap_or(18),
                scale: data_type.scale.unwrap_or(0),
            }),
            "CHAR" => Ok(SqlType::Char {
                size: data_type.size.unwrap_or(1),
            }),
            "VARCHAR" => Ok(SqlType::Varchar {
                size: data_type.size.unwrap_or(0),
            }),
            "DATE" => Ok(SqlType::Date),
            "TIME" => Ok(SqlType::Time),
            "TIMESTAMP" => Ok(SqlType::Timestamp),
            "BLOB" | "BINARY" | "VARBINARY" => Ok(SqlType::Binary),
            _ => Err(ConversionError::UnsupportedType {
                type_name: data_type.type_name.clone(),
            }),
        }
    }
}

/// Type mapper for converting engine types to Arrow types.
pub struct TypeMapper;

impl TypeMapper {
    /// Convert an engine type to an Arrow DataType.
    pub fn sql_to_arrow(sql_type: &SqlType) -> DataType {
        match sql_type {
            SqlType::Boolean => DataType::Boolean,
            SqlType::SmallInt => DataType::Int16,
            SqlType::Integer => DataType::Int32,
            SqlType::BigInt => DataType::Int64,
            SqlType::Float => DataType::Float32,
            SqlType::Double => DataType::Float64,
            SqlType::Decimal { precision, scale } => {
                let precision = (*precision).clamp(1, MAX_DECIMAL128_PRECISION);
                DataType::Decimal128(precision, *scale)
            }
            SqlType::Char { .. } | SqlType::Varchar { .. } => DataType::Utf8,
            SqlType::Date => DataType::Date32,
            SqlType::Time => DataType::Time64(TimeUnit::Microsecond),
            SqlType::Timestamp => DataType::Timestamp(TimeUnit::Microsecond, None),
            SqlType::Binary => DataType::Binary,
        }
    }

    /// Field metadata preserving the engine type.
    pub fn create_field_metadata(sql_type: &SqlType) -> HashMap<String, String> {
        let mut metadata = HashMap::new();

        if let Ok(encoded) = serde_json::to_string(sql_type) {
            metadata.insert("sql:type".to_string(), encoded);
        }

        match sql_type {
            SqlType::Char { size } | SqlType::Varchar { size } => {
                metadata.insert("sql:size".to_string(), size.to_string());
            }
            SqlType::Decimal { precision, scale } => {
                metadata.insert("sql:precision".to_string(), precision.to_string());
                metadata.insert("sql:scale".to_string(), scale.to_string());
            }
            _ => {}
        }

        metadata
    }

    /// Extract the engine type from Arrow field metadata.
    pub fn from_field_metadata(metadata: &HashMap<String, String>) -> Option<SqlType> {
        metadata
            .get("sql:type")
            .and_then(|s| serde_json::from_str(s).ok())
    }

    /// Build an Arrow schema for a row set's columns.
    ///
    /// All fields are nullable.
    ///
    /// # Errors
    /// Returns `ConversionError::UnsupportedType` if any column type is unknown.
    pub fn schema_for(columns: &[ColumnInfo]) -> Result<(Schema, Vec<SqlType>), ConversionError> {
        let mut fields = Vec::with_capacity(columns.len());
        let mut types = Vec::with_capacity(columns.len());

        for column in columns {
            let sql_type = SqlType::from_column_type(&column.data_type)?;
            fields.push(
                Field::new(&column.name, Self::sql_to_arrow(&sql_type), true)
                    .with_metadata(Self::create_field_metadata(&sql_type)),
            );
            types.push(sql_type);
        }

        Ok((Schema::new(fields), types))
    }
}
