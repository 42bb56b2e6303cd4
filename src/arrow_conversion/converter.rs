//! Converter from row-major cursor rows to Arrow RecordBatches.

use crate::channel::messages::{ColumnInfo, Row};
use crate::error::ConversionError;
use crate::types::{SqlType, TypeMapper};
use arrow::datatypes::Schema;
use arrow::record_batch::RecordBatch;
use std::sync::Arc;

use super::builders::build_array;

/// Converter for transforming delivered rows to Arrow RecordBatches.
#[derive(Debug, Clone)]
pub struct ArrowConverter {
    schema: Arc<Schema>,
    column_types: Vec<SqlType>,
}

impl ArrowConverter {
    /// Create a new converter from row set column metadata.
    ///
    /// # Errors
    /// Returns `ConversionError` if any column type has no Arrow mapping.
    pub fn new(columns: &[ColumnInfo]) -> Result<Self, ConversionError> {
        let (schema, column_types) = TypeMapper::schema_for(columns)?;
        Ok(Self {
            schema: Arc::new(schema),
            column_types,
        })
    }

    /// Get the Arrow schema for this converter.
    pub fn schema(&self) -> Arc<Schema> {
        Arc::clone(&self.schema)
    }

    /// Convert rows to an Arrow RecordBatch.
    ///
    /// # Errors
    /// Returns `ConversionError` if a row does not match the schema or a value
    /// cannot be converted to its column type.
    pub fn convert_rows(&self, rows: &[Row]) -> Result<RecordBatch, ConversionError> {
        if rows.is_empty() {
            return Ok(RecordBatch::new_empty(Arc::clone(&self.schema)));
        }

        let num_columns = self.column_types.len();
        for (row_idx, row) in rows.iter().enumerate() {
            if row.len() != num_columns {
                return Err(ConversionError::SchemaMismatch(format!(
                    "Row {} has {} columns, expected {}",
                    row_idx,
                    row.len(),
                    num_columns
                )));
            }
        }

        let arrays = self
            .column_types
            .iter()
            .enumerate()
            .map(|(col_idx, sql_type)| {
                let column: Vec<_> = rows.iter().map(|row| &row[col_idx]).collect();
                build_array(sql_type, &column, col_idx)
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(RecordBatch::try_new(Arc::clone(&self.schema), arrays)?)
    }
}
