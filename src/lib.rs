//! # sqlcursor-rs
//!
//! Client-side SQL statement engine with paged cursors and Apache Arrow
//! export.
//!
//! The engine executes SQL text over an [`ExecutionChannel`] supplied by the
//! caller, sequences the mixed results of an execution (row sets and update
//! counts), pages rows through cursors, runs queued batches, and reclaims
//! resources automatically when a statement is marked close-on-completion.
//!
//! ## Example
//!
//! ```no_run
//! # use sqlcursor::*;
//! # async fn example(channel: impl ExecutionChannel + 'static) -> Result<(), Box<dyn std::error::Error>> {
//! let connection = Connection::new(channel, ConnectionProperties::default());
//! let mut stmt = connection.create_statement()?;
//!
//! // Close the statement once the cursor is drained
//! stmt.close_on_completion()?;
//!
//! let cursor = stmt.execute_query("SELECT col1 FROM test ORDER BY col1").await?;
//! while let Some(batch) = cursor.next_batch(1024).await? {
//!     println!("Rows: {}", batch.num_rows());
//! }
//! assert!(stmt.is_closed());
//!
//! connection.close().await?;
//! # Ok(())
//! # }
//! ```

// Module declarations
pub mod admin;
pub mod arrow_conversion;
pub mod channel;
pub mod connection;
pub mod error;
pub mod query;
pub mod types;

// Re-export public API
pub use admin::{ServiceChannel, StatisticsManager};
pub use arrow_conversion::ArrowConverter;
pub use channel::{
    CancelChannel, ColumnInfo, DataType, ExecuteRequest, ExecutionChannel, ExecutionOutcome, Page,
    Parameter, ResultItem, ResultSetType, RowSetHandle, StatementHandle,
};
pub use connection::{Connection, ConnectionProperties};
pub use error::{
    ChannelError, ConnectionError, ConversionError, EngineError, ErrorKind, QueryError,
    ServiceError,
};
pub use query::{
    CancelHandle, Capability, Cursor, ExecutionPlanProvider, FetchDirection, Statement,
    StatementBuilder,
};
pub use types::{SqlType, TypeMapper};
