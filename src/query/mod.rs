//! Statement execution and result handling.
//!
//! # Overview
//!
//! The query module is organized into:
//! - `statement` - SQL statement execution, configuration and lifecycle
//! - `sequence` - Ordered results of one execution
//! - `cursor` - Paged cursors over row-producing results
//! - `batch` - Queued batch execution
//! - `options` - Statement options, fetch directions and capabilities
//!
//! # Example
//!
//! ```no_run
//! use sqlcursor::channel::ExecutionChannel;
//! use sqlcursor::query::StatementBuilder;
//! use std::sync::Arc;
//! use tokio::sync::Mutex;
//!
//! # async fn example(channel: Arc<Mutex<dyn ExecutionChannel>>) -> Result<(), Box<dyn std::error::Error>> {
//! let mut stmt = StatementBuilder::new(channel).build();
//! stmt.set_fetch_size(100)?;
//!
//! let cursor = stmt.execute_query("SELECT col1 FROM test ORDER BY col1").await?;
//! while cursor.next().await? {
//!     println!("col1 = {:?}", cursor.get_i64(0).await?);
//! }
//!
//! stmt.close().await?;
//! # Ok(())
//! # }
//! ```

pub mod batch;
pub mod cursor;
pub mod options;
pub(crate) mod sequence;
pub mod statement;

// Re-export commonly used types
pub use batch::BatchQueue;
pub use cursor::Cursor;
pub use options::{Capability, CursorSettings, FetchDirection, StatementConfig};
pub use statement::{
    CancelHandle, ExecutionPlanProvider, Statement, StatementBuilder, DEFAULT_FETCH_SIZE,
};
