//! Execution channel abstraction trait.
//!
//! This module defines the `ExecutionChannel` trait that abstracts the
//! component dispatching commands to the database engine. The statement
//! engine only ever talks to the engine through this trait; transport, wire
//! encoding and session establishment live behind it.

use crate::error::ChannelError;
use async_trait::async_trait;

use super::messages::{ExecuteRequest, ExecutionOutcome, Page, RowSetHandle, StatementHandle};
use std::time::Duration;

/// Execution channel trait for database communication.
///
/// Every call is awaited to completion by the caller; the engine never
/// issues two calls on the same channel concurrently.
#[async_trait]
pub trait ExecutionChannel: Send + Sync {
    /// Allocate a statement handle on the engine.
    ///
    /// # Errors
    ///
    /// Returns `ChannelError` if allocation fails.
    async fn allocate_statement(&mut self) -> Result<StatementHandle, ChannelError>;

    /// Execute a SQL command.
    ///
    /// # Arguments
    ///
    /// * `handle` - Statement handle from `allocate_statement`
    /// * `request` - SQL text, parameters and execution options
    ///
    /// # Returns
    ///
    /// The complete, ordered list of result items plus the optional plan.
    ///
    /// # Errors
    ///
    /// Returns `ChannelError` if execution fails or times out.
    async fn execute(
        &mut self,
        handle: StatementHandle,
        request: &ExecuteRequest,
    ) -> Result<ExecutionOutcome, ChannelError>;

    /// Execute a queue of commands as one request.
    ///
    /// # Returns
    ///
    /// One update count per command, in submission order.
    ///
    /// # Errors
    ///
    /// Returns `ChannelError` if the batch fails. Whether earlier commands
    /// stay applied is up to the channel.
    async fn execute_batch(
        &mut self,
        handle: StatementHandle,
        commands: &[String],
        query_timeout: Option<Duration>,
    ) -> Result<Vec<i64>, ChannelError>;

    /// Fetch the next page of a row set.
    ///
    /// # Arguments
    ///
    /// * `row_set` - Row set handle from an execution outcome
    /// * `max_rows` - Maximum number of rows in the page
    ///
    /// # Errors
    ///
    /// Returns `ChannelError` if the fetch fails.
    async fn fetch_page(
        &mut self,
        row_set: RowSetHandle,
        max_rows: usize,
    ) -> Result<Page, ChannelError>;

    /// Release a row set.
    async fn release_row_set(&mut self, row_set: RowSetHandle) -> Result<(), ChannelError>;

    /// Release a statement handle.
    async fn release_statement(&mut self, handle: StatementHandle) -> Result<(), ChannelError>;

    /// Close the channel.
    ///
    /// # Errors
    ///
    /// Returns `ChannelError` if disconnect fails.
    async fn close(&mut self) -> Result<(), ChannelError>;

    /// Check if the channel is still usable.
    fn is_open(&self) -> bool;
}

/// Out-of-band cancellation of running executions.
///
/// Served without the [`ExecutionChannel`] lock, so a cancel can reach an
/// execution that is still in progress on the shared channel. Channels whose
/// engine cannot cancel simply do not provide one.
#[async_trait]
pub trait CancelChannel: Send + Sync {
    /// Cancel whatever is running on a statement handle.
    ///
    /// # Errors
    ///
    /// Returns `ChannelError` if the cancel request cannot be delivered.
    async fn cancel(&self, handle: StatementHandle) -> Result<(), ChannelError>;
}
