//! SQL statement handling and execution.
//!
//! A [`Statement`] executes SQL text over a shared execution channel, keeps
//! the result sequence of its latest execution, and hands out [`Cursor`]s for
//! row-producing results. Statement and cursors share one core so that a
//! cursor close can close its statement when close-on-completion is set.
//!
//! Dropping the last handle onto an open statement releases its row sets
//! and channel handle in a task spawned on the current tokio runtime.

use crate::channel::messages::{ExecuteRequest, Parameter, ResultSetType, StatementHandle};
use crate::channel::{
    BasicEscapeTranslator, CancelChannel, ErrorDecoder, EscapeTranslator, ExecutionChannel,
    MessageTemplateDecoder,
};
use crate::error::{ChannelError, QueryError};
use crate::query::batch::BatchQueue;
use crate::query::cursor::{Cursor, CursorState};
use crate::query::options::{
    Capability, CursorSettings, FetchDirection, StatementConfig,
};
use crate::query::sequence::{ResultSequence, SequenceItem};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, trace, warn};

/// Default number of rows requested per page when neither the statement nor
/// the connection sets a fetch size.
pub const DEFAULT_FETCH_SIZE: u32 = 400;

static NEXT_STATEMENT_ID: AtomicU64 = AtomicU64::new(1);

/// Access to the execution plan of the most recent execution.
#[async_trait]
pub trait ExecutionPlanProvider: Send + Sync {
    /// Execution plan captured at the most recent successful execution.
    ///
    /// # Returns
    /// `None` if that execution produced no plan.
    ///
    /// # Errors
    /// Returns `QueryError::NoStatementExecuted` before the first successful
    /// execution and `QueryError::StatementClosed` on a closed statement.
    async fn last_execution_plan(&self) -> Result<Option<String>, QueryError>;
}

/// Execution state guarded by the statement lock.
pub(crate) struct ExecutionState {
    handle: Option<StatementHandle>,
    sequence: Option<ResultSequence>,
    next_sequence_id: u64,
    executed: bool,
    last_plan: Option<String>,
}

impl ExecutionState {
    fn new() -> Self {
        Self {
            handle: None,
            sequence: None,
            next_sequence_id: 1,
            executed: false,
            last_plan: None,
        }
    }

    /// Cursor state of item `index` of sequence `sequence_id`, if that
    /// sequence is still the active one.
    pub(crate) fn cursor_mut(&mut self, sequence_id: u64, index: usize) -> Option<&mut CursorState> {
        self.sequence
            .as_mut()
            .filter(|sequence| sequence.id() == sequence_id)
            .and_then(|sequence| sequence.cursor_mut(index))
    }
}

/// Release a result sequence and a statement handle.
///
/// # Returns
/// One message per failed release.
async fn release_resources(
    channel: &mut dyn ExecutionChannel,
    sequence: Option<ResultSequence>,
    handle: Option<StatementHandle>,
) -> Vec<String> {
    let mut failures = Vec::new();
    if let Some(mut sequence) = sequence {
        failures.extend(sequence.close(channel).await);
    }
    if let Some(handle) = handle {
        if let Err(e) = channel.release_statement(handle).await {
            failures.push(e.to_string());
        }
    }
    failures
}

/// State shared by a statement and the cursors it hands out.
///
/// Lock order is always `state` before `channel`. Cancellation touches
/// neither lock.
pub(crate) struct StatementCore {
    id: u64,
    connection_id: u64,
    pub(crate) channel: Arc<Mutex<dyn ExecutionChannel>>,
    canceller: Option<Arc<dyn CancelChannel>>,
    /// Channel handle once allocated; readable while an execution holds the locks
    allocated: OnceLock<StatementHandle>,
    decoder: Arc<dyn ErrorDecoder>,
    closed: AtomicBool,
    close_on_completion: AtomicBool,
    pub(crate) state: Mutex<ExecutionState>,
}

impl StatementCore {
    pub(crate) fn decode(&self, error: &ChannelError) -> QueryError {
        QueryError::Execution(self.decoder.decode(error))
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> Result<(), QueryError> {
        if self.is_closed() {
            Err(QueryError::StatementClosed)
        } else {
            Ok(())
        }
    }

    /// Handle of this statement on the channel, allocated on first use.
    async fn ensure_handle(
        &self,
        state: &mut ExecutionState,
        channel: &mut dyn ExecutionChannel,
    ) -> Result<StatementHandle, QueryError> {
        if let Some(handle) = state.handle {
            return Ok(handle);
        }
        let handle = channel
            .allocate_statement()
            .await
            .map_err(|e| self.decode(&e))?;
        trace!(
            target: "sqlcursor::statement",
            statement = self.id,
            handle = handle.as_u64(),
            "Allocated statement handle"
        );
        state.handle = Some(handle);
        // A statement allocates at most one handle over its lifetime
        let _ = self.allocated.set(handle);
        Ok(handle)
    }

    /// Close the active result sequence before it is replaced.
    async fn discard_sequence(&self, state: &mut ExecutionState, channel: &mut dyn ExecutionChannel) {
        if let Some(mut sequence) = state.sequence.take() {
            let failures = sequence.close(channel).await;
            if !failures.is_empty() {
                warn!(
                    target: "sqlcursor::statement",
                    statement = self.id,
                    failures = ?failures,
                    "Release failed while discarding previous results"
                );
            }
        }
    }

    /// Run one execution and install its result sequence.
    async fn execute_locked(
        &self,
        state: &mut ExecutionState,
        channel: &mut dyn ExecutionChannel,
        request: &ExecuteRequest,
        settings: CursorSettings,
    ) -> Result<(), QueryError> {
        self.discard_sequence(state, channel).await;
        let handle = self.ensure_handle(state, channel).await?;

        debug!(
            target: "sqlcursor::statement",
            statement = self.id,
            sql = %request.sql,
            parameters = request.parameters.len(),
            "Executing statement"
        );

        let outcome = channel
            .execute(handle, request)
            .await
            .map_err(|e| self.decode(&e))?;

        let sequence_id = state.next_sequence_id;
        state.next_sequence_id += 1;
        state.executed = true;
        state.last_plan = outcome.plan;

        let sequence = ResultSequence::new(sequence_id, outcome.items, settings);
        trace!(
            target: "sqlcursor::statement",
            statement = self.id,
            items = sequence.len(),
            "Installed result sequence"
        );
        state.sequence = Some(sequence);
        Ok(())
    }

    async fn execute(
        &self,
        request: ExecuteRequest,
        settings: CursorSettings,
    ) -> Result<bool, QueryError> {
        let mut state = self.state.lock().await;
        self.ensure_open()?;
        let mut channel = self.channel.lock().await;

        self.execute_locked(&mut state, &mut *channel, &request, settings)
            .await?;

        Ok(state
            .sequence
            .as_ref()
            .is_some_and(|sequence| sequence.current_is_row_set()))
    }

    async fn execute_update(
        &self,
        request: ExecuteRequest,
        settings: CursorSettings,
    ) -> Result<i64, QueryError> {
        let mut state = self.state.lock().await;
        self.ensure_open()?;
        let mut channel = self.channel.lock().await;

        self.execute_locked(&mut state, &mut *channel, &request, settings)
            .await?;

        let Some(sequence) = state.sequence.as_mut() else {
            return Ok(0);
        };
        if sequence.len() == 0 {
            return Ok(0);
        }

        let mut failures = Vec::new();
        let count = sequence
            .skip_to_update_count(&mut *channel, &mut failures)
            .await;
        if !failures.is_empty() {
            warn!(
                target: "sqlcursor::statement",
                statement = self.id,
                failures = ?failures,
                "Release failed while discarding result sets"
            );
        }
        count.ok_or(QueryError::UnexpectedResultSet)
    }

    pub(crate) async fn execute_batch(
        &self,
        commands: Vec<String>,
        query_timeout: Option<Duration>,
    ) -> Result<Vec<i64>, QueryError> {
        let mut state = self.state.lock().await;
        self.ensure_open()?;
        let mut channel = self.channel.lock().await;

        self.discard_sequence(&mut state, &mut *channel).await;
        let handle = self.ensure_handle(&mut state, &mut *channel).await?;

        debug!(
            target: "sqlcursor::statement",
            statement = self.id,
            commands = commands.len(),
            "Executing batch"
        );

        let counts = channel
            .execute_batch(handle, &commands, query_timeout)
            .await
            .map_err(|e| self.decode(&e))?;

        if counts.len() != commands.len() {
            return Err(QueryError::InvalidState(format!(
                "Batch of {} commands returned {} update counts",
                commands.len(),
                counts.len()
            )));
        }
        Ok(counts)
    }

    /// Close the statement while holding its locks.
    ///
    /// # Returns
    /// One message per failed release.
    async fn close_locked(
        &self,
        state: &mut ExecutionState,
        channel: &mut dyn ExecutionChannel,
    ) -> Vec<String> {
        self.closed.store(true, Ordering::SeqCst);

        let failures =
            release_resources(channel, state.sequence.take(), state.handle.take()).await;

        debug!(
            target: "sqlcursor::statement",
            statement = self.id,
            failures = failures.len(),
            "Statement closed"
        );
        failures
    }

    /// Finish a cursor close and apply close-on-completion.
    ///
    /// Only explicit cursor closes and exhaustion auto-closes come here.
    pub(crate) async fn complete_cursor(
        &self,
        state: &mut ExecutionState,
        channel: &mut dyn ExecutionChannel,
        released: Result<(), ChannelError>,
    ) -> Vec<String> {
        let mut failures = Vec::new();
        if let Err(e) = released {
            failures.push(e.to_string());
        }

        if self.close_on_completion.load(Ordering::SeqCst) && !self.is_closed() {
            debug!(
                target: "sqlcursor::statement",
                statement = self.id,
                "Cursor completed, closing statement"
            );
            failures.extend(self.close_locked(state, channel).await);
        }
        failures
    }

    async fn last_execution_plan(&self) -> Result<Option<String>, QueryError> {
        self.ensure_open()?;
        let state = self.state.lock().await;
        if !state.executed {
            return Err(QueryError::NoStatementExecuted);
        }
        Ok(state.last_plan.clone())
    }

    /// Forward a cancel for this statement's handle.
    ///
    /// Takes neither the state nor the channel lock.
    async fn cancel(&self) -> Result<(), QueryError> {
        self.ensure_open()?;
        let Some(canceller) = self.canceller.as_ref() else {
            return Err(QueryError::UnsupportedCapability(
                "cancel: the channel provides no canceller".to_string(),
            ));
        };
        let Some(handle) = self.allocated.get().copied() else {
            return Ok(());
        };

        debug!(
            target: "sqlcursor::statement",
            statement = self.id,
            handle = handle.as_u64(),
            "Cancelling statement"
        );
        canceller.cancel(handle).await.map_err(|e| self.decode(&e))
    }
}

impl Drop for StatementCore {
    fn drop(&mut self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let state = self.state.get_mut();
        let sequence = state.sequence.take();
        let handle = state.handle.take();
        if sequence.is_none() && handle.is_none() {
            return;
        }

        let id = self.id;
        warn!(
            target: "sqlcursor::statement",
            statement = id,
            "Statement dropped without close, releasing"
        );
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(
                target: "sqlcursor::statement",
                statement = id,
                "No runtime to release dropped statement on"
            );
            return;
        };

        let channel = Arc::clone(&self.channel);
        runtime.spawn(async move {
            let mut channel = channel.lock().await;
            let failures = release_resources(&mut *channel, sequence, handle).await;
            if !failures.is_empty() {
                warn!(
                    target: "sqlcursor::statement",
                    statement = id,
                    failures = ?failures,
                    "Deferred release failed"
                );
            }
        });
    }
}

/// Cancels the running execution of a statement from another task.
///
/// Obtained from [`Statement::cancel_handle`] before starting an execution;
/// the statement itself stays borrowed by that execution. The handle does
/// not keep the statement alive.
#[derive(Clone)]
pub struct CancelHandle {
    core: Weak<StatementCore>,
    statement: u64,
}

impl std::fmt::Debug for CancelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelHandle")
            .field("statement", &self.statement)
            .finish()
    }
}

impl CancelHandle {
    /// Ask the engine to cancel the statement's running execution.
    ///
    /// Does nothing if the statement never allocated a channel handle.
    ///
    /// # Errors
    /// Returns `QueryError::StatementClosed` once the statement is closed or
    /// dropped, or the decoded failure of delivering the cancel.
    pub async fn cancel(&self) -> Result<(), QueryError> {
        let core = self.core.upgrade().ok_or(QueryError::StatementClosed)?;
        core.cancel().await
    }
}

/// SQL statement for query execution.
///
/// Configuration changes apply to the next execution; cursors already
/// produced keep the settings they were created with. Call
/// [`close`](Statement::close) to release the statement's channel resources.
pub struct Statement {
    /// Shared execution core
    pub(super) core: Arc<StatementCore>,
    /// Settings for the next execution
    pub(super) config: StatementConfig,
    /// Connection-wide fallback for a zero fetch size
    default_fetch_size: u32,
    /// Escape translator used when escape processing is on
    translator: Arc<dyn EscapeTranslator>,
    /// Queued batch commands
    pub(super) batch: BatchQueue,
}

impl std::fmt::Debug for Statement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Statement")
            .field("id", &self.core.id)
            .field("connection_id", &self.core.connection_id)
            .field("config", &self.config)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Statement {
    /// Create a statement with default settings over a channel.
    pub fn new(channel: Arc<Mutex<dyn ExecutionChannel>>) -> Self {
        StatementBuilder::new(channel).build()
    }

    /// Unique statement id (for logging).
    pub fn id(&self) -> u64 {
        self.core.id
    }

    /// Check if the statement is closed.
    pub fn is_closed(&self) -> bool {
        self.core.is_closed()
    }

    /// Id of the connection that created this statement.
    ///
    /// # Errors
    /// Returns `QueryError::StatementClosed` if the statement is closed.
    pub fn connection_id(&self) -> Result<u64, QueryError> {
        self.core.ensure_open()?;
        Ok(self.core.connection_id)
    }

    /// Apply escape processing to SQL text.
    pub(super) fn prepare_sql(&self, sql: &str) -> Result<String, QueryError> {
        if self.config.escape_processing {
            self.translator.translate(sql)
        } else {
            Ok(sql.to_string())
        }
    }

    pub(super) fn query_timeout_duration(&self) -> Option<Duration> {
        (self.config.query_timeout > 0)
            .then(|| Duration::from_secs(u64::from(self.config.query_timeout)))
    }

    fn build_request(
        &self,
        sql: &str,
        parameters: Vec<Parameter>,
    ) -> Result<(ExecuteRequest, CursorSettings), QueryError> {
        let request = ExecuteRequest::new(self.prepare_sql(sql)?)
            .with_parameters(parameters)
            .with_result_set_type(self.config.result_set_type)
            .with_timeout_secs(self.config.query_timeout)
            .with_max_rows(self.config.max_rows);
        let settings = CursorSettings::snapshot(&self.config, self.default_fetch_size);
        Ok((request, settings))
    }

    /// Execute SQL text.
    ///
    /// Any previous results of this statement are closed first.
    ///
    /// # Returns
    /// `true` if the first result is a row set.
    ///
    /// # Errors
    /// Returns `QueryError::StatementClosed` if the statement is closed, or
    /// the decoded channel failure.
    pub async fn execute(&mut self, sql: &str) -> Result<bool, QueryError> {
        self.execute_with_parameters(sql, Vec::new()).await
    }

    /// Execute SQL text with positional parameters.
    pub async fn execute_with_parameters(
        &mut self,
        sql: &str,
        parameters: Vec<Parameter>,
    ) -> Result<bool, QueryError> {
        self.core.ensure_open()?;
        let (request, settings) = self.build_request(sql, parameters)?;
        self.core.execute(request, settings).await
    }

    /// Execute a query and return its cursor.
    ///
    /// # Errors
    /// Returns `QueryError::NoResultSet` if the first result is not a row set.
    pub async fn execute_query(&mut self, sql: &str) -> Result<Cursor, QueryError> {
        if !self.execute(sql).await? {
            return Err(QueryError::NoResultSet(
                "Query did not produce a result set".to_string(),
            ));
        }
        self.get_result_set()
            .await?
            .ok_or_else(|| QueryError::NoResultSet("Result set is no longer available".to_string()))
    }

    /// Execute a data-modifying command and return its update count.
    ///
    /// Row sets produced before the first update count are closed and
    /// skipped; the update count becomes the current result. A command
    /// without any result reports 0.
    ///
    /// # Errors
    /// Returns `QueryError::UnexpectedResultSet` if the command produced only
    /// row sets.
    pub async fn execute_update(&mut self, sql: &str) -> Result<i64, QueryError> {
        self.core.ensure_open()?;
        let (request, settings) = self.build_request(sql, Vec::new())?;
        self.core.execute_update(request, settings).await
    }

    /// Cursor for the current result, if it is a row set.
    ///
    /// # Errors
    /// Returns `QueryError::StatementClosed` if the statement is closed.
    pub async fn get_result_set(&self) -> Result<Option<Cursor>, QueryError> {
        self.core.ensure_open()?;
        let state = self.core.state.lock().await;

        let Some(sequence) = state.sequence.as_ref() else {
            return Ok(None);
        };
        Ok(match sequence.current() {
            Some(SequenceItem::Rows(cursor)) => Some(Cursor::new(
                Arc::clone(&self.core),
                sequence.id(),
                sequence.position(),
                cursor,
            )),
            _ => None,
        })
    }

    /// Update count of the current result, or -1 if it is not an update count.
    ///
    /// # Errors
    /// Returns `QueryError::StatementClosed` if the statement is closed.
    pub async fn get_update_count(&self) -> Result<i64, QueryError> {
        self.core.ensure_open()?;
        let state = self.core.state.lock().await;
        Ok(state
            .sequence
            .as_ref()
            .map_or(-1, |sequence| sequence.update_count()))
    }

    /// Move to the next result, closing the current cursor.
    ///
    /// Closing a cursor this way never closes the statement.
    ///
    /// # Returns
    /// `true` if the new current result is a row set.
    ///
    /// # Errors
    /// Returns `QueryError::StatementClosed` if the statement is closed, or
    /// the decoded failure of releasing the previous cursor.
    pub async fn get_more_results(&self) -> Result<bool, QueryError> {
        self.core.ensure_open()?;
        let mut state = self.core.state.lock().await;
        let Some(sequence) = state.sequence.as_mut() else {
            return Ok(false);
        };
        let mut channel = self.core.channel.lock().await;
        sequence
            .advance(&mut *channel)
            .await
            .map_err(|e| self.core.decode(&e))
    }

    /// Maximum bytes delivered for a character value (0 = unlimited).
    pub fn max_field_size(&self) -> u32 {
        self.config.max_field_size
    }

    /// Set the maximum bytes delivered for a character value.
    ///
    /// # Errors
    /// Returns `QueryError::InvalidArgument` if `max` is negative; the prior
    /// value is kept.
    pub fn set_max_field_size(&mut self, max: i32) -> Result<(), QueryError> {
        self.core.ensure_open()?;
        self.config.max_field_size = StatementConfig::non_negative("maxFieldSize", max)?;
        Ok(())
    }

    /// Maximum rows delivered per cursor (0 = unlimited).
    pub fn max_rows(&self) -> u32 {
        self.config.max_rows
    }

    /// Set the maximum rows delivered per cursor.
    ///
    /// # Errors
    /// Returns `QueryError::InvalidArgument` if `max` is negative; the prior
    /// value is kept.
    pub fn set_max_rows(&mut self, max: i32) -> Result<(), QueryError> {
        self.core.ensure_open()?;
        self.config.max_rows = StatementConfig::non_negative("maxRows", max)?;
        Ok(())
    }

    /// Rows requested per page (0 = connection default).
    pub fn fetch_size(&self) -> u32 {
        self.config.fetch_size
    }

    /// Set the rows requested per page.
    ///
    /// # Errors
    /// Returns `QueryError::InvalidArgument` if `rows` is negative; the prior
    /// value is kept.
    pub fn set_fetch_size(&mut self, rows: i32) -> Result<(), QueryError> {
        self.core.ensure_open()?;
        self.config.fetch_size = StatementConfig::non_negative("fetchSize", rows)?;
        Ok(())
    }

    /// Query timeout in seconds (0 = unlimited).
    pub fn query_timeout(&self) -> u32 {
        self.config.query_timeout
    }

    /// Set the query timeout in seconds.
    ///
    /// # Errors
    /// Returns `QueryError::InvalidArgument` if `seconds` is negative; the
    /// prior value is kept.
    pub fn set_query_timeout(&mut self, seconds: i32) -> Result<(), QueryError> {
        self.core.ensure_open()?;
        self.config.query_timeout = StatementConfig::non_negative("queryTimeout", seconds)?;
        Ok(())
    }

    /// Fetch direction; always forward.
    pub fn fetch_direction(&self) -> FetchDirection {
        FetchDirection::Forward
    }

    /// Set the fetch direction.
    ///
    /// Accepts a [`FetchDirection`] or its numeric code.
    ///
    /// # Errors
    /// Returns `QueryError::UnsupportedCapability` for reverse or unknown
    /// directions and `QueryError::InvalidArgument` for any other code.
    pub fn set_fetch_direction(&mut self, direction: impl Into<i32>) -> Result<(), QueryError> {
        self.core.ensure_open()?;
        match FetchDirection::try_from(direction.into())? {
            FetchDirection::Forward => Ok(()),
            other => Err(QueryError::UnsupportedCapability(format!(
                "fetch direction {:?} ({})",
                other,
                other.code()
            ))),
        }
    }

    /// Whether escape sequences are translated before dispatch.
    pub fn escape_processing(&self) -> bool {
        self.config.escape_processing
    }

    /// Enable or disable escape processing.
    pub fn set_escape_processing(&mut self, enable: bool) -> Result<(), QueryError> {
        self.core.ensure_open()?;
        self.config.escape_processing = enable;
        Ok(())
    }

    /// Scrollability requested for new cursors.
    pub fn result_set_type(&self) -> ResultSetType {
        self.config.result_set_type
    }

    /// Mark the statement to close once its current cursor completes.
    ///
    /// Idempotent. The flag cannot be cleared.
    ///
    /// # Errors
    /// Returns `QueryError::StatementClosed` if the statement is closed.
    pub fn close_on_completion(&self) -> Result<(), QueryError> {
        self.core.ensure_open()?;
        self.core.close_on_completion.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Whether the statement closes once its current cursor completes.
    pub fn is_close_on_completion(&self) -> Result<bool, QueryError> {
        self.core.ensure_open()?;
        Ok(self.core.close_on_completion.load(Ordering::SeqCst))
    }

    /// Request statement pooling. Pooling is not supported; the request is
    /// accepted and ignored.
    pub fn set_poolable(&mut self, poolable: bool) -> Result<(), QueryError> {
        self.core.ensure_open()?;
        trace!(
            target: "sqlcursor::statement",
            statement = self.core.id,
            poolable,
            "Statement pooling not supported, ignoring"
        );
        Ok(())
    }

    /// Whether the statement is poolable; always `false`.
    pub fn is_poolable(&self) -> Result<bool, QueryError> {
        self.core.ensure_open()?;
        Ok(false)
    }

    /// Execution plan captured at the most recent successful execution.
    ///
    /// # Errors
    /// Returns `QueryError::NoStatementExecuted` before any execution.
    pub async fn last_execution_plan(&self) -> Result<Option<String>, QueryError> {
        self.core.last_execution_plan().await
    }

    /// Check whether this statement supports a capability.
    pub fn supports(&self, capability: Capability) -> bool {
        matches!(
            capability,
            Capability::ExecutionPlan
                | Capability::BatchExecution
                | Capability::MultipleResults
                | Capability::ScrollInsensitiveCursors
        ) || (capability == Capability::Cancel && self.core.canceller.is_some())
    }

    /// This statement as an execution plan provider.
    pub fn as_plan_provider(&self) -> Option<&dyn ExecutionPlanProvider> {
        self.supports(Capability::ExecutionPlan)
            .then_some(self as &dyn ExecutionPlanProvider)
    }

    /// Ask the engine to cancel the running execution of this statement.
    ///
    /// Does nothing if the statement was never executed. To cancel an
    /// execution in flight, use a [`CancelHandle`] from another task.
    ///
    /// # Errors
    /// Returns `QueryError::UnsupportedCapability` if the statement was built
    /// without a [`CancelChannel`].
    pub async fn cancel(&self) -> Result<(), QueryError> {
        self.core.cancel().await
    }

    /// Handle for cancelling this statement from another task.
    ///
    /// # Errors
    /// Returns `QueryError::StatementClosed` if the statement is closed and
    /// `QueryError::UnsupportedCapability` without a [`CancelChannel`].
    pub fn cancel_handle(&self) -> Result<CancelHandle, QueryError> {
        self.core.ensure_open()?;
        if self.core.canceller.is_none() {
            return Err(QueryError::UnsupportedCapability(
                "cancel: the channel provides no canceller".to_string(),
            ));
        }
        Ok(CancelHandle {
            core: Arc::downgrade(&self.core),
            statement: self.core.id,
        })
    }

    /// Close the statement.
    ///
    /// Idempotent. Closes the current cursor and releases the channel
    /// handle; every release is attempted even if an earlier one fails.
    ///
    /// # Errors
    /// Returns `QueryError::CloseFailed` listing the failed releases; the
    /// statement is closed regardless.
    pub async fn close(&self) -> Result<(), QueryError> {
        if self.core.is_closed() {
            return Ok(());
        }

        let mut state = self.core.state.lock().await;
        if self.core.is_closed() {
            return Ok(());
        }
        let mut channel = self.core.channel.lock().await;

        let failures = self.core.close_locked(&mut state, &mut *channel).await;
        if failures.is_empty() {
            Ok(())
        } else {
            warn!(
                target: "sqlcursor::statement",
                statement = self.core.id,
                failures = ?failures,
                "Release failed while closing statement"
            );
            Err(QueryError::CloseFailed { failures })
        }
    }
}

#[async_trait]
impl ExecutionPlanProvider for Statement {
    async fn last_execution_plan(&self) -> Result<Option<String>, QueryError> {
        self.core.last_execution_plan().await
    }
}

/// Builder for creating `Statement` instances with a fluent API.
pub struct StatementBuilder {
    channel: Arc<Mutex<dyn ExecutionChannel>>,
    canceller: Option<Arc<dyn CancelChannel>>,
    connection_id: u64,
    config: StatementConfig,
    default_fetch_size: u32,
    decoder: Arc<dyn ErrorDecoder>,
    translator: Arc<dyn EscapeTranslator>,
}

impl StatementBuilder {
    /// Create a new statement builder.
    pub fn new(channel: Arc<Mutex<dyn ExecutionChannel>>) -> Self {
        Self {
            channel,
            canceller: None,
            connection_id: 0,
            config: StatementConfig::default(),
            default_fetch_size: DEFAULT_FETCH_SIZE,
            decoder: Arc::new(MessageTemplateDecoder::new()),
            translator: Arc::new(BasicEscapeTranslator::new()),
        }
    }

    /// Set the out-of-band canceller for running executions.
    pub fn canceller(mut self, canceller: Arc<dyn CancelChannel>) -> Self {
        self.canceller = Some(canceller);
        self
    }

    /// Set the owning connection id.
    pub fn connection_id(mut self, connection_id: u64) -> Self {
        self.connection_id = connection_id;
        self
    }

    /// Set the initial configuration.
    pub fn config(mut self, config: StatementConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the requested cursor scrollability.
    pub fn result_set_type(mut self, result_set_type: ResultSetType) -> Self {
        self.config.result_set_type = result_set_type;
        self
    }

    /// Set the fallback fetch size used when the statement's is 0.
    pub fn default_fetch_size(mut self, rows: u32) -> Self {
        self.default_fetch_size = rows;
        self
    }

    /// Set the error decoder.
    pub fn decoder(mut self, decoder: Arc<dyn ErrorDecoder>) -> Self {
        self.decoder = decoder;
        self
    }

    /// Set the escape translator.
    pub fn escape_translator(mut self, translator: Arc<dyn EscapeTranslator>) -> Self {
        self.translator = translator;
        self
    }

    /// Build the statement.
    pub fn build(self) -> Statement {
        let core = StatementCore {
            id: NEXT_STATEMENT_ID.fetch_add(1, Ordering::Relaxed),
            connection_id: self.connection_id,
            channel: self.channel,
            canceller: self.canceller,
            allocated: OnceLock::new(),
            decoder: self.decoder,
            closed: AtomicBool::new(false),
            close_on_completion: AtomicBool::new(false),
            state: Mutex::new(ExecutionState::new()),
        };

        Statement {
            core: Arc::new(core),
            config: self.config,
            default_fetch_size: self.default_fetch_size,
            translator: self.translator,
            batch: BatchQueue::default(),
        }
    }
}
