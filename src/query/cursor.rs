//! Paged cursor over one row-producing result.
//!
//! A [`Cursor`] is a handle onto cursor state owned by its statement. The
//! handle stays valid as a value after the statement moves on, but every
//! operation through a stale handle reports the cursor as closed.

use crate::arrow_conversion::{float_value, integer_value, ArrowConverter};
use crate::channel::messages::{ColumnInfo, ResultSetType, Row, RowSetHandle};
use crate::channel::ExecutionChannel;
use crate::error::{ChannelError, ConversionError, QueryError};
use crate::query::options::CursorSettings;
use crate::query::statement::{ExecutionState, StatementCore};
use arrow::record_batch::RecordBatch;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{trace, warn};

/// Paging state of one row set.
pub(crate) struct CursorState {
    row_set: RowSetHandle,
    columns: Arc<[ColumnInfo]>,
    scrollability: ResultSetType,
    settings: CursorSettings,
    buffer: VecDeque<Row>,
    current: Option<Row>,
    delivered: usize,
    upstream_exhausted: bool,
    released: bool,
    was_null: bool,
    converter: Option<ArrowConverter>,
    closed: Arc<AtomicBool>,
}

impl CursorState {
    pub(crate) fn new(
        row_set: RowSetHandle,
        columns: Vec<ColumnInfo>,
        scrollability: ResultSetType,
        settings: CursorSettings,
    ) -> Self {
        Self {
            row_set,
            columns: columns.into(),
            scrollability,
            settings,
            buffer: VecDeque::new(),
            current: None,
            delivered: 0,
            upstream_exhausted: false,
            released: false,
            was_null: false,
            converter: None,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn limit_reached(&self) -> bool {
        self.settings.row_limit > 0 && self.delivered >= self.settings.row_limit
    }

    /// Rows to request for the next page, honouring the remaining row limit.
    fn page_size(&self) -> usize {
        if self.settings.row_limit == 0 {
            return self.settings.fetch_size;
        }
        let remaining = self.settings.row_limit.saturating_sub(self.delivered);
        self.settings.fetch_size.min(remaining).max(1)
    }

    /// Move to the next row.
    ///
    /// Returns `false` once the row set or the row limit is exhausted; the
    /// caller decides whether that closes the cursor.
    pub(crate) async fn advance(
        &mut self,
        channel: &mut dyn ExecutionChannel,
    ) -> Result<bool, ChannelError> {
        self.current = None;

        if self.limit_reached() {
            return Ok(false);
        }

        if self.buffer.is_empty() && !self.upstream_exhausted {
            let max_rows = self.page_size();
            let page = channel.fetch_page(self.row_set, max_rows).await?;
            trace!(
                target: "sqlcursor::cursor",
                row_set = self.row_set.as_u64(),
                rows = page.rows.len(),
                exhausted = page.exhausted,
                "Fetched page"
            );
            // An empty page ends the row set.
            self.upstream_exhausted = page.exhausted || page.rows.is_empty();
            self.buffer.extend(page.rows);
        }

        match self.buffer.pop_front() {
            Some(mut row) => {
                if self.settings.max_field_size > 0 {
                    for value in row.iter_mut() {
                        truncate_field(value, self.settings.max_field_size);
                    }
                }
                self.current = Some(row);
                self.delivered += 1;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Close the cursor and release its row set.
    ///
    /// Idempotent; the row set is released at most once.
    pub(crate) async fn close(
        &mut self,
        channel: &mut dyn ExecutionChannel,
    ) -> Result<(), ChannelError> {
        self.closed.store(true, Ordering::SeqCst);
        self.buffer.clear();
        self.current = None;

        if self.released {
            return Ok(());
        }
        self.released = true;
        channel.release_row_set(self.row_set).await
    }

    fn current_row(&self) -> Result<&Row, QueryError> {
        self.current.as_ref().ok_or_else(|| {
            QueryError::InvalidState("Cursor is not positioned on a row".to_string())
        })
    }

    fn value(&mut self, column: usize) -> Result<Value, QueryError> {
        let count = self.columns.len();
        let value = self
            .current_row()?
            .get(column)
            .cloned()
            .ok_or(ConversionError::ColumnIndex {
                index: column,
                count,
            })?;
        self.was_null = value.is_null();
        Ok(value)
    }

    fn converter(&mut self) -> Result<&ArrowConverter, ConversionError> {
        if self.converter.is_none() {
            self.converter = Some(ArrowConverter::new(&self.columns)?);
        }
        self.converter
            .as_ref()
            .ok_or_else(|| ConversionError::SchemaMismatch("converter unavailable".to_string()))
    }
}

/// Truncate a character value to at most `max_bytes`, on a char boundary.
fn truncate_field(value: &mut Value, max_bytes: usize) {
    if let Value::String(s) = value {
        if s.len() > max_bytes {
            let mut end = max_bytes;
            while !s.is_char_boundary(end) {
                end -= 1;
            }
            s.truncate(end);
        }
    }
}

/// Handle onto the rows of one result-set item.
///
/// Rows are fetched page by page. A forward-only cursor closes itself inside
/// the [`next`](Cursor::next) call that first finds no more rows; column
/// indices are 0-based.
pub struct Cursor {
    core: Arc<StatementCore>,
    sequence_id: u64,
    index: usize,
    columns: Arc<[ColumnInfo]>,
    scrollability: ResultSetType,
    closed: Arc<AtomicBool>,
}

impl std::fmt::Debug for Cursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cursor")
            .field("sequence_id", &self.sequence_id)
            .field("index", &self.index)
            .field("scrollability", &self.scrollability)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Cursor {
    pub(crate) fn new(
        core: Arc<StatementCore>,
        sequence_id: u64,
        index: usize,
        state: &CursorState,
    ) -> Self {
        Self {
            core,
            sequence_id,
            index,
            columns: Arc::clone(&state.columns),
            scrollability: state.scrollability,
            closed: Arc::clone(&state.closed),
        }
    }

    /// Column metadata.
    pub fn columns(&self) -> &[ColumnInfo] {
        &self.columns
    }

    /// Scrollability granted for this cursor.
    pub fn scrollability(&self) -> ResultSetType {
        self.scrollability
    }

    /// Check if the cursor is closed.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Advance to the next row.
    ///
    /// # Returns
    /// `true` if positioned on a row, `false` when the rows (or the row
    /// limit) are exhausted.
    ///
    /// # Errors
    /// Returns `QueryError::CursorClosed` if the cursor is closed, the
    /// decoded channel failure if fetching a page fails, or
    /// `QueryError::CloseFailed` if the auto-close on exhaustion could not
    /// release everything (the cursor is closed regardless).
    pub async fn next(&self) -> Result<bool, QueryError> {
        let mut state = self.core.state.lock().await;
        let mut channel = self.core.channel.lock().await;

        let cursor = state
            .cursor_mut(self.sequence_id, self.index)
            .filter(|cursor| !cursor.is_closed())
            .ok_or(QueryError::CursorClosed)?;

        if cursor
            .advance(&mut *channel)
            .await
            .map_err(|e| self.core.decode(&e))?
        {
            return Ok(true);
        }

        if self.scrollability == ResultSetType::ForwardOnly {
            self.close_exhausted(&mut state, &mut *channel).await?;
        }

        Ok(false)
    }

    /// Read up to `max_rows` rows into an Arrow RecordBatch.
    ///
    /// Rows are consumed through the same paging and row-limit rules as
    /// [`next`](Cursor::next). Returns `None` when no rows remain; a
    /// forward-only cursor closes itself in that call.
    ///
    /// # Errors
    /// Returns `QueryError::InvalidArgument` if `max_rows` is 0,
    /// `QueryError::CursorClosed` if the cursor is closed, a conversion
    /// error if a value does not match its column type, or
    /// `QueryError::CloseFailed` from the auto-close.
    pub async fn next_batch(&self, max_rows: usize) -> Result<Option<RecordBatch>, QueryError> {
        if max_rows == 0 {
            return Err(QueryError::invalid_argument("maxRows", "must be > 0"));
        }

        let mut state = self.core.state.lock().await;
        let mut channel = self.core.channel.lock().await;

        let cursor = state
            .cursor_mut(self.sequence_id, self.index)
            .filter(|cursor| !cursor.is_closed())
            .ok_or(QueryError::CursorClosed)?;

        let mut rows = Vec::with_capacity(max_rows.min(cursor.settings.fetch_size));
        while rows.len() < max_rows {
            let has_row = cursor
                .advance(&mut *channel)
                .await
                .map_err(|e| self.core.decode(&e))?;
            match (has_row, cursor.current.as_ref()) {
                (true, Some(row)) => rows.push(row.clone()),
                _ => break,
            }
        }

        if !rows.is_empty() {
            return Ok(Some(cursor.converter()?.convert_rows(&rows)?));
        }

        if self.scrollability == ResultSetType::ForwardOnly {
            self.close_exhausted(&mut state, &mut *channel).await?;
        }

        Ok(None)
    }

    /// Close the cursor.
    ///
    /// Idempotent. Closing an open cursor of a statement marked
    /// close-on-completion also closes the statement.
    ///
    /// # Errors
    /// Returns `QueryError::CloseFailed` if releasing resources failed; the
    /// cursor is closed regardless.
    pub async fn close(&self) -> Result<(), QueryError> {
        if self.is_closed() {
            return Ok(());
        }

        let mut state = self.core.state.lock().await;
        let mut channel = self.core.channel.lock().await;

        let Some(cursor) = state.cursor_mut(self.sequence_id, self.index) else {
            return Ok(());
        };
        if cursor.is_closed() {
            return Ok(());
        }

        let released = cursor.close(&mut *channel).await;
        let failures = self
            .core
            .complete_cursor(&mut state, &mut *channel, released)
            .await;

        if failures.is_empty() {
            Ok(())
        } else {
            Err(QueryError::CloseFailed { failures })
        }
    }

    /// 1-based number of the current row; 0 before the first row.
    pub async fn row_number(&self) -> Result<usize, QueryError> {
        let mut state = self.core.state.lock().await;
        let cursor = self.open_state(&mut state)?;
        Ok(if cursor.current.is_some() {
            cursor.delivered
        } else {
            0
        })
    }

    /// Whether the last value read was SQL NULL.
    pub async fn was_null(&self) -> Result<bool, QueryError> {
        let mut state = self.core.state.lock().await;
        Ok(self.open_state(&mut state)?.was_null)
    }

    /// Raw value of a column in the current row.
    pub async fn get_value(&self, column: usize) -> Result<Value, QueryError> {
        let mut state = self.core.state.lock().await;
        self.open_state(&mut state)?.value(column)
    }

    /// Column value as a string; numbers and booleans are rendered.
    pub async fn get_string(&self, column: usize) -> Result<Option<String>, QueryError> {
        Ok(match self.get_value(column).await? {
            Value::Null => None,
            Value::String(s) => Some(s),
            other => Some(other.to_string()),
        })
    }

    /// Column value as an integer.
    pub async fn get_i64(&self, column: usize) -> Result<Option<i64>, QueryError> {
        let (row, value) = self.positioned_value(column).await?;
        Ok(integer_value(&value, row, column)?)
    }

    /// Column value as a double.
    pub async fn get_f64(&self, column: usize) -> Result<Option<f64>, QueryError> {
        let (row, value) = self.positioned_value(column).await?;
        Ok(float_value(&value, row, column)?)
    }

    /// Column value as a boolean.
    ///
    /// Accepts booleans, the numbers 0 and 1, and the strings `true`/`false`.
    pub async fn get_bool(&self, column: usize) -> Result<Option<bool>, QueryError> {
        let (row, value) = self.positioned_value(column).await?;
        let parsed = match &value {
            Value::Null => return Ok(None),
            Value::Bool(b) => Some(*b),
            Value::Number(n) => match n.as_i64() {
                Some(0) => Some(false),
                Some(1) => Some(true),
                _ => None,
            },
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "1" => Some(true),
                "false" | "0" => Some(false),
                _ => None,
            },
            _ => None,
        };
        parsed.map(Some).ok_or_else(|| {
            ConversionError::ValueConversionFailed {
                row,
                column,
                message: format!("Expected boolean, got: {:?}", value),
            }
            .into()
        })
    }

    async fn positioned_value(&self, column: usize) -> Result<(usize, Value), QueryError> {
        let mut state = self.core.state.lock().await;
        let cursor = self.open_state(&mut state)?;
        let value = cursor.value(column)?;
        Ok((cursor.delivered.saturating_sub(1), value))
    }

    /// Auto-close after exhaustion, then apply close-on-completion.
    ///
    /// The cursor (and the statement, if cascading) ends up closed even
    /// when a release fails; the failures are reported afterwards.
    async fn close_exhausted(
        &self,
        state: &mut ExecutionState,
        channel: &mut dyn ExecutionChannel,
    ) -> Result<(), QueryError> {
        let Some(cursor) = state.cursor_mut(self.sequence_id, self.index) else {
            return Ok(());
        };
        let released = cursor.close(channel).await;
        let failures = self.core.complete_cursor(state, channel, released).await;
        if failures.is_empty() {
            return Ok(());
        }

        warn!(
            target: "sqlcursor::cursor",
            failures = ?failures,
            "Release failed while closing exhausted cursor"
        );
        Err(QueryError::CloseFailed { failures })
    }

    fn open_state<'a>(
        &self,
        state: &'a mut ExecutionState,
    ) -> Result<&'a mut CursorState, QueryError> {
        state
            .cursor_mut(self.sequence_id, self.index)
            .filter(|cursor| !cursor.is_closed())
            .ok_or(QueryError::CursorClosed)
    }
}
