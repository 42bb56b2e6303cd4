//! Common test utilities for sqlcursor-rs integration tests.
//!
//! # Scripted channel
//!
//! [`ScriptedChannel`] is an in-memory stand-in for a database engine. It
//! understands the handful of commands the integration tests issue against a
//! single table `test(col1 INTEGER)`:
//!
//! | Command                                          | Result                          |
//! |--------------------------------------------------|---------------------------------|
//! | `INSERT INTO test(col1) VALUES(n)`               | update count 1                  |
//! | `INSERT INTO test(col1) VALUES(n) RETURNING col1`| row set `[n]`, update count 1   |
//! | `SELECT col1 FROM test [ORDER BY col1]`          | row set with a plan             |
//! | `SELECT CURRENT_DATE FROM RDB$DATABASE`          | row set with one date           |
//! | `DELETE FROM test`                               | update count = rows removed     |
//! | `EXECUTE PROCEDURE testexception`                | engine exception                |
//! | `EXECUTE BLOCK ...two_param_exception...`        | parametrized engine exception   |
//! | `EXECUTE PROCEDURE wait_for_cancel`              | blocks until cancelled          |
//! | anything containing `{`                          | syntax error (unprocessed escape) |
//!
//! Everything the engine is asked to do is recorded in a shared [`Journal`]
//! so tests can assert on released handles and page sizes after the channel
//! has been moved into a connection.

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::json;
use sqlcursor::channel::{
    CancelChannel, ColumnInfo, DataType, ExecuteRequest, ExecutionChannel, ExecutionOutcome, Page,
    ResultItem, ResultSetType, Row, RowSetHandle, StatementHandle,
};
use sqlcursor::connection::{Connection, ConnectionProperties};
use sqlcursor::error::{ChannelError, EngineFailure, FailureCategory, MessageFragment};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

// ============================================================================
// Test data
// ============================================================================

/// Number of rows inserted by [`insert_test_data`].
pub const DATA_ITEMS: i64 = 5;

/// Command that runs until the statement is cancelled.
pub const WAIT_FOR_CANCEL: &str = "EXECUTE PROCEDURE wait_for_cancel";

/// Query used to read back the test table.
pub const SELECT_DATA: &str = "SELECT col1 FROM test ORDER BY col1";

/// Insert command for one value.
pub fn insert_sql(value: i64) -> String {
    format!("INSERT INTO test(col1) VALUES({})", value)
}

// ============================================================================
// Journal
// ============================================================================

/// Everything the scripted engine observed.
#[derive(Debug, Default)]
pub struct JournalEntries {
    pub executed: Vec<String>,
    pub batches: Vec<Vec<String>>,
    pub timeouts: Vec<Option<Duration>>,
    pub page_requests: Vec<usize>,
    pub released_row_sets: Vec<u64>,
    pub released_statements: Vec<u64>,
    pub cancelled: Vec<u64>,
    pub closed: bool,
}

/// Shared view onto a [`ScriptedChannel`]'s journal.
#[derive(Debug, Clone, Default)]
pub struct Journal(Arc<Mutex<JournalEntries>>);

impl Journal {
    fn record<R>(&self, f: impl FnOnce(&mut JournalEntries) -> R) -> R {
        let mut entries = self.0.lock().expect("journal lock poisoned");
        f(&mut entries)
    }

    pub fn executed(&self) -> Vec<String> {
        self.record(|j| j.executed.clone())
    }

    pub fn batches(&self) -> Vec<Vec<String>> {
        self.record(|j| j.batches.clone())
    }

    pub fn timeouts(&self) -> Vec<Option<Duration>> {
        self.record(|j| j.timeouts.clone())
    }

    pub fn page_requests(&self) -> Vec<usize> {
        self.record(|j| j.page_requests.clone())
    }

    pub fn released_row_sets(&self) -> Vec<u64> {
        self.record(|j| j.released_row_sets.clone())
    }

    pub fn released_statements(&self) -> Vec<u64> {
        self.record(|j| j.released_statements.clone())
    }

    pub fn cancelled(&self) -> Vec<u64> {
        self.record(|j| j.cancelled.clone())
    }

    pub fn is_closed(&self) -> bool {
        self.record(|j| j.closed)
    }
}

// ============================================================================
// Scripted channel
// ============================================================================

struct OpenRowSet {
    rows: VecDeque<Row>,
}

/// In-memory execution channel for integration tests.
pub struct ScriptedChannel {
    table: Vec<i64>,
    next_handle: u64,
    statements: HashSet<u64>,
    row_sets: HashMap<u64, OpenRowSet>,
    journal: Journal,
    cancel_signal: Arc<Notify>,
    open: bool,
}

impl ScriptedChannel {
    /// Create an empty engine and a journal observing it.
    pub fn new() -> (Self, Journal) {
        let journal = Journal::default();
        let channel = Self {
            table: Vec::new(),
            next_handle: 1,
            statements: HashSet::new(),
            row_sets: HashMap::new(),
            journal: journal.clone(),
            cancel_signal: Arc::new(Notify::new()),
            open: true,
        };
        (channel, journal)
    }

    /// Canceller that interrupts this engine's running command.
    pub fn canceller(&self) -> Arc<ScriptedCanceller> {
        Arc::new(ScriptedCanceller {
            signal: Arc::clone(&self.cancel_signal),
            journal: self.journal.clone(),
        })
    }

    fn allocate(&mut self) -> u64 {
        let handle = self.next_handle;
        self.next_handle += 1;
        handle
    }

    fn open_row_set(
        &mut self,
        column: &str,
        type_name: &str,
        rows: Vec<Row>,
        scrollability: ResultSetType,
    ) -> ResultItem {
        let handle = self.allocate();
        self.row_sets.insert(
            handle,
            OpenRowSet {
                rows: rows.into(),
            },
        );
        ResultItem::RowSet {
            handle: RowSetHandle::new(handle),
            columns: vec![ColumnInfo::new(column, DataType::named(type_name))],
            scrollability,
        }
    }

    fn ensure_open(&self) -> Result<(), ChannelError> {
        if self.open {
            Ok(())
        } else {
            Err(ChannelError::Closed)
        }
    }

    fn ensure_statement(&self, handle: StatementHandle) -> Result<(), ChannelError> {
        if self.statements.contains(&handle.as_u64()) {
            Ok(())
        } else {
            Err(ChannelError::InvalidHandle(format!(
                "statement {}",
                handle.as_u64()
            )))
        }
    }

    /// Run one command against the in-memory table.
    ///
    /// Queries grant the requested scrollability; `RETURNING` rows are
    /// always forward-only.
    fn run(
        &mut self,
        sql: &str,
        scrollability: ResultSetType,
    ) -> Result<ExecutionOutcome, ChannelError> {
        let sql = sql.trim();

        if sql.contains('{') {
            return Err(ChannelError::Engine(
                EngineFailure::new(FailureCategory::Syntax, 335544569, "Dynamic SQL Error")
                    .with_sql_state("42S22")
                    .with_fragment(MessageFragment::plain("SQL error code = -206"))
                    .with_fragment(MessageFragment::plain("Column unknown"))
                    .with_fragment(MessageFragment::plain("{FN"))
                    .with_fragment(MessageFragment::plain("At line 1, column 13")),
            ));
        }

        if let Some(rest) = sql.strip_prefix("INSERT INTO test(col1) VALUES(") {
            let (value, tail) = rest
                .split_once(')')
                .ok_or_else(|| syntax_error("Unexpected end of command"))?;
            let value: i64 = value
                .trim()
                .parse()
                .map_err(|_| syntax_error("Token unknown"))?;
            self.table.push(value);

            let mut items = Vec::new();
            if tail.trim().eq_ignore_ascii_case("RETURNING col1") {
                items.push(self.open_row_set(
                    "COL1",
                    "INTEGER",
                    vec![vec![json!(value)]],
                    ResultSetType::ForwardOnly,
                ));
            }
            items.push(ResultItem::UpdateCount(1));
            return Ok(ExecutionOutcome::new(items));
        }

        match sql {
            "SELECT col1 FROM test ORDER BY col1" => {
                let mut values = self.table.clone();
                values.sort_unstable();
                let rows = values.into_iter().map(|v| vec![json!(v)]).collect();
                let item = self.open_row_set("COL1", "INTEGER", rows, scrollability);
                Ok(ExecutionOutcome::new(vec![item]).with_plan("PLAN (TEST ORDER PK_TEST)"))
            }
            "SELECT col1 FROM test" => {
                let rows = self.table.iter().map(|v| vec![json!(v)]).collect();
                let item = self.open_row_set("COL1", "INTEGER", rows, scrollability);
                Ok(ExecutionOutcome::new(vec![item]).with_plan("PLAN (TEST NATURAL)"))
            }
            "SELECT CURRENT_DATE FROM RDB$DATABASE" => {
                let item = self.open_row_set(
                    "CURRENT_DATE",
                    "DATE",
                    vec![vec![json!("2026-10-16")]],
                    scrollability,
                );
                Ok(ExecutionOutcome::new(vec![item]).with_plan("PLAN (RDB$DATABASE NATURAL)"))
            }
            "DELETE FROM test" => {
                let removed = self.table.len() as i64;
                self.table.clear();
                Ok(ExecutionOutcome::new(vec![ResultItem::UpdateCount(removed)]))
            }
            "EXECUTE PROCEDURE testexception" => Err(ChannelError::Engine(
                EngineFailure::new(FailureCategory::Exception, 335544517, "exception 1")
                    .with_fragment(MessageFragment::plain("SIMPLE_EXCEPTION"))
                    .with_fragment(MessageFragment::plain("Custom message"))
                    .with_fragment(MessageFragment::plain("At procedure 'TESTEXCEPTION' line: 1, col: 45")),
            )),
            _ if sql.starts_with("EXECUTE BLOCK") && sql.contains("two_param_exception") => {
                Err(ChannelError::Engine(
                    EngineFailure::new(FailureCategory::Exception, 335544517, "exception 2")
                        .with_fragment(MessageFragment::plain("TWO_PARAM_EXCEPTION"))
                        .with_fragment(MessageFragment::with_parameters(
                            "Param 1 '@1', Param 2 '@2'",
                            vec!["value_1".to_string(), "value2".to_string()],
                        ))
                        .with_fragment(MessageFragment::plain("At block line: 1, col: 37")),
                ))
            }
            _ => Err(syntax_error("Token unknown")),
        }
    }
}

fn syntax_error(message: &str) -> ChannelError {
    ChannelError::Engine(
        EngineFailure::new(FailureCategory::Syntax, 335544634, "Dynamic SQL Error")
            .with_fragment(MessageFragment::plain(message)),
    )
}

#[async_trait]
impl ExecutionChannel for ScriptedChannel {
    async fn allocate_statement(&mut self) -> Result<StatementHandle, ChannelError> {
        self.ensure_open()?;
        let handle = self.allocate();
        self.statements.insert(handle);
        Ok(StatementHandle::new(handle))
    }

    async fn execute(
        &mut self,
        handle: StatementHandle,
        request: &ExecuteRequest,
    ) -> Result<ExecutionOutcome, ChannelError> {
        self.ensure_open()?;
        self.ensure_statement(handle)?;
        self.journal.record(|j| {
            j.executed.push(request.sql.clone());
            j.timeouts.push(request.query_timeout);
        });

        if request.sql.trim() == WAIT_FOR_CANCEL {
            self.cancel_signal.notified().await;
            return Err(ChannelError::Engine(EngineFailure::new(
                FailureCategory::Cancelled,
                335544794,
                "operation was cancelled",
            )));
        }
        self.run(&request.sql, request.result_set_type)
    }

    async fn execute_batch(
        &mut self,
        handle: StatementHandle,
        commands: &[String],
        query_timeout: Option<Duration>,
    ) -> Result<Vec<i64>, ChannelError> {
        self.ensure_open()?;
        self.ensure_statement(handle)?;
        self.journal.record(|j| {
            j.batches.push(commands.to_vec());
            j.timeouts.push(query_timeout);
        });

        // Stops at the first failing command.
        let mut counts = Vec::with_capacity(commands.len());
        for sql in commands {
            let outcome = self.run(sql, ResultSetType::ForwardOnly)?;
            let count = outcome
                .items
                .iter()
                .find_map(|item| match item {
                    ResultItem::UpdateCount(count) => Some(*count),
                    ResultItem::RowSet { .. } => None,
                })
                .unwrap_or(0);
            counts.push(count);
        }
        Ok(counts)
    }

    async fn fetch_page(
        &mut self,
        row_set: RowSetHandle,
        max_rows: usize,
    ) -> Result<Page, ChannelError> {
        self.ensure_open()?;
        self.journal.record(|j| j.page_requests.push(max_rows));

        let open = self
            .row_sets
            .get_mut(&row_set.as_u64())
            .ok_or_else(|| ChannelError::InvalidHandle(format!("row set {}", row_set.as_u64())))?;
        let take = max_rows.min(open.rows.len());
        let rows: Vec<Row> = open.rows.drain(..take).collect();
        Ok(Page::new(rows, open.rows.is_empty()))
    }

    async fn release_row_set(&mut self, row_set: RowSetHandle) -> Result<(), ChannelError> {
        self.ensure_open()?;
        self.row_sets
            .remove(&row_set.as_u64())
            .ok_or_else(|| ChannelError::InvalidHandle(format!("row set {}", row_set.as_u64())))?;
        self.journal
            .record(|j| j.released_row_sets.push(row_set.as_u64()));
        Ok(())
    }

    async fn release_statement(&mut self, handle: StatementHandle) -> Result<(), ChannelError> {
        self.ensure_open()?;
        if !self.statements.remove(&handle.as_u64()) {
            return Err(ChannelError::InvalidHandle(format!(
                "statement {}",
                handle.as_u64()
            )));
        }
        self.journal
            .record(|j| j.released_statements.push(handle.as_u64()));
        Ok(())
    }

    async fn close(&mut self) -> Result<(), ChannelError> {
        self.open = false;
        self.row_sets.clear();
        self.statements.clear();
        self.journal.record(|j| j.closed = true);
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }
}

/// Out-of-band canceller of a [`ScriptedChannel`].
pub struct ScriptedCanceller {
    signal: Arc<Notify>,
    journal: Journal,
}

#[async_trait]
impl CancelChannel for ScriptedCanceller {
    async fn cancel(&self, handle: StatementHandle) -> Result<(), ChannelError> {
        self.journal.record(|j| j.cancelled.push(handle.as_u64()));
        self.signal.notify_waiters();
        Ok(())
    }
}

// ============================================================================
// Connection helpers
// ============================================================================

/// Open a connection over a fresh scripted engine.
pub fn test_connection() -> (Connection, Journal) {
    test_connection_with(ConnectionProperties::default())
}

/// Open a connection with explicit properties over a fresh scripted engine.
pub fn test_connection_with(properties: ConnectionProperties) -> (Connection, Journal) {
    let (channel, journal) = ScriptedChannel::new();
    let canceller = channel.canceller();
    let connection = Connection::new(channel, properties).with_canceller(canceller);
    (connection, journal)
}

/// Insert values `0..DATA_ITEMS` into the test table.
pub async fn insert_test_data(connection: &Connection) {
    let mut stmt = connection
        .create_statement()
        .expect("Failed to create statement");
    for value in 0..DATA_ITEMS {
        let count = stmt
            .execute_update(&insert_sql(value))
            .await
            .expect("Failed to insert test data");
        assert_eq!(count, 1);
    }
    stmt.close().await.expect("Failed to close statement");
}
