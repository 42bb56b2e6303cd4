//! Batch execution of queued SQL commands.

use crate::error::QueryError;
use crate::query::statement::Statement;
use tracing::debug;

/// Ordered queue of SQL commands awaiting batch execution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchQueue {
    commands: Vec<String>,
}

impl BatchQueue {
    /// Append a command.
    pub fn push(&mut self, sql: impl Into<String>) {
        self.commands.push(sql.into());
    }

    /// Number of queued commands.
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Check if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Drop all queued commands.
    pub fn clear(&mut self) {
        self.commands.clear();
    }

    /// Take all queued commands, leaving the queue empty.
    pub fn take(&mut self) -> Vec<String> {
        std::mem::take(&mut self.commands)
    }
}

impl Statement {
    /// Queue a SQL command for batch execution.
    ///
    /// # Errors
    /// Returns `QueryError::StatementClosed` if the statement is closed.
    pub fn add_batch(&mut self, sql: &str) -> Result<(), QueryError> {
        if self.is_closed() {
            return Err(QueryError::StatementClosed);
        }
        self.batch.push(sql);
        Ok(())
    }

    /// Drop all queued commands.
    pub fn clear_batch(&mut self) -> Result<(), QueryError> {
        if self.is_closed() {
            return Err(QueryError::StatementClosed);
        }
        self.batch.clear();
        Ok(())
    }

    /// Number of queued commands.
    pub fn batch_size(&self) -> usize {
        self.batch.len()
    }

    /// Execute all queued commands as one request.
    ///
    /// The queue is cleared whether or not execution succeeds. Any active
    /// results of this statement are closed first. Whether a failing command
    /// stops the remaining ones is up to the execution channel.
    ///
    /// # Returns
    /// One update count per command, in submission order. An empty queue
    /// returns an empty vector without contacting the channel.
    ///
    /// # Errors
    /// Returns `QueryError::StatementClosed` if the statement is closed, the
    /// decoded channel failure, or `QueryError::InvalidState` if the channel
    /// reports a different number of counts than commands were sent.
    pub async fn execute_batch(&mut self) -> Result<Vec<i64>, QueryError> {
        if self.is_closed() {
            return Err(QueryError::StatementClosed);
        }

        let queued = self.batch.take();
        if queued.is_empty() {
            debug!(
                target: "sqlcursor::batch",
                statement = self.id(),
                "Empty batch, nothing to execute"
            );
            return Ok(Vec::new());
        }

        let commands = queued
            .iter()
            .map(|sql| self.prepare_sql(sql))
            .collect::<Result<Vec<_>, _>>()?;

        self.core
            .execute_batch(commands, self.query_timeout_duration())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::messages::{ExecutionOutcome, StatementHandle};
    use crate::channel::ExecutionChannel;
    use crate::error::{ChannelError, EngineFailure, ErrorKind, FailureCategory};
    use crate::query::statement::tests::{row_set, MockChannel};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::Mutex;

    fn statement(channel: MockChannel) -> Statement {
        let channel: Arc<Mutex<dyn ExecutionChannel>> = Arc::new(Mutex::new(channel));
        Statement::new(channel)
    }

    #[test]
    fn test_batch_queue() {
        let mut queue = BatchQueue::default();
        assert!(queue.is_empty());
        queue.push("INSERT INTO test(col1) VALUES(1)");
        queue.push("INSERT INTO test(col1) VALUES(2)");
        assert_eq!(queue.len(), 2);

        let taken = queue.take();
        assert_eq!(taken.len(), 2);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_execute_batch_returns_counts_in_order() {
        let mut channel = MockChannel::new();
        channel
            .expect_allocate_statement()
            .times(1)
            .returning(|| Ok(StatementHandle::new(3)));
        channel
            .expect_execute_batch()
            .withf(|handle, commands, timeout| {
                handle.as_u64() == 3
                    && commands.len() == 3
                    && commands[2] == "INSERT INTO test(col1) VALUES(2)"
                    && *timeout == Some(Duration::from_secs(10))
            })
            .times(1)
            .returning(|_, commands, _| Ok(vec![1; commands.len()]));

        let mut stmt = statement(channel);
        stmt.set_query_timeout(10).unwrap();
        for i in 0..3 {
            stmt.add_batch(&format!("INSERT INTO test(col1) VALUES({})", i))
                .unwrap();
        }

        let counts = stmt.execute_batch().await.unwrap();
        assert_eq!(counts, vec![1, 1, 1]);
        assert_eq!(stmt.batch_size(), 0);
    }

    #[tokio::test]
    async fn test_empty_batch_skips_channel() {
        let mut stmt = statement(MockChannel::new());
        assert!(stmt.execute_batch().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_batch_clears_queue() {
        let mut channel = MockChannel::new();
        channel
            .expect_allocate_statement()
            .times(1)
            .returning(|| Ok(StatementHandle::new(3)));
        channel.expect_execute_batch().times(1).returning(|_, _, _| {
            Err(ChannelError::Engine(EngineFailure::new(
                FailureCategory::Constraint,
                335544665,
                "violation of PRIMARY or UNIQUE KEY constraint",
            )))
        });

        let mut stmt = statement(channel);
        stmt.add_batch("INSERT INTO test(col1) VALUES(1)").unwrap();
        stmt.add_batch("INSERT INTO test(col1) VALUES(1)").unwrap();

        let err = stmt.execute_batch().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConstraintViolation);
        assert_eq!(stmt.batch_size(), 0);
    }

    #[tokio::test]
    async fn test_count_mismatch_is_invalid_state() {
        let mut channel = MockChannel::new();
        channel
            .expect_allocate_statement()
            .times(1)
            .returning(|| Ok(StatementHandle::new(3)));
        channel
            .expect_execute_batch()
            .times(1)
            .returning(|_, _, _| Ok(vec![1]));

        let mut stmt = statement(channel);
        stmt.add_batch("DELETE FROM a").unwrap();
        stmt.add_batch("DELETE FROM b").unwrap();

        let err = stmt.execute_batch().await.unwrap_err();
        assert!(matches!(err, QueryError::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_batch_closes_active_cursor() {
        let mut channel = MockChannel::new();
        channel
            .expect_allocate_statement()
            .times(1)
            .returning(|| Ok(StatementHandle::new(3)));
        channel
            .expect_execute()
            .times(1)
            .returning(|_, _| Ok(ExecutionOutcome::new(vec![row_set(9)])));
        channel
            .expect_release_row_set()
            .times(1)
            .returning(|_| Ok(()));
        channel
            .expect_execute_batch()
            .times(1)
            .returning(|_, _, _| Ok(vec![1]));

        let mut stmt = statement(channel);
        let cursor = stmt.execute_query("SELECT col1 FROM test").await.unwrap();

        stmt.add_batch("INSERT INTO test(col1) VALUES(5)").unwrap();
        stmt.execute_batch().await.unwrap();

        assert!(cursor.is_closed());
        assert!(stmt.get_result_set().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_batch_on_closed_statement() {
        let mut stmt = statement(MockChannel::new());
        stmt.add_batch("DELETE FROM a").unwrap();
        stmt.close().await.unwrap();

        assert_eq!(
            stmt.add_batch("DELETE FROM b").unwrap_err().kind(),
            ErrorKind::StatementClosed
        );
        assert_eq!(
            stmt.execute_batch().await.unwrap_err().kind(),
            ErrorKind::StatementClosed
        );
    }
}
