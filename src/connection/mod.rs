//! Connection ownership of the execution channel.
//!
//! A [`Connection`] owns the execution channel and the connection-wide
//! defaults, and creates statements that share that channel.
//!
//! # Example
//!
//! ```no_run
//! # use sqlcursor::channel::ExecutionChannel;
//! # use sqlcursor::connection::{Connection, ConnectionProperties};
//! # use std::str::FromStr;
//! # async fn example(channel: impl ExecutionChannel + 'static) -> Result<(), Box<dyn std::error::Error>> {
//! let properties = ConnectionProperties::from_str("defaultFetchSize=100")?;
//! let connection = Connection::new(channel, properties);
//!
//! let mut stmt = connection.create_statement()?;
//! stmt.execute_update("INSERT INTO test(col1) VALUES(1)").await?;
//! stmt.close().await?;
//!
//! connection.close().await?;
//! # Ok(())
//! # }
//! ```

pub mod params;

pub use params::{ConnectionProperties, ConnectionPropertiesBuilder};

use crate::channel::messages::ResultSetType;
use crate::channel::{CancelChannel, ErrorDecoder, ExecutionChannel, MessageTemplateDecoder};
use crate::error::ConnectionError;
use crate::query::statement::{Statement, StatementBuilder};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Owner of an execution channel and factory for statements.
///
/// Closing the connection closes the channel; statements created from it
/// fail on their next channel call afterwards.
pub struct Connection {
    id: u64,
    channel: Arc<Mutex<dyn ExecutionChannel>>,
    canceller: Option<Arc<dyn CancelChannel>>,
    properties: ConnectionProperties,
    decoder: Arc<dyn ErrorDecoder>,
    closed: AtomicBool,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("properties", &self.properties)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Connection {
    /// Create a connection over a channel.
    pub fn new(channel: impl ExecutionChannel + 'static, properties: ConnectionProperties) -> Self {
        Self::from_shared(Arc::new(Mutex::new(channel)), properties)
    }

    /// Create a connection over an already shared channel.
    pub fn from_shared(
        channel: Arc<Mutex<dyn ExecutionChannel>>,
        properties: ConnectionProperties,
    ) -> Self {
        let id = NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed);
        debug!(target: "sqlcursor::connection", connection = id, "Connection created");
        Self {
            id,
            channel,
            canceller: None,
            properties,
            decoder: Arc::new(MessageTemplateDecoder::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Replace the error decoder used by new statements.
    pub fn with_decoder(mut self, decoder: Arc<dyn ErrorDecoder>) -> Self {
        self.decoder = decoder;
        self
    }

    /// Let statements cancel running executions through `canceller`.
    pub fn with_canceller(mut self, canceller: Arc<dyn CancelChannel>) -> Self {
        self.canceller = Some(canceller);
        self
    }

    /// Unique connection id.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Connection properties.
    pub fn properties(&self) -> &ConnectionProperties {
        &self.properties
    }

    /// Check if the connection is closed.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Create a statement with the connection defaults.
    ///
    /// # Errors
    /// Returns `ConnectionError::ConnectionClosed` if the connection is closed.
    pub fn create_statement(&self) -> Result<Statement, ConnectionError> {
        self.create_statement_with(self.properties.default_result_set_type)
    }

    /// Create a statement requesting the given cursor scrollability.
    ///
    /// # Errors
    /// Returns `ConnectionError::ConnectionClosed` if the connection is closed.
    pub fn create_statement_with(
        &self,
        result_set_type: ResultSetType,
    ) -> Result<Statement, ConnectionError> {
        if self.is_closed() {
            return Err(ConnectionError::ConnectionClosed);
        }

        let mut builder = StatementBuilder::new(Arc::clone(&self.channel))
            .connection_id(self.id)
            .config(self.properties.statement_config())
            .result_set_type(result_set_type)
            .default_fetch_size(self.properties.default_fetch_size)
            .decoder(Arc::clone(&self.decoder));
        if let Some(canceller) = &self.canceller {
            builder = builder.canceller(Arc::clone(canceller));
        }
        let stmt = builder.build();

        debug!(
            target: "sqlcursor::connection",
            connection = self.id,
            statement = stmt.id(),
            "Statement created"
        );
        Ok(stmt)
    }

    /// Close the connection and its channel.
    ///
    /// Idempotent.
    ///
    /// # Errors
    /// Returns `ConnectionError::Channel` if the channel fails to close; the
    /// connection is closed regardless.
    pub async fn close(&self) -> Result<(), ConnectionError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let mut channel = self.channel.lock().await;
        if !channel.is_open() {
            return Ok(());
        }

        channel.close().await.map_err(|e| {
            warn!(
                target: "sqlcursor::connection",
                connection = self.id,
                error = %e,
                "Channel close failed"
            );
            ConnectionError::Channel(self.decoder.decode(&e))
        })?;

        debug!(target: "sqlcursor::connection", connection = self.id, "Connection closed");
        Ok(())
    }
}
