//! Service manager channel and session handling.

use crate::channel::ErrorDecoder;
use crate::error::{ChannelError, ServiceError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, trace, warn};

/// Handle of an attachment to the service manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServiceHandle(pub u64);

impl ServiceHandle {
    /// Create a new service handle.
    pub fn new(handle: u64) -> Self {
        Self(handle)
    }

    /// Get the raw handle value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

/// Service action to start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceAction {
    /// Database statistics report
    DatabaseStatistics,
}

/// Request to start a service action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRequest {
    /// Action to run
    pub action: ServiceAction,
    /// Database the action applies to
    pub database: String,
    /// Action-specific option bits
    pub options: u32,
}

/// Channel to the database service manager.
#[async_trait]
pub trait ServiceChannel: Send + Sync {
    /// Attach to the service manager.
    async fn attach(&mut self) -> Result<ServiceHandle, ChannelError>;

    /// Start an action on an attachment.
    async fn start(
        &mut self,
        handle: ServiceHandle,
        request: &ServiceRequest,
    ) -> Result<(), ChannelError>;

    /// Next line of the running action's output, or `None` when it is done.
    async fn next_line(&mut self, handle: ServiceHandle) -> Result<Option<String>, ChannelError>;

    /// Detach from the service manager.
    async fn detach(&mut self, handle: ServiceHandle) -> Result<(), ChannelError>;
}

/// One attachment to the service manager.
///
/// Obtained through [`ServiceSession::run`], which detaches on every exit
/// path. If the running future is dropped while attached, the detach is
/// spawned onto the current tokio runtime.
pub struct ServiceSession {
    channel: Arc<Mutex<dyn ServiceChannel>>,
    handle: ServiceHandle,
    attached: bool,
}

impl ServiceSession {
    /// Attach, run `request` writing its output to `sink`, then detach.
    ///
    /// Detach runs even when starting or draining the action fails. The
    /// first failure wins; a detach failure is reported only if everything
    /// before it succeeded.
    pub async fn run(
        shared: &Arc<Mutex<dyn ServiceChannel>>,
        decoder: &dyn ErrorDecoder,
        request: &ServiceRequest,
        sink: &mut dyn Write,
    ) -> Result<(), ServiceError> {
        let mut channel = shared.lock().await;

        let handle = channel
            .attach()
            .await
            .map_err(|e| ServiceError::Service(decoder.decode(&e)))?;
        let mut session = ServiceSession {
            channel: Arc::clone(shared),
            handle,
            attached: true,
        };
        debug!(
            target: "sqlcursor::service",
            handle = handle.as_u64(),
            action = ?request.action,
            "Attached to service manager"
        );

        let outcome = session.drive(&mut *channel, decoder, request, sink).await;
        let detached = session.detach(&mut *channel).await;

        outcome?;
        detached.map_err(|e| ServiceError::Service(decoder.decode(&e)))
    }

    async fn drive(
        &mut self,
        channel: &mut dyn ServiceChannel,
        decoder: &dyn ErrorDecoder,
        request: &ServiceRequest,
        sink: &mut dyn Write,
    ) -> Result<(), ServiceError> {
        channel
            .start(self.handle, request)
            .await
            .map_err(|e| ServiceError::Service(decoder.decode(&e)))?;

        let mut lines = 0usize;
        while let Some(line) = channel
            .next_line(self.handle)
            .await
            .map_err(|e| ServiceError::Service(decoder.decode(&e)))?
        {
            writeln!(sink, "{}", line)?;
            lines += 1;
        }
        sink.flush()?;

        trace!(
            target: "sqlcursor::service",
            handle = self.handle.as_u64(),
            lines,
            "Service output drained"
        );
        Ok(())
    }

    async fn detach(&mut self, channel: &mut dyn ServiceChannel) -> Result<(), ChannelError> {
        self.attached = false;
        let result = channel.detach(self.handle).await;
        match &result {
            Ok(()) => debug!(
                target: "sqlcursor::service",
                handle = self.handle.as_u64(),
                "Detached from service manager"
            ),
            Err(e) => warn!(
                target: "sqlcursor::service",
                handle = self.handle.as_u64(),
                error = %e,
                "Detach from service manager failed"
            ),
        }
        result
    }
}

impl Drop for ServiceSession {
    fn drop(&mut self) {
        if !self.attached {
            return;
        }
        let handle = self.handle;
        warn!(
            target: "sqlcursor::service",
            handle = handle.as_u64(),
            "Service session dropped while attached, detaching"
        );

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let channel = Arc::clone(&self.channel);
        runtime.spawn(async move {
            if let Err(e) = channel.lock().await.detach(handle).await {
                warn!(
                    target: "sqlcursor::service",
                    handle = handle.as_u64(),
                    error = %e,
                    "Deferred detach failed"
                );
            }
        });
    }
}
