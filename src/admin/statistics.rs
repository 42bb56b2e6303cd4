//! Database statistics service action.

use crate::admin::service::{ServiceAction, ServiceChannel, ServiceRequest, ServiceSession};
use crate::channel::{ErrorDecoder, MessageTemplateDecoder};
use crate::error::ServiceError;
use std::io::Write;
use std::sync::Arc;
use tokio::sync::Mutex;

const DB_LOG: u32 = 0x02;
const HEADER_PAGES: u32 = 0x04;

/// Runs the database statistics action and writes its report to a sink.
pub struct StatisticsManager {
    channel: Arc<Mutex<dyn ServiceChannel>>,
    decoder: Arc<dyn ErrorDecoder>,
    database: String,
}

impl StatisticsManager {
    /// Data table statistics.
    pub const DATA_TABLE_STATISTICS: u32 = 0x01;
    /// Index statistics.
    pub const INDEX_STATISTICS: u32 = 0x08;
    /// System table statistics.
    pub const SYSTEM_TABLE_STATISTICS: u32 = 0x10;

    const ALL_OPTIONS: u32 =
        Self::DATA_TABLE_STATISTICS | Self::SYSTEM_TABLE_STATISTICS | Self::INDEX_STATISTICS;

    /// Create a manager for `database` over a service channel.
    pub fn new(channel: Arc<Mutex<dyn ServiceChannel>>, database: impl Into<String>) -> Self {
        Self {
            channel,
            decoder: Arc::new(MessageTemplateDecoder::new()),
            database: database.into(),
        }
    }

    /// Replace the error decoder.
    pub fn with_decoder(mut self, decoder: Arc<dyn ErrorDecoder>) -> Self {
        self.decoder = decoder;
        self
    }

    /// Database the statistics are gathered for.
    pub fn database(&self) -> &str {
        &self.database
    }

    /// Write the statistics header page.
    pub async fn header_page(&self, sink: &mut dyn Write) -> Result<(), ServiceError> {
        self.run(HEADER_PAGES, sink).await
    }

    /// Write the full database statistics, excluding system tables.
    ///
    /// Includes the header page, log, index and data table statistics.
    pub async fn database_statistics(&self, sink: &mut dyn Write) -> Result<(), ServiceError> {
        self.run(0, sink).await
    }

    /// Write selected database statistics.
    ///
    /// `options` combines [`DATA_TABLE_STATISTICS`](Self::DATA_TABLE_STATISTICS),
    /// [`SYSTEM_TABLE_STATISTICS`](Self::SYSTEM_TABLE_STATISTICS) and
    /// [`INDEX_STATISTICS`](Self::INDEX_STATISTICS). The header page and log
    /// are always included; 0 writes only those.
    ///
    /// # Errors
    /// Returns `ServiceError::InvalidArgument` if `options` has any other bit
    /// set. The service is not contacted in that case.
    pub async fn database_statistics_with(
        &self,
        options: u32,
        sink: &mut dyn Write,
    ) -> Result<(), ServiceError> {
        if options & !Self::ALL_OPTIONS != 0 {
            return Err(ServiceError::InvalidArgument(format!(
                "options must be 0 or a combination of DATA_TABLE_STATISTICS, \
                 SYSTEM_TABLE_STATISTICS and INDEX_STATISTICS, got {:#x}",
                options
            )));
        }
        let options = if options == 0 { DB_LOG } else { options };
        self.run(options, sink).await
    }

    async fn run(&self, options: u32, sink: &mut dyn Write) -> Result<(), ServiceError> {
        let request = ServiceRequest {
            action: ServiceAction::DatabaseStatistics,
            database: self.database.clone(),
            options,
        };
        ServiceSession::run(&self.channel, self.decoder.as_ref(), &request, sink).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admin::service::ServiceHandle;
    use crate::error::{ChannelError, ErrorKind};
    use async_trait::async_trait;
    use mockall::mock;

    mock! {
        pub Service {}

        #[async_trait]
        impl ServiceChannel for Service {
            async fn attach(&mut self) -> Result<ServiceHandle, ChannelError>;
            async fn start(&mut self, handle: ServiceHandle, request: &ServiceRequest) -> Result<(), ChannelError>;
            async fn next_line(&mut self, handle: ServiceHandle) -> Result<Option<String>, ChannelError>;
            async fn detach(&mut self, handle: ServiceHandle) -> Result<(), ChannelError>;
        }
    }

    fn manager(service: MockService) -> StatisticsManager {
        let channel: Arc<Mutex<dyn ServiceChannel>> = Arc::new(Mutex::new(service));
        StatisticsManager::new(channel, "/data/employee.fdb")
    }

    fn expect_lines(service: &mut MockService, lines: &'static [&'static str]) {
        let mut remaining = lines.iter();
        service
            .expect_next_line()
            .times(lines.len() + 1)
            .returning(move |_| Ok(remaining.next().map(|line| line.to_string())));
    }

    #[tokio::test]
    async fn test_header_page_writes_output_and_detaches() {
        let mut service = MockService::new();
        service
            .expect_attach()
            .times(1)
            .returning(|| Ok(ServiceHandle::new(4)));
        service
            .expect_start()
            .withf(|handle, request| {
                handle.as_u64() == 4
                    && request.options == HEADER_PAGES
                    && request.database == "/data/employee.fdb"
            })
            .times(1)
            .returning(|_, _| Ok(()));
        expect_lines(&mut service, &["Database header page information:", "Flags 0"]);
        service.expect_detach().times(1).returning(|_| Ok(()));

        let mut out = Vec::new();
        manager(service).header_page(&mut out).await.unwrap();

        let text = String::from_utf8(out).unwrap();
        assert_eq!(text, "Database header page information:\nFlags 0\n");
    }

    #[tokio::test]
    async fn test_zero_options_requests_header_and_log() {
        let mut service = MockService::new();
        service
            .expect_attach()
            .times(1)
            .returning(|| Ok(ServiceHandle::new(1)));
        service
            .expect_start()
            .withf(|_, request| request.options == DB_LOG)
            .times(1)
            .returning(|_, _| Ok(()));
        expect_lines(&mut service, &[]);
        service.expect_detach().times(1).returning(|_| Ok(()));

        let mut out = Vec::new();
        manager(service)
            .database_statistics_with(0, &mut out)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_combined_options_are_forwarded() {
        let mut service = MockService::new();
        service
            .expect_attach()
            .times(1)
            .returning(|| Ok(ServiceHandle::new(1)));
        service
            .expect_start()
            .withf(|_, request| request.options == 0x09)
            .times(1)
            .returning(|_, _| Ok(()));
        expect_lines(&mut service, &["Index PK_TEST (0)"]);
        service.expect_detach().times(1).returning(|_| Ok(()));

        let mut out = Vec::new();
        manager(service)
            .database_statistics_with(
                StatisticsManager::DATA_TABLE_STATISTICS | StatisticsManager::INDEX_STATISTICS,
                &mut out,
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_invalid_options_rejected_without_attach() {
        let mut out = Vec::new();
        let err = manager(MockService::new())
            .database_statistics_with(0x40, &mut out)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgumentValue);
    }

    #[tokio::test]
    async fn test_detach_runs_when_start_fails() {
        let mut service = MockService::new();
        service
            .expect_attach()
            .times(1)
            .returning(|| Ok(ServiceHandle::new(2)));
        service
            .expect_start()
            .times(1)
            .returning(|_, _| Err(ChannelError::Io("connection reset".to_string())));
        service.expect_detach().times(1).returning(|_| Ok(()));

        let mut out = Vec::new();
        let err = manager(service)
            .database_statistics(&mut out)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ChannelFailure);
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_detach_failure_reported_after_success() {
        let mut service = MockService::new();
        service
            .expect_attach()
            .times(1)
            .returning(|| Ok(ServiceHandle::new(2)));
        service.expect_start().times(1).returning(|_, _| Ok(()));
        expect_lines(&mut service, &[]);
        service
            .expect_detach()
            .times(1)
            .returning(|_| Err(ChannelError::Closed));

        let mut out = Vec::new();
        assert!(manager(service)
            .database_statistics(&mut out)
            .await
            .is_err());
    }
}
