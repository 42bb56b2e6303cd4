//! Execution channel boundary.
//!
//! This module defines everything the statement engine needs from the
//! component that talks to the database engine, without implementing any
//! transport itself.
//!
//! # Architecture
//!
//! The channel boundary is organized into:
//! - `protocol` - The `ExecutionChannel` and `CancelChannel` traits
//! - `messages` - Request, result item and page types
//! - `decoder` - Decoding of channel failures into error kinds and messages
//! - `escape` - Escape-sequence translation applied before dispatch

pub mod decoder;
pub mod escape;
pub mod messages;
pub mod protocol;

// Re-export commonly used types
pub use decoder::{expand_template, ErrorDecoder, MessageTemplateDecoder};
pub use escape::{BasicEscapeTranslator, EscapeTranslator};
pub use messages::{
    ColumnInfo, DataType, ExecuteRequest, ExecutionOutcome, Page, Parameter, ResultItem,
    ResultSetType, Row, RowSetHandle, StatementHandle,
};
pub use protocol::{CancelChannel, ExecutionChannel};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_exports() {
        let _request = ExecuteRequest::new("SELECT 1");
        let _outcome = ExecutionOutcome::new(vec![ResultItem::UpdateCount(1)]);
        let _decoder = MessageTemplateDecoder::new();
        let _translator = BasicEscapeTranslator::new();
        let _handle = RowSetHandle::new(1);
    }

    #[test]
    fn test_channel_is_object_safe() {
        fn _takes_channel(_channel: &dyn ExecutionChannel) {}
    }
}
