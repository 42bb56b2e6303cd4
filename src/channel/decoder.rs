//! Decoding of channel failures into the symbolic error taxonomy.

use crate::error::{ChannelError, DecodedError, ErrorKind, FailureCategory, MessageFragment};

/// Maps channel failures to [`DecodedError`]s.
pub trait ErrorDecoder: Send + Sync {
    /// Decode a channel failure.
    fn decode(&self, error: &ChannelError) -> DecodedError;
}

/// Default decoder.
///
/// Renders each message fragment with its positional parameters expanded and
/// joins the fragments with `"; "`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MessageTemplateDecoder;

impl MessageTemplateDecoder {
    /// Create a new decoder.
    pub fn new() -> Self {
        Self
    }

    /// Render all fragments into a single message.
    pub fn render(fragments: &[MessageFragment]) -> String {
        fragments
            .iter()
            .map(|fragment| expand_template(&fragment.template, &fragment.parameters))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

impl ErrorDecoder for MessageTemplateDecoder {
    fn decode(&self, error: &ChannelError) -> DecodedError {
        match error {
            ChannelError::Engine(failure) => {
                let kind = match failure.category {
                    FailureCategory::Syntax => ErrorKind::SyntaxError,
                    FailureCategory::Constraint => ErrorKind::ConstraintViolation,
                    FailureCategory::Exception => ErrorKind::EngineException,
                    FailureCategory::Timeout => ErrorKind::Timeout,
                    FailureCategory::Cancelled => ErrorKind::Cancelled,
                };
                DecodedError {
                    kind,
                    sql_state: failure
                        .sql_state
                        .clone()
                        .unwrap_or_else(|| kind.sql_state().to_string()),
                    error_code: failure.error_code,
                    message: Self::render(&failure.fragments),
                }
            }
            ChannelError::InvalidHandle(_) => DecodedError {
                kind: ErrorKind::InvalidState,
                sql_state: ErrorKind::InvalidState.sql_state().to_string(),
                error_code: 0,
                message: error.to_string(),
            },
            ChannelError::Io(_) | ChannelError::Protocol(_) | ChannelError::Closed => {
                DecodedError {
                    kind: ErrorKind::ChannelFailure,
                    sql_state: ErrorKind::ChannelFailure.sql_state().to_string(),
                    error_code: 0,
                    message: error.to_string(),
                }
            }
        }
    }
}

/// Expand positional placeholders `@1`, `@2`, ... in a message template.
///
/// Placeholders are 1-based and may have more than one digit. A placeholder
/// without a matching parameter is left as written.
pub fn expand_template(template: &str, parameters: &[String]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.char_indices().peekable();

    while let Some((pos, ch)) = chars.next() {
        if ch != '@' {
            out.push(ch);
            continue;
        }

        let digits_start = pos + 1;
        let mut digits_end = digits_start;
        while let Some(&(next_pos, next)) = chars.peek() {
            if next.is_ascii_digit() {
                digits_end = next_pos + 1;
                chars.next();
            } else {
                break;
            }
        }

        let digits = &template[digits_start..digits_end];
        let value = digits
            .parse::<usize>()
            .ok()
            .filter(|index| *index >= 1)
            .and_then(|index| parameters.get(index - 1));

        match value {
            Some(value) => out.push_str(value),
            None => {
                out.push('@');
                out.push_str(digits);
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineFailure;

    #[test]
    fn test_expand_two_parameters() {
        let expanded = expand_template(
            "Param 1 '@1', Param 2 '@2'",
            &["value_1".to_string(), "value2".to_string()],
        );
        assert_eq!(expanded, "Param 1 'value_1', Param 2 'value2'");
    }

    #[test]
    fn test_expand_multi_digit_placeholder() {
        let parameters: Vec<String> = (1..=12).map(|i| format!("v{}", i)).collect();
        assert_eq!(expand_template("@12 and @1", &parameters), "v12 and v1");
    }

    #[test]
    fn test_expand_missing_parameter_is_kept() {
        assert_eq!(expand_template("@1 @2", &["a".to_string()]), "a @2");
        assert_eq!(expand_template("mail@", &[]), "mail@");
        assert_eq!(expand_template("@0", &["a".to_string()]), "@0");
    }

    #[test]
    fn test_decode_parametrized_exception() {
        let failure = EngineFailure::new(FailureCategory::Exception, 335544517, "exception 1")
            .with_fragment(MessageFragment::plain("TWO_PARAM_EXCEPTION"))
            .with_fragment(MessageFragment::with_parameters(
                "Param 1 '@1', Param 2 '@2'",
                vec!["value_1".to_string(), "value2".to_string()],
            ))
            .with_fragment(MessageFragment::plain("At block line: 1, col: 1"));

        let decoded = MessageTemplateDecoder::new().decode(&ChannelError::Engine(failure));

        assert_eq!(decoded.kind, ErrorKind::EngineException);
        assert_eq!(decoded.error_code, 335544517);
        assert!(decoded
            .message
            .contains("; Param 1 'value_1', Param 2 'value2'; "));
    }

    #[test]
    fn test_decode_uses_engine_sql_state() {
        let failure = EngineFailure::new(FailureCategory::Syntax, 335544578, "Column unknown")
            .with_sql_state("42S22");
        let decoded = MessageTemplateDecoder::new().decode(&ChannelError::Engine(failure));
        assert_eq!(decoded.kind, ErrorKind::SyntaxError);
        assert_eq!(decoded.sql_state, "42S22");
    }

    #[test]
    fn test_decode_transport_failures() {
        let decoder = MessageTemplateDecoder::new();

        let decoded = decoder.decode(&ChannelError::Io("connection reset".to_string()));
        assert_eq!(decoded.kind, ErrorKind::ChannelFailure);
        assert!(decoded.message.contains("connection reset"));

        let decoded = decoder.decode(&ChannelError::InvalidHandle("row set 9".to_string()));
        assert_eq!(decoded.kind, ErrorKind::InvalidState);
    }

    #[test]
    fn test_decode_timeout() {
        let failure = EngineFailure::new(FailureCategory::Timeout, 0, "statement timed out");
        let decoded = MessageTemplateDecoder::new().decode(&ChannelError::Engine(failure));
        assert_eq!(decoded.kind, ErrorKind::Timeout);
        assert_eq!(decoded.sql_state, "HYT00");
    }
}
