//! Escape-sequence translation applied to SQL text before dispatch.
//!
//! Statements with escape processing enabled pass their SQL through an
//! [`EscapeTranslator`]; with escape processing disabled the text reaches the
//! channel untouched.

use crate::error::QueryError;

/// Rewrites `{keyword ...}` escape sequences into native SQL.
pub trait EscapeTranslator: Send + Sync {
    /// Translate every escape sequence in `sql`.
    ///
    /// # Errors
    ///
    /// Returns `QueryError::InvalidArgument` for unknown or unbalanced escapes.
    fn translate(&self, sql: &str) -> Result<String, QueryError>;
}

/// Translator for the common escape forms.
///
/// Supported keywords: `fn`, `d`, `t`, `ts`, `oj`, `call` and `escape`.
/// Quoted literals and quoted identifiers are copied verbatim.
#[derive(Debug, Clone, Copy, Default)]
pub struct BasicEscapeTranslator;

impl BasicEscapeTranslator {
    /// Create a new translator.
    pub fn new() -> Self {
        Self
    }

    fn translate_segment(&self, sql: &str) -> Result<String, QueryError> {
        let mut out = String::with_capacity(sql.len());
        let mut pos = 0;

        while let Some(ch) = sql[pos..].chars().next() {
            match ch {
                '\'' | '"' => {
                    let end = find_quote_end(sql, pos, ch);
                    out.push_str(&sql[pos..end]);
                    pos = end;
                }
                '{' => {
                    let close = find_matching_brace(sql, pos).ok_or_else(|| {
                        QueryError::invalid_argument("sql", "Unbalanced escape sequence")
                    })?;
                    let inner = self.translate_segment(&sql[pos + 1..close])?;
                    out.push_str(&translate_escape(&inner)?);
                    pos = close + 1;
                }
                _ => {
                    out.push(ch);
                    pos += ch.len_utf8();
                }
            }
        }

        Ok(out)
    }
}

impl EscapeTranslator for BasicEscapeTranslator {
    fn translate(&self, sql: &str) -> Result<String, QueryError> {
        if !sql.contains('{') {
            return Ok(sql.to_string());
        }
        self.translate_segment(sql)
    }
}

/// Byte offset just past the quote closing the literal starting at `start`.
/// Doubled quotes inside the literal are escapes; an unterminated literal
/// runs to the end of the text.
fn find_quote_end(sql: &str, start: usize, quote: char) -> usize {
    let bytes = sql.as_bytes();
    let quote = quote as u8;
    let mut i = start + 1;
    while i < bytes.len() {
        if bytes[i] == quote {
            if bytes.get(i + 1) == Some(&quote) {
                i += 2;
                continue;
            }
            return i + 1;
        }
        i += 1;
    }
    bytes.len()
}

fn find_matching_brace(sql: &str, open: usize) -> Option<usize> {
    let bytes = sql.as_bytes();
    let mut depth = 0usize;
    let mut i = open;
    while i < bytes.len() {
        match bytes[i] {
            b'\'' | b'"' => {
                i = find_quote_end(sql, i, bytes[i] as char);
                continue;
            }
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}

fn translate_escape(body: &str) -> Result<String, QueryError> {
    let body = body.trim();
    let (keyword, rest) = match body.find(char::is_whitespace) {
        Some(split) => (&body[..split], body[split..].trim()),
        None => (body, ""),
    };

    match keyword.to_ascii_lowercase().as_str() {
        "fn" => Ok(translate_function(rest)),
        "d" => Ok(format!("DATE {}", rest)),
        "t" => Ok(format!("TIME {}", rest)),
        "ts" => Ok(format!("TIMESTAMP {}", rest)),
        "oj" => Ok(rest.to_string()),
        "call" => Ok(format!("EXECUTE PROCEDURE {}", rest)),
        "escape" => Ok(format!("ESCAPE {}", rest)),
        "" => Err(QueryError::invalid_argument("sql", "Empty escape sequence")),
        other => Err(QueryError::invalid_argument(
            "sql",
            format!("Unknown escape sequence keyword '{}'", other),
        )),
    }
}

fn translate_function(call: &str) -> String {
    let name_end = call.find('(').unwrap_or(call.len());
    let name = call[..name_end].trim();
    let args = call[name_end..].trim();
    let no_args = args.is_empty() || args.replace(char::is_whitespace, "") == "()";

    let native = match name.to_ascii_uppercase().as_str() {
        "CURDATE" if no_args => Some("CURRENT_DATE"),
        "CURTIME" if no_args => Some("CURRENT_TIME"),
        "NOW" if no_args => Some("CURRENT_TIMESTAMP"),
        _ => None,
    };

    match native {
        Some(native) => native.to_string(),
        None => call.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn translate(sql: &str) -> Result<String, QueryError> {
        BasicEscapeTranslator::new().translate(sql)
    }

    #[test]
    fn test_plain_sql_is_unchanged() {
        assert_eq!(
            translate("SELECT col1 FROM test").unwrap(),
            "SELECT col1 FROM test"
        );
    }

    #[test]
    fn test_function_escape() {
        assert_eq!(
            translate("SELECT {fn CURDATE} FROM RDB$DATABASE").unwrap(),
            "SELECT CURRENT_DATE FROM RDB$DATABASE"
        );
        assert_eq!(
            translate("SELECT {fn now()} FROM t").unwrap(),
            "SELECT CURRENT_TIMESTAMP FROM t"
        );
        assert_eq!(
            translate("SELECT {fn UPPER(name)} FROM t").unwrap(),
            "SELECT UPPER(name) FROM t"
        );
    }

    #[test]
    fn test_date_time_literals() {
        assert_eq!(
            translate("WHERE d = {d '2024-01-31'}").unwrap(),
            "WHERE d = DATE '2024-01-31'"
        );
        assert_eq!(
            translate("WHERE t = {t '12:00:00'} OR ts = {ts '2024-01-31 12:00:00'}").unwrap(),
            "WHERE t = TIME '12:00:00' OR ts = TIMESTAMP '2024-01-31 12:00:00'"
        );
    }

    #[test]
    fn test_call_and_outer_join() {
        assert_eq!(
            translate("{call add_row(1, 2)}").unwrap(),
            "EXECUTE PROCEDURE add_row(1, 2)"
        );
        assert_eq!(
            translate("SELECT * FROM {oj a LEFT OUTER JOIN b ON a.id = b.id}").unwrap(),
            "SELECT * FROM a LEFT OUTER JOIN b ON a.id = b.id"
        );
    }

    #[test]
    fn test_nested_escape() {
        assert_eq!(
            translate("SELECT {fn YEAR({d '2024-01-31'})} FROM t").unwrap(),
            "SELECT YEAR(DATE '2024-01-31') FROM t"
        );
    }

    #[test]
    fn test_braces_inside_literals_are_kept() {
        assert_eq!(
            translate("SELECT '{fn CURDATE}', 'it''s {x}' FROM t").unwrap(),
            "SELECT '{fn CURDATE}', 'it''s {x}' FROM t"
        );
    }

    #[test]
    fn test_unknown_and_unbalanced_escapes() {
        let err = translate("SELECT {foo bar} FROM t").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgumentValue);

        let err = translate("SELECT {fn CURDATE FROM t").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgumentValue);
    }
}
