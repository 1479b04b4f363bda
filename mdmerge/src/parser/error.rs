use std::fmt;
use std::ops::Range;

use codespan_reporting::diagnostic::{Diagnostic, Label, Severity};

/// A document the Markdown backend could not process.
///
/// `span` is a byte range into the offending source. The error does not know
/// which side of a merge it came from; callers attach that.
#[derive(Debug, Clone)]
pub struct ParseError {
    pub message: String,
    pub span: Range<usize>,
    pub severity: Severity,
    pub notes: Vec<String>,
}

impl ParseError {
    pub fn error(message: impl Into<String>, span: Range<usize>) -> Self {
        ParseError {
            message: message.into(),
            span,
            severity: Severity::Error,
            notes: Vec::new(),
        }
    }

    /// Input that is not valid UTF-8 text. The span points at the first
    /// invalid byte.
    pub fn invalid_utf8(err: &std::str::Utf8Error) -> Self {
        let start = err.valid_up_to();
        let end = start + err.error_len().unwrap_or(1);
        ParseError::error("input is not valid UTF-8 text", start..end)
            .with_note("Markdown sources must be UTF-8 encoded")
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    /// Convert to a codespan-reporting Diagnostic for display.
    pub fn to_diagnostic(&self, file_id: usize) -> Diagnostic<usize> {
        Diagnostic::new(self.severity)
            .with_message(&self.message)
            .with_labels(vec![Label::primary(file_id, self.span.clone())])
            .with_notes(self.notes.clone())
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (bytes {}..{})", self.message, self.span.start, self.span.end)
    }
}

impl std::error::Error for ParseError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_utf8_points_at_bad_byte() {
        let bytes = b"# Title\n\xff\n";
        let err = std::str::from_utf8(bytes).unwrap_err();
        let parse_error = ParseError::invalid_utf8(&err);
        assert_eq!(parse_error.span, 8..9);
        assert_eq!(parse_error.notes.len(), 1);
    }
}
