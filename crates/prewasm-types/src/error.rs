use crate::Span;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Maximum number of diagnostics stored; later ones are only counted.
pub const MAX_ERRORS: usize = 20;

/// Class of a recoverable, user-facing diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// Unresolved identifier, or a redefined module name, local or label.
    NameResolution,
    /// Operand, assignment, argument, return or condition type mismatch.
    TypeMismatch,
    /// Call argument count does not match the callee signature.
    Arity,
    /// `break` with no enclosing loop.
    ControlFlow,
    /// Memory and config layout problems.
    Layout,
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NameResolution => write!(f, "name resolution"),
            Self::TypeMismatch => write!(f, "type mismatch"),
            Self::Arity => write!(f, "arity"),
            Self::ControlFlow => write!(f, "control flow"),
            Self::Layout => write!(f, "layout"),
        }
    }
}

/// A single recoverable compiler diagnostic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub message: String,
    /// Source file name; empty when no file is being processed.
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub file: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub span: Option<Span>,
}

impl Diagnostic {
    /// Render as `ERROR <file> <line>:<col>: <message>`, omitting absent fields.
    pub fn render(&self) -> String {
        let mut prefix = String::from("ERROR");
        if !self.file.is_empty() {
            prefix.push(' ');
            prefix.push_str(&self.file);
        }
        if let Some(span) = self.span {
            prefix.push_str(&format!(" {span}"));
        }
        format!("{prefix}: {}", self.message)
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// Destination for rendered diagnostics.
pub trait DiagnosticSink {
    fn emit(&mut self, line: &str);
}

impl<F: FnMut(&str)> DiagnosticSink for F {
    fn emit(&mut self, line: &str) {
        self(line)
    }
}

/// Default sink: forwards every diagnostic to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl DiagnosticSink for LogSink {
    fn emit(&mut self, line: &str) {
        log::error!("{line}");
    }
}

/// Accumulates diagnostics across passes.
///
/// Passes report through [`Diagnostics::error`] and keep going; the driver
/// checks [`Diagnostics::error_count`] between passes.
pub struct Diagnostics {
    filename: String,
    errors: Vec<Diagnostic>,
    total_errors: usize,
    sink: Box<dyn DiagnosticSink>,
}

impl Diagnostics {
    /// Diagnostics reported through [`LogSink`].
    pub fn new() -> Self {
        Self::with_sink(LogSink)
    }

    pub fn with_sink(sink: impl DiagnosticSink + 'static) -> Self {
        Self {
            filename: String::new(),
            errors: Vec::new(),
            total_errors: 0,
            sink: Box::new(sink),
        }
    }

    pub fn set_filename(&mut self, filename: impl Into<String>) {
        self.filename = filename.into();
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Report an error, respecting the [`MAX_ERRORS`] storage limit.
    pub fn error(&mut self, kind: DiagnosticKind, message: impl Into<String>, span: Option<Span>) {
        let diagnostic = Diagnostic {
            kind,
            message: message.into(),
            file: self.filename.clone(),
            span,
        };
        self.sink.emit(&diagnostic.render());
        if self.errors.len() < MAX_ERRORS {
            self.errors.push(diagnostic);
        }
        self.total_errors += 1;
    }

    pub fn error_count(&self) -> usize {
        self.total_errors
    }

    pub fn has_errors(&self) -> bool {
        self.total_errors > 0
    }

    pub fn errors(&self) -> &[Diagnostic] {
        &self.errors
    }

    pub fn into_errors(self) -> Vec<Diagnostic> {
        self.errors
    }
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Diagnostics")
            .field("filename", &self.filename)
            .field("errors", &self.errors)
            .field("total_errors", &self.total_errors)
            .finish_non_exhaustive()
    }
}

/// Internal invariant violations. These abort compilation immediately and
/// indicate a compiler defect rather than a user mistake.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FatalError {
    /// An (operator, type) or conversion pair missing from a table.
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// A tree shape no pass should ever produce.
    #[error("malformed AST: {0}")]
    MalformedAst(String),
}

pub type FatalResult<T> = Result<T, FatalError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn capture() -> (Diagnostics, Rc<RefCell<Vec<String>>>) {
        let lines = Rc::new(RefCell::new(Vec::new()));
        let sink_lines = Rc::clone(&lines);
        let diags = Diagnostics::with_sink(move |line: &str| sink_lines.borrow_mut().push(line.to_string()));
        (diags, lines)
    }

    #[test]
    fn test_render_with_file_and_position() {
        let (mut diags, lines) = capture();
        diags.set_filename("draw.wasm");
        diags.error(
            DiagnosticKind::NameResolution,
            "cannot resolve name - foo",
            Some(Span::point(3, 14)),
        );
        assert_eq!(
            lines.borrow().as_slice(),
            ["ERROR draw.wasm 3:14: cannot resolve name - foo"]
        );
    }

    #[test]
    fn test_render_without_optional_fields() {
        let (mut diags, lines) = capture();
        diags.error(DiagnosticKind::Layout, "bad alignment", None);
        assert_eq!(lines.borrow()[0], "ERROR: bad alignment");
    }

    #[test]
    fn test_error_count_keeps_counting_past_limit() {
        let (mut diags, lines) = capture();
        for i in 0..25 {
            diags.error(DiagnosticKind::TypeMismatch, format!("error {i}"), None);
        }
        assert_eq!(diags.errors().len(), MAX_ERRORS);
        assert_eq!(diags.error_count(), 25);
        assert_eq!(lines.borrow().len(), 25);
        assert!(diags.has_errors());
    }

    #[test]
    fn test_empty_diagnostics() {
        let diags = Diagnostics::new();
        assert!(!diags.has_errors());
        assert_eq!(diags.error_count(), 0);
    }

    #[test]
    fn test_diagnostic_json_round_trip() {
        let diag = Diagnostic {
            kind: DiagnosticKind::Arity,
            message: "argument count mismatch - got 1, but expected 2".into(),
            file: "test.wasm".into(),
            span: Some(Span::new(1, 2, 1, 9)),
        };
        let json = serde_json::to_string(&diag).unwrap();
        assert!(json.contains("\"kind\":\"arity\""));
        let back: Diagnostic = serde_json::from_str(&json).unwrap();
        assert_eq!(back, diag);
    }

    #[test]
    fn test_fatal_error_display() {
        let err = FatalError::UnsupportedOperation("% on f32".into());
        assert_eq!(err.to_string(), "unsupported operation: % on f32");
    }
}
