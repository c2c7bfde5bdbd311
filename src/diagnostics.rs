use std::fmt;

use thiserror::Error;

use crate::value::Value;

/// Represents a byte span within a source file, plus the line it starts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SourceSpan {
    pub start: usize,
    pub end: usize,
    pub line: usize,
}

impl SourceSpan {
    pub const fn new(start: usize, end: usize, line: usize) -> Self {
        Self { start, end, line }
    }

    /// Span covering `self` through the end of `other`, keeping the first line.
    pub const fn to(self, other: SourceSpan) -> Self {
        Self {
            start: self.start,
            end: other.end,
            line: self.line,
        }
    }
}

/// The runtime error taxonomy. Every kind except [`ErrorKind::StackOverflow`]
/// can be caught by a script `try`/`catch`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    TypeMismatch,
    OperatorNotImplemented,
    NoMatchingOverload,
    DuplicateDefinition,
    AccessDenied,
    NotEnumerable,
    IndexOutOfRange,
    KeyNotFound,
    DivisionOrModuloByZero,
    InvalidOperation,
    UndefinedName,
    UserThrown,
    StackOverflow,
}

impl ErrorKind {
    pub const CATCHABLE: [ErrorKind; 11] = [
        ErrorKind::TypeMismatch,
        ErrorKind::OperatorNotImplemented,
        ErrorKind::NoMatchingOverload,
        ErrorKind::DuplicateDefinition,
        ErrorKind::AccessDenied,
        ErrorKind::NotEnumerable,
        ErrorKind::IndexOutOfRange,
        ErrorKind::KeyNotFound,
        ErrorKind::DivisionOrModuloByZero,
        ErrorKind::InvalidOperation,
        ErrorKind::UndefinedName,
    ];

    pub fn is_fatal(self) -> bool {
        matches!(self, ErrorKind::StackOverflow)
    }

    /// Name of the built-in exception class scripts use to catch this kind.
    pub fn exception_class(self) -> &'static str {
        match self {
            ErrorKind::TypeMismatch => "TypeMismatchError",
            ErrorKind::OperatorNotImplemented => "OperatorNotImplementedError",
            ErrorKind::NoMatchingOverload => "NoMatchingOverloadError",
            ErrorKind::DuplicateDefinition => "DuplicateDefinitionError",
            ErrorKind::AccessDenied => "AccessDeniedError",
            ErrorKind::NotEnumerable => "NotEnumerableError",
            ErrorKind::IndexOutOfRange => "IndexOutOfRangeError",
            ErrorKind::KeyNotFound => "KeyNotFoundError",
            ErrorKind::DivisionOrModuloByZero => "DivideByZeroError",
            ErrorKind::InvalidOperation => "InvalidOperationError",
            ErrorKind::UndefinedName => "UndefinedNameError",
            ErrorKind::UserThrown | ErrorKind::StackOverflow => "Exception",
        }
    }
}

/// Classification of a diagnostic event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    Lexer,
    Parser,
    Runtime(ErrorKind),
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiagnosticKind::Lexer => write!(f, "Lexer"),
            DiagnosticKind::Parser => write!(f, "Parser"),
            DiagnosticKind::Runtime(kind) => write!(f, "{kind:?}"),
        }
    }
}

/// Rich diagnostic information surfaced to end users.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub message: String,
    pub span: Option<SourceSpan>,
    pub notes: Vec<String>,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            span: None,
            notes: Vec::new(),
        }
    }

    pub fn runtime(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::new(DiagnosticKind::Runtime(kind), message)
    }

    pub fn with_span(mut self, span: SourceSpan) -> Self {
        self.span = Some(span);
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self.kind {
            DiagnosticKind::Runtime(kind) => Some(kind),
            _ => None,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)?;
        if let Some(span) = self.span {
            write!(f, " (line {})", span.line)?;
        }
        if !self.notes.is_empty() {
            writeln!(f)?;
            for note in &self.notes {
                writeln!(f, "  note: {note}")?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for Diagnostic {}

/// A script-level exception travelling up the host stack.
#[derive(Debug, Clone)]
pub struct Thrown {
    pub value: Value,
    pub class_name: String,
    pub message: String,
    pub span: Option<SourceSpan>,
}

impl fmt::Display for Thrown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.class_name, self.message)?;
        if let Some(span) = self.span {
            write!(f, " (line {})", span.line)?;
        }
        Ok(())
    }
}

/// Unified error type for the Corvid toolchain.
#[derive(Debug, Error)]
pub enum CorvidError {
    #[error("{0}")]
    Diagnostic(#[from] Diagnostic),
    #[error("uncaught {0}")]
    Thrown(Box<Thrown>),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CorvidError {
    pub fn runtime(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::Diagnostic(Diagnostic::runtime(kind, message))
    }

    /// The taxonomy kind of this error, if it came from the evaluator.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            CorvidError::Diagnostic(diag) => diag.error_kind(),
            CorvidError::Thrown(_) => Some(ErrorKind::UserThrown),
            CorvidError::Io(_) => None,
        }
    }

    /// Attaches `span` unless the error already points somewhere more precise.
    pub fn at(self, span: SourceSpan) -> Self {
        match self {
            CorvidError::Diagnostic(mut diag) => {
                if diag.span.is_none() {
                    diag.span = Some(span);
                }
                CorvidError::Diagnostic(diag)
            }
            CorvidError::Thrown(mut thrown) => {
                if thrown.span.is_none() {
                    thrown.span = Some(span);
                }
                CorvidError::Thrown(thrown)
            }
            other => other,
        }
    }

    pub fn line(&self) -> Option<usize> {
        match self {
            CorvidError::Diagnostic(diag) => diag.span.map(|span| span.line),
            CorvidError::Thrown(thrown) => thrown.span.map(|span| span.line),
            CorvidError::Io(_) => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, CorvidError>;

/// Shorthand for building a runtime error result.
pub fn fail<T>(kind: ErrorKind, message: impl Into<String>) -> Result<T> {
    Err(CorvidError::runtime(kind, message))
}
