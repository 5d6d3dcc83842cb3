//! Collected diagnostics
//!
//! Non-fatal problems found during parsing, type checking and code
//! generation do not stop the compiler; they are recorded here, best-effort,
//! and surfaced together at the end. The driver exits non-zero if any
//! error-severity diagnostic was recorded. Module verification failure is
//! the only unconditionally fatal condition and is handled separately.

use crate::span::Span;
use std::fmt;
use thiserror::Error;

/// What went wrong
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DiagKind {
    #[error("unmatched bracket: remaining input discarded")]
    ParseTruncation,

    #[error("`def {name}` requires a type annotation (e.g. `def Int:{name}`)")]
    MissingTypeAnnotation { name: String },

    #[error("cannot assign to `{name}`: variable was never declared with `def`")]
    UndeclaredAssignment { name: String },

    #[error("no overload of `{name}` matches argument types ({arg_types})")]
    UnresolvedOverload { name: String, arg_types: String },

    #[error("`{op}` is not defined for operands of type {ty}")]
    UnsupportedOperands { op: String, ty: String },

    #[error("function `{name}` can reach the end of its body without returning a value")]
    MissingReturn { name: String },

    #[error("unknown operation `{name}`")]
    UnknownOperation { name: String },
}

/// How bad it is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
}

/// One recorded diagnostic
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub kind: DiagKind,
    pub severity: Severity,
    pub span: Option<Span>,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sev = match self.severity {
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        match self.span {
            Some(span) => write!(f, "{}: {} (at {})", sev, self.kind, span),
            None => write!(f, "{}: {}", sev, self.kind),
        }
    }
}

/// Diagnostics sink carried on the compilation context
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    list: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn error(&mut self, kind: DiagKind, span: Option<Span>) {
        self.list.push(Diagnostic {
            kind,
            severity: Severity::Error,
            span,
        });
    }

    pub fn warning(&mut self, kind: DiagKind, span: Option<Span>) {
        self.list.push(Diagnostic {
            kind,
            severity: Severity::Warning,
            span,
        });
    }

    pub fn has_errors(&self) -> bool {
        self.list.iter().any(|d| d.severity == Severity::Error)
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.list.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_tracking() {
        let mut diags = Diagnostics::new();
        assert!(!diags.has_errors());

        diags.warning(
            DiagKind::MissingReturn {
                name: "f".to_string(),
            },
            None,
        );
        assert!(!diags.has_errors());
        assert_eq!(diags.len(), 1);

        diags.error(
            DiagKind::UndeclaredAssignment {
                name: "x".to_string(),
            },
            None,
        );
        assert!(diags.has_errors());
        assert_eq!(diags.len(), 2);
    }

    #[test]
    fn test_display() {
        let d = Diagnostic {
            kind: DiagKind::MissingTypeAnnotation {
                name: "x".to_string(),
            },
            severity: Severity::Error,
            span: None,
        };
        let text = d.to_string();
        assert!(text.starts_with("error:"));
        assert!(text.contains("def Int:x"));
    }
}
