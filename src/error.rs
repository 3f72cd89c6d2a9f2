//! Diagnostics and hard errors.
//!
//! Recoverable problems become [`Diagnostic`] values, collected during the
//! run and returned alongside the output. Hard failures (contract
//! violations, strict mode) are a [`ConvertError`].

use std::fmt;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// Recognized construct that could not keep its structure.
    StructuralWarning,
    /// Construct whose markup could not be parsed; fell back to verbatim.
    MarkupError,
    /// Reference whose target is unknown in this document.
    UnresolvedReference,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Severity::StructuralWarning => "warning",
            Severity::MarkupError => "markup error",
            Severity::UnresolvedReference => "unresolved reference",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    /// 1-based source line.
    pub line: usize,
}

impl Diagnostic {
    pub fn warning(message: impl Into<String>, line: usize) -> Self {
        Self {
            severity: Severity::StructuralWarning,
            message: message.into(),
            line,
        }
    }

    pub fn markup_error(message: impl Into<String>, line: usize) -> Self {
        Self {
            severity: Severity::MarkupError,
            message: message.into(),
            line,
        }
    }

    pub fn unresolved(message: impl Into<String>, line: usize) -> Self {
        Self {
            severity: Severity::UnresolvedReference,
            message: message.into(),
            line,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (line {}): {}", self.severity, self.line, self.message)
    }
}

#[derive(Debug, Error)]
pub enum ConvertError {
    /// A reference node carried more than one resolution, or none at all.
    #[error("ambiguous reference node at line {line}: {raw:?}")]
    AmbiguousNode { raw: String, line: usize },
    /// Strict mode: the first collected diagnostic aborts the conversion.
    #[error("conversion aborted: {0}")]
    Strict(Diagnostic),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagnostic_display() {
        let diag = Diagnostic::markup_error("bad table", 12);
        assert_eq!(diag.to_string(), "markup error (line 12): bad table");
    }

    #[test]
    fn strict_error_wraps_diagnostic() {
        let err = ConvertError::Strict(Diagnostic::warning("oops", 3));
        assert!(err.to_string().contains("warning (line 3): oops"));
    }
}
