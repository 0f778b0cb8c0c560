//! Structured diagnostics for schema sources.
//!
//! Diagnostics are collected, never thrown: a syntax pass over a directory
//! reports every error in every file in one shot. The JSON shape here is a
//! persisted format and must stay forward-compatible.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Stable machine-readable code, e.g. `syntax`, `duplicate-table`.
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<u32>,
}

impl Diagnostic {
    pub fn error(code: &str, message: impl Into<String>) -> Diagnostic {
        Diagnostic {
            severity: Severity::Error,
            code: code.to_string(),
            message: message.into(),
            file: None,
            line: None,
            column: None,
        }
    }

    pub fn warning(code: &str, message: impl Into<String>) -> Diagnostic {
        Diagnostic {
            severity: Severity::Warning,
            ..Diagnostic::error(code, message)
        }
    }

    pub fn at(mut self, file: Option<&str>, line: u32, column: u32) -> Diagnostic {
        self.file = file.map(str::to_string);
        self.line = Some(line);
        self.column = Some(column);
        self
    }

    /// `file:line:col: severity: message`, pieces omitted when unknown.
    pub fn render(&self) -> String {
        let mut out = String::new();
        if let Some(file) = &self.file {
            out.push_str(file);
            if let (Some(line), Some(column)) = (self.line, self.column) {
                out.push_str(&format!(":{line}:{column}"));
            }
            out.push_str(": ");
        }
        let severity = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        out.push_str(&format!("{severity}: {}", self.message));
        out
    }
}

/// An accumulating collection of diagnostics.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Diagnostics {
    diagnostics: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Diagnostics {
        Diagnostics::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    pub fn extend(&mut self, other: Diagnostics) {
        self.diagnostics.extend(other.diagnostics);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    pub fn error_count(&self) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Error)
            .count()
    }

    pub fn warning_count(&self) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Warning)
            .count()
    }

    pub fn has_errors(&self) -> bool {
        self.error_count() > 0
    }

    /// Promote warnings to errors (strict mode).
    pub fn promote_warnings(&mut self) {
        for diagnostic in &mut self.diagnostics {
            diagnostic.severity = Severity::Error;
        }
    }

    pub fn to_report(&self, steps_applied: Option<usize>) -> DiagnosticsReport {
        DiagnosticsReport {
            diagnostics: self.diagnostics.clone(),
            summary: DiagnosticsSummary {
                errors: self.error_count(),
                warnings: self.warning_count(),
                valid: !self.has_errors(),
                steps_applied,
            },
        }
    }
}

impl IntoIterator for Diagnostics {
    type Item = Diagnostic;
    type IntoIter = std::vec::IntoIter<Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.diagnostics.into_iter()
    }
}

/// The persisted diagnostics shape: `{diagnostics: [...], summary: {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticsReport {
    pub diagnostics: Vec<Diagnostic>,
    pub summary: DiagnosticsSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticsSummary {
    pub errors: usize,
    pub warnings: usize,
    pub valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub steps_applied: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_counts_by_severity() {
        let mut diagnostics = Diagnostics::new();
        diagnostics.push(Diagnostic::error("syntax", "bad").at(Some("a.sql"), 3, 7));
        diagnostics.push(Diagnostic::warning("declarative-alter", "merged"));

        let report = diagnostics.to_report(None);
        assert_eq!(report.summary.errors, 1);
        assert_eq!(report.summary.warnings, 1);
        assert!(!report.summary.valid);
    }

    #[test]
    fn render_includes_position_when_known() {
        let d = Diagnostic::error("syntax", "unexpected `)`").at(Some("schema.sql"), 1, 18);
        assert_eq!(d.render(), "schema.sql:1:18: error: unexpected `)`");
    }

    #[test]
    fn report_json_round_trips() {
        let mut diagnostics = Diagnostics::new();
        diagnostics.push(Diagnostic::error("syntax", "x"));
        let report = diagnostics.to_report(Some(4));
        let json = serde_json::to_string(&report).unwrap();
        let back: DiagnosticsReport = serde_json::from_str(&json).unwrap();
        assert_eq!(back, report);
    }
}
