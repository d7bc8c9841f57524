//! Operator-facing outcome reports
//!
//! Every run ends in exactly one report; faults become reports with an
//! explanation and a next step rather than raw error codes.

use sbemkit_core::Severity;
use serde::{Deserialize, Serialize};
use std::fmt;

/// What the operator is told when a run ends
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeReport {
    /// How prominently to present the report
    pub severity: Severity,
    /// Short heading
    pub title: String,
    /// Explanation and next steps
    pub message: String,
}

impl OutcomeReport {
    /// Informational report
    pub fn info(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Severity::Info, title, message)
    }

    /// Warning report
    pub fn warning(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, title, message)
    }

    /// Error report
    pub fn error(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Severity::Error, title, message)
    }

    fn new(severity: Severity, title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity,
            title: title.into(),
            message: message.into(),
        }
    }

    /// Append a follow-up paragraph, raising severity to at least `severity`.
    pub fn with_addendum(mut self, severity: Severity, text: &str) -> Self {
        self.severity = self.severity.max(severity);
        self.message.push_str("\n\n");
        self.message.push_str(text);
        self
    }
}

impl fmt::Display for OutcomeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.severity, self.title, self.message)
    }
}

/// Report types produced by runs
pub trait RunReport: Send + 'static {
    /// The operator-facing outcome.
    fn outcome(&self) -> &OutcomeReport;
}

impl RunReport for OutcomeReport {
    fn outcome(&self) -> &OutcomeReport {
        self
    }
}
