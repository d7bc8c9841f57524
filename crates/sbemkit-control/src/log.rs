//! Operator log
//!
//! Append-only, timestamped entries meant for the operator (as opposed to
//! `tracing` diagnostics). Each entry is mirrored to `tracing` and
//! published on the event bus as `AppEvent::Log`.

use chrono::Utc;
use sbemkit_core::emit;
use sbemkit_core::event_bus::{AppEvent, LogEvent};
use sbemkit_core::{thread_safe_vec, Severity, ThreadSafeVec};

/// Source tag for microtome activity
pub const SOURCE_MICROTOME: &str = "3VIEW";
/// Source tag for control flow
pub const SOURCE_CTRL: &str = "CTRL";
/// Source tag for microscope activity
pub const SOURCE_SEM: &str = "SEM";
/// Source tag for calibration
pub const SOURCE_CAL: &str = "CAL";

/// Shared operator log
///
/// Cloning shares the same entries; workers append, the presentation side
/// reads.
#[derive(Debug, Clone)]
pub struct OperatorLog {
    entries: ThreadSafeVec<LogEvent>,
}

impl Default for OperatorLog {
    fn default() -> Self {
        Self::new()
    }
}

impl OperatorLog {
    /// Empty log.
    pub fn new() -> Self {
        Self {
            entries: thread_safe_vec(),
        }
    }

    /// Append an entry.
    pub fn add(&self, source: &str, severity: Severity, message: impl Into<String>) {
        let entry = LogEvent {
            timestamp: Utc::now(),
            source: source.to_string(),
            severity,
            message: message.into(),
        };
        match severity {
            Severity::Info => tracing::info!(target: "operator", "{}: {}", source, entry.message),
            Severity::Warning => tracing::warn!(target: "operator", "{}: {}", source, entry.message),
            Severity::Error => tracing::error!(target: "operator", "{}: {}", source, entry.message),
        }
        self.entries.lock().push(entry.clone());
        emit!(AppEvent::Log(entry));
    }

    /// Append an informational entry.
    pub fn info(&self, source: &str, message: impl Into<String>) {
        self.add(source, Severity::Info, message);
    }

    /// Append a warning.
    pub fn warn(&self, source: &str, message: impl Into<String>) {
        self.add(source, Severity::Warning, message);
    }

    /// Append an error.
    pub fn error(&self, source: &str, message: impl Into<String>) {
        self.add(source, Severity::Error, message);
    }

    /// Copy of all entries, oldest first.
    pub fn entries(&self) -> Vec<LogEvent> {
        self.entries.lock().clone()
    }

    /// Entries from index `from` on, for incremental readers.
    pub fn entries_since(&self, from: usize) -> Vec<LogEvent> {
        let entries = self.entries.lock();
        entries.get(from..).map(<[_]>::to_vec).unwrap_or_default()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the log is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entries_are_shared_between_clones() {
        let log = OperatorLog::new();
        let worker = log.clone();
        worker.info(SOURCE_CTRL, "Approach started");
        worker.warn(SOURCE_MICROTOME, "Knife could not be cleared");

        assert_eq!(log.len(), 2);
        let entries = log.entries_since(1);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].severity, Severity::Warning);
        assert_eq!(entries[0].source, "3VIEW");
        assert!(log.entries_since(5).is_empty());
    }
}
