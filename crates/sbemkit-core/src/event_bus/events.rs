//! Event type definitions for the event bus.
//!
//! Events are grouped by category and are cloneable and serializable so the
//! operator log can persist them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::data::{StageCalibration, StagePosition};

/// Root event enum for all application events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AppEvent {
    /// Long-running operation lifecycle
    Run(RunEvent),
    /// Stage, knife and beam activity
    Hardware(HardwareEvent),
    /// Calibration proposals and confirmations
    Calibration(CalibrationEvent),
    /// Settings and configuration
    Settings(SettingsEvent),
    /// Timestamped operator log line
    Log(LogEvent),
    /// A run ended in a fault
    Error(ErrorEvent),
}

impl AppEvent {
    /// Get the category of this event
    pub fn category(&self) -> EventCategory {
        match self {
            AppEvent::Run(_) => EventCategory::Run,
            AppEvent::Hardware(_) => EventCategory::Hardware,
            AppEvent::Calibration(_) => EventCategory::Calibration,
            AppEvent::Settings(_) => EventCategory::Settings,
            AppEvent::Log(_) => EventCategory::Log,
            AppEvent::Error(_) => EventCategory::Error,
        }
    }

    /// Get a short description of this event for logging
    pub fn description(&self) -> String {
        match self {
            AppEvent::Run(e) => e.description(),
            AppEvent::Hardware(e) => e.description(),
            AppEvent::Calibration(e) => e.description(),
            AppEvent::Settings(e) => e.description(),
            AppEvent::Log(e) => e.to_string(),
            AppEvent::Error(e) => e.description(),
        }
    }
}

/// Event category for filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventCategory {
    /// Run lifecycle events.
    Run,
    /// Hardware activity events.
    Hardware,
    /// Calibration events.
    Calibration,
    /// Settings and configuration events.
    Settings,
    /// Operator log lines.
    Log,
    /// Error and diagnostic events.
    Error,
}

impl fmt::Display for EventCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventCategory::Run => "Run",
            EventCategory::Hardware => "Hardware",
            EventCategory::Calibration => "Calibration",
            EventCategory::Settings => "Settings",
            EventCategory::Log => "Log",
            EventCategory::Error => "Error",
        };
        f.write_str(name)
    }
}

/// Kind of long-running operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RunKind {
    /// Stepwise approach cutting.
    Approach,
    /// Randomised stage stress test.
    MotorTest,
    /// Stage scale/rotation calibration.
    StageCalibration,
    /// Single operator-requested stage move.
    StageMove,
    /// Beam (EHT) on/off switch.
    EhtSwitch,
}

impl fmt::Display for RunKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunKind::Approach => "Approach",
            RunKind::MotorTest => "Motor test",
            RunKind::StageCalibration => "Stage calibration",
            RunKind::StageMove => "Stage move",
            RunKind::EhtSwitch => "EHT switch",
        };
        f.write_str(name)
    }
}

/// Run lifecycle events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RunEvent {
    /// A run was launched.
    Started {
        /// Which operation.
        run: RunKind,
    },
    /// Abort was requested by the operator.
    AbortRequested {
        /// Which operation.
        run: RunKind,
    },
    /// A run reached a terminal state.
    Finished {
        /// Which operation.
        run: RunKind,
        /// One-line outcome summary.
        summary: String,
    },
}

impl RunEvent {
    fn description(&self) -> String {
        match self {
            RunEvent::Started { run } => format!("{} started", run),
            RunEvent::AbortRequested { run } => format!("{} abort requested", run),
            RunEvent::Finished { run, summary } => format!("{} finished: {}", run, summary),
        }
    }
}

/// Hardware activity events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum HardwareEvent {
    /// Stage reached a new position.
    StageMoved {
        /// The new position.
        position: StagePosition,
    },
    /// Knife moved to its near position.
    KnifeNear,
    /// Knife cleared away from the block face.
    KnifeCleared,
    /// One full cut cycle was started.
    CutStarted {
        /// Z (µm) the cut was made at.
        z: f64,
    },
    /// Beam state changed.
    EhtChanged {
        /// Whether the beam is on.
        on: bool,
    },
    /// A driver reported a fault.
    Fault {
        /// Numeric error code.
        code: u32,
        /// Cause text.
        cause: String,
    },
}

impl HardwareEvent {
    fn description(&self) -> String {
        match self {
            HardwareEvent::StageMoved { position } => format!("Stage at {}", position),
            HardwareEvent::KnifeNear => "Knife near".to_string(),
            HardwareEvent::KnifeCleared => "Knife cleared".to_string(),
            HardwareEvent::CutStarted { z } => format!("Cutting at Z={:.3}", z),
            HardwareEvent::EhtChanged { on } => {
                format!("EHT {}", if *on { "on" } else { "off" })
            }
            HardwareEvent::Fault { code, cause } => format!("Fault {}: {}", code, cause),
        }
    }
}

/// Calibration events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CalibrationEvent {
    /// New stage calibration computed, awaiting confirmation.
    Proposed {
        /// Beam energy key (kV).
        eht: f64,
        /// The proposal.
        calibration: StageCalibration,
    },
    /// Proposal confirmed and persisted.
    Confirmed {
        /// Beam energy key (kV).
        eht: f64,
        /// The persisted values.
        calibration: StageCalibration,
    },
    /// Proposal discarded without persisting.
    Discarded {
        /// Beam energy key (kV).
        eht: f64,
    },
    /// Motor speeds recalculated.
    MotorSpeedsUpdated {
        /// X motor speed (µm/s).
        x: f64,
        /// Y motor speed (µm/s).
        y: f64,
    },
}

impl CalibrationEvent {
    fn description(&self) -> String {
        match self {
            CalibrationEvent::Proposed { eht, calibration } => {
                format!("Proposed calibration at {:.2} kV: {}", eht, calibration)
            }
            CalibrationEvent::Confirmed { eht, calibration } => {
                format!("Confirmed calibration at {:.2} kV: {}", eht, calibration)
            }
            CalibrationEvent::Discarded { eht } => {
                format!("Discarded calibration at {:.2} kV", eht)
            }
            CalibrationEvent::MotorSpeedsUpdated { x, y } => {
                format!("Motor speeds X={:.3} Y={:.3}", x, y)
            }
        }
    }
}

/// Settings-related events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SettingsEvent {
    /// Settings loaded.
    Loaded,
    /// Settings saved.
    Saved,
    /// A configuration section changed.
    Changed {
        /// Dotted key of the changed section.
        key: String,
    },
}

impl SettingsEvent {
    fn description(&self) -> String {
        match self {
            SettingsEvent::Loaded => "Settings loaded".to_string(),
            SettingsEvent::Saved => "Settings saved".to_string(),
            SettingsEvent::Changed { key } => format!("Setting changed: {}", key),
        }
    }
}

/// Severity shared by log lines, outcome reports and error events
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// Informational.
    Info,
    /// Needs operator attention, operation may continue.
    Warning,
    /// Operation failed.
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Info => f.write_str("INFO"),
            Severity::Warning => f.write_str("WARNING"),
            Severity::Error => f.write_str("ERROR"),
        }
    }
}

/// One line of the operator log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEvent {
    /// When the line was written.
    pub timestamp: DateTime<Utc>,
    /// Source tag: `3VIEW` (microtome), `CTRL`, `SEM` or `CAL`.
    pub source: String,
    /// Severity.
    pub severity: Severity,
    /// Message text.
    pub message: String,
}

impl fmt::Display for LogEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} | {}: {}",
            self.timestamp.format("%H:%M:%S"),
            self.source,
            self.message
        )
    }
}

/// A run that stopped on a fault, with the operator-facing explanation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEvent {
    /// The run that faulted.
    pub run: RunKind,
    /// Severity.
    pub severity: Severity,
    /// Human-readable message.
    pub message: String,
}

impl ErrorEvent {
    fn description(&self) -> String {
        format!("{} {}: {}", self.run, self.severity, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_category() {
        let event = AppEvent::Run(RunEvent::Started {
            run: RunKind::Approach,
        });
        assert_eq!(event.category(), EventCategory::Run);

        let event = AppEvent::Hardware(HardwareEvent::KnifeCleared);
        assert_eq!(event.category(), EventCategory::Hardware);
    }

    #[test]
    fn test_event_description() {
        let event = AppEvent::Run(RunEvent::Finished {
            run: RunKind::MotorTest,
            summary: "NUMBER OF ERRORS: 0".to_string(),
        });
        assert!(event.description().contains("Motor test"));
        assert!(event.description().contains("NUMBER OF ERRORS"));
    }

    #[test]
    fn test_event_serialization() {
        let event = AppEvent::Hardware(HardwareEvent::Fault {
            code: 206,
            cause: "Z mismatch".to_string(),
        });
        let json = serde_json::to_string(&event).expect("Should serialize");
        let parsed: AppEvent = serde_json::from_str(&json).expect("Should deserialize");

        if let AppEvent::Hardware(HardwareEvent::Fault { code, .. }) = parsed {
            assert_eq!(code, 206);
        } else {
            panic!("Wrong event type after deserialization");
        }
    }

    #[test]
    fn test_log_line_format() {
        let line = LogEvent {
            timestamp: DateTime::parse_from_rfc3339("2024-05-01T09:08:07Z")
                .expect("valid timestamp")
                .with_timezone(&Utc),
            source: "KNIFE".to_string(),
            severity: Severity::Info,
            message: "Cutting in progress".to_string(),
        };
        assert_eq!(line.to_string(), "09:08:07 | KNIFE: Cutting in progress");
        assert!(Severity::Error > Severity::Warning);
    }
}
