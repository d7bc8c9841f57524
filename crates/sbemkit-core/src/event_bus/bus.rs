//! Process-wide event bus.
//!
//! Runs publish from worker threads. The presentation thread keeps a cursor
//! and reads the retained [`EventRecord`]s newer than it with
//! [`EventBus::records_after`].

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::sync::OnceLock;

use super::events::{AppEvent, EventCategory, Severity};

/// Which events a reader wants
#[derive(Debug, Clone, Default, PartialEq)]
pub enum EventFilter {
    #[default]
    All,
    /// Events in any of these categories.
    Categories(Vec<EventCategory>),
    /// Log lines and error events at or above a severity.
    AtLeast(Severity),
}

impl EventFilter {
    pub fn matches(&self, event: &AppEvent) -> bool {
        match self {
            EventFilter::All => true,
            EventFilter::Categories(categories) => categories.contains(&event.category()),
            EventFilter::AtLeast(min) => match event {
                AppEvent::Log(line) => line.severity >= *min,
                AppEvent::Error(error) => error.severity >= *min,
                _ => false,
            },
        }
    }
}

/// A published event with its sequence number
#[derive(Debug, Clone)]
pub struct EventRecord {
    /// Monotonic, starting at 1.
    pub seq: u64,
    pub at: DateTime<Utc>,
    pub event: AppEvent,
}

/// Event bus tuning
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventBusConfig {
    /// Records kept for cursor readers; 0 keeps none.
    pub retained: usize,
}

struct Journal {
    next_seq: u64,
    records: VecDeque<EventRecord>,
}

/// Sequence-numbered journal of [`AppEvent`]s for cursor readers
pub struct EventBus {
    config: EventBusConfig,
    journal: Mutex<Journal>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_config(EventBusConfig::default())
    }

    pub fn with_config(config: EventBusConfig) -> Self {
        Self {
            journal: Mutex::new(Journal {
                next_seq: 1,
                records: VecDeque::with_capacity(config.retained),
            }),
            config,
        }
    }

    /// Record `event`. Returns its sequence number.
    pub fn publish(&self, event: AppEvent) -> u64 {
        let mut journal = self.journal.lock();
        let seq = journal.next_seq;
        journal.next_seq += 1;
        tracing::trace!("event {}: {}", seq, event.description());
        if self.config.retained > 0 {
            if journal.records.len() == self.config.retained {
                journal.records.pop_front();
            }
            journal.records.push_back(EventRecord {
                seq,
                at: Utc::now(),
                event,
            });
        }
        seq
    }

    /// Sequence number of the most recent event (0 before the first).
    pub fn last_seq(&self) -> u64 {
        self.journal.lock().next_seq - 1
    }

    /// Retained records newer than `cursor` that match `filter`, oldest first.
    ///
    /// Pass the `seq` of the last record seen as the next cursor. Records
    /// that fell out of retention are skipped silently.
    pub fn records_after(&self, cursor: u64, filter: &EventFilter) -> Vec<EventRecord> {
        self.journal
            .lock()
            .records
            .iter()
            .filter(|r| r.seq > cursor && filter.matches(&r.event))
            .cloned()
            .collect()
    }

    pub fn config(&self) -> &EventBusConfig {
        &self.config
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("last_seq", &self.last_seq())
            .field("config", &self.config)
            .finish()
    }
}

static EVENT_BUS: OnceLock<EventBus> = OnceLock::new();

/// The global bus, created with defaults on first use
pub fn event_bus() -> &'static EventBus {
    EVENT_BUS.get_or_init(EventBus::new)
}

/// Configure the global bus. Only effective before the first `event_bus()`
/// call; otherwise the rejected config is handed back.
pub fn init_event_bus(config: EventBusConfig) -> Result<(), EventBusConfig> {
    EVENT_BUS
        .set(EventBus::with_config(config))
        .map_err(|bus| bus.config.clone())
}

/// Publish on the global event bus
#[macro_export]
macro_rules! emit {
    ($event:expr) => {
        $crate::event_bus::event_bus().publish($event)
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_bus::events::{ErrorEvent, HardwareEvent, LogEvent, RunEvent, RunKind};

    fn started(run: RunKind) -> AppEvent {
        AppEvent::Run(RunEvent::Started { run })
    }

    fn log(severity: Severity, message: &str) -> AppEvent {
        AppEvent::Log(LogEvent {
            timestamp: Utc::now(),
            source: "CTRL".to_string(),
            severity,
            message: message.to_string(),
        })
    }

    #[test]
    fn test_severity_filter() {
        let filter = EventFilter::AtLeast(Severity::Warning);
        assert!(!filter.matches(&log(Severity::Info, "Cutting")));
        assert!(filter.matches(&log(Severity::Warning, "Knife clear failed")));
        assert!(filter.matches(&AppEvent::Error(ErrorEvent {
            run: RunKind::MotorTest,
            severity: Severity::Error,
            message: "Could not write the motor test log".to_string(),
        })));
        assert!(!filter.matches(&started(RunKind::Approach)));
    }

    #[test]
    fn test_cursor_reads_each_record_once() {
        let bus = EventBus::with_config(EventBusConfig { retained: 3 });
        assert_eq!(bus.last_seq(), 0);
        for z in 0..5 {
            bus.publish(AppEvent::Hardware(HardwareEvent::CutStarted { z: z as f64 }));
        }
        assert_eq!(bus.last_seq(), 5);

        let records = bus.records_after(0, &EventFilter::All);
        let seqs: Vec<u64> = records.iter().map(|r| r.seq).collect();
        assert_eq!(seqs, vec![3, 4, 5]);

        bus.publish(started(RunKind::MotorTest));
        let newer = bus.records_after(5, &EventFilter::All);
        assert_eq!(newer.len(), 1);
        assert!(matches!(newer[0].event, AppEvent::Run(_)));
        assert!(bus
            .records_after(5, &EventFilter::Categories(vec![EventCategory::Hardware]))
            .is_empty());
    }

    #[test]
    fn test_nothing_retained_by_default() {
        let bus = EventBus::new();
        assert_eq!(bus.publish(started(RunKind::StageMove)), 1);
        assert!(bus.records_after(0, &EventFilter::All).is_empty());
    }
}
