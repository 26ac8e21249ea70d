//! Sink for the session's diagnostic events.

use std::sync::{Arc, Mutex};

use log::Level;

pub trait EventLog: Send {
    fn record(&self, level: Level, source: &str, message: &str);
}

/// Forward events to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogEventLog;

impl EventLog for LogEventLog {
    fn record(&self, level: Level, source: &str, message: &str) {
        log::log!(target: "rigeldome", level, "[{source}] {message}");
    }
}

/// Keep every event in memory; handy when a host wants to show them itself.
#[derive(Debug, Default, Clone)]
pub struct RecordingEventLog {
    events: Arc<Mutex<Vec<(Level, String, String)>>>,
}

impl RecordingEventLog {
    pub fn new() -> RecordingEventLog {
        RecordingEventLog::default()
    }

    pub fn events(&self) -> Vec<(Level, String, String)> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn contains(&self, level: Level, needle: &str) -> bool {
        self.events()
            .iter()
            .any(|(event_level, _, message)| *event_level == level && message.contains(needle))
    }
}

impl EventLog for RecordingEventLog {
    fn record(&self, level: Level, source: &str, message: &str) {
        let mut events = match self.events.lock() {
            Ok(events) => events,
            Err(poisoned) => poisoned.into_inner(),
        };
        events.push((level, source.to_string(), message.to_string()));
    }
}
