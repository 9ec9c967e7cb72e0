use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Application channel event IDs that describe a crash: application error,
/// error reporting, application hang.
pub const CRASH_EVENT_IDS: [u16; 3] = [1000, 1001, 1002];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Channel { Application, System }

impl Channel {
    pub fn name(self) -> &'static str {
        match self { Channel::Application => "Application", Channel::System => "System" }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.name()) }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity { Critical, Error, Warning, Information, Other }

impl Severity {
    /// Maps the `<Level>` value of a rendered event.
    pub fn from_level(l: u8) -> Self {
        match l { 1 => Severity::Critical, 2 => Severity::Error, 3 => Severity::Warning, 4 => Severity::Information, _ => Severity::Other }
    }
}

/// Drops the qualifier/severity bits of a raw 32-bit event code.
pub fn mask_event_id(raw: u32) -> u16 { (raw & 0xFFFF) as u16 }

/// One entry read from a log channel. Never mutated after construction.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    pub time: DateTime<Utc>,
    pub channel: Channel,
    pub source: String,
    pub event_id: u16,
    pub severity: Severity,
    /// Positional insert strings, in the order the channel reported them.
    pub fields: Vec<String>,
    #[serde(default)]
    pub payload: Vec<u8>,
}

impl LogRecord {
    pub fn message(&self) -> String { self.fields.join(" ") }

    /// Lossy text view of the binary payload; invalid UTF-8 and NUL padding never fail.
    pub fn payload_text(&self) -> String {
        String::from_utf8_lossy(&self.payload).trim_matches(char::from(0)).to_string()
    }

    pub fn is_crash_event(&self) -> bool { CRASH_EVENT_IDS.contains(&self.event_id) }
}
