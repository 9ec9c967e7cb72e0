use serde::Serialize;
use crate::record::Channel;

/// Failures reported by a log service implementation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SourceError {
    #[error("access denied")]
    AccessDenied,
    #[error("channel unavailable: {0}")]
    Unavailable(String),
    #[error("read failed: {0}")]
    Read(String),
}

/// Errors carried alongside partial results in a diagnosis.
///
/// `Input` stops the search before any channel is opened. `AccessDenied` ends the
/// whole sweep. `Channel` only loses the one channel it names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CrashError {
    #[error("{message}")]
    Input { message: String },
    #[error("Access denied opening the {channel} log. Run as Administrator to read it.")]
    AccessDenied { channel: Channel },
    #[error("{channel} log error: {reason}")]
    Channel { channel: Channel, reason: String },
}

impl CrashError {
    pub fn from_source(channel: Channel, e: SourceError) -> Self {
        match e {
            SourceError::AccessDenied => CrashError::AccessDenied { channel },
            other => CrashError::Channel { channel, reason: other.to_string() },
        }
    }

    pub fn input(message: impl Into<String>) -> Self { CrashError::Input { message: message.into() } }

    pub fn is_fatal(&self) -> bool { matches!(self, CrashError::Input { .. } | CrashError::AccessDenied { .. }) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_denied_stays_distinct() {
        let e = CrashError::from_source(Channel::System, SourceError::AccessDenied);
        assert_eq!(e, CrashError::AccessDenied { channel: Channel::System });
        assert!(e.is_fatal());
    }

    #[test]
    fn other_source_failures_become_channel_errors() {
        let e = CrashError::from_source(Channel::Application, SourceError::Unavailable("no such log".into()));
        assert!(!e.is_fatal());
        assert_eq!(e.to_string(), "Application log error: channel unavailable: no such log");
    }

    #[test]
    fn every_variant_serializes_with_its_kind() {
        let errors = vec![
            CrashError::input("Please select an executable file."),
            CrashError::AccessDenied { channel: Channel::Application },
            CrashError::Channel { channel: Channel::System, reason: "gone".into() },
        ];
        let v = serde_json::to_value(&errors).unwrap();
        assert_eq!(v[0], serde_json::json!({"kind": "input", "message": "Please select an executable file."}));
        assert_eq!(v[1], serde_json::json!({"kind": "access_denied", "channel": "Application"}));
        assert_eq!(v[2]["kind"], "channel");
        assert_eq!(v[2]["reason"], "gone");
    }
}
