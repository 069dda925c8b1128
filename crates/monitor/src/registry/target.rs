//! Monitored target identities.

use std::fmt;

use serde::Serialize;

/// Something whose status is polled.
///
/// Identity is the variant plus its natural key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Target {
    /// The manager link itself. There is exactly one.
    Connection,
    /// A SIP extension, by peer name.
    Extension(String),
    /// A voicemail mailbox, by `box@context` name.
    Mailbox(String),
}

/// Variant of a [`Target`] without its key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    Connection,
    Extension,
    Mailbox,
}

impl Target {
    pub fn kind(&self) -> TargetKind {
        match self {
            Target::Connection => TargetKind::Connection,
            Target::Extension(_) => TargetKind::Extension,
            Target::Mailbox(_) => TargetKind::Mailbox,
        }
    }

    /// Extension id or mailbox name; `None` for the connection.
    pub fn key(&self) -> Option<&str> {
        match self {
            Target::Connection => None,
            Target::Extension(id) => Some(id.as_str()),
            Target::Mailbox(name) => Some(name.as_str()),
        }
    }

    /// Name shown to the host monitoring system.
    pub fn display_name(&self) -> String {
        match self {
            Target::Connection => "Asterisk Connection".to_string(),
            Target::Extension(id) => format!("Asterisk Extension {}", id),
            Target::Mailbox(name) => format!("Asterisk Mailbox {}", name),
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_name())
    }
}

impl TargetKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TargetKind::Connection => "connection",
            TargetKind::Extension => "extension",
            TargetKind::Mailbox => "mailbox",
        }
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
