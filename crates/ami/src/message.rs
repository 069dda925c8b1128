//! Actions sent to the manager and messages received from it.
//!
//! Both are ordered lists of `Key: Value` headers. Header lookup on a
//! [`Message`] is case-insensitive, matching how Asterisk treats keys.

use std::fmt;

/// Header carrying the action name.
pub const ACTION_HEADER: &str = "Action";

/// Header used to correlate a response with the action that caused it.
pub const ACTION_ID_HEADER: &str = "ActionID";

/// Header carrying the outcome of an action (`Success`, `Error`, ...).
pub const RESPONSE_HEADER: &str = "Response";

/// Header present on unsolicited event messages.
pub const EVENT_HEADER: &str = "Event";

/// Header carrying a human-readable explanation.
pub const MESSAGE_HEADER: &str = "Message";

/// An action request to be sent to the manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Action {
    name: String,
    headers: Vec<(String, String)>,
}

impl Action {
    /// Create an action with the given name and no extra headers.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            headers: Vec::new(),
        }
    }

    /// Append a header, builder style.
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    /// The action name (`Login`, `SIPshowpeer`, ...).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Headers in insertion order, excluding `Action` itself.
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Look up a header value by case-insensitive key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// Login action. Events are switched off so responses are not
    /// interleaved with event traffic.
    pub fn login(username: &str, secret: &str) -> Self {
        Self::new("Login")
            .header("Username", username)
            .header("Secret", secret)
            .header("Events", "off")
    }

    /// Peer details for a SIP peer, including its registration `Status`.
    pub fn sip_show_peer(peer: &str) -> Self {
        Self::new("SIPshowpeer").header("Peer", peer)
    }

    /// Voicemail status for a mailbox; the response carries `Waiting`.
    pub fn mailbox_status(mailbox: &str) -> Self {
        Self::new("MailboxStatus").header("Mailbox", mailbox)
    }

    /// Keepalive.
    pub fn ping() -> Self {
        Self::new("Ping")
    }

    /// End the manager session.
    pub fn logoff() -> Self {
        Self::new("Logoff")
    }
}

/// A message received from the manager: a response or an event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message {
    headers: Vec<(String, String)>,
}

impl Message {
    /// Build a message from headers in wire order.
    pub fn from_headers<K, V, I>(headers: I) -> Self
    where
        K: Into<String>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        Self {
            headers: headers
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub(crate) fn push(&mut self, key: String, value: String) {
        self.headers.push((key, value));
    }

    /// First value for `name`, compared case-insensitively.
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// First value for `name`, or `default` when the header is absent.
    pub fn get_header_or<'a>(&'a self, name: &str, default: &'a str) -> &'a str {
        self.get_header(name).unwrap_or(default)
    }

    /// Every value for `name`, in wire order.
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.headers
            .iter()
            .filter(move |(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// All headers in wire order.
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    /// Value of the `Response` header, if this is a response.
    pub fn response(&self) -> Option<&str> {
        self.get_header(RESPONSE_HEADER)
    }

    /// True when the `Response` header is `Error`.
    pub fn is_error(&self) -> bool {
        self.response()
            .is_some_and(|r| r.eq_ignore_ascii_case("Error"))
    }

    /// True for unsolicited event messages.
    pub fn is_event(&self) -> bool {
        self.get_header(EVENT_HEADER).is_some()
    }

    pub fn action_id(&self) -> Option<&str> {
        self.get_header(ACTION_ID_HEADER)
    }

    /// Value of the `Message` header.
    pub fn message(&self) -> Option<&str> {
        self.get_header(MESSAGE_HEADER)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (key, value) in &self.headers {
            if !first {
                f.write_str(", ")?;
            }
            first = false;
            write!(f, "{}={}", key, value)?;
        }
        Ok(())
    }
}
