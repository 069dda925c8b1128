//! Scripted manager transport for testing without a telephony server.
//!
//! Clones share state, so a test can keep one handle for scripting and
//! inspection while another is owned by the session manager.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use ami::{Action, AmiError, Message};

use super::transport::ManagerTransport;

/// What the mock does when a scripted action arrives.
#[derive(Debug, Clone)]
pub enum MockReply {
    /// Answer with this message.
    Response(Message),
    /// Fail the exchange but keep the link up.
    Fail(String),
    /// Fail the exchange and drop the link, like a server hanging up.
    Disconnect,
}

impl MockReply {
    /// Shorthand for a response built from headers.
    pub fn response<K, V, I>(headers: I) -> Self
    where
        K: Into<String>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        Self::Response(Message::from_headers(headers))
    }
}

#[derive(Debug, Default)]
struct MockState {
    connected: bool,
    connect_error: Option<String>,
    login_rejection: Option<String>,
    login_credentials: Option<(String, String)>,
    replies: HashMap<(String, String), MockReply>,
    sent: Vec<Action>,
    connect_attempts: usize,
    logoffs: usize,
}

/// Mock transport with scripted replies keyed by action name and target.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    /// A disconnected mock whose connect and login succeed.
    pub fn new() -> Self {
        Self::default()
    }

    /// A mock that starts with a live, logged-in link.
    pub fn connected() -> Self {
        let mock = Self::new();
        mock.state().connected = true;
        mock
    }

    /// Make every connect attempt fail with `detail`.
    pub fn with_connect_error(self, detail: &str) -> Self {
        self.state().connect_error = Some(detail.to_string());
        self
    }

    /// Make login answer `Response: Error` with `message`.
    pub fn with_login_rejected(self, message: &str) -> Self {
        self.state().login_rejection = Some(message.to_string());
        self
    }

    pub fn clear_connect_error(&self) {
        self.state().connect_error = None;
    }

    /// Script the reply for an action. `key` is the value of the action's
    /// `Peer` or `Mailbox` header; use `""` for actions without one.
    pub fn on_action(&self, action: &str, key: &str, reply: MockReply) {
        self.state()
            .replies
            .insert((action.to_ascii_lowercase(), key.to_string()), reply);
    }

    /// Script the `SIPshowpeer` reply for an extension.
    pub fn on_peer(&self, peer: &str, reply: MockReply) {
        self.on_action("SIPshowpeer", peer, reply);
    }

    /// Script the `MailboxStatus` reply for a mailbox.
    pub fn on_mailbox(&self, mailbox: &str, reply: MockReply) {
        self.on_action("MailboxStatus", mailbox, reply);
    }

    /// Force the link state, e.g. to simulate a dropped connection.
    pub fn set_connected(&self, connected: bool) {
        self.state().connected = connected;
    }

    /// Every action sent so far, in order. Login is not included.
    pub fn sent_actions(&self) -> Vec<Action> {
        self.state().sent.clone()
    }

    /// Number of sent actions with the given name.
    pub fn sent_count(&self, action: &str) -> usize {
        self.state()
            .sent
            .iter()
            .filter(|a| a.name().eq_ignore_ascii_case(action))
            .count()
    }

    pub fn connect_attempts(&self) -> usize {
        self.state().connect_attempts
    }

    /// Credentials of the most recent login.
    pub fn login_credentials(&self) -> Option<(String, String)> {
        self.state().login_credentials.clone()
    }

    pub fn logoffs(&self) -> usize {
        self.state().logoffs
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn target_key(action: &Action) -> String {
    action
        .get("Peer")
        .or_else(|| action.get("Mailbox"))
        .unwrap_or_default()
        .to_string()
}

impl ManagerTransport for MockTransport {
    async fn connect(&mut self, _host: &str, _port: u16) -> Result<(), AmiError> {
        let mut state = self.state();
        state.connect_attempts += 1;
        state.connected = false;
        if let Some(detail) = state.connect_error.clone() {
            return Err(AmiError::Io(detail));
        }
        state.connected = true;
        Ok(())
    }

    async fn login(&mut self, username: &str, secret: &str) -> Result<Message, AmiError> {
        let mut state = self.state();
        state.login_credentials = Some((username.to_string(), secret.to_string()));
        Ok(match &state.login_rejection {
            Some(message) => Message::from_headers([
                ("Response", "Error"),
                ("Message", message.as_str()),
            ]),
            None => Message::from_headers([
                ("Response", "Success"),
                ("Message", "Authentication accepted"),
            ]),
        })
    }

    async fn send_action(&mut self, action: Action) -> Result<Message, AmiError> {
        let mut state = self.state();
        if !state.connected {
            return Err(AmiError::ConnectionClosed("mock link is down".to_string()));
        }

        let key = (action.name().to_ascii_lowercase(), target_key(&action));
        let reply = state.replies.get(&key).cloned();
        state.sent.push(action);

        match reply {
            Some(MockReply::Response(message)) => Ok(message),
            Some(MockReply::Fail(detail)) => Err(AmiError::Malformed(detail)),
            Some(MockReply::Disconnect) => {
                state.connected = false;
                Err(AmiError::ConnectionClosed("mock server hung up".to_string()))
            }
            None => Ok(Message::from_headers([
                ("Response", "Error"),
                ("Message", "No scripted response"),
            ])),
        }
    }

    fn is_connected(&self) -> bool {
        self.state().connected
    }

    fn reset(&mut self) {
        self.state().connected = false;
    }

    async fn logoff(&mut self) {
        let mut state = self.state();
        state.logoffs += 1;
        state.connected = false;
    }
}
