//! Session manager for the single shared manager link.
//!
//! Connection state is checked, established and used through three
//! separate calls so the poller decides when to retry. Nothing in here
//! retries on its own.

use std::fmt;

use ami::{Action, Message};
use thiserror::Error;

use super::transport::ManagerTransport;
use crate::config::ManagerConfig;

/// Errors from the session lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// The TCP connection or banner exchange failed.
    #[error("failed to connect to manager: {0}")]
    ConnectFailed(String),

    /// The manager rejected the credentials or the login exchange failed.
    #[error("manager login failed: {0}")]
    AuthFailed(String),

    /// An action was attempted without a live link.
    #[error("manager session is not connected")]
    NotConnected,

    /// The link failed during an exchange and has been dropped.
    #[error("manager link lost: {0}")]
    Transport(String),

    /// One exchange failed to encode or decode; the link is still up.
    #[error("manager exchange failed: {0}")]
    Exchange(String),
}

/// Where and as whom to log in. Supplied once at construction.
#[derive(Clone, PartialEq, Eq)]
pub struct ManagerEndpoint {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub secret: String,
}

impl ManagerEndpoint {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        username: impl Into<String>,
        secret: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            username: username.into(),
            secret: secret.into(),
        }
    }
}

impl From<&ManagerConfig> for ManagerEndpoint {
    fn from(config: &ManagerConfig) -> Self {
        Self::new(
            config.host.clone(),
            config.port,
            config.username.clone(),
            config.secret.clone(),
        )
    }
}

impl fmt::Debug for ManagerEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagerEndpoint")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Owns the manager link and its connect/login lifecycle.
pub struct SessionManager<T> {
    transport: T,
    endpoint: ManagerEndpoint,
    last_error: Option<SessionError>,
}

impl<T: ManagerTransport> SessionManager<T> {
    /// Creates a session manager. No connection is attempted.
    pub fn new(transport: T, endpoint: ManagerEndpoint) -> Self {
        Self {
            transport,
            endpoint,
            last_error: None,
        }
    }

    /// Current link state. Never reconnects.
    pub fn connected(&self) -> bool {
        self.transport.is_connected()
    }

    /// Connects and logs in unless already connected.
    ///
    /// On failure the link stays down and the error is kept as
    /// [`last_error`](Self::last_error).
    pub async fn ensure_connected(&mut self) -> Result<(), SessionError> {
        if self.connected() {
            return Ok(());
        }

        let result = self.connect_and_login().await;
        match &result {
            Ok(()) => {
                tracing::info!(
                    host = %self.endpoint.host,
                    port = self.endpoint.port,
                    "Manager session established"
                );
                self.last_error = None;
            }
            Err(e) => {
                self.last_error = Some(e.clone());
            }
        }
        result
    }

    async fn connect_and_login(&mut self) -> Result<(), SessionError> {
        self.transport
            .connect(&self.endpoint.host, self.endpoint.port)
            .await
            .map_err(|e| SessionError::ConnectFailed(e.to_string()))?;

        let response = match self
            .transport
            .login(&self.endpoint.username, &self.endpoint.secret)
            .await
        {
            Ok(response) => response,
            Err(e) => {
                self.transport.reset();
                return Err(SessionError::AuthFailed(e.to_string()));
            }
        };

        if response.is_error() {
            self.transport.reset();
            return Err(SessionError::AuthFailed(
                response.message().unwrap_or("login rejected").to_string(),
            ));
        }

        Ok(())
    }

    /// Sends one action over the existing link.
    ///
    /// Fails with [`SessionError::NotConnected`] without touching the
    /// transport when the link is down. A connection error drops the link;
    /// any other exchange failure leaves it up for the next action.
    pub async fn execute(&mut self, action: Action) -> Result<Message, SessionError> {
        if !self.connected() {
            return Err(SessionError::NotConnected);
        }

        let name = action.name().to_string();
        match self.transport.send_action(action).await {
            Ok(response) => Ok(response),
            Err(e) if e.is_connection_error() => {
                let err = SessionError::Transport(e.to_string());
                tracing::warn!(action = %name, error = %e, "Manager link lost");
                self.transport.reset();
                self.last_error = Some(err.clone());
                Err(err)
            }
            Err(e) => {
                tracing::debug!(action = %name, error = %e, "Manager exchange failed");
                Err(SessionError::Exchange(e.to_string()))
            }
        }
    }

    /// Most recent connect, login or transport failure. Cleared by a
    /// successful [`ensure_connected`](Self::ensure_connected).
    pub fn last_error(&self) -> Option<&SessionError> {
        self.last_error.as_ref()
    }

    pub fn endpoint(&self) -> &ManagerEndpoint {
        &self.endpoint
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Logs off if connected.
    pub async fn close(&mut self) {
        if self.connected() {
            self.transport.logoff().await;
            tracing::info!("Manager session closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::mock::{MockReply, MockTransport};

    fn endpoint() -> ManagerEndpoint {
        ManagerEndpoint::new("pbx.test", 5038, "admin", "secret")
    }

    #[tokio::test]
    async fn test_connected_does_not_reconnect() {
        let mock = MockTransport::new();
        let session = SessionManager::new(mock.clone(), endpoint());

        assert!(!session.connected());
        assert_eq!(mock.connect_attempts(), 0);
    }

    #[tokio::test]
    async fn test_ensure_connected_logs_in() {
        let mock = MockTransport::new();
        let mut session = SessionManager::new(mock.clone(), endpoint());

        session.ensure_connected().await.unwrap();
        assert!(session.connected());
        assert_eq!(mock.connect_attempts(), 1);
        assert_eq!(mock.login_credentials(), Some(("admin".to_string(), "secret".to_string())));
        assert!(session.last_error().is_none());
    }

    #[tokio::test]
    async fn test_ensure_connected_is_idempotent() {
        let mock = MockTransport::connected();
        let mut session = SessionManager::new(mock.clone(), endpoint());

        session.ensure_connected().await.unwrap();
        session.ensure_connected().await.unwrap();
        assert_eq!(mock.connect_attempts(), 0);
    }

    #[tokio::test]
    async fn test_connect_failure() {
        let mock = MockTransport::new().with_connect_error("connection refused");
        let mut session = SessionManager::new(mock.clone(), endpoint());

        let err = session.ensure_connected().await.unwrap_err();
        assert!(matches!(err, SessionError::ConnectFailed(ref d) if d.contains("connection refused")));
        assert!(!session.connected());
        assert_eq!(session.last_error(), Some(&err));
    }

    #[tokio::test]
    async fn test_login_rejected() {
        let mock = MockTransport::new().with_login_rejected("Authentication failed");
        let mut session = SessionManager::new(mock.clone(), endpoint());

        let err = session.ensure_connected().await.unwrap_err();
        assert_eq!(err, SessionError::AuthFailed("Authentication failed".to_string()));
        assert!(!session.connected());
    }

    #[tokio::test]
    async fn test_success_clears_last_error() {
        let mock = MockTransport::new().with_connect_error("refused");
        let mut session = SessionManager::new(mock.clone(), endpoint());

        assert!(session.ensure_connected().await.is_err());
        assert!(session.last_error().is_some());

        mock.clear_connect_error();
        session.ensure_connected().await.unwrap();
        assert!(session.last_error().is_none());
    }

    #[tokio::test]
    async fn test_execute_not_connected() {
        let mock = MockTransport::new();
        let mut session = SessionManager::new(mock.clone(), endpoint());

        let err = session.execute(Action::ping()).await.unwrap_err();
        assert_eq!(err, SessionError::NotConnected);
        assert!(mock.sent_actions().is_empty());
    }

    #[tokio::test]
    async fn test_execute_returns_response() {
        let mock = MockTransport::connected();
        mock.on_peer(
            "1001",
            MockReply::response([("Response", "Success"), ("Status", "OK")]),
        );
        let mut session = SessionManager::new(mock.clone(), endpoint());

        let response = session.execute(Action::sip_show_peer("1001")).await.unwrap();
        assert_eq!(response.get_header("Status"), Some("OK"));
        assert_eq!(mock.sent_actions().len(), 1);
    }

    #[tokio::test]
    async fn test_execute_transport_failure_drops_link() {
        let mock = MockTransport::connected();
        mock.on_peer("1001", MockReply::Disconnect);
        let mut session = SessionManager::new(mock.clone(), endpoint());

        let err = session.execute(Action::sip_show_peer("1001")).await.unwrap_err();
        assert!(matches!(err, SessionError::Transport(_)));
        assert!(!session.connected());
        assert_eq!(session.last_error(), Some(&err));
    }

    #[tokio::test]
    async fn test_execute_exchange_failure_keeps_link() {
        let mock = MockTransport::connected();
        mock.on_peer("1001", MockReply::Fail("garbled".to_string()));
        let mut session = SessionManager::new(mock.clone(), endpoint());

        let err = session.execute(Action::sip_show_peer("1001")).await.unwrap_err();
        assert!(matches!(err, SessionError::Exchange(ref d) if d.contains("garbled")));
        assert!(session.connected());
        assert!(session.last_error().is_none());

        session.execute(Action::sip_show_peer("1002")).await.unwrap();
        assert_eq!(mock.sent_count("SIPshowpeer"), 2);
    }

    #[test]
    fn test_endpoint_debug_redacts_secret() {
        let debug = format!("{:?}", endpoint());
        assert!(!debug.contains("\"secret\""));
        assert!(debug.contains("<redacted>"));
    }
}
