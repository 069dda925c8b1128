//! Manager transport abstraction.
//!
//! [`ManagerTransport`] is the seam between the session lifecycle and the
//! wire client, so polling logic can run against [`AmiTransport`] in
//! production and a scripted mock in tests.

use std::time::Duration;

use ami::{Action, AmiClient, AmiError, Message};

/// Operations the session manager needs from a manager wire client.
///
/// Implementations own at most one live link at a time.
#[allow(async_fn_in_trait)]
pub trait ManagerTransport: Send {
    /// Opens a new link, replacing any previous one.
    async fn connect(&mut self, host: &str, port: u16) -> Result<(), AmiError>;

    /// Authenticates the current link. A rejected login is a normal
    /// response with `Response: Error`.
    async fn login(&mut self, username: &str, secret: &str) -> Result<Message, AmiError>;

    /// One request-response exchange over the current link.
    async fn send_action(&mut self, action: Action) -> Result<Message, AmiError>;

    /// Whether a usable link exists. Must not perform I/O.
    fn is_connected(&self) -> bool;

    /// Drops the link without talking to the server.
    fn reset(&mut self);

    /// Ends the session politely, then drops the link.
    async fn logoff(&mut self);
}

/// Production transport backed by [`AmiClient`].
pub struct AmiTransport {
    client: Option<AmiClient>,
    connect_timeout: Duration,
    action_timeout: Duration,
}

impl AmiTransport {
    /// Creates a disconnected transport.
    pub fn new(connect_timeout: Duration, action_timeout: Duration) -> Self {
        Self {
            client: None,
            connect_timeout,
            action_timeout,
        }
    }

    /// Banner of the current link, if any.
    pub fn banner(&self) -> Option<&str> {
        self.client.as_ref().map(|c| c.banner())
    }

    fn client_mut(&mut self) -> Result<&mut AmiClient, AmiError> {
        self.client
            .as_mut()
            .ok_or_else(|| AmiError::ConnectionClosed("no manager link".to_string()))
    }
}

impl ManagerTransport for AmiTransport {
    async fn connect(&mut self, host: &str, port: u16) -> Result<(), AmiError> {
        self.client = None;
        let mut client = AmiClient::connect_with_timeout(host, port, self.connect_timeout).await?;
        client.set_timeout(self.action_timeout);
        self.client = Some(client);
        Ok(())
    }

    async fn login(&mut self, username: &str, secret: &str) -> Result<Message, AmiError> {
        self.client_mut()?.login(username, secret).await
    }

    async fn send_action(&mut self, action: Action) -> Result<Message, AmiError> {
        self.client_mut()?.send_action(action).await
    }

    fn is_connected(&self) -> bool {
        self.client.as_ref().is_some_and(|c| c.is_connected())
    }

    fn reset(&mut self) {
        self.client = None;
    }

    async fn logoff(&mut self) {
        if let Some(mut client) = self.client.take() {
            if let Err(e) = client.logoff().await {
                tracing::debug!(error = %e, "Manager logoff failed");
            }
        }
    }
}
