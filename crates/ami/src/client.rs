//! TCP client for the Asterisk Manager Interface.
//!
//! The client connects, validates the server banner, and then runs
//! strictly sequential request-response exchanges. Each action gets a
//! unique `ActionID` and the client reads until the matching response
//! arrives, skipping unsolicited events in between.

use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader, ReadHalf, WriteHalf};
use tokio::net::TcpStream;

use crate::codec::{AmiCodec, MAX_LINE_LENGTH};
use crate::error::{AmiError, Result};
use crate::message::{Action, Message};

/// Default manager port.
pub const DEFAULT_PORT: u16 = 5038;

/// Default timeout for connect and for each exchange in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 5;

/// Every manager greets with this prefix followed by its protocol version.
pub const BANNER_PREFIX: &str = "Asterisk Call Manager/";

/// Prefix for the `ActionID` values this client generates.
const ACTION_ID_PREFIX: &str = "astmon";

/// A connected manager session.
pub struct AmiClient {
    reader: BufReader<ReadHalf<TcpStream>>,
    writer: WriteHalf<TcpStream>,
    codec: AmiCodec,
    timeout: Duration,
    banner: String,
    next_action_id: u64,
    closed: bool,
    /// The tail of an over-long line is still unread.
    skip_partial_line: bool,
}

impl AmiClient {
    /// Connect with the default timeout.
    pub async fn connect(host: &str, port: u16) -> Result<Self> {
        Self::connect_with_timeout(host, port, Duration::from_secs(DEFAULT_TIMEOUT_SECS)).await
    }

    /// Connect and read the banner, both bounded by `timeout`.
    ///
    /// The same timeout then applies to every exchange.
    pub async fn connect_with_timeout(host: &str, port: u16, timeout: Duration) -> Result<Self> {
        let stream = tokio::time::timeout(timeout, TcpStream::connect((host, port)))
            .await
            .map_err(|_| AmiError::Timeout(format!("connecting to {}:{}", host, port)))??;
        let _ = stream.set_nodelay(true);

        let (read_half, write_half) = tokio::io::split(stream);
        let mut client = Self {
            reader: BufReader::new(read_half),
            writer: write_half,
            codec: AmiCodec::new(),
            timeout,
            banner: String::new(),
            next_action_id: 1,
            closed: false,
            skip_partial_line: false,
        };

        let banner = tokio::time::timeout(timeout, client.read_line())
            .await
            .map_err(|_| AmiError::Timeout("waiting for manager banner".to_string()))??;
        let banner = banner.trim().to_string();
        if !banner.starts_with(BANNER_PREFIX) {
            return Err(AmiError::InvalidBanner(banner));
        }

        tracing::debug!(host, port, banner = %banner, "Connected to manager");
        client.banner = banner;
        Ok(client)
    }

    /// The full greeting line, e.g. `Asterisk Call Manager/5.0.1`.
    pub fn banner(&self) -> &str {
        &self.banner
    }

    /// Protocol version advertised in the banner.
    pub fn version(&self) -> &str {
        self.banner.trim_start_matches(BANNER_PREFIX)
    }

    /// Set the timeout for subsequent exchanges.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    /// False once the server closed the link or an exchange failed.
    pub fn is_connected(&self) -> bool {
        !self.closed
    }

    /// Authenticate. The caller inspects the returned response; a rejected
    /// login comes back as `Response: Error`, not as an `Err`.
    pub async fn login(&mut self, username: &str, secret: &str) -> Result<Message> {
        self.send_action(Action::login(username, secret)).await
    }

    /// Send one action and wait for its response.
    ///
    /// A connection error or timeout leaves the stream position unknown,
    /// so the client is marked closed. Encoding and framing errors fail
    /// only this exchange.
    pub async fn send_action(&mut self, action: Action) -> Result<Message> {
        if self.closed {
            return Err(AmiError::ConnectionClosed(
                "client is not connected".to_string(),
            ));
        }

        let result = tokio::time::timeout(self.timeout, self.send_internal(&action))
            .await
            .map_err(|_| AmiError::Timeout(format!("waiting for {} response", action.name())))
            .and_then(|r| r);

        if let Err(e) = &result {
            tracing::debug!(action = action.name(), error = %e, "Manager exchange failed");
            if e.is_connection_error() {
                self.closed = true;
            }
        }
        result
    }

    /// Internal send implementation without timeout.
    async fn send_internal(&mut self, action: &Action) -> Result<Message> {
        let action_id = format!("{}-{}", ACTION_ID_PREFIX, self.next_action_id);
        self.next_action_id += 1;

        let encoded = AmiCodec::encode(action, Some(&action_id))?;
        self.writer.write_all(encoded.as_bytes()).await?;
        self.writer.flush().await?;

        loop {
            let message = self.read_message().await?;
            if message.action_id() == Some(action_id.as_str()) {
                return Ok(message);
            }
            if message.is_event() {
                tracing::trace!(event = message.get_header_or("Event", ""), "Skipping event");
            } else {
                tracing::trace!(action_id = ?message.action_id(), "Skipping uncorrelated message");
            }
        }
    }

    /// Peer details for a SIP extension.
    pub async fn sipshowpeer(&mut self, peer: &str) -> Result<Message> {
        self.send_action(Action::sip_show_peer(peer)).await
    }

    /// Voicemail status for a mailbox.
    pub async fn mailbox_status(&mut self, mailbox: &str) -> Result<Message> {
        self.send_action(Action::mailbox_status(mailbox)).await
    }

    /// Returns `true` if the manager answered the ping successfully.
    pub async fn ping(&mut self) -> Result<bool> {
        let response = self.send_action(Action::ping()).await?;
        Ok(!response.is_error())
    }

    /// End the session politely and close the socket.
    pub async fn logoff(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        let result = self.send_action(Action::logoff()).await;
        self.closed = true;
        let _ = self.writer.shutdown().await;
        result.map(|_| ())
    }

    async fn read_message(&mut self) -> Result<Message> {
        loop {
            let line = self.read_line().await?;
            if let Some(message) = self.codec.decode_line(&line)? {
                return Ok(message);
            }
        }
    }

    /// Reads one line, buffering at most `MAX_LINE_LENGTH + 1` bytes.
    ///
    /// An over-long line fails with `LineTooLong` and drops the message
    /// being decoded; its unread tail is skipped on the next call.
    async fn read_line(&mut self) -> Result<String> {
        if self.skip_partial_line {
            self.discard_line().await?;
            self.skip_partial_line = false;
        }

        let mut line = Vec::new();
        let bytes_read = (&mut self.reader)
            .take(MAX_LINE_LENGTH as u64 + 1)
            .read_until(b'\n', &mut line)
            .await?;
        if bytes_read == 0 {
            self.closed = true;
            return Err(AmiError::ConnectionClosed(
                "manager closed connection".to_string(),
            ));
        }
        if line.len() > MAX_LINE_LENGTH {
            self.skip_partial_line = !line.ends_with(b"\n");
            self.codec = AmiCodec::new();
            return Err(AmiError::LineTooLong {
                size: line.len(),
                max: MAX_LINE_LENGTH,
            });
        }
        Ok(String::from_utf8_lossy(&line).into_owned())
    }

    /// Consumes input up to and including the next newline without
    /// keeping it.
    async fn discard_line(&mut self) -> Result<()> {
        loop {
            let (newline, available) = {
                let buf = self.reader.fill_buf().await?;
                (buf.iter().position(|&b| b == b'\n'), buf.len())
            };
            if available == 0 {
                self.closed = true;
                return Err(AmiError::ConnectionClosed(
                    "manager closed connection".to_string(),
                ));
            }
            match newline {
                Some(pos) => {
                    self.reader.consume(pos + 1);
                    return Ok(());
                }
                None => self.reader.consume(available),
            }
        }
    }
}
