//! Line codec for the manager protocol.
//!
//! # Message Format
//!
//! Every message is a block of lines terminated by CRLF:
//! - `Key: Value` per header
//! - one empty line ends the message
//!
//! Lines without a colon (legacy command output) are kept under the
//! `Output` key so nothing the server sends is dropped.

use crate::error::{AmiError, Result};
use crate::message::{Action, Message, ACTION_HEADER, ACTION_ID_HEADER};

/// Line terminator used on the wire.
pub const LINE_TERMINATOR: &str = "\r\n";

/// Maximum accepted length of a single line in bytes.
pub const MAX_LINE_LENGTH: usize = 8192;

/// Maximum number of headers accepted in one message.
pub const MAX_HEADERS: usize = 1024;

/// Key used for lines that carry no `Key:` prefix.
pub const OUTPUT_KEY: &str = "Output";

/// Encoder and incremental decoder for manager messages.
#[derive(Debug, Default)]
pub struct AmiCodec {
    /// Message being assembled from lines received so far.
    pending: Message,
}

impl AmiCodec {
    /// Create a codec with no partial message.
    pub fn new() -> Self {
        Self::default()
    }

    /// Encode an action, inserting `ActionID` right after `Action` when given.
    ///
    /// Keys and values must not contain line breaks; they would split the
    /// header and let a value inject extra headers.
    pub fn encode(action: &Action, action_id: Option<&str>) -> Result<String> {
        let mut out = String::new();
        push_line(&mut out, ACTION_HEADER, action.name())?;
        if let Some(id) = action_id {
            push_line(&mut out, ACTION_ID_HEADER, id)?;
        }
        for (key, value) in action.headers() {
            if key.is_empty() || key.contains(':') {
                return Err(AmiError::Malformed(format!("invalid header key {:?}", key)));
            }
            push_line(&mut out, key, value)?;
        }
        out.push_str(LINE_TERMINATOR);
        Ok(out)
    }

    /// Feed one line (with or without its terminator).
    ///
    /// Returns the completed message when `line` is the blank line ending
    /// it. Blank lines between messages are ignored.
    pub fn decode_line(&mut self, line: &str) -> Result<Option<Message>> {
        if line.len() > MAX_LINE_LENGTH {
            return Err(AmiError::LineTooLong {
                size: line.len(),
                max: MAX_LINE_LENGTH,
            });
        }

        let line = line.trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() {
            if self.pending.is_empty() {
                return Ok(None);
            }
            return Ok(Some(std::mem::take(&mut self.pending)));
        }

        if self.pending.headers().len() >= MAX_HEADERS {
            self.pending = Message::default();
            return Err(AmiError::TooManyHeaders { max: MAX_HEADERS });
        }

        let (key, value) = split_header(line);
        self.pending.push(key, value);
        Ok(None)
    }

    /// True when a message has been started but not terminated.
    pub fn has_partial(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Parse one complete message block.
    ///
    /// A block missing its terminating blank line is accepted as long as
    /// it contains at least one header.
    pub fn parse(block: &str) -> Result<Message> {
        let mut codec = Self::new();
        for line in block.split('\n') {
            if let Some(message) = codec.decode_line(line)? {
                return Ok(message);
            }
        }
        if codec.has_partial() {
            return Ok(std::mem::take(&mut codec.pending));
        }
        Err(AmiError::Malformed("empty message".to_string()))
    }
}

fn push_line(out: &mut String, key: &str, value: &str) -> Result<()> {
    if value.contains(['\r', '\n']) {
        return Err(AmiError::Malformed(format!(
            "value of {} contains a line break",
            key
        )));
    }
    out.push_str(key);
    out.push_str(": ");
    out.push_str(value);
    out.push_str(LINE_TERMINATOR);
    Ok(())
}

fn split_header(line: &str) -> (String, String) {
    match line.split_once(':') {
        Some((key, value)) if !key.is_empty() && !key.contains(' ') => {
            (key.trim().to_string(), value.trim().to_string())
        }
        _ => (OUTPUT_KEY.to_string(), line.to_string()),
    }
}
