//! # AMI Client Library
//!
//! This crate speaks the Asterisk Manager Interface (AMI): the text
//! control protocol a telephony server exposes on TCP port 5038.
//!
//! ## Overview
//!
//! - **Messages**: [`Action`] requests and received [`Message`]s with
//!   case-insensitive header lookup
//! - **Codec**: CRLF `Key: Value` lines, one blank line per message
//! - **Client**: banner check, login, correlated request-response
//!   exchanges with per-exchange timeouts
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use ami::AmiClient;
//!
//! # async fn run() -> ami::Result<()> {
//! let mut client = AmiClient::connect("127.0.0.1", 5038).await?;
//! let login = client.login("admin", "secret").await?;
//! if login.is_error() {
//!     eprintln!("login rejected: {}", login.message().unwrap_or("no reason"));
//!     return Ok(());
//! }
//!
//! let peer = client.sipshowpeer("1001").await?;
//! println!("1001 is {}", peer.get_header_or("Status", "unknown"));
//! client.logoff().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`message`]: Action and message types
//! - [`codec`]: Line encoder/decoder
//! - [`client`]: TCP client
//! - [`error`]: Error types

pub mod client;
pub mod codec;
pub mod error;
pub mod message;

pub use client::{AmiClient, BANNER_PREFIX, DEFAULT_PORT, DEFAULT_TIMEOUT_SECS};
pub use codec::{AmiCodec, LINE_TERMINATOR, MAX_HEADERS, MAX_LINE_LENGTH};
pub use error::{AmiError, Result};
pub use message::{Action, Message};
