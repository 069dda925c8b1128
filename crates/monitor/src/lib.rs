//! # astmon
//!
//! Polls an Asterisk server over its manager interface and keeps the last
//! known status of a fixed set of targets:
//!
//! - **Connection**: whether the manager link is up
//! - **Extensions**: SIP peer status as reported by `SIPshowpeer`
//! - **Mailboxes**: waiting message count from `MailboxStatus`
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐  tick()  ┌───────────────┐  execute()  ┌────────────────┐
//! │  PollRunner  │ ───────▶ │ PollScheduler │ ──────────▶ │ SessionManager │──▶ AMI
//! └──────────────┘          └───────────────┘             └────────────────┘
//!                                   │ set_status()
//!                                   ▼
//!                           ┌───────────────┐  snapshot()  ┌──────────────┐
//!                           │TargetRegistry │ ◀─────────── │ StatusReader │
//!                           └───────────────┘              └──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use monitor::{AmiTransport, ManagerEndpoint, PollScheduler, SessionManager, TargetRegistry};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let registry = Arc::new(TargetRegistry::new(["1001"], ["1001@default"])?);
//!     let transport = AmiTransport::new(Duration::from_secs(5), Duration::from_secs(5));
//!     let session = SessionManager::new(
//!         transport,
//!         ManagerEndpoint::new("127.0.0.1", 5038, "admin", "secret"),
//!     );
//!
//!     let mut scheduler = PollScheduler::new(session, Arc::clone(&registry));
//!     scheduler.tick().await;
//!
//!     for status in registry.reader().snapshot() {
//!         println!("{}: {}", status.name, status.status);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`config`]: Configuration loading and defaults
//! - [`session`]: Manager link lifecycle and transports
//! - [`registry`]: Target set and status cache
//! - [`poller`]: One poll cycle over every target
//! - [`runner`]: Interval timer driving the poller

pub mod config;
pub mod poller;
pub mod registry;
pub mod runner;
pub mod session;

pub use config::{Config, ConfigError};
pub use poller::{Diagnostic, PollError, PollEvent, PollScheduler, Severity, TickReport};
pub use registry::{
    RegistryError, Status, StatusReader, StatusRecord, Target, TargetKind, TargetRegistry,
    TargetStatus,
};
pub use runner::PollRunner;
pub use session::{
    AmiTransport, ManagerEndpoint, ManagerTransport, MockReply, MockTransport, SessionError,
    SessionManager,
};
