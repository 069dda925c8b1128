//! Manager session module.
//!
//! This module owns the single link to the telephony server's manager
//! interface: the transport seam, the connect/login lifecycle, and a
//! scripted mock transport for tests.

pub mod manager;
pub mod mock;
pub mod transport;

pub use manager::{ManagerEndpoint, SessionError, SessionManager};
pub use mock::{MockReply, MockTransport};
pub use transport::{AmiTransport, ManagerTransport};
