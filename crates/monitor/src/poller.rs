//! Poll scheduler.
//!
//! [`PollScheduler::tick`] runs one poll cycle: the connection first, then
//! every extension and mailbox, each in its own failure boundary. The
//! scheduler does not own a timer; see [`crate::runner`] for that.

use std::sync::Arc;

use ami::Action;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, error, warn};

use crate::registry::{Status, Target, TargetRegistry};
use crate::session::{ManagerTransport, SessionError, SessionManager};

/// Capacity of the event broadcast channel.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Why a single target's poll failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PollError {
    /// The session could not carry the request.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// The manager answered `Response: Error`.
    #[error("manager reported an error: {0}")]
    Protocol(String),
}

/// How serious a diagnostic is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Expected to recover by itself, e.g. a failed reconnect.
    Warning,
    /// Needs an operator, e.g. a misconfigured mailbox.
    Error,
}

/// A failure worth reporting beyond the target's status going unknown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub tick: u64,
    pub target: Target,
    pub severity: Severity,
    pub message: String,
}

/// Summary of one poll cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    /// Sequence number, starting at 1.
    pub tick: u64,
    /// Targets visited, always every registered target.
    pub polled: usize,
    /// Targets whose poll step failed.
    pub failed: usize,
    /// Session state at the start of the cycle.
    pub connected: bool,
}

/// Events emitted by the scheduler.
#[derive(Debug, Clone)]
pub enum PollEvent {
    /// A target's status value differs from the previous one.
    StatusChanged { target: Target, status: Status },
    /// Diagnostic channel.
    Diagnostic(Diagnostic),
    /// A cycle finished.
    TickCompleted(TickReport),
}

/// Drives per-tick polling of every registered target.
pub struct PollScheduler<T> {
    session: SessionManager<T>,
    registry: Arc<TargetRegistry>,
    event_tx: broadcast::Sender<PollEvent>,
    ticks: u64,
}

impl<T: ManagerTransport> PollScheduler<T> {
    pub fn new(session: SessionManager<T>, registry: Arc<TargetRegistry>) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            session,
            registry,
            event_tx,
            ticks: 0,
        }
    }

    /// Returns a receiver for scheduler events.
    pub fn subscribe(&self) -> broadcast::Receiver<PollEvent> {
        self.event_tx.subscribe()
    }

    pub fn registry(&self) -> &Arc<TargetRegistry> {
        &self.registry
    }

    pub fn session(&self) -> &SessionManager<T> {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut SessionManager<T> {
        &mut self.session
    }

    /// Number of completed ticks.
    pub fn tick_count(&self) -> u64 {
        self.ticks
    }

    /// Runs one poll cycle over every registered target.
    ///
    /// A failure polling one target is contained to that target: it goes
    /// `unknown` and the cycle moves on to the next one.
    pub async fn tick(&mut self) -> TickReport {
        let tick = self.ticks + 1;
        let registry = Arc::clone(&self.registry);
        let connected = self.session.connected();
        let mut failed = 0;

        for target in registry.all_targets() {
            let status = match self.poll_target(tick, target).await {
                Ok(status) => status,
                Err(e) => {
                    failed += 1;
                    self.report_failure(tick, target, &e);
                    Status::Unknown
                }
            };
            self.record(target, status);
        }

        self.ticks = tick;
        let report = TickReport {
            tick,
            polled: registry.len(),
            failed,
            connected,
        };
        debug!(
            tick,
            polled = report.polled,
            failed,
            connected,
            "Poll cycle complete"
        );
        let _ = self.event_tx.send(PollEvent::TickCompleted(report));
        report
    }

    async fn poll_target(&mut self, tick: u64, target: &Target) -> Result<Status, PollError> {
        match target {
            Target::Connection => Ok(self.poll_connection(tick).await),
            Target::Extension(id) => self.poll_extension(id).await,
            Target::Mailbox(name) => self.poll_mailbox(name).await,
        }
    }

    /// The status is the state before any reconnect attempt, so a
    /// successful reconnect shows up on the next tick.
    async fn poll_connection(&mut self, tick: u64) -> Status {
        if self.session.connected() {
            return Status::Connected;
        }

        if let Err(e) = self.session.ensure_connected().await {
            warn!(error = %e, "Error connecting to manager");
            self.emit_diagnostic(tick, Target::Connection, Severity::Warning, e.to_string());
        }
        Status::Disconnected
    }

    async fn poll_extension(&mut self, id: &str) -> Result<Status, PollError> {
        if !self.session.connected() {
            return Ok(Status::Unknown);
        }

        let response = self.session.execute(Action::sip_show_peer(id)).await?;
        // A reply without a Response header is not trusted either.
        if response.response().is_none() || response.is_error() {
            debug!(
                extension = id,
                message = response.message().unwrap_or_default(),
                "Peer lookup failed"
            );
            return Ok(Status::Unknown);
        }

        // Reported verbatim, latency suffix included ("OK (5 ms)").
        Ok(Status::from_header(response.get_header("Status")))
    }

    async fn poll_mailbox(&mut self, name: &str) -> Result<Status, PollError> {
        if !self.session.connected() {
            return Ok(Status::Unknown);
        }

        let response = self.session.execute(Action::mailbox_status(name)).await?;
        if response.is_error() {
            return Err(PollError::Protocol(
                response
                    .message()
                    .unwrap_or("mailbox status failed")
                    .to_string(),
            ));
        }

        Ok(match response.get_header("Waiting") {
            Some(waiting) if waiting.trim().parse::<u64>().is_ok() => {
                Status::Value(waiting.trim().to_string())
            }
            Some(other) => {
                warn!(mailbox = name, waiting = other, "Unexpected Waiting value");
                Status::Unknown
            }
            None => Status::Unknown,
        })
    }

    fn report_failure(&self, tick: u64, target: &Target, failure: &PollError) {
        match (target, failure) {
            (Target::Mailbox(_), PollError::Protocol(message)) => {
                error!(target_name = %target, tick, "{}", message);
                self.emit_diagnostic(tick, target.clone(), Severity::Error, message.clone());
            }
            _ => {
                warn!(target_name = %target, tick, error = %failure, "Poll failed");
                self.emit_diagnostic(tick, target.clone(), Severity::Warning, failure.to_string());
            }
        }
    }

    /// Panics if `target` is not registered; the scheduler only visits
    /// registered targets.
    fn record(&self, target: &Target, status: Status) {
        let previous = self
            .registry
            .status_of(target)
            .unwrap_or_else(|e| panic!("registry invariant broken: {}", e))
            .status;
        self.registry
            .set_status(target, status.clone())
            .unwrap_or_else(|e| panic!("registry invariant broken: {}", e));

        if previous != status {
            debug!(target_name = %target, from = %previous, to = %status, "Status changed");
            let _ = self.event_tx.send(PollEvent::StatusChanged {
                target: target.clone(),
                status,
            });
        }
    }

    fn emit_diagnostic(&self, tick: u64, target: Target, severity: Severity, message: String) {
        let _ = self.event_tx.send(PollEvent::Diagnostic(Diagnostic {
            tick,
            target,
            severity,
            message,
        }));
    }
}
