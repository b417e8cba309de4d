//! Command egress.
//!
//! The decision engine never talks to a socket directly.  It hands every
//! [`Command`] to a [`CommandSink`]; the sink decides how the command leaves
//! the process.
//!
//! - [`CommandChannel`] – fire-and-forget JSON over UDP to the vehicle.
//! - [`MemorySink`] – records commands in memory so the full engine can run
//!   in headless tests without a vehicle.
//!
//! Commands are advisory and unacknowledged.  A failed send is reported to
//! the caller, who logs it and moves on; the next telemetry tick re-evaluates
//! and resends if the condition persists.

use std::net::SocketAddr;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use neurodrive_types::{Command, NeuroError};
use tokio::net::{ToSocketAddrs, UdpSocket};
use tracing::debug;

/// Anything that can deliver a [`Command`] to the vehicle.
#[async_trait]
pub trait CommandSink: Send + Sync {
    /// Deliver `command`.  No retries are attempted.
    ///
    /// # Errors
    ///
    /// Returns [`NeuroError::Send`] when the command could not be handed to
    /// the transport.
    async fn send(&self, command: Command) -> Result<(), NeuroError>;
}

// ────────────────────────────────────────────────────────────────────────────
// UDP
// ────────────────────────────────────────────────────────────────────────────

/// Fire-and-forget UDP command channel.
pub struct CommandChannel {
    socket: UdpSocket,
    target: SocketAddr,
}

impl CommandChannel {
    /// Bind an ephemeral local socket that sends to `target`.
    ///
    /// # Errors
    ///
    /// Returns [`NeuroError::Io`] if no local socket can be bound or `target`
    /// does not resolve.
    pub async fn connect(target: impl ToSocketAddrs) -> Result<Self, NeuroError> {
        let target = tokio::net::lookup_host(target)
            .await
            .map_err(|e| NeuroError::Io(e.to_string()))?
            .next()
            .ok_or_else(|| NeuroError::Io("command target did not resolve".to_string()))?;
        let local: SocketAddr = if target.is_ipv4() {
            SocketAddr::from(([0, 0, 0, 0], 0))
        } else {
            SocketAddr::from(([0u16; 8], 0))
        };
        let socket = UdpSocket::bind(local)
            .await
            .map_err(|e| NeuroError::Io(e.to_string()))?;
        Ok(Self { socket, target })
    }

    /// Destination of every command.
    pub fn target(&self) -> SocketAddr {
        self.target
    }
}

#[async_trait]
impl CommandSink for CommandChannel {
    async fn send(&self, command: Command) -> Result<(), NeuroError> {
        let payload = command.to_json()?;
        self.socket
            .send_to(payload.as_bytes(), self.target)
            .await
            .map_err(|e| NeuroError::Send(e.to_string()))?;
        debug!(kind = ?command.kind, value1 = command.value1, value2 = command.value2, "command sent");
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// In-memory sink
// ────────────────────────────────────────────────────────────────────────────

/// Sink that records every command instead of transmitting it.
#[derive(Default)]
pub struct MemorySink {
    sent: Mutex<Vec<Command>>,
    /// Sends still to fail before the sink starts recording.
    failures_left: AtomicU32,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink whose every send fails with [`NeuroError::Send`].  Useful for
    /// checking that egress failures never stall the engine.
    pub fn failing() -> Self {
        Self::failing_first(u32::MAX)
    }

    /// A sink whose first `n` sends fail, after which it records normally.
    pub fn failing_first(n: u32) -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            failures_left: AtomicU32::new(n),
        }
    }

    /// Snapshot of every command recorded so far, oldest first.
    pub fn commands(&self) -> Vec<Command> {
        self.sent.lock().map(|v| v.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl CommandSink for MemorySink {
    async fn send(&self, command: Command) -> Result<(), NeuroError> {
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                // u32::MAX means "fail forever".
                match n {
                    0 => None,
                    u32::MAX => Some(u32::MAX),
                    n => Some(n - 1),
                }
            })
            .is_ok();
        if failing {
            return Err(NeuroError::Send("memory sink configured to fail".to_string()));
        }
        self.sent
            .lock()
            .map_err(|_| NeuroError::Send("memory sink poisoned".to_string()))?
            .push(command);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use neurodrive_types::CommandKind;

    #[tokio::test]
    async fn udp_channel_delivers_json() {
        let vehicle = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = vehicle.local_addr().unwrap();

        let channel = CommandChannel::connect(addr).await.unwrap();
        assert_eq!(channel.target(), addr);
        channel.send(Command::heal()).await.unwrap();

        let mut buf = [0u8; 256];
        let (len, _) = vehicle.recv_from(&mut buf).await.unwrap();
        let back: Command = serde_json::from_slice(&buf[..len]).unwrap();
        assert_eq!(back, Command::heal());
    }

    #[tokio::test]
    async fn send_to_closed_port_does_not_block() {
        // Nothing listens on the target; UDP send still succeeds locally.
        let scratch = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = scratch.local_addr().unwrap();
        drop(scratch);

        let channel = CommandChannel::connect(addr).await.unwrap();
        let result = channel.send(Command::drive(0.5, 0.0)).await;
        assert!(result.is_ok() || matches!(result, Err(NeuroError::Send(_))));
    }

    #[tokio::test]
    async fn memory_sink_records_in_order() {
        let sink = MemorySink::new();
        sink.send(Command::heal()).await.unwrap();
        sink.send(Command::clear_faults()).await.unwrap();

        let sent = sink.commands();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].kind, CommandKind::Heal);
        assert_eq!(sent[1], Command::clear_faults());
    }

    #[tokio::test]
    async fn failing_sink_reports_send_error() {
        let sink = MemorySink::failing();
        assert!(matches!(
            sink.send(Command::heal()).await,
            Err(NeuroError::Send(_))
        ));
        assert!(sink.commands().is_empty());
    }

    #[tokio::test]
    async fn sink_recovers_after_initial_failures() {
        let sink = MemorySink::failing_first(2);
        assert!(sink.send(Command::heal()).await.is_err());
        assert!(sink.send(Command::heal()).await.is_err());
        sink.send(Command::heal()).await.unwrap();
        assert_eq!(sink.commands(), vec![Command::heal()]);
    }
}
