//! [`TelemetryChannel`] – drain-latest UDP ingress.
//!
//! The vehicle streams JSON telemetry at ~50 Hz.  The decision engine only
//! ever cares about the freshest reading, so every poll drains the socket
//! completely and keeps the last packet that parsed.  Older packets that
//! arrived in the same poll are never observed downstream.
//!
//! The socket is a plain non-blocking [`std::net::UdpSocket`]: a poll is a
//! handful of `recvfrom` syscalls and never waits on the async reactor, so
//! it behaves identically inside a Tokio task and in a synchronous test.
//!
//! # Example
//!
//! ```rust,no_run
//! use neurodrive_middleware::TelemetryChannel;
//!
//! let mut channel = TelemetryChannel::bind("127.0.0.1:5005").unwrap();
//! if let Some(sample) = channel.poll() {
//!     println!("speed = {}", sample.speed);
//! }
//! ```

use std::io::ErrorKind;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};

use neurodrive_types::{NeuroError, TelemetrySample};
use tracing::{debug, warn};

/// Maximum datagram size accepted from the vehicle.
pub const MAX_DATAGRAM_BYTES: usize = 1024;

/// Non-blocking telemetry ingress bound to a fixed local port.
pub struct TelemetryChannel {
    socket: UdpSocket,
    buf: [u8; MAX_DATAGRAM_BYTES],
}

impl TelemetryChannel {
    /// Bind the ingress socket and switch it to non-blocking mode.
    ///
    /// # Errors
    ///
    /// Returns [`NeuroError::Io`] if the address cannot be bound.
    pub fn bind(addr: impl ToSocketAddrs) -> Result<Self, NeuroError> {
        let socket = UdpSocket::bind(addr).map_err(|e| NeuroError::Io(e.to_string()))?;
        socket
            .set_nonblocking(true)
            .map_err(|e| NeuroError::Io(e.to_string()))?;
        Ok(Self {
            socket,
            buf: [0u8; MAX_DATAGRAM_BYTES],
        })
    }

    /// Address the socket is bound to (useful when binding port `0`).
    pub fn local_addr(&self) -> Result<SocketAddr, NeuroError> {
        self.socket
            .local_addr()
            .map_err(|e| NeuroError::Io(e.to_string()))
    }

    /// Drain every queued datagram and return the last one that parsed.
    ///
    /// # Errors
    ///
    /// - [`NeuroError::NoData`] – nothing was queued.
    /// - [`NeuroError::Parse`] – packets were queued but none of them parsed
    ///   (the error of the last malformed packet is returned).
    /// - [`NeuroError::Io`] – the socket failed before any packet parsed.
    pub fn try_poll(&mut self) -> Result<TelemetrySample, NeuroError> {
        let mut latest: Option<TelemetrySample> = None;
        let mut last_err: Option<NeuroError> = None;

        loop {
            match self.socket.recv_from(&mut self.buf) {
                Ok((len, _peer)) => match TelemetrySample::from_json(&self.buf[..len]) {
                    Ok(sample) => latest = Some(sample),
                    Err(e) => {
                        debug!(error = %e, "dropping malformed telemetry packet");
                        last_err = Some(e);
                    }
                },
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    last_err = Some(NeuroError::Io(e.to_string()));
                    break;
                }
            }
        }

        match (latest, last_err) {
            (Some(sample), _) => Ok(sample),
            (None, Some(err)) => Err(err),
            (None, None) => Err(NeuroError::NoData),
        }
    }

    /// Best-effort variant of [`try_poll`][Self::try_poll].
    ///
    /// Returns `None` when nothing usable arrived; malformed packets and
    /// socket errors are logged, never surfaced as samples.
    pub fn poll(&mut self) -> Option<TelemetrySample> {
        match self.try_poll() {
            Ok(sample) => Some(sample),
            Err(NeuroError::NoData) => None,
            Err(NeuroError::Parse(_)) => None,
            Err(e) => {
                warn!(error = %e, "telemetry ingress error");
                None
            }
        }
    }
}
