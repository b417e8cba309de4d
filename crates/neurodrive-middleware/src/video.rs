//! [`VideoReceiver`] – length-prefixed TCP video ingress.
//!
//! The vehicle opens a single TCP connection and writes one frame at a time:
//!
//! ```text
//! ┌──────────────────────┬───────────────────────────────┐
//! │ len: u32 (LE, 4 B)   │ encoded still image (len B)   │
//! └──────────────────────┴───────────────────────────────┘
//! ```
//!
//! Frames are carried as opaque bytes; decoding is left to whoever displays
//! them.  When the peer closes the connection (a zero-length read, possibly
//! in the middle of a frame) the receiver drops it and waits for the next
//! connection.

use std::net::SocketAddr;

use chrono::{DateTime, Utc};
use neurodrive_types::NeuroError;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Frames larger than this are treated as a corrupt length prefix.
pub const MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

/// One encoded still image received from the vehicle.
#[derive(Debug, Clone)]
pub struct VideoFrame {
    /// 1-based count of frames received since the receiver was created.
    pub sequence: u64,
    pub received_at: DateTime<Utc>,
    /// Encoded image bytes (JPEG/PNG; not inspected).
    pub data: Vec<u8>,
}

/// Read one length-prefixed frame from `reader`.
///
/// Returns `Ok(None)` when the stream closes before a full frame was read.
///
/// # Errors
///
/// Returns [`NeuroError::Video`] on I/O failure or when the declared length
/// exceeds [`MAX_FRAME_BYTES`].
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<Vec<u8>>, NeuroError>
where
    R: AsyncRead + Unpin,
{
    let mut prefix = [0u8; 4];
    match reader.read_exact(&mut prefix).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(NeuroError::Video(e.to_string())),
    }

    let len = u32::from_le_bytes(prefix) as usize;
    if len > MAX_FRAME_BYTES {
        return Err(NeuroError::Video(format!(
            "declared frame length {len} exceeds {MAX_FRAME_BYTES}"
        )));
    }

    // read_exact loops until the full declared length has arrived.
    let mut data = vec![0u8; len];
    match reader.read_exact(&mut data).await {
        Ok(_) => Ok(Some(data)),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(None),
        Err(e) => Err(NeuroError::Video(e.to_string())),
    }
}

/// Accepts one vehicle connection at a time and yields its frames.
pub struct VideoReceiver {
    listener: TcpListener,
    conn: Option<TcpStream>,
    frames: u64,
}

impl VideoReceiver {
    /// Bind the video listener.
    ///
    /// # Errors
    ///
    /// Returns [`NeuroError::Io`] if the address cannot be bound.
    pub async fn bind(addr: impl ToSocketAddrs) -> Result<Self, NeuroError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| NeuroError::Io(e.to_string()))?;
        Ok(Self {
            listener,
            conn: None,
            frames: 0,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, NeuroError> {
        self.listener
            .local_addr()
            .map_err(|e| NeuroError::Io(e.to_string()))
    }

    /// Total frames received so far.
    pub fn frames_received(&self) -> u64 {
        self.frames
    }

    /// Wait for the next complete frame, (re-)accepting connections as needed.
    ///
    /// Empty frames are skipped.  Broken connections are dropped and a new
    /// one is accepted.
    ///
    /// # Errors
    ///
    /// Returns [`NeuroError::Io`] only if `accept` itself fails.
    pub async fn next_frame(&mut self) -> Result<VideoFrame, NeuroError> {
        loop {
            if self.conn.is_none() {
                let (stream, peer) = self
                    .listener
                    .accept()
                    .await
                    .map_err(|e| NeuroError::Io(e.to_string()))?;
                info!(%peer, "video connection accepted");
                self.conn = Some(stream);
            }
            let Some(conn) = self.conn.as_mut() else {
                continue;
            };

            match read_frame(conn).await {
                Ok(Some(data)) if data.is_empty() => {
                    debug!("skipping empty video frame");
                }
                Ok(Some(data)) => {
                    self.frames += 1;
                    return Ok(VideoFrame {
                        sequence: self.frames,
                        received_at: Utc::now(),
                        data,
                    });
                }
                Ok(None) => {
                    info!("video connection closed; waiting for a new one");
                    self.conn = None;
                }
                Err(e) => {
                    warn!(error = %e, "dropping video connection");
                    self.conn = None;
                }
            }
        }
    }

    /// Publish every received frame on `latest` until the watch channel has
    /// no receivers left or `accept` fails.
    pub async fn run(mut self, latest: watch::Sender<Option<VideoFrame>>) {
        loop {
            match self.next_frame().await {
                Ok(frame) => {
                    if latest.send(Some(frame)).is_err() {
                        debug!("no video consumers left; stopping receiver");
                        return;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "video receiver stopped");
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    fn framed(payload: &[u8]) -> Vec<u8> {
        let mut out = (payload.len() as u32).to_le_bytes().to_vec();
        out.extend_from_slice(payload);
        out
    }

    #[tokio::test]
    async fn read_frame_from_buffer() {
        let bytes = framed(b"\xFF\xD8jpeg-bytes");
        let mut reader = bytes.as_slice();
        let frame = read_frame(&mut reader).await.unwrap().unwrap();
        assert_eq!(frame, b"\xFF\xD8jpeg-bytes");
        assert!(read_frame(&mut reader).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn truncated_frame_is_closure() {
        let mut bytes = framed(b"0123456789");
        bytes.truncate(8);
        let mut reader = bytes.as_slice();
        assert!(read_frame(&mut reader).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn oversized_prefix_is_rejected() {
        let bytes = u32::MAX.to_le_bytes();
        let mut reader = bytes.as_slice();
        assert!(matches!(
            read_frame(&mut reader).await,
            Err(NeuroError::Video(_))
        ));
    }

    #[tokio::test]
    async fn reassembles_frames_split_across_writes() {
        let mut receiver = VideoReceiver::bind("127.0.0.1:0").await.unwrap();
        let addr = receiver.local_addr().unwrap();

        let writer = tokio::spawn(async move {
            let mut stream = TcpStream::connect(addr).await.unwrap();
            let bytes = framed(b"split-frame-payload");
            for chunk in bytes.chunks(3) {
                stream.write_all(chunk).await.unwrap();
                stream.flush().await.unwrap();
                tokio::time::sleep(std::time::Duration::from_millis(2)).await;
            }
        });

        let frame = receiver.next_frame().await.unwrap();
        assert_eq!(frame.sequence, 1);
        assert_eq!(frame.data, b"split-frame-payload");
        writer.await.unwrap();
    }

    #[tokio::test]
    async fn reaccepts_after_disconnect() {
        let mut receiver = VideoReceiver::bind("127.0.0.1:0").await.unwrap();
        let addr = receiver.local_addr().unwrap();

        let writer = tokio::spawn(async move {
            let mut first = TcpStream::connect(addr).await.unwrap();
            first.write_all(&framed(b"one")).await.unwrap();
            drop(first);

            let mut second = TcpStream::connect(addr).await.unwrap();
            second.write_all(&framed(b"two")).await.unwrap();
            // Keep the connection open until the frame is read.
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        });

        assert_eq!(receiver.next_frame().await.unwrap().data, b"one");
        let second = receiver.next_frame().await.unwrap();
        assert_eq!(second.data, b"two");
        assert_eq!(receiver.frames_received(), 2);
        writer.await.unwrap();
    }
}
