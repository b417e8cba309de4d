//! `neurodrive-middleware` – The Nervous System
//!
//! Moves bytes between the vehicle and the decision engine without caring
//! about their meaning.
//!
//! # Modules
//!
//! - [`telemetry`] – [`TelemetryChannel`]: non-blocking UDP ingress with
//!   drain-latest semantics.
//! - [`command`] – [`CommandSink`] trait and the fire-and-forget UDP
//!   [`CommandChannel`], plus an in-memory [`MemorySink`] for headless tests.
//! - [`video`] – [`VideoReceiver`]: length-prefixed TCP frame reader.
//! - [`bus`] – topic-based publish/subscribe event bus built on Tokio
//!   broadcast channels.

pub mod bus;
pub mod command;
pub mod telemetry;
pub mod video;

pub use bus::{EventBus, Topic, TopicReceiver};
pub use command::{CommandChannel, CommandSink, MemorySink};
pub use telemetry::TelemetryChannel;
pub use video::{VideoFrame, VideoReceiver};
