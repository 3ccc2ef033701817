//! Video relay module
//!
//! Compressed packets arrive from the robot as [`VideoEvent`]s. The relay
//! keeps the stream alive, feeds packets to an external decoder and hands the
//! decoded frames to a [`FrameSink`].

pub mod decoder;
pub mod frame;
pub mod frame_reader;
pub mod keep_alive;
pub mod relay;
pub mod sink;
pub mod source;

use bytes::Bytes;
use std::net::SocketAddr;

pub use decoder::{DecodeProcess, DecoderSettings};
pub use frame::{DecodedFrame, FrameGeometry, MAX_FRAME_BYTES};
pub use frame_reader::{FrameReader, ReaderSettings};
pub use relay::{RelaySettings, RelayStats, VideoRelayHandle};
pub use sink::{ChannelSink, DiscardSink, FrameSink, RecordingSink, SinkError};
pub use source::VideoSource;

/// Notification from the robot's video side
#[derive(Clone, Debug, PartialEq)]
pub enum VideoEvent {
    /// Robot reachable; (re)start the stream
    Connected,
    /// One compressed packet
    Frame(Bytes),
}

#[derive(Debug, thiserror::Error)]
pub enum VideoError {
    #[error("Failed to start decoder '{program}': {source}")]
    ProcessStart {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Decoder '{0}' has no pipe to talk to")]
    MissingPipe(String),

    #[error("Decoder pipe I/O error: {0}")]
    TransientIo(std::io::Error),

    #[error("Decoder output stalled after {failures} consecutive failed reads")]
    DecoderStalled { failures: u32 },

    #[error("Frame geometry {width}x{height} is empty or too large")]
    UnsupportedGeometry { width: usize, height: usize },

    #[error("Failed to bind video socket {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}

/// Everything the relay needs to run
#[derive(Clone, Debug, Default)]
pub struct VideoSettings {
    pub relay: RelaySettings,
    pub reader: ReaderSettings,
    pub decoder: DecoderSettings,
}
