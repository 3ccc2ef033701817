//! Destinations for decoded frames
//!
//! A sink takes one complete frame at a time. Failures are reported back to
//! the frame reader, which logs them and keeps reading.

use crate::video::frame::DecodedFrame;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("Sink I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Sink full, frame dropped")]
    Full,

    #[error("Sink closed")]
    Closed,
}

pub trait FrameSink: Send + 'static {
    fn accept(&mut self, frame: DecodedFrame) -> Result<(), SinkError>;

    fn name(&self) -> &str;
}

/// Appends raw frames to a file
pub struct RecordingSink {
    path: PathBuf,
    writer: BufWriter<File>,
    frames: u64,
    flush_every: u64,
}

impl RecordingSink {
    pub fn create(path: &Path) -> Result<Self, SinkError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        info!("Recording decoded frames to {}", path.display());
        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
            frames: 0,
            flush_every: 30,
        })
    }

    pub fn frames_written(&self) -> u64 {
        self.frames
    }
}

impl FrameSink for RecordingSink {
    fn accept(&mut self, frame: DecodedFrame) -> Result<(), SinkError> {
        self.writer.write_all(frame.data())?;
        self.frames += 1;
        if self.frames % self.flush_every == 0 {
            self.writer.flush()?;
            debug!("Flushed {} frames to {}", self.frames, self.path.display());
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "recording"
    }
}

impl Drop for RecordingSink {
    fn drop(&mut self) {
        if let Err(e) = self.writer.flush() {
            warn!("Failed to flush recording {}: {}", self.path.display(), e);
        }
    }
}

/// Hands frames to a consumer task, e.g. a display
pub struct ChannelSink {
    sender: mpsc::Sender<DecodedFrame>,
}

impl ChannelSink {
    pub fn bounded(capacity: usize) -> (Self, mpsc::Receiver<DecodedFrame>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, receiver)
    }
}

impl FrameSink for ChannelSink {
    fn accept(&mut self, frame: DecodedFrame) -> Result<(), SinkError> {
        self.sender.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SinkError::Full,
            mpsc::error::TrySendError::Closed(_) => SinkError::Closed,
        })
    }

    fn name(&self) -> &str {
        "channel"
    }
}

/// Counts frames and throws them away
#[derive(Debug, Default)]
pub struct DiscardSink {
    pub frames: u64,
}

impl FrameSink for DiscardSink {
    fn accept(&mut self, _frame: DecodedFrame) -> Result<(), SinkError> {
        self.frames += 1;
        Ok(())
    }

    fn name(&self) -> &str {
        "discard"
    }
}
