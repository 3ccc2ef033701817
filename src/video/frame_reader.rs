//! Fixed-size frame extraction from the decoder's output
//!
//! The decoder writes an unframed pixel stream; the reader cuts it into
//! `width * height * 3` byte frames. A short read (decoder still starting up,
//! pipe hiccup) throws away the partial buffer and tries again after a short
//! pause. A run of
//! failures long enough to mean the pipe is dead ends the reader instead of
//! spinning on it forever.

use crate::video::frame::{DecodedFrame, FrameGeometry};
use crate::video::sink::FrameSink;
use crate::video::VideoError;
use chrono::Local;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Clone, Debug)]
pub struct ReaderSettings {
    pub geometry: FrameGeometry,
    /// Consecutive failed reads before giving up; 0 retries forever
    pub max_consecutive_failures: u32,
    /// Pause after a failed read
    pub retry_delay: Duration,
}

impl Default for ReaderSettings {
    fn default() -> Self {
        Self {
            geometry: FrameGeometry::default(),
            max_consecutive_failures: 50,
            retry_delay: Duration::from_millis(10),
        }
    }
}

pub struct FrameReader<R> {
    output: R,
    settings: ReaderSettings,
    frames: u64,
    discarded: u64,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(output: R, settings: ReaderSettings) -> Self {
        Self {
            output,
            settings,
            frames: 0,
            discarded: 0,
        }
    }

    /// Frames handed to the sink so far
    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn discarded(&self) -> u64 {
        self.discarded
    }

    /// Reads frames into `sink` until cancelled or the pipe is given up on
    ///
    /// Returns the number of frames forwarded when cancelled.
    pub async fn run<S: FrameSink + ?Sized>(
        &mut self,
        sink: &mut S,
        cancel: CancellationToken,
    ) -> Result<u64, VideoError> {
        let geometry = self.settings.geometry;
        if !geometry.is_supported() {
            return Err(VideoError::UnsupportedGeometry {
                width: geometry.width,
                height: geometry.height,
            });
        }
        let frame_size = geometry.frame_size();
        let ceiling = self.settings.max_consecutive_failures;
        info!(
            "Frame reader started: {}x{} ({} bytes/frame) into {} sink",
            geometry.width,
            geometry.height,
            frame_size,
            sink.name()
        );

        let mut failures = 0u32;
        let mut last_stats_time = Local::now();
        let mut frames_at_last_stats = 0u64;
        let stats_interval = chrono::Duration::seconds(10);

        loop {
            let mut buf = vec![0u8; frame_size];
            let read = tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Frame reader cancelled after {} frames", self.frames);
                    return Ok(self.frames);
                }
                read = self.output.read_exact(&mut buf) => read,
            };

            if let Err(e) = read {
                failures += 1;
                let err = VideoError::TransientIo(e);
                warn!("Decoded frame read failed ({} in a row): {}", failures, err);
                if ceiling > 0 && failures >= ceiling {
                    return Err(VideoError::DecoderStalled { failures });
                }
                tokio::select! {
                    _ = cancel.cancelled() => {
                        info!("Frame reader cancelled after {} frames", self.frames);
                        return Ok(self.frames);
                    }
                    _ = tokio::time::sleep(self.settings.retry_delay) => {}
                }
                continue;
            }
            failures = 0;

            let Some(frame) = DecodedFrame::new(geometry, buf) else {
                self.discarded += 1;
                continue;
            };

            match sink.accept(frame) {
                Ok(()) => self.frames += 1,
                Err(e) => {
                    self.discarded += 1;
                    debug!("Sink rejected frame: {}", e);
                }
            }

            let now = Local::now();
            if now - last_stats_time > stats_interval {
                let secs = (now - last_stats_time).num_milliseconds() as f64 / 1000.0;
                info!(
                    "Frame reader: {:.1} fps, {} frames total, {} discarded",
                    (self.frames - frames_at_last_stats) as f64 / secs,
                    self.frames,
                    self.discarded
                );
                frames_at_last_stats = self.frames;
                last_stats_time = now;
            }
        }
    }
}
