//! External decode process
//!
//! The codec lives in a child process: compressed packets go in on stdin, raw
//! pixels come out on stdout. In record mode only stdin is piped and the
//! child writes wherever its own arguments tell it to.

use crate::video::frame::FrameGeometry;
use crate::video::VideoError;
use serde::{Deserialize, Serialize};
use std::process::Stdio;
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{debug, info, warn};

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct DecoderSettings {
    pub program: String,
    pub args: Vec<String>,
    /// Pipe stdout back for fixed-size frame reads
    pub read_frames: bool,
}

impl Default for DecoderSettings {
    fn default() -> Self {
        let args = [
            "-i", "pipe:0", "-pix_fmt", "bgr24", "-vcodec", "rawvideo", "-an", "-sn", "-s",
            "960x720", "-f", "rawvideo", "pipe:1",
        ];
        Self {
            program: "ffmpeg".to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
            read_frames: true,
        }
    }
}

impl DecoderSettings {
    /// Output size requested with `-s WxH`, if any
    pub fn output_size(&self) -> Option<FrameGeometry> {
        let value = self
            .args
            .iter()
            .position(|arg| arg == "-s")
            .and_then(|idx| self.args.get(idx + 1))?;
        let (width, height) = value.split_once('x')?;
        Some(FrameGeometry::new(width.parse().ok()?, height.parse().ok()?))
    }

    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Running decoder child with its pipes
pub struct DecodeProcess {
    child: Child,
    input: Option<ChildStdin>,
    output: Option<ChildStdout>,
}

impl DecodeProcess {
    /// Starts the child; failure here is fatal for the relay
    pub fn launch(settings: &DecoderSettings) -> Result<Self, VideoError> {
        info!("Launching decoder: {}", settings.command_line());

        let stdout = if settings.read_frames {
            Stdio::piped()
        } else {
            Stdio::null()
        };

        let mut child = Command::new(&settings.program)
            .args(&settings.args)
            .stdin(Stdio::piped())
            .stdout(stdout)
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| VideoError::ProcessStart {
                program: settings.program.clone(),
                source,
            })?;

        let input = child.stdin.take();
        let output = child.stdout.take();
        if input.is_none() || (settings.read_frames && output.is_none()) {
            return Err(VideoError::MissingPipe(settings.program.clone()));
        }

        debug!("Decoder started with pid {:?}", child.id());
        Ok(Self {
            child,
            input,
            output,
        })
    }

    pub fn take_input(&mut self) -> Option<ChildStdin> {
        self.input.take()
    }

    pub fn take_output(&mut self) -> Option<ChildStdout> {
        self.output.take()
    }

    /// Kills the child and reaps it
    pub async fn shutdown(mut self) {
        match self.child.try_wait() {
            Ok(Some(status)) => {
                info!("Decoder already exited: {}", status);
                return;
            }
            Ok(None) => {}
            Err(e) => warn!("Could not poll decoder status: {}", e),
        }

        if let Err(e) = self.child.kill().await {
            warn!("Failed to kill decoder: {}", e);
        } else {
            info!("Decoder stopped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_command_line_decodes_to_raw_bgr() {
        let settings = DecoderSettings::default();
        assert_eq!(
            settings.command_line(),
            "ffmpeg -i pipe:0 -pix_fmt bgr24 -vcodec rawvideo -an -sn -s 960x720 -f rawvideo pipe:1"
        );
        assert!(settings.read_frames);
        assert_eq!(settings.output_size(), Some(FrameGeometry::default()));
    }

    #[test]
    fn output_size_needs_a_well_formed_value() {
        let with = |args: &[&str]| DecoderSettings {
            args: args.iter().map(|a| a.to_string()).collect(),
            ..DecoderSettings::default()
        };
        assert_eq!(with(&["-s", "640x480"]).output_size(), Some(FrameGeometry::new(640, 480)));
        assert_eq!(with(&["-s"]).output_size(), None);
        assert_eq!(with(&["-s", "hd720"]).output_size(), None);
        assert_eq!(with(&["-f", "rawvideo"]).output_size(), None);
    }

    #[tokio::test]
    async fn missing_program_is_a_start_error() {
        let settings = DecoderSettings {
            program: "telebridge-no-such-decoder".to_string(),
            args: Vec::new(),
            read_frames: true,
        };
        let err = DecodeProcess::launch(&settings).err().unwrap();
        assert!(matches!(err, VideoError::ProcessStart { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn pipes_round_trip_through_child() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let settings = DecoderSettings {
            program: "cat".to_string(),
            args: Vec::new(),
            read_frames: true,
        };
        let mut process = DecodeProcess::launch(&settings).unwrap();
        let mut input = process.take_input().unwrap();
        let mut output = process.take_output().unwrap();

        input.write_all(b"packet").await.unwrap();
        input.flush().await.unwrap();
        let mut buf = [0u8; 6];
        output.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"packet");

        drop(input);
        process.shutdown().await;
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn record_mode_pipes_only_stdin() {
        let settings = DecoderSettings {
            program: "cat".to_string(),
            args: Vec::new(),
            read_frames: false,
        };
        let mut process = DecodeProcess::launch(&settings).unwrap();
        assert!(process.take_output().is_none());
        assert!(process.take_input().is_some());
        process.shutdown().await;
    }
}
