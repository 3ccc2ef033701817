//! Video relay with statum state machine
//!
//! Keeps the robot's stream alive and pushes compressed packets into the
//! decoder, while a second task pulls decoded frames out the other side.
//!
//! # State Machine
//!
//! ```text
//! Disconnected ──(Connected)──► Connected ──(first frame)──► Streaming
//!                                  │  ▲                        │  ▲
//!                                  └──┘ (Connected again)      └──┘
//! ```
//!
//! # Architecture
//!
//! ```text
//! VideoEvent ──► [relay task] ──► decoder stdin
//!                     │
//!                [keep-alive] ──► CommandChannel
//!
//! decoder stdout ──► [frame reader task] ──► FrameSink
//! ```

use crate::command::{Command, CommandChannel, VideoBitRate};
use crate::video::decoder::DecodeProcess;
use crate::video::frame_reader::{FrameReader, ReaderSettings};
use crate::video::keep_alive::KeepAlive;
use crate::video::sink::FrameSink;
use crate::video::{VideoError, VideoEvent, VideoSettings};
use bytes::Bytes;
use statum::{machine, state};
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Clone, Debug)]
pub struct RelaySettings {
    pub keepalive_period: Duration,
    pub bitrate: VideoBitRate,
    /// Exposure sent on connect, skipped when `None`
    pub exposure: Option<i8>,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            keepalive_period: Duration::from_millis(100),
            bitrate: VideoBitRate::Auto,
            exposure: Some(0),
        }
    }
}

/// Counters reported when the relay stops
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RelayStats {
    pub forwarded: u64,
    pub write_failures: u64,
    pub dropped_before_connect: u64,
}

#[state]
#[derive(Debug, Clone)]
pub enum RelayState {
    Disconnected,
    Connected,
    Streaming,
}

#[machine]
pub struct VideoRelay<S: RelayState> {
    commands: CommandChannel,
    settings: RelaySettings,
    decoder_input: Box<dyn AsyncWrite + Send + Unpin>,
    keep_alive: Option<KeepAlive>,
    cancel: CancellationToken,
    stats: RelayStats,
}

impl<S: RelayState> VideoRelay<S> {
    pub fn stats(&self) -> &RelayStats {
        &self.stats
    }

    fn issue(&self, command: Command) {
        if let Err(e) = self.commands.issue(command) {
            warn!("Video command not delivered: {}", e);
        }
    }

    // Start-stream, bitrate, optional exposure, then a fresh keep-alive timer
    async fn start_session(&mut self) {
        self.issue(Command::StartVideo);
        self.issue(Command::SetVideoEncoderRate(self.settings.bitrate));
        if let Some(level) = self.settings.exposure {
            self.issue(Command::SetExposure(level));
        }

        if let Some(previous) = self.keep_alive.take() {
            debug!("Replacing keep-alive timer");
            previous.stop().await;
        }
        self.keep_alive = Some(KeepAlive::start(
            self.commands.clone(),
            self.settings.keepalive_period,
            &self.cancel,
        ));
    }

    // A failed write drops this packet only; a decoder that stops reading
    // must not hold up cancellation
    async fn write_packet(&mut self, packet: &Bytes) {
        let written = tokio::select! {
            _ = self.cancel.cancelled() => {
                debug!("Write of {} byte frame abandoned on shutdown", packet.len());
                return;
            }
            written = self.decoder_input.write_all(packet) => written,
        };
        match written {
            Ok(()) => self.stats.forwarded += 1,
            Err(e) => {
                self.stats.write_failures += 1;
                let err = VideoError::TransientIo(e);
                warn!(
                    "Dropped {} byte frame ({} write failures): {}",
                    packet.len(),
                    self.stats.write_failures,
                    err
                );
            }
        }
    }

    /// Stops the keep-alive and returns the final counters
    pub async fn finish(mut self) -> RelayStats {
        if let Some(keep_alive) = self.keep_alive.take() {
            keep_alive.stop().await;
        }
        if let Err(e) = self.decoder_input.shutdown().await {
            debug!("Decoder input already closed: {}", e);
        }
        info!(
            "Video relay stopped: {} frames forwarded, {} write failures",
            self.stats.forwarded, self.stats.write_failures
        );
        self.stats
    }
}

impl VideoRelay<Disconnected> {
    pub fn create(
        commands: CommandChannel,
        settings: RelaySettings,
        decoder_input: Box<dyn AsyncWrite + Send + Unpin>,
        cancel: CancellationToken,
    ) -> Self {
        info!("Initializing video relay with settings: {:?}", settings);
        Self::new(
            commands,
            settings,
            decoder_input,
            None, // keep_alive
            cancel,
            RelayStats::default(),
        )
    }

    pub fn drop_frame(&mut self, packet: &Bytes) {
        self.stats.dropped_before_connect += 1;
        debug!("Dropping {} byte frame, not connected yet", packet.len());
    }

    pub async fn connect(mut self) -> VideoRelay<Connected> {
        info!("Robot connected, starting video stream");
        self.start_session().await;
        self.transition()
    }
}

impl VideoRelay<Connected> {
    pub async fn reconnect(&mut self) {
        info!("Robot reconnected before first frame, restarting video stream");
        self.start_session().await;
    }

    pub async fn begin_streaming(mut self, first: Bytes) -> VideoRelay<Streaming> {
        info!("First video frame received ({} bytes)", first.len());
        self.write_packet(&first).await;
        self.transition()
    }
}

impl VideoRelay<Streaming> {
    pub async fn forward(&mut self, packet: Bytes) {
        self.write_packet(&packet).await;
    }

    pub async fn reconnect(&mut self) {
        info!("Robot reconnected, restarting video stream");
        self.start_session().await;
    }
}

async fn next_event(
    events: &mut mpsc::Receiver<VideoEvent>,
    cancel: &CancellationToken,
) -> Option<VideoEvent> {
    tokio::select! {
        _ = cancel.cancelled() => None,
        event = events.recv() => event,
    }
}

/// Drives the relay through its states until cancelled or the source ends
pub async fn run_relay(
    relay: VideoRelay<Disconnected>,
    mut events: mpsc::Receiver<VideoEvent>,
) -> RelayStats {
    let cancel = relay.cancel.clone();

    let mut relay = relay;
    let mut connected = loop {
        match next_event(&mut events, &cancel).await {
            Some(VideoEvent::Connected) => break relay.connect().await,
            Some(VideoEvent::Frame(packet)) => relay.drop_frame(&packet),
            None => return relay.finish().await,
        }
    };

    let mut streaming = loop {
        match next_event(&mut events, &cancel).await {
            Some(VideoEvent::Connected) => connected.reconnect().await,
            Some(VideoEvent::Frame(packet)) => break connected.begin_streaming(packet).await,
            None => return connected.finish().await,
        }
    };

    while let Some(event) = next_event(&mut events, &cancel).await {
        match event {
            VideoEvent::Connected => streaming.reconnect().await,
            VideoEvent::Frame(packet) => streaming.forward(packet).await,
        }
    }
    streaming.finish().await
}

/// Handle owning the decoder process and both relay tasks
pub struct VideoRelayHandle {
    cancel: CancellationToken,
    relay_task: JoinHandle<RelayStats>,
    reader_task: Option<JoinHandle<()>>,
    decoder: DecodeProcess,
}

impl VideoRelayHandle {
    /// Launches the decoder and starts relaying
    ///
    /// A decoder that cannot be started is returned as an error; nothing is
    /// spawned in that case.
    pub fn spawn(
        settings: VideoSettings,
        commands: CommandChannel,
        events: mpsc::Receiver<VideoEvent>,
        mut sink: Box<dyn FrameSink>,
        parent: &CancellationToken,
    ) -> Result<Self, VideoError> {
        let mut decoder = DecodeProcess::launch(&settings.decoder)?;
        let input = decoder
            .take_input()
            .ok_or_else(|| VideoError::MissingPipe(settings.decoder.program.clone()))?;

        let cancel = parent.child_token();

        let reader_task = if settings.decoder.read_frames {
            let output = decoder
                .take_output()
                .ok_or_else(|| VideoError::MissingPipe(settings.decoder.program.clone()))?;
            let reader_cancel = cancel.clone();
            let reader_settings: ReaderSettings = settings.reader.clone();
            Some(tokio::spawn(async move {
                let mut reader = FrameReader::new(output, reader_settings);
                match reader.run(sink.as_mut(), reader_cancel).await {
                    Ok(frames) => info!("Frame reader finished after {} frames", frames),
                    Err(e) => error!("Frame reader gave up: {}", e),
                }
            }))
        } else {
            info!("Decoder runs in record mode, no frame reader");
            None
        };

        let relay = VideoRelay::create(commands, settings.relay, Box::new(input), cancel.clone());
        let relay_task = tokio::spawn(run_relay(relay, events));

        Ok(Self {
            cancel,
            relay_task,
            reader_task,
            decoder,
        })
    }

    /// Stops both tasks and the decoder process
    pub async fn shutdown(self) -> RelayStats {
        self.cancel.cancel();

        let stats = match self.relay_task.await {
            Ok(stats) => stats,
            Err(e) => {
                error!("Video relay task panicked: {}", e);
                RelayStats::default()
            }
        };
        if let Some(reader) = self.reader_task {
            if let Err(e) = reader.await {
                error!("Frame reader task panicked: {}", e);
            }
        }
        self.decoder.shutdown().await;
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    fn relay_with(
        settings: RelaySettings,
        input: Box<dyn AsyncWrite + Send + Unpin>,
    ) -> (VideoRelay<Disconnected>, mpsc::Receiver<Command>) {
        let (commands, receiver) = CommandChannel::bounded(256);
        let relay = VideoRelay::create(commands, settings, input, CancellationToken::new());
        (relay, receiver)
    }

    #[tokio::test(start_paused = true)]
    async fn connect_issues_startup_commands() {
        let (client, _server) = tokio::io::duplex(1024);
        let (relay, mut commands) = relay_with(RelaySettings::default(), Box::new(client));

        let connected = relay.connect().await;
        assert_eq!(commands.try_recv().unwrap(), Command::StartVideo);
        assert_eq!(
            commands.try_recv().unwrap(),
            Command::SetVideoEncoderRate(VideoBitRate::Auto)
        );
        assert_eq!(commands.try_recv().unwrap(), Command::SetExposure(0));
        assert!(commands.try_recv().is_err());

        tokio::time::sleep(Duration::from_millis(350)).await;
        connected.finish().await;
        let refreshes = std::iter::from_fn(|| commands.try_recv().ok()).count();
        assert!((2..=4).contains(&refreshes), "{} refreshes", refreshes);
    }

    #[tokio::test]
    async fn exposure_is_optional() {
        let (client, _server) = tokio::io::duplex(1024);
        let settings = RelaySettings {
            exposure: None,
            ..RelaySettings::default()
        };
        let (relay, mut commands) = relay_with(settings, Box::new(client));

        relay.connect().await.finish().await;
        let sent: Vec<Command> = std::iter::from_fn(|| commands.try_recv().ok()).collect();
        assert!(!sent.iter().any(|c| matches!(c, Command::SetExposure(_))));
    }

    #[tokio::test]
    async fn frames_flow_into_decoder_after_connect() {
        let (client, mut server) = tokio::io::duplex(1024);
        let (relay, _commands) = relay_with(RelaySettings::default(), Box::new(client));
        let (events_tx, events_rx) = mpsc::channel(16);

        let task = tokio::spawn(run_relay(relay, events_rx));
        events_tx.send(VideoEvent::Frame(Bytes::from_static(b"early"))).await.unwrap();
        events_tx.send(VideoEvent::Connected).await.unwrap();
        events_tx.send(VideoEvent::Frame(Bytes::from_static(b"abc"))).await.unwrap();
        events_tx.send(VideoEvent::Frame(Bytes::from_static(b"def"))).await.unwrap();
        drop(events_tx);

        let stats = task.await.unwrap();
        assert_eq!(stats.forwarded, 2);
        assert_eq!(stats.dropped_before_connect, 1);

        let mut written = Vec::new();
        server.read_to_end(&mut written).await.unwrap();
        assert_eq!(written, b"abcdef");
    }

    #[tokio::test]
    async fn write_failures_do_not_stop_the_relay() {
        let (client, server) = tokio::io::duplex(64);
        drop(server);
        let (relay, _commands) = relay_with(RelaySettings::default(), Box::new(client));
        let (events_tx, events_rx) = mpsc::channel(16);

        let task = tokio::spawn(run_relay(relay, events_rx));
        events_tx.send(VideoEvent::Connected).await.unwrap();
        for _ in 0..3 {
            events_tx
                .send(VideoEvent::Frame(Bytes::from_static(b"pkt")))
                .await
                .unwrap();
        }
        drop(events_tx);

        let stats = task.await.unwrap();
        assert_eq!(stats.forwarded, 0);
        assert_eq!(stats.write_failures, 3);
    }

    #[tokio::test]
    async fn reconnect_restarts_the_session() {
        let (client, _server) = tokio::io::duplex(1024);
        let (relay, mut commands) = relay_with(RelaySettings::default(), Box::new(client));

        let mut streaming = relay
            .connect()
            .await
            .begin_streaming(Bytes::from_static(b"x"))
            .await;
        streaming.reconnect().await;
        streaming.finish().await;

        let starts = std::iter::from_fn(|| commands.try_recv().ok())
            .filter(|c| matches!(c, Command::SetVideoEncoderRate(_)))
            .count();
        assert_eq!(starts, 2);
    }

    #[tokio::test]
    async fn cancellation_interrupts_a_blocked_write() {
        let (client, _server) = tokio::io::duplex(16);
        let (commands, _rx) = CommandChannel::bounded(16);
        let cancel = CancellationToken::new();
        let relay = VideoRelay::create(
            commands,
            RelaySettings::default(),
            Box::new(client),
            cancel.clone(),
        );
        let (events_tx, events_rx) = mpsc::channel(4);

        let task = tokio::spawn(run_relay(relay, events_rx));
        events_tx.send(VideoEvent::Connected).await.unwrap();
        events_tx
            .send(VideoEvent::Frame(Bytes::from(vec![0u8; 4096])))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();

        let stats = tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("relay did not stop while its write was blocked")
            .unwrap();
        assert_eq!(stats.forwarded, 0);
    }

    #[tokio::test]
    async fn cancellation_ends_relay() {
        let (client, _server) = tokio::io::duplex(64);
        let (commands, _rx) = CommandChannel::bounded(16);
        let cancel = CancellationToken::new();
        let relay = VideoRelay::create(
            commands,
            RelaySettings::default(),
            Box::new(client),
            cancel.clone(),
        );
        let (_events_tx, events_rx) = mpsc::channel(4);

        let task = tokio::spawn(run_relay(relay, events_rx));
        cancel.cancel();
        assert_eq!(task.await.unwrap(), RelayStats::default());
    }

    #[tokio::test]
    async fn unknown_decoder_is_fatal_at_spawn() {
        let mut settings = VideoSettings::default();
        settings.decoder.program = "telebridge-no-such-decoder".to_string();
        let (commands, _rx) = CommandChannel::bounded(16);
        let (_events_tx, events_rx) = mpsc::channel(4);

        let result = VideoRelayHandle::spawn(
            settings,
            commands,
            events_rx,
            Box::new(crate::video::sink::DiscardSink::default()),
            &CancellationToken::new(),
        );
        assert!(matches!(result, Err(VideoError::ProcessStart { .. })));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn shutdown_kills_a_decoder_that_stopped_reading() {
        let mut settings = VideoSettings::default();
        settings.decoder = crate::video::decoder::DecoderSettings {
            program: "sleep".to_string(),
            args: vec!["30".to_string()],
            read_frames: false,
        };
        let (commands, _rx) = CommandChannel::bounded(256);
        let (events_tx, events_rx) = mpsc::channel(16);

        let handle = VideoRelayHandle::spawn(
            settings,
            commands,
            events_rx,
            Box::new(crate::video::sink::DiscardSink::default()),
            &CancellationToken::new(),
        )
        .unwrap();

        events_tx.send(VideoEvent::Connected).await.unwrap();
        events_tx
            .send(VideoEvent::Frame(Bytes::from(vec![0u8; 1 << 20])))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        let stats = tokio::time::timeout(Duration::from_secs(5), handle.shutdown())
            .await
            .expect("shutdown hung on a decoder that does not read stdin");
        assert_eq!(stats.forwarded, 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn handle_relays_through_a_real_child() {
        use crate::video::frame::FrameGeometry;
        use crate::video::sink::ChannelSink;

        let geometry = FrameGeometry::new(2, 2);
        let mut settings = VideoSettings::default();
        settings.decoder = crate::video::decoder::DecoderSettings {
            program: "cat".to_string(),
            args: Vec::new(),
            read_frames: true,
        };
        settings.reader.geometry = geometry;

        let (commands, _rx) = CommandChannel::bounded(256);
        let (events_tx, events_rx) = mpsc::channel(16);
        let (sink, mut frames) = ChannelSink::bounded(8);

        let handle = VideoRelayHandle::spawn(
            settings,
            commands,
            events_rx,
            Box::new(sink),
            &CancellationToken::new(),
        )
        .unwrap();

        events_tx.send(VideoEvent::Connected).await.unwrap();
        events_tx
            .send(VideoEvent::Frame(Bytes::from(vec![7u8; geometry.frame_size()])))
            .await
            .unwrap();

        let frame = tokio::time::timeout(Duration::from_secs(5), frames.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(frame.data().iter().all(|b| *b == 7));

        let stats = handle.shutdown().await;
        assert_eq!(stats.forwarded, 1);
    }
}
