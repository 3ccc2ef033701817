use clap::Parser;
use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use std::sync::Arc;
use telebridge::command::{log_commands, CommandChannel};
use telebridge::config::BridgeConfig;
use telebridge::controller::{
    wire_axes, AxisState, ButtonCommandRouter, CollectorHandle, InputEventBus,
};
use telebridge::mapping::ControlLoop;
use telebridge::video::{
    DiscardSink, FrameSink, RecordingSink, VideoRelayHandle, VideoSource,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// Gamepad to robot teleoperation bridge
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Run without a gamepad
    #[arg(long)]
    no_gamepad: bool,

    /// Run without the video relay
    #[arg(long)]
    no_video: bool,

    /// More output per occurrence (debug, trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    setup(args.verbose)?;

    let config = BridgeConfig::load(args.config.as_deref()).await?;
    let root = CancellationToken::new();

    // Robot side: every command ends up here
    let (commands, command_receiver) = CommandChannel::bounded(config.control.command_buffer);
    let command_log = tokio::spawn(log_commands(command_receiver));

    let axes = Arc::new(AxisState::new());
    let mut bus = InputEventBus::new();
    wire_axes(&mut bus, &axes);
    let routed = ButtonCommandRouter::register(&mut bus, &commands);
    info!("{} buttons routed to commands", routed);
    let (publisher, dispatcher) = bus.spawn(config.input.event_queue, root.child_token());

    let collector = if config.input.gamepad && !args.no_gamepad {
        Some(
            CollectorHandle::spawn(publisher.clone(), root.child_token())
                .map_err(|e| eyre!("Failed to spawn gamepad collector: {}", e))?,
        )
    } else {
        info!("Gamepad input disabled");
        None
    };

    let control = ControlLoop::spawn(
        axes.clone(),
        commands.clone(),
        config.control_settings(),
        root.child_token(),
    );

    let video = if config.video.enabled && !args.no_video {
        let sink: Box<dyn FrameSink> = match &config.video.recording_path {
            Some(path) => Box::new(RecordingSink::create(path)?),
            None => Box::new(DiscardSink::default()),
        };
        let (events_tx, events_rx) = mpsc::channel(256);
        let relay = VideoRelayHandle::spawn(
            config.video_settings(),
            commands.clone(),
            events_rx,
            sink,
            &root,
        )?;
        let source = VideoSource::bind(config.video.listen_addr).await?;
        let source_task = source.spawn(events_tx, root.child_token());
        Some((relay, source_task))
    } else {
        info!("Video relay disabled");
        None
    };

    info!("Bridge running, press Ctrl-C to stop");
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl-C: {}", e);
    }
    info!("Shutting down");
    root.cancel();

    if let Some((relay, source_task)) = video {
        if let Err(e) = source_task.await {
            warn!("Video source task failed: {}", e);
        }
        let stats = relay.shutdown().await;
        info!("Video relay: {:?}", stats);
    }

    let ticks = control.shutdown().await;
    info!("Control loop ran {} ticks", ticks);

    if let Some(collector) = collector {
        tokio::task::spawn_blocking(move || collector.shutdown()).await?;
    }
    drop(publisher);
    match dispatcher.await {
        Ok(delivered) => info!("Dispatched {} input events", delivered),
        Err(e) => warn!("Input dispatcher task failed: {}", e),
    }

    // Closing the last sender lets the logger drain and stop
    drop(commands);
    let logged = command_log.await?;
    info!("{} commands issued", logged);

    Ok(())
}

fn setup(verbosity: u8) -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    setup_logging_env(verbosity);
    Ok(())
}

fn setup_logging_env(verbosity: u8) {
    let level = match verbosity {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();
}
