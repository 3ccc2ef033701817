//! Command vocabulary for the robot command channel
//!
//! Everything the bridge asks of the robot travels as a [`Command`] through a
//! bounded channel. The control path and the video relay share one
//! [`CommandChannel`]; the robot driver on the other end owns the wire protocol.
//!
//! ```text
//! ButtonCommandRouter ─┐
//! ControlLoop ─────────┼─► CommandChannel ─[mpsc]─► robot driver
//! VideoRelay ──────────┘
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

/// Logical movement axis driven by the sticks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MoveAxis {
    /// Forward (positive) / backward (negative)
    Pitch,
    /// Right (positive) / left (negative)
    Roll,
    /// Up (positive) / down (negative)
    Throttle,
    /// Clockwise (positive) / counter-clockwise (negative)
    Yaw,
}

/// Encoder bitrate setting for the robot camera
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum VideoBitRate {
    #[default]
    Auto,
    Mbps1,
    Mbps1_5,
    Mbps2,
    Mbps3,
    Mbps4,
}

impl VideoBitRate {
    /// Numeric argument understood by the robot driver
    pub fn code(self) -> u8 {
        match self {
            VideoBitRate::Auto => 0,
            VideoBitRate::Mbps1 => 1,
            VideoBitRate::Mbps1_5 => 2,
            VideoBitRate::Mbps2 => 3,
            VideoBitRate::Mbps3 => 4,
            VideoBitRate::Mbps4 => 5,
        }
    }
}

/// A single request for the robot
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    TakeOff,
    Land,
    FrontFlip,
    BackFlip,
    LeftFlip,
    RightFlip,
    ThrowTakeOff,
    Bounce,
    SetFastMode,
    SetSlowMode,
    /// Continuous movement, `magnitude` in [-100, 100]; 0 is an explicit hold
    Move { axis: MoveAxis, magnitude: f64 },
    StartVideo,
    SetVideoEncoderRate(VideoBitRate),
    SetExposure(i8),
}

/// Verbs accepted by the robot command channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    TakeOff,
    Land,
    FrontFlip,
    BackFlip,
    LeftFlip,
    RightFlip,
    ThrowTakeOff,
    Bounce,
    SetFastMode,
    SetSlowMode,
    Forward,
    Backward,
    Left,
    Right,
    Up,
    Down,
    Clockwise,
    CounterClockwise,
    StartVideo,
    SetVideoEncoderRate,
    SetExposure,
}

impl Command {
    /// Hold command for an axis with no active input
    pub fn neutral(axis: MoveAxis) -> Self {
        Command::Move {
            axis,
            magnitude: 0.0,
        }
    }

    pub fn is_neutral(&self) -> bool {
        matches!(self, Command::Move { magnitude, .. } if *magnitude == 0.0)
    }

    /// Channel verb this command resolves to
    ///
    /// A move picks its verb from the sign of the magnitude; zero resolves to
    /// the positive verb of the pair (`Forward(0)`, `Right(0)`, ...).
    pub fn verb(&self) -> Verb {
        match *self {
            Command::TakeOff => Verb::TakeOff,
            Command::Land => Verb::Land,
            Command::FrontFlip => Verb::FrontFlip,
            Command::BackFlip => Verb::BackFlip,
            Command::LeftFlip => Verb::LeftFlip,
            Command::RightFlip => Verb::RightFlip,
            Command::ThrowTakeOff => Verb::ThrowTakeOff,
            Command::Bounce => Verb::Bounce,
            Command::SetFastMode => Verb::SetFastMode,
            Command::SetSlowMode => Verb::SetSlowMode,
            Command::Move { axis, magnitude } => {
                let negative = magnitude < 0.0;
                match (axis, negative) {
                    (MoveAxis::Pitch, false) => Verb::Forward,
                    (MoveAxis::Pitch, true) => Verb::Backward,
                    (MoveAxis::Roll, false) => Verb::Right,
                    (MoveAxis::Roll, true) => Verb::Left,
                    (MoveAxis::Throttle, false) => Verb::Up,
                    (MoveAxis::Throttle, true) => Verb::Down,
                    (MoveAxis::Yaw, false) => Verb::Clockwise,
                    (MoveAxis::Yaw, true) => Verb::CounterClockwise,
                }
            }
            Command::StartVideo => Verb::StartVideo,
            Command::SetVideoEncoderRate(_) => Verb::SetVideoEncoderRate,
            Command::SetExposure(_) => Verb::SetExposure,
        }
    }

    /// Numeric argument of the verb, if it takes one
    pub fn argument(&self) -> Option<f64> {
        match *self {
            Command::Move { magnitude, .. } => Some(magnitude.abs()),
            Command::SetVideoEncoderRate(rate) => Some(f64::from(rate.code())),
            Command::SetExposure(level) => Some(f64::from(level)),
            _ => None,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.argument() {
            Some(arg) => write!(f, "{:?}({:.2})", self.verb(), arg),
            None => write!(f, "{:?}", self.verb()),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("Command channel full, dropped {0}")]
    Full(Command),

    #[error("Command channel closed, dropped {0}")]
    Closed(Command),
}

/// Non-blocking sending side of the robot command stream
///
/// Cheap to clone; every producer gets its own copy.
#[derive(Debug, Clone)]
pub struct CommandChannel {
    sender: mpsc::Sender<Command>,
}

impl CommandChannel {
    /// Creates a bounded command channel and returns both ends
    pub fn bounded(capacity: usize) -> (Self, mpsc::Receiver<Command>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        debug!("Created command channel with capacity {}", capacity.max(1));
        (Self { sender }, receiver)
    }

    /// Queues a command without waiting
    ///
    /// Never blocks the caller: a full channel drops the command.
    pub fn issue(&self, command: Command) -> Result<(), CommandError> {
        self.sender.try_send(command).map_err(|e| match e {
            mpsc::error::TrySendError::Full(c) => CommandError::Full(c),
            mpsc::error::TrySendError::Closed(c) => CommandError::Closed(c),
        })
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

/// Drains the command channel into the log until every sender is gone
///
/// Stands in for the robot driver in the binary.
pub async fn log_commands(mut receiver: mpsc::Receiver<Command>) -> u64 {
    info!("Command logger started");
    let mut count = 0u64;

    while let Some(command) = receiver.recv().await {
        count += 1;
        match command {
            Command::Move { .. } if command.is_neutral() => trace!("-> {}", command),
            Command::Move { .. } => debug!("-> {}", command),
            _ => info!("-> {}", command),
        }
    }

    warn!("Command channel closed after {} commands", count);
    count
}
