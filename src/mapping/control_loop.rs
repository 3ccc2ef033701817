//! Fixed-rate stick sampling into movement commands
//!
//! Two tickers, one per stick, each at 100 Hz by default. They share nothing
//! but the [`AxisState`] they read and the [`CommandChannel`] they write, and
//! they drive disjoint axes, so they never coordinate.
//!
//! ```text
//! AxisState ──► [deadzone] ──► pitch::map ──► Move(axis, magnitude) ──► CommandChannel
//!   (right)      ±10 / ±10                     Pitch, Roll
//!   (left)       ±10 / ±20                     Throttle, Yaw
//! ```
//!
//! Every tick emits exactly one command per axis, an explicit zero when the
//! stick is inside its deadzone. A tick that overruns its slot makes the next
//! one skip rather than pile up.

use crate::command::{Command, CommandChannel, CommandError, MoveAxis};
use crate::controller::axis_state::{AxisState, Stick, StickPair};
use crate::mapping::pitch;
use chrono::Local;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Clone, Debug)]
pub struct ControlSettings {
    pub tick: Duration,
    pub full_scale_offset: f64,
    /// Pitch, roll and throttle
    pub translation_deadzone: i32,
    pub yaw_deadzone: i32,
}

impl Default for ControlSettings {
    fn default() -> Self {
        Self {
            tick: Duration::from_millis(10),
            full_scale_offset: 32767.0,
            translation_deadzone: 10,
            yaw_deadzone: 20,
        }
    }
}

impl ControlSettings {
    fn deadzone(&self, axis: MoveAxis) -> i32 {
        match axis {
            MoveAxis::Yaw => self.yaw_deadzone,
            _ => self.translation_deadzone,
        }
    }

    /// Motion strictly beyond the deadzone, explicit hold otherwise
    pub fn axis_command(&self, axis: MoveAxis, raw: i32) -> Command {
        let threshold = self.deadzone(axis);
        if raw > threshold || raw < -threshold {
            Command::Move {
                axis,
                magnitude: pitch::map(f64::from(raw), self.full_scale_offset),
            }
        } else {
            Command::neutral(axis)
        }
    }

    /// The two commands one tick emits for `stick`
    ///
    /// Right stick: y → pitch, x → roll. Left stick: y → throttle, x → yaw.
    pub fn stick_commands(&self, stick: Stick, pair: StickPair) -> [Command; 2] {
        match stick {
            Stick::Right => [
                self.axis_command(MoveAxis::Pitch, pair.y),
                self.axis_command(MoveAxis::Roll, pair.x),
            ],
            Stick::Left => [
                self.axis_command(MoveAxis::Throttle, pair.y),
                self.axis_command(MoveAxis::Yaw, pair.x),
            ],
        }
    }
}

/// One tick: snapshot, map, issue. Never waits.
///
/// Returns how many commands were dropped by a full or closed channel.
pub fn run_tick(
    stick: Stick,
    state: &AxisState,
    settings: &ControlSettings,
    commands: &CommandChannel,
) -> usize {
    let pair = state.stick(stick);
    let mut dropped = 0;
    for command in settings.stick_commands(stick, pair) {
        match commands.issue(command) {
            Ok(()) => {}
            Err(CommandError::Full(c)) => {
                debug!("{:?} stick tick dropped {}", stick, c);
                dropped += 1;
            }
            Err(CommandError::Closed(_)) => dropped += 1,
        }
    }
    dropped
}

pub struct ControlLoop;

impl ControlLoop {
    /// Starts one ticker per stick
    pub fn spawn(
        state: Arc<AxisState>,
        commands: CommandChannel,
        settings: ControlSettings,
        cancel: CancellationToken,
    ) -> ControlLoopHandle {
        info!(
            "Starting control loop: {:?} tick, deadzones ±{} / yaw ±{}",
            settings.tick, settings.translation_deadzone, settings.yaw_deadzone
        );

        let right = tokio::spawn(run_stick(
            Stick::Right,
            state.clone(),
            commands.clone(),
            settings.clone(),
            cancel.clone(),
        ));
        let left = tokio::spawn(run_stick(Stick::Left, state, commands, settings, cancel.clone()));

        ControlLoopHandle {
            cancel,
            tickers: vec![right, left],
        }
    }
}

async fn run_stick(
    stick: Stick,
    state: Arc<AxisState>,
    commands: CommandChannel,
    settings: ControlSettings,
    cancel: CancellationToken,
) -> u64 {
    let mut interval = tokio::time::interval(settings.tick);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut ticks = 0u64;
    let mut dropped = 0usize;
    let mut last_stats_time = Local::now();
    let stats_interval = chrono::Duration::seconds(30);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {}
        }

        if commands.is_closed() {
            warn!("Command channel closed, {:?} stick ticker stopping", stick);
            break;
        }

        dropped += run_tick(stick, &state, &settings, &commands);
        ticks += 1;

        let now = Local::now();
        if now - last_stats_time > stats_interval {
            info!(
                "{:?} stick ticker: {} ticks, {} commands dropped",
                stick, ticks, dropped
            );
            dropped = 0;
            last_stats_time = now;
        }
    }

    info!("{:?} stick ticker stopped after {} ticks", stick, ticks);
    ticks
}

/// Owned timers of the two stick tickers
pub struct ControlLoopHandle {
    cancel: CancellationToken,
    tickers: Vec<JoinHandle<u64>>,
}

impl ControlLoopHandle {
    /// Stops both tickers and waits for them, returns total ticks run
    pub async fn shutdown(self) -> u64 {
        self.cancel.cancel();
        let mut total = 0;
        for ticker in self.tickers {
            match ticker.await {
                Ok(ticks) => total += ticks,
                Err(e) => error!("Stick ticker panicked: {}", e),
            }
        }
        total
    }
}
