//! Periodic start-stream refresh
//!
//! The robot stops streaming on its own unless the start-stream request keeps
//! coming, so once connected the relay re-issues it on a fixed period.

use crate::command::{Command, CommandChannel};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Owned keep-alive timer; dropping it without `stop` leaves it running
pub struct KeepAlive {
    cancel: CancellationToken,
    task: JoinHandle<u64>,
}

impl KeepAlive {
    /// First refresh fires one `period` after the call
    pub fn start(commands: CommandChannel, period: Duration, parent: &CancellationToken) -> Self {
        let cancel = parent.child_token();
        let token = cancel.clone();
        info!("Starting video keep-alive every {:?}", period);

        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut sent = 0u64;
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = interval.tick() => {
                        match commands.issue(Command::StartVideo) {
                            Ok(()) => sent += 1,
                            Err(e) => debug!("Keep-alive not delivered: {}", e),
                        }
                    }
                }
            }
            sent
        });

        Self { cancel, task }
    }

    /// Stops the timer, returns how many refreshes were delivered
    pub async fn stop(self) -> u64 {
        self.cancel.cancel();
        let sent = self.task.await.unwrap_or(0);
        debug!("Keep-alive stopped after {} refreshes", sent);
        sent
    }
}
