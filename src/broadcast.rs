//! Outbound position broadcasting.
//!
//! DESIGN
//! ======
//! Pointer moves overwrite a single-slot [`Mailbox`]; nothing queues. A
//! fixed-period tick compares the latest message with the last one sent and
//! flushes only on change, so the outbound rate is bounded by the tick period
//! no matter how fast the pointer moves.
//!
//! The tick runs as a `spawn_local` task owned by [`BroadcastLoop`]. The tick
//! callback returns [`ControlFlow::Break`] once the connection is gone, which
//! ends the task; restarting is the connection manager's job.

#[cfg(test)]
#[path = "broadcast_test.rs"]
mod broadcast_test;

use std::ops::ControlFlow;
use std::time::Duration;

use frames::PositionMessage;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Shortest tick period accepted; `tokio::time::interval` rejects zero.
pub const MIN_TICK_PERIOD: Duration = Duration::from_millis(1);

/// Latest-wins slot plus the last message actually sent.
#[derive(Debug, Clone, Default)]
pub struct Mailbox {
    latest: PositionMessage,
    last_sent: PositionMessage,
}

impl Mailbox {
    /// Overwrite the latest message.
    pub fn post(&mut self, message: PositionMessage) {
        self.latest = message;
    }

    #[must_use]
    pub fn latest(&self) -> &PositionMessage {
        &self.latest
    }

    #[must_use]
    pub fn last_sent(&self) -> &PositionMessage {
        &self.last_sent
    }

    /// Return the latest message if it differs from the last sent one and
    /// record it as sent.
    pub fn take_pending(&mut self) -> Option<PositionMessage> {
        if self.latest == self.last_sent {
            return None;
        }
        self.last_sent = self.latest.clone();
        Some(self.latest.clone())
    }

    /// Drop both slots back to the sentinel. A new connection then sends
    /// nothing until the pointer moves again.
    pub fn clear(&mut self) {
        self.latest = PositionMessage::Untracked;
        self.last_sent = PositionMessage::Untracked;
    }
}

/// Drive `tick` every `period` until it breaks. Late ticks are skipped.
pub async fn run_broadcast_loop<F>(period: Duration, mut tick: F)
where
    F: FnMut() -> ControlFlow<()>,
{
    let mut interval = tokio::time::interval(period.max(MIN_TICK_PERIOD));
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        interval.tick().await;
        if tick().is_break() {
            break;
        }
    }
}

/// Handle on the tick task. Dropping it stops the task.
#[derive(Debug, Default)]
pub struct BroadcastLoop {
    handle: Option<JoinHandle<()>>,
}

impl BroadcastLoop {
    /// Start ticking, replacing any running tick task.
    ///
    /// Must be called from within a `LocalSet`.
    pub fn start<F>(&mut self, period: Duration, tick: F)
    where
        F: FnMut() -> ControlFlow<()> + 'static,
    {
        self.stop();
        self.handle = Some(tokio::task::spawn_local(run_broadcast_loop(period, tick)));
    }

    /// Abort the tick task. Idempotent.
    pub fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for BroadcastLoop {
    fn drop(&mut self) {
        self.stop();
    }
}
