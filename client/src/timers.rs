//! Local countdown timers.
//!
//! Each named timer is a spawned task ticking once per second, feeding tick
//! and expiry events back into the session channel. The subsystem never
//! decides game logic: the session state machine owns arming, cancellation
//! and the epoch tags that let it ignore stale expirations.

use crate::session::{SessionEvent, TimerKind};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::interval;

pub struct TimerSet {
    events: mpsc::UnboundedSender<SessionEvent>,
    tick: Duration,
    active: HashMap<TimerKind, JoinHandle<()>>,
}

impl TimerSet {
    pub fn new(events: mpsc::UnboundedSender<SessionEvent>) -> Self {
        Self::with_tick(events, Duration::from_secs(1))
    }

    /// Same as [`TimerSet::new`] with a custom tick length, so tests do not
    /// wait wall-clock seconds.
    pub fn with_tick(events: mpsc::UnboundedSender<SessionEvent>, tick: Duration) -> Self {
        Self {
            events,
            tick,
            active: HashMap::new(),
        }
    }

    /// Starts `kind` counting down from `seconds`. A running instance of the
    /// same timer is aborted first, so there is never more than one active
    /// countdown per name.
    pub fn arm(&mut self, kind: TimerKind, seconds: u32, epoch: u64) {
        if let Some(previous) = self.active.remove(&kind) {
            previous.abort();
        }
        let events = self.events.clone();
        let tick = self.tick;
        let handle = tokio::spawn(run_countdown(kind, seconds, epoch, events, tick));
        self.active.insert(kind, handle);
    }

    pub fn cancel(&mut self, kind: TimerKind) {
        if let Some(handle) = self.active.remove(&kind) {
            handle.abort();
        }
    }

    pub fn cancel_all(&mut self) {
        for (_, handle) in self.active.drain() {
            handle.abort();
        }
    }
}

impl Drop for TimerSet {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

async fn run_countdown(
    kind: TimerKind,
    seconds: u32,
    epoch: u64,
    events: mpsc::UnboundedSender<SessionEvent>,
    tick: Duration,
) {
    let mut ticker = interval(tick);
    // The first tick completes immediately.
    ticker.tick().await;

    let mut remaining = seconds;
    while remaining > 0 {
        ticker.tick().await;
        remaining -= 1;
        if remaining > 0 {
            if events
                .send(SessionEvent::TimerTick {
                    kind,
                    remaining,
                    epoch,
                })
                .is_err()
            {
                return;
            }
        }
    }

    let _ = events.send(SessionEvent::TimerExpired { kind, epoch });
}
