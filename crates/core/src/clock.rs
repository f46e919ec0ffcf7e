//! Session Clock
//!
//! Tracks the remaining time of a bounded-duration session. The clock owns a
//! single periodic ticker task that posts a tick event once per second to the
//! session's event channel; the owner applies each tick with
//! [`SessionClock::tick`]. The clock only reports when it has reached zero;
//! ending the session is the owner's decision.

use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Fifteen minutes.
pub const DEFAULT_SESSION_DURATION: Duration = Duration::from_secs(15 * 60);

const TICK_PERIOD: Duration = Duration::from_secs(1);

#[derive(Debug)]
pub struct SessionClock {
    duration_secs: u64,
    remaining_secs: u64,
    ticker: Option<JoinHandle<()>>,
}

impl SessionClock {
    pub fn new(duration: Duration) -> Self {
        let duration_secs = duration.as_secs();
        Self {
            duration_secs,
            remaining_secs: duration_secs,
            ticker: None,
        }
    }

    /// Resets the remaining time to the full duration and starts ticking.
    ///
    /// Any ticker from a previous start is aborted first, so at most one tick
    /// source exists per clock. `make_tick` builds the event sent on every
    /// elapsed second.
    pub fn start<T, F>(&mut self, events: mpsc::Sender<T>, make_tick: F)
    where
        T: Send + 'static,
        F: Fn() -> T + Send + 'static,
    {
        self.cancel_ticker();
        self.remaining_secs = self.duration_secs;

        self.ticker = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + TICK_PERIOD, TICK_PERIOD);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                if events.send(make_tick()).await.is_err() {
                    break;
                }
            }
        }));
    }

    /// Stops ticking without touching the remaining time.
    pub fn stop(&mut self) {
        self.cancel_ticker();
    }

    /// Stops ticking and restores the full duration.
    pub fn reset(&mut self) {
        self.cancel_ticker();
        self.remaining_secs = self.duration_secs;
    }

    /// Applies one elapsed second and returns the remaining time.
    ///
    /// Ticks arriving after `stop` (already queued in the channel) are
    /// ignored. The counter floors at zero.
    pub fn tick(&mut self) -> u64 {
        if self.is_running() {
            self.remaining_secs = self.remaining_secs.saturating_sub(1);
        }
        self.remaining_secs
    }

    pub fn remaining_secs(&self) -> u64 {
        self.remaining_secs
    }

    pub fn duration_secs(&self) -> u64 {
        self.duration_secs
    }

    pub fn is_running(&self) -> bool {
        self.ticker.is_some()
    }

    pub fn is_expired(&self) -> bool {
        self.remaining_secs == 0
    }

    fn cancel_ticker(&mut self) {
        if let Some(handle) = self.ticker.take() {
            handle.abort();
        }
    }
}

impl Drop for SessionClock {
    fn drop(&mut self) {
        self.cancel_ticker();
    }
}
