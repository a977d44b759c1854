//! Per-lobby round timer for Scrawl.
//!
//! A lobby's clock is not a game loop: nothing happens between ticks
//! except hint reveals and deadline checks, so the timer only has to
//! re-enter the lobby actor at a fixed cadence (1 s by default). It does
//! that by pushing a tick command onto the actor's own command queue,
//! which keeps the timer's mutations ordered with every other input.
//!
//! # Integration
//!
//! ```ignore
//! let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
//! let timer = RoundTimer::new(TimerConfig::default(), shutdown_rx);
//! timer.spawn(lobby_id.to_string(), command_tx.clone(), |_| LobbyCommand::Tick);
//! // ... on teardown:
//! let _ = shutdown_tx.send(true);
//! ```
//!
//! The timer exits when the shutdown signal flips to `true`, when the
//! signal's sender is dropped, or when the actor's queue closes.

use std::fmt::Display;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, trace, warn};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Configuration for a [`RoundTimer`].
///
/// Missed ticks are dropped and the cadence continues. Lobby ticks read
/// the wall clock, so one late tick catches up on everything the missed
/// ones would have done.
#[derive(Debug, Clone)]
pub struct TimerConfig {
    /// Time between ticks. Zero disables the timer entirely.
    pub interval: Duration,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self::every(Duration::from_secs(1))
    }
}

impl TimerConfig {
    pub fn every(interval: Duration) -> Self {
        Self { interval }
    }

    /// Returns `true` when the timer would never fire.
    pub fn is_disabled(&self) -> bool {
        self.interval.is_zero()
    }
}

// ---------------------------------------------------------------------------
// Timer
// ---------------------------------------------------------------------------

/// Why a timer task stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerExit {
    /// The shutdown signal fired (or its sender was dropped).
    Shutdown,
    /// The lobby's command queue is closed; the actor is gone.
    ChannelClosed,
    /// The config has a zero interval.
    Disabled,
}

/// The recurring task that re-enters a lobby actor.
pub struct RoundTimer {
    config: TimerConfig,
    shutdown: watch::Receiver<bool>,
}

impl RoundTimer {
    /// Creates a timer that stops when `shutdown` becomes `true`.
    pub fn new(config: TimerConfig, shutdown: watch::Receiver<bool>) -> Self {
        Self { config, shutdown }
    }

    /// Spawns the timer on the Tokio runtime.
    ///
    /// `make_tick` builds the command to enqueue; it receives the tick
    /// number (starting at 1).
    pub fn spawn<C, F>(
        self,
        label: impl Display + Send + 'static,
        commands: mpsc::Sender<C>,
        make_tick: F,
    ) -> JoinHandle<TimerExit>
    where
        C: Send + 'static,
        F: FnMut(u64) -> C + Send + 'static,
    {
        tokio::spawn(self.run(label, commands, make_tick))
    }

    /// Runs the timer loop on the current task until it exits.
    pub async fn run<C, F>(
        mut self,
        label: impl Display,
        commands: mpsc::Sender<C>,
        mut make_tick: F,
    ) -> TimerExit
    where
        F: FnMut(u64) -> C,
    {
        if self.config.is_disabled() {
            debug!(lobby_id = %label, "round timer disabled");
            return TimerExit::Disabled;
        }

        let start = Instant::now() + self.config.interval;
        let mut interval = time::interval_at(start, self.config.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        debug!(
            lobby_id = %label,
            interval_ms = self.config.interval.as_millis() as u64,
            "round timer started"
        );

        let mut ticks = 0u64;
        if *self.shutdown.borrow() {
            return TimerExit::Shutdown;
        }
        loop {
            tokio::select! {
                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        debug!(lobby_id = %label, ticks, "round timer stopped");
                        return TimerExit::Shutdown;
                    }
                }
                _ = interval.tick() => {
                    ticks += 1;
                    match commands.try_send(make_tick(ticks)) {
                        Ok(()) => trace!(lobby_id = %label, tick = ticks, "tick"),
                        Err(mpsc::error::TrySendError::Full(_)) => {
                            // The next tick covers whatever this one missed.
                            warn!(lobby_id = %label, tick = ticks, "lobby queue full, tick dropped");
                        }
                        Err(mpsc::error::TrySendError::Closed(_)) => {
                            debug!(lobby_id = %label, ticks, "lobby gone, round timer stopped");
                            return TimerExit::ChannelClosed;
                        }
                    }
                }
            }
        }
    }
}
