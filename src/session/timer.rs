// src/session/timer.rs

use std::{
    panic::{AssertUnwindSafe, catch_unwind},
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use thiserror::Error;
use tokio::{sync::watch, task::JoinHandle, time::MissedTickBehavior};

pub type TimeUpHandler = Box<dyn Fn() + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TimerError {
    #[error("timer is locked for an active session")]
    Locked,
    #[error("timer has already expired")]
    Expired,
}

/// Result of a single tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    Running(u64),
    Paused,
    Expired,
}

#[derive(Debug)]
struct Clock {
    remaining: u64,
    running: bool,
    locked: bool,
}

struct Shared {
    clock: Mutex<Clock>,
    fired: AtomicBool,
    on_time_up: TimeUpHandler,
    progress: watch::Sender<u64>,
}

impl Shared {
    fn clock(&self) -> MutexGuard<'_, Clock> {
        self.clock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Decrements by one second. Zero is terminal.
    fn tick(&self) -> Tick {
        let remaining = {
            let mut clock = self.clock();
            if clock.remaining == 0 {
                None
            } else if !clock.running {
                return Tick::Paused;
            } else {
                clock.remaining -= 1;
                Some(clock.remaining)
            }
        };

        match remaining {
            Some(0) | None => {
                self.progress.send_replace(0);
                self.fire();
                Tick::Expired
            }
            Some(left) => {
                self.progress.send_replace(left);
                Tick::Running(left)
            }
        }
    }

    fn fire(&self) {
        if self.fired.swap(true, Ordering::AcqRel) {
            return;
        }
        tracing::info!("Countdown reached zero");
        if catch_unwind(AssertUnwindSafe(|| (self.on_time_up)())).is_err() {
            tracing::error!("Time-up handler panicked; expiry still recorded");
        }
    }
}

/// Owns the remaining time of one session and fires `on_time_up` exactly once.
///
/// Ticks come from a one-second `tokio::time::interval` spawned by [`start`].
/// Dropping the timer cancels the tick task.
///
/// [`start`]: CountdownTimer::start
pub struct CountdownTimer {
    shared: Arc<Shared>,
    task: Option<JoinHandle<()>>,
    total_seconds: u64,
}

impl CountdownTimer {
    pub fn new(total_minutes: u32, on_time_up: TimeUpHandler) -> Self {
        let total_seconds = u64::from(total_minutes) * 60;
        let (progress, _) = watch::channel(total_seconds);
        Self {
            shared: Arc::new(Shared {
                clock: Mutex::new(Clock {
                    remaining: total_seconds,
                    running: false,
                    locked: false,
                }),
                fired: AtomicBool::new(false),
                on_time_up,
                progress,
            }),
            task: None,
            total_seconds,
        }
    }

    pub fn total_seconds(&self) -> u64 {
        self.total_seconds
    }

    pub fn remaining_seconds(&self) -> u64 {
        self.shared.clock().remaining
    }

    pub fn is_running(&self) -> bool {
        self.shared.clock().running
    }

    pub fn has_expired(&self) -> bool {
        self.shared.fired.load(Ordering::Acquire)
    }

    /// Informational per-tick updates of the remaining seconds.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.shared.progress.subscribe()
    }

    /// Starts ticking. Must be called inside a Tokio runtime. Calling it
    /// again while the tick task is alive only resumes the clock.
    pub fn start(&mut self) -> Result<(), TimerError> {
        if self.has_expired() {
            return Err(TimerError::Expired);
        }
        self.shared.clock().running = true;

        if self.task.as_ref().is_some_and(|t| !t.is_finished()) {
            return Ok(());
        }

        let shared = Arc::clone(&self.shared);
        self.task = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));
            interval.set_missed_tick_behavior(MissedTickBehavior::Burst);
            // The first tick completes immediately.
            interval.tick().await;
            loop {
                interval.tick().await;
                if shared.tick() == Tick::Expired {
                    break;
                }
            }
        }));
        tracing::debug!(seconds = self.total_seconds, "Countdown started");
        Ok(())
    }

    /// Disables pause and resume for the rest of the timer's life.
    pub fn lock(&self) {
        self.shared.clock().locked = true;
    }

    pub fn pause(&self) -> Result<(), TimerError> {
        let mut clock = self.shared.clock();
        if clock.locked {
            return Err(TimerError::Locked);
        }
        clock.running = false;
        Ok(())
    }

    pub fn resume(&self) -> Result<(), TimerError> {
        let mut clock = self.shared.clock();
        if clock.locked {
            return Err(TimerError::Locked);
        }
        if clock.remaining == 0 {
            return Err(TimerError::Expired);
        }
        clock.running = true;
        Ok(())
    }

    /// Stops the tick task. The remaining time is kept.
    pub fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.shared.clock().running = false;
    }

    #[cfg(test)]
    fn tick(&self) -> Tick {
        self.shared.tick()
    }

    #[cfg(test)]
    fn arm(&self) {
        self.shared.clock().running = true;
    }
}

impl Drop for CountdownTimer {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl std::fmt::Debug for CountdownTimer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CountdownTimer")
            .field("total_seconds", &self.total_seconds)
            .field("clock", &*self.shared.clock())
            .field("fired", &self.has_expired())
            .finish()
    }
}
