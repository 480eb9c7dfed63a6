//! Wake/sleep scheduling for the controller.
//!
//! The loop has one suspension point, [`EventLoop::wait`], which returns
//! whichever comes first: the wake deadline or a queued intent. While a
//! unit of work runs, [`EventLoop::drive`] keeps draining the intent queue
//! so nothing is lost, but only hands the intents back once the work is done.

use std::collections::VecDeque;
use std::future::Future;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::signal::Intent;

/// Why [`EventLoop::wait`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wakeup {
    /// The wake deadline elapsed.
    Deadline,
    /// An intent was dequeued.
    Intent(Intent),
}

/// Result of driving one unit of work.
#[derive(Debug)]
pub struct Driven<T> {
    pub output: T,
    /// A `Stop` arrived while the work was running.
    pub stop_requested: bool,
}

pub struct EventLoop {
    intents: mpsc::UnboundedReceiver<Intent>,
    deferred: VecDeque<Intent>,
    deadline: Option<Instant>,
    drain_poll_interval: Duration,
}

impl EventLoop {
    pub fn new(intents: mpsc::UnboundedReceiver<Intent>, drain_poll_interval: Duration) -> Self {
        Self {
            intents,
            deferred: VecDeque::new(),
            deadline: None,
            drain_poll_interval: drain_poll_interval.max(Duration::from_millis(1)),
        }
    }

    /// Schedule the next wake-up `interval` from now, replacing any previous one.
    pub fn arm(&mut self, interval: Duration) -> Instant {
        let deadline = Instant::now() + interval;
        self.deadline = Some(deadline);
        debug!(?interval, "Wake deadline armed");
        deadline
    }

    /// Clear the wake deadline.
    pub fn disarm(&mut self) {
        if self.deadline.take().is_some() {
            debug!("Wake deadline cleared");
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn drain_poll_interval(&self) -> Duration {
        self.drain_poll_interval
    }

    pub fn set_drain_poll_interval(&mut self, interval: Duration) {
        self.drain_poll_interval = interval.max(Duration::from_millis(1));
    }

    /// Intents held back while a unit of work was running.
    pub fn pending(&self) -> usize {
        self.deferred.len()
    }

    /// Drop every queued intent. Returns how many were dropped.
    pub fn discard_pending(&mut self) -> usize {
        let mut dropped = self.deferred.len();
        self.deferred.clear();
        while self.intents.try_recv().is_ok() {
            dropped += 1;
        }
        dropped
    }

    /// Block until the deadline elapses or an intent is available.
    ///
    /// Deferred intents come first, in arrival order. A queued intent wins
    /// over a deadline that elapsed at the same time. Without a deadline
    /// this waits for an intent only.
    pub async fn wait(&mut self) -> Wakeup {
        if let Some(intent) = self.deferred.pop_front() {
            return Wakeup::Intent(intent);
        }

        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    biased;
                    intent = self.intents.recv() => Self::received(intent),
                    _ = sleep_until(deadline) => {
                        self.deadline = None;
                        Wakeup::Deadline
                    }
                }
            }
            None => {
                let intent = self.intents.recv().await;
                Self::received(intent)
            }
        }
    }

    /// Run `work` to completion while buffering intents.
    ///
    /// The first `Stop` calls `on_stop` right away and is remembered in the
    /// result; later ones are ignored. Other intents are deferred for
    /// [`wait`](Self::wait). While a stop is pending, progress is reported
    /// every drain poll interval.
    pub async fn drive<F, S>(&mut self, work: F, on_stop: S) -> Driven<F::Output>
    where
        F: Future,
        S: Fn(),
    {
        tokio::pin!(work);

        let mut stop_requested = false;
        let mut drain_ticker = tokio::time::interval(self.drain_poll_interval);
        drain_ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                output = &mut work => {
                    return Driven { output, stop_requested };
                }
                Some(intent) = self.intents.recv() => {
                    match intent {
                        Intent::Stop if stop_requested => {
                            debug!("Duplicate stop request ignored");
                        }
                        Intent::Stop => {
                            stop_requested = true;
                            on_stop();
                        }
                        other => {
                            debug!(intent = %other, "Intent deferred until the unit of work returns");
                            self.deferred.push_back(other);
                        }
                    }
                }
                _ = drain_ticker.tick(), if stop_requested => {
                    info!("Waiting for the in-flight unit of work to finish");
                }
            }
        }
    }

    fn received(intent: Option<Intent>) -> Wakeup {
        match intent {
            Some(intent) => Wakeup::Intent(intent),
            None => {
                warn!("Intent queue closed, treating as a stop request");
                Wakeup::Intent(Intent::Stop)
            }
        }
    }
}

#[cfg(test)]
#[path = "event_loop_tests.rs"]
mod tests;
