//! Single-flight debounced write queue.
//!
//! Coalesces bursts of writes into one physical write:
//! - The first write arms one timer; writes inside the window replace the
//!   pending payload (last write wins)
//! - At most one write is in flight; a write scheduled during it becomes the
//!   single successor and runs as soon as the in-flight write completes
//! - A flush cancels the timer through its handle and takes the payload
//!
//! The queue is pure state. Time comes in as an argument and the timer task
//! is owned by the caller, so the state machine is testable without sleeping.

use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

/// Configuration for debounced writes.
#[derive(Debug, Clone, Copy)]
pub struct DebounceConfig {
    /// Quiet period between the first write of a burst and the disk write
    pub delay: Duration,
}

impl Default for DebounceConfig {
    fn default() -> Self {
        Self {
            delay: Duration::from_millis(50),
        }
    }
}

impl DebounceConfig {
    /// Create a DebounceConfig from application config values.
    pub fn from_config(delay_ms: u64) -> Self {
        Self {
            delay: Duration::from_millis(delay_ms),
        }
    }
}

/// Cancellable handle over an armed timer task.
#[derive(Debug, Clone, Default)]
pub struct TimerHandle {
    token: CancellationToken,
}

impl TimerHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Token the timer task waits on.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    #[cfg(test)]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Outcome of [`WriteQueue::schedule`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheduled {
    /// Queue was idle; the caller must start a timer firing at this instant.
    Armed(Instant),
    /// A timer is already armed; the pending payload was replaced.
    Coalesced,
    /// A write is in flight; the payload runs right after it.
    Queued,
}

/// Write queue with at most one pending payload and one write in flight.
#[derive(Debug)]
pub struct WriteQueue<T> {
    config: DebounceConfig,
    pending: Option<T>,
    deadline: Option<Instant>,
    timer: Option<TimerHandle>,
    in_flight: bool,
    scheduled: u64,
    coalesced: u64,
}

impl<T> WriteQueue<T> {
    pub fn new(config: DebounceConfig) -> Self {
        Self {
            config,
            pending: None,
            deadline: None,
            timer: None,
            in_flight: false,
            scheduled: 0,
            coalesced: 0,
        }
    }

    /// Offer a payload for persistence.
    pub fn schedule(&mut self, item: T, now: Instant) -> Scheduled {
        self.scheduled += 1;
        if self.pending.replace(item).is_some() {
            self.coalesced += 1;
        }

        if self.in_flight {
            return Scheduled::Queued;
        }
        if self.deadline.is_some() {
            return Scheduled::Coalesced;
        }

        let deadline = now + self.config.delay;
        self.deadline = Some(deadline);
        Scheduled::Armed(deadline)
    }

    /// Attach the handle of the timer started for an `Armed` schedule.
    pub fn arm(&mut self, timer: TimerHandle) {
        if let Some(old) = self.timer.replace(timer) {
            old.cancel();
        }
    }

    /// Take the pending payload and mark a write in flight.
    ///
    /// Returns `None` if nothing is pending (a flush got there first).
    pub fn begin(&mut self) -> Option<T> {
        let item = self.pending.take()?;
        self.deadline = None;
        self.timer = None;
        self.in_flight = true;
        Some(item)
    }

    /// Mark the in-flight write done. True when a successor is waiting.
    pub fn complete(&mut self) -> bool {
        self.in_flight = false;
        self.pending.is_some()
    }

    /// Cancel the armed timer and take the pending payload.
    pub fn take_for_flush(&mut self) -> Option<T> {
        self.cancel_timer();
        self.pending.take()
    }

    /// Drop pending work and cancel the timer.
    pub fn discard(&mut self) {
        self.cancel_timer();
        self.pending = None;
    }

    /// Time left before the armed timer is due.
    ///
    /// Returns None when no timer is armed.
    pub fn time_until_due(&self, now: Instant) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(now))
    }

    #[cfg(test)]
    pub fn is_in_flight(&self) -> bool {
        self.in_flight
    }

    /// Nothing pending and nothing being written.
    pub fn is_idle(&self) -> bool {
        self.pending.is_none() && !self.in_flight
    }

    /// Total payloads offered.
    pub fn scheduled(&self) -> u64 {
        self.scheduled
    }

    /// Payloads replaced before being written.
    pub fn coalesced(&self) -> u64 {
        self.coalesced
    }

    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.cancel();
        }
        self.deadline = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue() -> WriteQueue<u32> {
        WriteQueue::new(DebounceConfig::from_config(50))
    }

    #[test]
    fn test_first_schedule_arms_then_coalesces() {
        let mut q = queue();
        let t0 = Instant::now();

        assert_eq!(
            q.schedule(1, t0),
            Scheduled::Armed(t0 + Duration::from_millis(50))
        );
        assert_eq!(q.schedule(2, t0), Scheduled::Coalesced);
        assert_eq!(q.schedule(3, t0), Scheduled::Coalesced);

        assert_eq!(q.begin(), Some(3));
        assert_eq!(q.scheduled(), 3);
        assert_eq!(q.coalesced(), 2);
    }

    #[test]
    fn test_time_until_due() {
        let mut q = queue();
        let t0 = Instant::now();
        assert_eq!(q.time_until_due(t0), None);

        q.schedule(1, t0);
        assert_eq!(
            q.time_until_due(t0 + Duration::from_millis(20)),
            Some(Duration::from_millis(30))
        );
        assert_eq!(
            q.time_until_due(t0 + Duration::from_millis(80)),
            Some(Duration::ZERO)
        );
    }

    #[test]
    fn test_write_during_flight_is_single_successor() {
        let mut q = queue();
        let t0 = Instant::now();

        q.schedule(1, t0);
        assert_eq!(q.begin(), Some(1));
        assert!(q.is_in_flight());

        assert_eq!(q.schedule(2, t0), Scheduled::Queued);
        assert_eq!(q.schedule(3, t0), Scheduled::Queued);

        assert!(q.complete());
        assert_eq!(q.begin(), Some(3));
        assert!(!q.complete());
        assert!(q.is_idle());
    }

    #[test]
    fn test_flush_cancels_timer() {
        let mut q = queue();
        let t0 = Instant::now();

        q.schedule(1, t0);
        let timer = TimerHandle::new();
        q.arm(timer.clone());

        assert_eq!(q.take_for_flush(), Some(1));
        assert!(timer.is_cancelled());
        assert_eq!(q.begin(), None);

        // Idle again: next schedule arms a new timer.
        assert!(matches!(q.schedule(2, t0), Scheduled::Armed(_)));
    }

    #[test]
    fn test_discard_drops_pending() {
        let mut q = queue();
        q.schedule(1, Instant::now());
        let timer = TimerHandle::new();
        q.arm(timer.clone());

        q.discard();
        assert!(timer.is_cancelled());
        assert!(q.is_idle());
    }
}
