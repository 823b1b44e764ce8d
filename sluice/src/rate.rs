//! Sliding-window ingest rate tracking.
//!
//! [`IngestRateTracker`] counts arrivals over a trailing window and reports
//! samples per second. Time comes from a [`Clock`] so tests and simulations
//! can drive it deterministically with a [`ManualClock`].

use std::collections::VecDeque;
use std::fmt::Debug;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Default sliding window length.
pub const DEFAULT_RATE_WINDOW: Duration = Duration::from_secs(5);

/// Source of monotonic time.
pub trait Clock: Send + Sync + Debug {
    /// Returns the current instant.
    fn now(&self) -> Instant;
}

/// Wall-clock time via [`Instant::now`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    #[inline]
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A clock that only moves when told to.
///
/// Cloning shares the underlying instant, so a test can keep one handle and
/// hand another to the controller.
///
/// # Examples
///
/// ```rust
/// use std::time::Duration;
/// use sluice::rate::{Clock, ManualClock};
///
/// let clock = ManualClock::new();
/// let start = clock.now();
/// clock.advance(Duration::from_millis(250));
/// assert_eq!(clock.now() - start, Duration::from_millis(250));
/// ```
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<Instant>>,
}

impl ManualClock {
    /// Creates a manual clock starting at the current instant.
    pub fn new() -> Self {
        Self {
            now: Arc::new(Mutex::new(Instant::now())),
        }
    }

    /// Moves the clock forward.
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Trailing-window arrival counter.
///
/// Arrivals recorded at the same instant share one entry, so memory grows
/// with the number of distinct record calls inside the window rather than
/// with the number of samples.
#[derive(Debug, Clone)]
pub struct IngestRateTracker {
    window: Duration,
    clock: Arc<dyn Clock>,
    /// `(arrival instant, sample count)`, oldest first.
    entries: VecDeque<(Instant, u32)>,
    /// Sum of the counts in `entries`.
    count: u64,
}

impl IngestRateTracker {
    /// Creates a tracker over `window` using the system clock.
    pub fn new(window: Duration) -> Self {
        Self::with_clock(window, Arc::new(SystemClock))
    }

    /// Creates a tracker over `window` using `clock`.
    pub fn with_clock(window: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            window,
            clock,
            entries: VecDeque::new(),
            count: 0,
        }
    }

    /// Records one arrival.
    pub fn record(&mut self) {
        self.record_batch(1);
    }

    /// Records `n` arrivals at the current instant.
    pub fn record_batch(&mut self, n: usize) {
        if n == 0 {
            return;
        }
        let now = self.clock.now();
        self.prune(now);

        let n = u32::try_from(n).unwrap_or(u32::MAX);
        match self.entries.back_mut() {
            Some((at, count)) if *at == now => *count = count.saturating_add(n),
            _ => self.entries.push_back((now, n)),
        }
        self.count += u64::from(n);
    }

    /// Prunes expired entries and returns the current rate in samples/second.
    pub fn rate(&mut self) -> f64 {
        let now = self.clock.now();
        self.prune(now);
        self.rate_at(now)
    }

    /// Returns the current rate without mutating the tracker.
    pub fn current_rate(&self) -> f64 {
        self.rate_at(self.clock.now())
    }

    /// Returns the rate as seen at `now`.
    ///
    /// Entries older than the window are ignored. The divisor is the time
    /// since the oldest retained entry, capped at the window, so a short burst
    /// is not reported as if it had been spread over the whole window. If that
    /// time is zero (everything arrived at one instant) the full window is
    /// used instead.
    pub fn rate_at(&self, now: Instant) -> f64 {
        let Some(cutoff) = now.checked_sub(self.window) else {
            return self.rate_over(self.entries.iter(), now);
        };
        let live = self.entries.iter().skip_while(|(at, _)| *at < cutoff);
        self.rate_over(live, now)
    }

    #[allow(clippy::cast_precision_loss)] // Counts far below 2^52
    fn rate_over<'a, I>(&self, mut live: I, now: Instant) -> f64
    where
        I: Iterator<Item = &'a (Instant, u32)>,
    {
        let Some(&(oldest, first_count)) = live.next() else {
            return 0.0;
        };
        let count = u64::from(first_count) + live.map(|(_, n)| u64::from(*n)).sum::<u64>();

        let elapsed = now.saturating_duration_since(oldest).min(self.window);
        let seconds = if elapsed.is_zero() {
            self.window.as_secs_f64()
        } else {
            elapsed.as_secs_f64()
        };
        if seconds == 0.0 {
            return 0.0;
        }
        count as f64 / seconds
    }

    fn prune(&mut self, now: Instant) {
        let Some(cutoff) = now.checked_sub(self.window) else {
            return;
        };
        while let Some(&(at, n)) = self.entries.front() {
            if at >= cutoff {
                break;
            }
            self.entries.pop_front();
            self.count -= u64::from(n);
        }
    }

    /// Forgets every recorded arrival.
    pub fn reset(&mut self) {
        self.entries.clear();
        self.count = 0;
    }

    /// Returns the number of arrivals recorded inside the window as of the
    /// last prune.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Returns the number of stored entries.
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// Returns the window length.
    pub fn window(&self) -> Duration {
        self.window
    }
}

impl Default for IngestRateTracker {
    fn default() -> Self {
        Self::new(DEFAULT_RATE_WINDOW)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker(window_secs: u64) -> (IngestRateTracker, ManualClock) {
        let clock = ManualClock::new();
        let tracker = IngestRateTracker::with_clock(
            Duration::from_secs(window_secs),
            Arc::new(clock.clone()),
        );
        (tracker, clock)
    }

    #[test]
    fn test_empty_rate_is_zero() {
        let (mut tracker, _clock) = tracker(5);
        assert_eq!(tracker.rate(), 0.0);
        assert_eq!(tracker.current_rate(), 0.0);
    }

    #[test]
    fn test_steady_rate() {
        let (mut tracker, clock) = tracker(5);
        // 10 Hz for 4 seconds
        for _ in 0..40 {
            tracker.record();
            clock.advance(Duration::from_millis(100));
        }
        // Oldest retained entry is 4.0 s old
        assert!((tracker.rate() - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_short_burst_uses_elapsed_time() {
        let (mut tracker, clock) = tracker(5);
        tracker.record_batch(50);
        clock.advance(Duration::from_secs(1));

        // 50 samples over 1 s, not over the 5 s window
        assert!((tracker.rate() - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_same_instant_uses_window() {
        let (mut tracker, _clock) = tracker(5);
        tracker.record_batch(10);
        tracker.record_batch(15);

        assert_eq!(tracker.entry_count(), 1);
        assert!((tracker.rate() - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_old_entries_pruned() {
        let (mut tracker, clock) = tracker(5);
        tracker.record_batch(100);
        clock.advance(Duration::from_secs(6));
        tracker.record_batch(3);
        clock.advance(Duration::from_secs(1));

        assert!((tracker.rate() - 3.0).abs() < 1e-9);
        assert_eq!(tracker.count(), 3);
        assert_eq!(tracker.entry_count(), 1);
    }

    #[test]
    fn test_current_rate_does_not_prune() {
        let (mut tracker, clock) = tracker(1);
        tracker.record_batch(4);
        clock.advance(Duration::from_secs(2));

        assert_eq!(tracker.current_rate(), 0.0);
        assert_eq!(tracker.entry_count(), 1);
        assert_eq!(tracker.rate(), 0.0);
        assert_eq!(tracker.entry_count(), 0);
    }

    #[test]
    fn test_reset() {
        let (mut tracker, _clock) = tracker(5);
        tracker.record_batch(7);
        tracker.reset();
        assert_eq!(tracker.count(), 0);
        assert_eq!(tracker.rate(), 0.0);
    }

    #[test]
    fn test_zero_batch_ignored() {
        let (mut tracker, _clock) = tracker(5);
        tracker.record_batch(0);
        assert_eq!(tracker.entry_count(), 0);
    }
}
