//! Per-chart live series controller.
//!
//! [`LiveSeriesController`] owns every series of one chart and runs each
//! incoming sample through the ingest pipeline:
//!
//! 1. sanitize (non-finite `x` rejected, infinite `y` replaced, NaN `y` kept as a gap)
//! 2. ordering check against the series' newest `x`
//! 3. duplicate timestamp resolution
//! 4. ring buffer insertion
//! 5. retention and archival
//! 6. rate tracking
//! 7. dirty mark on the frame coalescer
//!
//! Read queries never fail: an unknown series reads as empty.
//!
//! # Thread Safety
//!
//! The controller is `Send` but takes `&mut self` for every write. A host
//! that reads from another thread wraps it in a mutex, see
//! [`SharedController`](crate::driver::SharedController); the repaint
//! notification is delivered after the mutation it reports.

use std::collections::BTreeMap;
use std::mem;
use std::sync::Arc;
use std::time::Instant;

use crate::coalesce::{FrameCoalescer, ListenerId};
use crate::config::{ControllerConfig, DuplicateTimestampBehavior, OutOfOrderBehavior};
use crate::downsample::{DownsampleMethod, downsample};
use crate::error::{ConfigError, Result};
use crate::rate::{Clock, IngestRateTracker, SystemClock};
use crate::retention::Archive;
use crate::ring::RingBuffer;
use crate::sample::{Sample, Sanitized};
use crate::stats::{LiveStatistics, SeriesStatistics};

/// Event delivered to subscribers registered with
/// [`subscribe`](LiveSeriesController::subscribe).
#[derive(Debug, Clone, PartialEq)]
pub enum LiveEvent {
    /// [`pause`](LiveSeriesController::pause) or
    /// [`resume`](LiveSeriesController::resume) changed the flag.
    PauseChanged {
        /// The new state.
        paused: bool,
    },

    /// Samples were discarded while the consumer was paused on them.
    ViewedDataEvicted {
        /// The affected series.
        series: String,
        /// Number of discarded samples.
        count: usize,
    },
}

/// Callback receiving [`LiveEvent`]s.
pub type EventListener = Box<dyn FnMut(&LiveEvent) + Send>;

/// Handle returned by [`subscribe`](LiveSeriesController::subscribe) and the
/// typed event registrations, used with
/// [`unsubscribe`](LiveSeriesController::unsubscribe).
///
/// Distinct from the repaint [`ListenerId`] so a handle from one registry
/// cannot remove a listener from the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

/// Storage and counters of one named series.
#[derive(Debug)]
struct SeriesState {
    buffer: RingBuffer<Sample>,
    archive: Archive,
    rate: IngestRateTracker,
    /// `archive ++ buffer` is non-decreasing in `x`.
    monotonic: bool,
    total_received: u64,
    total_accepted: u64,
    total_rejected: u64,
    total_evicted: u64,
    total_condensed: u64,
}

impl SeriesState {
    fn new(config: &ControllerConfig, clock: &Arc<dyn Clock>) -> Self {
        Self {
            buffer: RingBuffer::new(config.capacity),
            archive: Archive::new(),
            rate: IngestRateTracker::with_clock(config.rate_window, Arc::clone(clock)),
            monotonic: true,
            total_received: 0,
            total_accepted: 0,
            total_rejected: 0,
            total_evicted: 0,
            total_condensed: 0,
        }
    }

    fn newest(&self) -> Option<&Sample> {
        self.buffer.last().or_else(|| self.archive.last())
    }

    fn oldest(&self) -> Option<&Sample> {
        self.archive.first().or_else(|| self.buffer.first())
    }

    fn len(&self) -> usize {
        self.archive.len() + self.buffer.len()
    }

    fn iter(&self) -> impl DoubleEndedIterator<Item = &Sample> + '_ {
        self.archive.iter().chain(self.buffer.iter())
    }

    fn x_range(&self) -> Option<(f64, f64)> {
        if self.monotonic {
            return Some((self.oldest()?.x, self.newest()?.x));
        }
        self.iter().fold(None, |range, sample| match range {
            None => Some((sample.x, sample.x)),
            Some((min, max)) => Some((sample.x.min(min), sample.x.max(max))),
        })
    }

    fn in_range(&self, x_min: f64, x_max: f64) -> Vec<Sample> {
        if !self.monotonic {
            return self
                .iter()
                .filter(|s| s.x >= x_min && s.x <= x_max)
                .copied()
                .collect();
        }

        let archive_start = self.archive.partition_point(|s| s.x < x_min);
        let archive_end = self.archive.partition_point(|s| s.x <= x_max);
        let buffer_start = self.buffer.partition_point(|s| s.x < x_min);
        let buffer_end = self.buffer.partition_point(|s| s.x <= x_max);

        let mut out =
            Vec::with_capacity((archive_end - archive_start) + (buffer_end - buffer_start));
        out.extend(
            self.archive
                .iter()
                .skip(archive_start)
                .take(archive_end - archive_start),
        );
        out.extend(
            self.buffer
                .iter()
                .skip(buffer_start)
                .take(buffer_end - buffer_start),
        );
        out
    }

    fn statistics(&self) -> SeriesStatistics {
        SeriesStatistics {
            point_count: self.len(),
            archived_count: self.archive.len(),
            total_received: self.total_received,
            total_accepted: self.total_accepted,
            total_rejected: self.total_rejected,
            total_evicted: self.total_evicted,
            total_condensed: self.total_condensed,
            ingest_rate_hz: self.rate.current_rate(),
            memory_estimate_bytes: self.buffer.capacity() * mem::size_of::<Option<Sample>>()
                + self.archive.len() * mem::size_of::<Sample>()
                + self.rate.entry_count() * mem::size_of::<(Instant, u32)>(),
            x_range: self.x_range(),
        }
    }

    fn reset(&mut self) {
        self.buffer.clear();
        self.archive.clear();
        self.rate.reset();
        self.monotonic = true;
    }
}

/// Result of running one sample through the pipeline.
#[derive(Debug, Clone, Copy, Default)]
struct Ingested {
    accepted: bool,
    evicted: usize,
}

impl Ingested {
    const REJECTED: Self = Self {
        accepted: false,
        evicted: 0,
    };
}

/// Owns the live series of one chart.
///
/// # Example
///
/// ```rust
/// use sluice::config::{ControllerConfig, DuplicateTimestampBehavior};
/// use sluice::controller::LiveSeriesController;
/// use sluice::retention::RetentionPolicy;
/// use sluice::sample::Sample;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = ControllerConfig::new(1024, RetentionPolicy::RollingCount { max_points: 3 })
///     .with_duplicates(DuplicateTimestampBehavior::Average);
/// let mut controller = LiveSeriesController::new(config)?;
///
/// controller.add_point("cpu", (100.0, 10.0));
/// controller.add_point("cpu", (100.0, 20.0));
/// assert_eq!(controller.get_points("cpu"), vec![Sample::new(100.0, 15.0)]);
///
/// controller.add_points("cpu", [(101.0, 1.0), (102.0, 2.0), (103.0, 3.0)]);
/// assert_eq!(controller.series_len("cpu"), 3);
/// assert_eq!(controller.get_oldest("cpu"), Some(Sample::new(101.0, 1.0)));
/// # Ok(())
/// # }
/// ```
pub struct LiveSeriesController {
    config: ControllerConfig,
    clock: Arc<dyn Clock>,
    series: BTreeMap<String, SeriesState>,
    coalescer: FrameCoalescer,
    listeners: Vec<(SubscriptionId, EventListener)>,
    next_subscription: u64,
    paused: bool,
    disposed: bool,
}

impl LiveSeriesController {
    /// Creates a controller using the system clock.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the configuration is invalid.
    pub fn new(config: ControllerConfig) -> Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Creates a controller whose rate tracking reads `clock`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the configuration is invalid.
    pub fn with_clock(config: ControllerConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;
        let coalescer = FrameCoalescer::new(config.coalescing);
        Ok(Self {
            config,
            clock,
            series: BTreeMap::new(),
            coalescer,
            listeners: Vec::new(),
            next_subscription: 0,
            paused: false,
            disposed: false,
        })
    }

    // ── Ingestion ───────────────────────────────────────────────────

    /// Offers one sample to a series, creating the series on first use.
    ///
    /// Returns `true` if the sample was stored or merged into the newest
    /// sample, `false` if it was rejected or the controller is disposed.
    pub fn add_point<S: Into<Sample>>(&mut self, series: &str, sample: S) -> bool {
        if self.disposed {
            return false;
        }

        let outcome = self.ingest(series, sample.into());
        if outcome.accepted {
            if let Some(state) = self.series.get_mut(series) {
                state.rate.record();
            }
            self.coalescer.mark_dirty();
        }
        self.report_evictions(series, outcome.evicted);
        outcome.accepted
    }

    /// Offers a batch of samples to one series, in order.
    ///
    /// Equivalent to calling [`add_point`](Self::add_point) for each sample
    /// except that the rate tracker and the coalescer are updated once for
    /// the whole batch.
    ///
    /// # Returns
    ///
    /// The number of accepted samples.
    pub fn add_points<I, S>(&mut self, series: &str, batch: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: Into<Sample>,
    {
        if self.disposed {
            return 0;
        }

        let mut accepted = 0;
        let mut evicted = 0;
        for sample in batch {
            let outcome = self.ingest(series, sample.into());
            accepted += usize::from(outcome.accepted);
            evicted += outcome.evicted;
        }

        if accepted > 0 {
            if let Some(state) = self.series.get_mut(series) {
                state.rate.record_batch(accepted);
            }
            self.coalescer.mark_dirty();
        }
        self.report_evictions(series, evicted);
        accepted
    }

    /// Sanitize, order, dedupe, insert and retain one sample.
    fn ingest(&mut self, name: &str, raw: Sample) -> Ingested {
        if !self.series.contains_key(name) {
            let state = SeriesState::new(&self.config, &self.clock);
            self.series.insert(name.to_string(), state);
        }
        let Some(state) = self.series.get_mut(name) else {
            return Ingested::REJECTED;
        };
        state.total_received += 1;

        let sample = match raw.sanitize() {
            Sanitized::Clean(sample) => sample,
            Sanitized::Gap(sample) => {
                tracing::trace!(series = name, x = sample.x, "gap sample");
                sample
            }
            Sanitized::Replaced { sample, original } => {
                tracing::warn!(
                    series = name,
                    x = sample.x,
                    value = original,
                    "non-finite value replaced with 0.0"
                );
                sample
            }
            Sanitized::InvalidX(sample) => {
                tracing::warn!(series = name, x = sample.x, "rejected sample with non-finite x");
                state.total_rejected += 1;
                return Ingested::REJECTED;
            }
        };

        let newest = state.newest().map(|s| s.x);
        let mut resort = false;
        match newest {
            Some(newest) if sample.x < newest => match self.config.out_of_order {
                OutOfOrderBehavior::Accept => state.monotonic = false,
                OutOfOrderBehavior::AcceptWithWarning => {
                    tracing::warn!(series = name, x = sample.x, newest, "out-of-order sample");
                    state.monotonic = false;
                }
                OutOfOrderBehavior::Reject => {
                    tracing::debug!(
                        series = name,
                        x = sample.x,
                        newest,
                        "rejected out-of-order sample"
                    );
                    state.total_rejected += 1;
                    return Ingested::REJECTED;
                }
                OutOfOrderBehavior::AutoSort => resort = true,
            },
            Some(newest) if sample.x == newest && !state.buffer.is_empty() => {
                match resolve_duplicate(state, sample, self.config.duplicates) {
                    Duplicate::Merged => {
                        state.total_accepted += 1;
                        return Ingested {
                            accepted: true,
                            evicted: 0,
                        };
                    }
                    Duplicate::Rejected => {
                        tracing::debug!(
                            series = name,
                            x = sample.x,
                            "rejected duplicate timestamp"
                        );
                        state.total_rejected += 1;
                        return Ingested::REJECTED;
                    }
                    Duplicate::Insert => {}
                }
            }
            _ => {}
        }

        let mut evicted = usize::from(state.buffer.push(sample).is_some());
        if resort {
            state.buffer.sort_by(|a, b| a.x.total_cmp(&b.x));
        }

        let report = self.config.retention.apply(&mut state.buffer, &mut state.archive);
        evicted += report.evicted_count;

        // Late samples older than the archive tail age out and merge there;
        // the live head must not precede the tail.
        if resort
            && let (Some(tail), Some(head)) = (state.archive.last(), state.buffer.first())
            && head.x < tail.x
        {
            state.monotonic = false;
        }

        state.total_accepted += 1;
        state.total_condensed += report.condensed_count as u64;
        state.total_evicted += evicted as u64;
        Ingested {
            accepted: true,
            evicted,
        }
    }

    fn report_evictions(&mut self, series: &str, count: usize) {
        if self.paused && count > 0 {
            self.emit(&LiveEvent::ViewedDataEvicted {
                series: series.to_string(),
                count,
            });
        }
    }

    // ── Queries ─────────────────────────────────────────────────────

    /// Returns every sample of a series in chronological order, archive first.
    pub fn get_points(&self, series: &str) -> Vec<Sample> {
        self.iter_points(series).collect()
    }

    /// Iterates a series without copying it, archive first.
    pub fn iter_points<'a>(&'a self, series: &str) -> impl Iterator<Item = Sample> + use<'a> {
        self.series
            .get(series)
            .into_iter()
            .flat_map(|state| state.iter())
            .copied()
    }

    /// Returns the samples with `x_min <= x <= x_max`.
    ///
    /// Uses binary search while the series is ordered by `x`, a linear scan
    /// after out-of-order samples were accepted.
    pub fn get_points_in_range(&self, series: &str, x_min: f64, x_max: f64) -> Vec<Sample> {
        if x_min > x_max || x_min.is_nan() || x_max.is_nan() {
            return Vec::new();
        }
        self.series
            .get(series)
            .map(|state| state.in_range(x_min, x_max))
            .unwrap_or_default()
    }

    /// Returns a series reduced to about `target_count` samples.
    pub fn get_points_downsampled(
        &self,
        series: &str,
        target_count: usize,
        method: DownsampleMethod,
    ) -> Vec<Sample> {
        downsample(&self.get_points(series), target_count, method)
    }

    /// Returns the newest sample of a series.
    pub fn get_latest(&self, series: &str) -> Option<Sample> {
        self.series.get(series)?.newest().copied()
    }

    /// Returns the oldest sample of a series, from the archive if it has one.
    pub fn get_oldest(&self, series: &str) -> Option<Sample> {
        self.series.get(series)?.oldest().copied()
    }

    /// Returns the smallest and largest `x` of a series.
    pub fn get_data_range(&self, series: &str) -> Option<(f64, f64)> {
        self.series.get(series)?.x_range()
    }

    /// Returns a statistics snapshot of every series.
    pub fn get_statistics(&self) -> LiveStatistics {
        let mut stats = LiveStatistics::from_series(
            self.series
                .iter()
                .map(|(name, state)| (name.clone(), state.statistics())),
        );
        stats.paused = self.paused;
        stats.notifications_fired = self.coalescer.notifications_fired();
        stats.marks_absorbed = self.coalescer.marks_absorbed();
        stats
    }

    /// Returns the series names in sorted order.
    pub fn series_names(&self) -> Vec<&str> {
        self.series.keys().map(String::as_str).collect()
    }

    /// Returns `true` if the series exists.
    pub fn contains_series(&self, series: &str) -> bool {
        self.series.contains_key(series)
    }

    /// Returns the number of queryable samples of a series.
    pub fn series_len(&self, series: &str) -> usize {
        self.series.get(series).map_or(0, SeriesState::len)
    }

    /// Returns the active configuration.
    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    // ── Lifecycle ───────────────────────────────────────────────────

    /// Empties one series, or every series when `series` is `None`.
    ///
    /// Lifetime counters and subscriptions are kept.
    pub fn clear(&mut self, series: Option<&str>) {
        if self.disposed {
            return;
        }
        match series {
            Some(name) => {
                if let Some(state) = self.series.get_mut(name) {
                    state.reset();
                    self.coalescer.mark_dirty();
                }
            }
            None => {
                for state in self.series.values_mut() {
                    state.reset();
                }
                self.coalescer.mark_dirty();
            }
        }
    }

    /// Drops a series and its counters. Returns `false` if it did not exist.
    pub fn remove_series(&mut self, series: &str) -> bool {
        if self.disposed {
            return false;
        }
        let removed = self.series.remove(series).is_some();
        if removed {
            self.coalescer.mark_dirty();
        }
        removed
    }

    /// Rebuilds every ring buffer with a new capacity.
    ///
    /// Shrinking keeps the newest samples of each series. Retention is not
    /// re-applied; the next write does that.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidCapacity`] if `new_capacity` is zero.
    ///
    /// # Returns
    ///
    /// The number of samples dropped across all series.
    pub fn set_capacity(&mut self, new_capacity: usize) -> Result<usize> {
        if new_capacity == 0 {
            return Err(ConfigError::InvalidCapacity {
                capacity: new_capacity,
            }
            .into());
        }
        if self.disposed {
            return Ok(0);
        }

        let mut dropped_by_series = Vec::new();
        for (name, state) in &mut self.series {
            let dropped = state.buffer.len().saturating_sub(new_capacity);
            let buffer = mem::replace(&mut state.buffer, RingBuffer::new(new_capacity));
            state.buffer = buffer.resize(new_capacity);
            state.total_evicted += dropped as u64;
            if dropped > 0 {
                dropped_by_series.push((name.clone(), dropped));
            }
        }
        self.config.capacity = new_capacity;

        let total: usize = dropped_by_series.iter().map(|(_, n)| n).sum();
        if total > 0 {
            tracing::debug!(new_capacity, dropped = total, "resized series buffers");
            self.coalescer.mark_dirty();
        }
        for (name, dropped) in dropped_by_series {
            self.report_evictions(&name, dropped);
        }
        Ok(total)
    }

    /// Tells the consumer to stop auto-scrolling. Ingestion continues.
    pub fn pause(&mut self) {
        self.set_paused(true);
    }

    /// Tells the consumer to resume auto-scrolling.
    pub fn resume(&mut self) {
        self.set_paused(false);
    }

    fn set_paused(&mut self, paused: bool) {
        if self.disposed || self.paused == paused {
            return;
        }
        self.paused = paused;
        self.emit(&LiveEvent::PauseChanged { paused });
    }

    /// Returns `true` while paused.
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Host frame tick; fires the pending repaint notification, if any.
    ///
    /// # Returns
    ///
    /// `true` if repaint listeners were notified.
    pub fn tick(&mut self) -> bool {
        self.coalescer.tick()
    }

    /// Returns `true` if the next [`tick`](Self::tick) will notify.
    pub fn has_pending_repaint(&self) -> bool {
        self.coalescer.is_pending()
    }

    /// Cancels any pending notification, detaches every listener and turns
    /// later writes into no-ops. Stored data stays readable.
    pub fn dispose(&mut self) {
        self.disposed = true;
        self.coalescer.dispose();
        self.listeners.clear();
    }

    /// Returns `true` once [`dispose`](Self::dispose) has run.
    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    // ── Listeners ───────────────────────────────────────────────────

    /// Registers a repaint listener, called at most once per tick.
    pub fn on_repaint<F>(&mut self, listener: F) -> ListenerId
    where
        F: FnMut() + Send + 'static,
    {
        self.coalescer.add_listener(Box::new(listener))
    }

    /// Removes a repaint listener.
    pub fn remove_repaint_listener(&mut self, id: ListenerId) -> bool {
        self.coalescer.remove_listener(id)
    }

    /// Registers a listener for every [`LiveEvent`].
    pub fn subscribe<F>(&mut self, listener: F) -> SubscriptionId
    where
        F: FnMut(&LiveEvent) + Send + 'static,
    {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        if !self.disposed {
            self.listeners.push((id, Box::new(listener)));
        }
        id
    }

    /// Registers a listener for pause state changes.
    pub fn on_pause_changed<F>(&mut self, mut listener: F) -> SubscriptionId
    where
        F: FnMut(bool) + Send + 'static,
    {
        self.subscribe(move |event| {
            if let LiveEvent::PauseChanged { paused } = event {
                listener(*paused);
            }
        })
    }

    /// Registers a listener for evictions that happen while paused.
    pub fn on_viewed_data_evicted<F>(&mut self, mut listener: F) -> SubscriptionId
    where
        F: FnMut(&str, usize) + Send + 'static,
    {
        self.subscribe(move |event| {
            if let LiveEvent::ViewedDataEvicted { series, count } = event {
                listener(series, *count);
            }
        })
    }

    /// Removes an event listener. Returns `false` if it was not registered.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(subscription, _)| *subscription != id);
        self.listeners.len() != before
    }

    fn emit(&mut self, event: &LiveEvent) {
        for (_, listener) in &mut self.listeners {
            listener(event);
        }
    }
}

impl std::fmt::Debug for LiveSeriesController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveSeriesController")
            .field("config", &self.config)
            .field("series", &self.series.len())
            .field("coalescer", &self.coalescer)
            .field("listeners", &self.listeners.len())
            .field("paused", &self.paused)
            .field("disposed", &self.disposed)
            .finish_non_exhaustive()
    }
}

/// Outcome of a duplicate timestamp check.
enum Duplicate {
    /// Resolved in place; nothing to insert.
    Merged,
    /// The new sample is dropped.
    Rejected,
    /// The new sample is inserted as usual.
    Insert,
}

fn resolve_duplicate(
    state: &mut SeriesState,
    sample: Sample,
    behavior: DuplicateTimestampBehavior,
) -> Duplicate {
    let replacement = match behavior {
        DuplicateTimestampBehavior::KeepFirst => return Duplicate::Rejected,
        DuplicateTimestampBehavior::KeepBoth => return Duplicate::Insert,
        DuplicateTimestampBehavior::Replace => sample,
        DuplicateTimestampBehavior::Average => {
            let Some(old) = state.buffer.last() else {
                return Duplicate::Insert;
            };
            Sample::new(old.x, mean_ignoring_gaps(old.y, sample.y))
        }
    };

    match state.buffer.replace_last(replacement) {
        Ok(_) => Duplicate::Merged,
        Err(_) => Duplicate::Insert,
    }
}

/// Mean of two values, treating a NaN gap as absent.
fn mean_ignoring_gaps(a: f64, b: f64) -> f64 {
    match (a.is_nan(), b.is_nan()) {
        (false, false) => (a + b) / 2.0,
        (true, false) => b,
        (false, true) => a,
        (true, true) => f64::NAN,
    }
}
