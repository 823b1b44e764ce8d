//! Retention policies and the tiered archive.
//!
//! A [`RetentionPolicy`] is an immutable parameter set describing when samples
//! leave a series' live buffer. Applying it is a function of
//! `(policy, buffer, archive)` that mutates the two stores and reports what
//! happened; policies never own buffers themselves, so one policy value can be
//! shared by every series of a controller.
//!
//! Durations are expressed in the same units as sample `x` values (commonly
//! milliseconds), since the pipeline treats `x` as opaque logical time.

use std::collections::VecDeque;
use std::collections::vec_deque;

use serde::{Deserialize, Serialize};

use crate::downsample::{DownsampleMethod, downsample};
use crate::error::{ConfigError, Result};
use crate::ring::RingBuffer;
use crate::sample::Sample;

/// Rule governing which samples are kept, evicted or archived.
///
/// # Example
///
/// ```rust
/// use sluice::downsample::DownsampleMethod;
/// use sluice::retention::RetentionPolicy;
///
/// // Keep the last 60 s at full resolution, older data at one sample per second,
/// // and at most 3600 archived samples.
/// let policy = RetentionPolicy::TieredArchive {
///     recent_duration: 60_000.0,
///     recent_max_points: None,
///     archive_resolution: 1_000.0,
///     max_archive_points: Some(3_600),
///     downsample_method: DownsampleMethod::Lttb,
/// };
/// assert!(policy.validate().is_ok());
/// assert!(policy.uses_archive());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RetentionPolicy {
    /// Keep at most `max_points` samples.
    RollingCount {
        /// Maximum number of live samples.
        max_points: usize,
    },

    /// Keep samples no older than `duration` behind the newest one.
    RollingDuration {
        /// Window length in `x` units.
        duration: f64,
    },

    /// Never evict by policy. Ring capacity still bounds memory.
    Unlimited,

    /// Count limit first, then duration limit.
    Combined {
        /// Maximum number of live samples.
        max_points: usize,
        /// Window length in `x` units.
        max_duration: f64,
    },

    /// Recent data at full resolution, older data downsampled into an archive.
    TieredArchive {
        /// Length of the full-resolution window in `x` units.
        recent_duration: f64,
        /// Optional cap on full-resolution samples.
        recent_max_points: Option<usize>,
        /// Target spacing between archived samples in `x` units.
        archive_resolution: f64,
        /// Optional cap on archived samples; the oldest are dropped first.
        max_archive_points: Option<usize>,
        /// Method used to condense each archived batch.
        #[serde(default)]
        downsample_method: DownsampleMethod,
    },
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self::RollingCount { max_points: 10_000 }
    }
}

/// Outcome of one retention pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvictionReport {
    /// Samples permanently discarded (live evictions plus archive trimming).
    pub evicted_count: usize,
    /// Samples moved from the live buffer into the archive.
    pub archived_count: usize,
    /// Aged samples dropped when their batch was downsampled.
    pub condensed_count: usize,
}

impl EvictionReport {
    /// Returns `true` if the pass changed nothing.
    pub fn is_empty(&self) -> bool {
        self.evicted_count == 0 && self.archived_count == 0 && self.condensed_count == 0
    }
}

impl RetentionPolicy {
    /// Returns `true` for policies that move old samples into an [`Archive`].
    pub fn uses_archive(&self) -> bool {
        matches!(self, Self::TieredArchive { .. })
    }

    /// Validates the policy parameters.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidRetention`] if a count is zero, or a
    /// duration or resolution is negative, zero where it must be positive, or
    /// not finite.
    pub fn validate(&self) -> Result<()> {
        match *self {
            Self::RollingCount { max_points } => check_count("max_points", max_points),
            Self::RollingDuration { duration } => check_span("duration", duration),
            Self::Unlimited => Ok(()),
            Self::Combined {
                max_points,
                max_duration,
            } => {
                check_count("max_points", max_points)?;
                check_span("max_duration", max_duration)
            }
            Self::TieredArchive {
                recent_duration,
                recent_max_points,
                archive_resolution,
                max_archive_points,
                ..
            } => {
                check_span("recent_duration", recent_duration)?;
                if let Some(points) = recent_max_points {
                    check_count("recent_max_points", points)?;
                }
                if !(archive_resolution.is_finite() && archive_resolution > 0.0) {
                    return Err(invalid(format!(
                        "archive_resolution must be finite and > 0, got {archive_resolution}"
                    )));
                }
                if let Some(points) = max_archive_points {
                    check_count("max_archive_points", points)?;
                }
                Ok(())
            }
        }
    }

    /// Applies the policy to a series' live buffer and archive.
    ///
    /// An empty buffer is a no-op. The archive is only touched by
    /// [`TieredArchive`](Self::TieredArchive).
    ///
    /// # Examples
    ///
    /// ```rust
    /// use sluice::retention::{Archive, RetentionPolicy};
    /// use sluice::ring::RingBuffer;
    /// use sluice::sample::Sample;
    ///
    /// let mut buffer = RingBuffer::new(16);
    /// for i in 0..10 {
    ///     buffer.push(Sample::new(f64::from(i) * 1000.0, 1.0));
    /// }
    /// let mut archive = Archive::new();
    ///
    /// let policy = RetentionPolicy::RollingDuration { duration: 5000.0 };
    /// let report = policy.apply(&mut buffer, &mut archive);
    ///
    /// assert_eq!(report.evicted_count, 4);
    /// assert_eq!(buffer.first().map(|s| s.x), Some(4000.0));
    /// ```
    pub fn apply(&self, buffer: &mut RingBuffer<Sample>, archive: &mut Archive) -> EvictionReport {
        if buffer.is_empty() {
            return EvictionReport::default();
        }

        match *self {
            Self::RollingCount { max_points } => EvictionReport {
                evicted_count: evict_over_count(buffer, max_points),
                ..EvictionReport::default()
            },
            Self::RollingDuration { duration } => EvictionReport {
                evicted_count: evict_older_than(buffer, duration),
                ..EvictionReport::default()
            },
            Self::Unlimited => EvictionReport::default(),
            Self::Combined {
                max_points,
                max_duration,
            } => {
                let by_count = evict_over_count(buffer, max_points);
                let by_age = evict_older_than(buffer, max_duration);
                EvictionReport {
                    evicted_count: by_count + by_age,
                    ..EvictionReport::default()
                }
            }
            Self::TieredArchive {
                recent_duration,
                recent_max_points,
                archive_resolution,
                max_archive_points,
                downsample_method,
            } => {
                let batch = take_archive_batch(buffer, recent_duration, recent_max_points);
                let archived_count = batch.len();
                let condensed_count = archive.append(batch, archive_resolution, downsample_method);
                let trimmed = max_archive_points.map_or(0, |max| archive.trim_front(max));

                EvictionReport {
                    evicted_count: trimmed,
                    archived_count,
                    condensed_count,
                }
            }
        }
    }
}

fn invalid(reason: String) -> crate::error::SluiceError {
    ConfigError::InvalidRetention { reason }.into()
}

fn check_count(name: &str, value: usize) -> Result<()> {
    if value == 0 {
        return Err(invalid(format!("{name} must be > 0")));
    }
    Ok(())
}

fn check_span(name: &str, value: f64) -> Result<()> {
    if !(value.is_finite() && value >= 0.0) {
        return Err(invalid(format!("{name} must be finite and >= 0, got {value}")));
    }
    Ok(())
}

/// Pops the oldest samples until `len <= max_points`.
fn evict_over_count(buffer: &mut RingBuffer<Sample>, max_points: usize) -> usize {
    let excess = buffer.len().saturating_sub(max_points);
    for _ in 0..excess {
        buffer.pop_front();
    }
    excess
}

/// Pops the oldest samples while `x < newest.x - duration`.
fn evict_older_than(buffer: &mut RingBuffer<Sample>, duration: f64) -> usize {
    let Some(newest) = buffer.last().copied() else {
        return 0;
    };
    let cutoff = newest.x - duration;
    buffer.pop_front_while(|sample| sample.x < cutoff)
}

/// Pops every sample leaving the full-resolution window, oldest first.
fn take_archive_batch(
    buffer: &mut RingBuffer<Sample>,
    recent_duration: f64,
    recent_max_points: Option<usize>,
) -> Vec<Sample> {
    let mut batch = Vec::new();
    let Some(newest) = buffer.last().copied() else {
        return batch;
    };

    let cutoff = newest.x - recent_duration;
    while buffer.first().is_some_and(|sample| sample.x < cutoff) {
        batch.extend(buffer.pop_front());
    }

    if let Some(max_points) = recent_max_points {
        while buffer.len() > max_points {
            batch.extend(buffer.pop_front());
        }
    }

    batch
}

/// Downsamples an aged batch to roughly one sample per `resolution`.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)] // span / resolution is finite and non-negative
fn condense(batch: &[Sample], resolution: f64, method: DownsampleMethod) -> Vec<Sample> {
    if batch.len() <= 2 {
        return batch.to_vec();
    }

    let buckets = (x_span(batch) / resolution).ceil();
    let target = if buckets.is_finite() {
        (buckets as usize).clamp(2, batch.len())
    } else {
        batch.len()
    };

    downsample(batch, target, method)
}

/// Distance between the smallest and largest `x`.
fn x_span(samples: &[Sample]) -> f64 {
    let (min, max) = samples
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(min, max), s| {
            (min.min(s.x), max.max(s.x))
        });
    if min > max { 0.0 } else { max - min }
}

/// Downsampled history kept behind a series' live buffer.
///
/// Samples are kept sorted by `x`. For `x`-ordered input every archived
/// sample is older than everything still in the live buffer.
#[derive(Debug, Clone, Default)]
pub struct Archive {
    samples: VecDeque<Sample>,
}

impl Archive {
    /// Creates an empty archive.
    pub fn new() -> Self {
        Self::default()
    }

    /// Downsamples a batch of aged samples and appends it to the archive.
    ///
    /// The batch is condensed to `ceil(span / resolution)` samples, clamped
    /// to `[2, batch.len()]`. Batches of one or two samples are kept as is.
    /// A batch that starts before the archive tail (an out-of-order sample
    /// that aged out) is merged so the archive stays sorted; equal `x` values
    /// keep arrival order.
    ///
    /// # Returns
    ///
    /// The number of samples dropped by downsampling.
    pub fn append(
        &mut self,
        mut batch: Vec<Sample>,
        resolution: f64,
        method: DownsampleMethod,
    ) -> usize {
        if batch.is_empty() {
            return 0;
        }
        if !batch.is_sorted_by(|a, b| a.x <= b.x) {
            batch.sort_by(|a, b| a.x.total_cmp(&b.x));
        }

        let condensed = condense(&batch, resolution, method);
        let dropped = batch.len() - condensed.len();
        if dropped > 0 {
            tracing::debug!(
                aged = batch.len(),
                archived = condensed.len(),
                "condensed aged samples into archive"
            );
        }

        let needs_merge = match (self.samples.back(), condensed.first()) {
            (Some(tail), Some(first)) => first.x < tail.x,
            _ => false,
        };
        self.samples.extend(condensed);
        if needs_merge {
            self.samples
                .make_contiguous()
                .sort_by(|a, b| a.x.total_cmp(&b.x));
        }
        dropped
    }

    /// Drops the oldest samples until at most `max_points` remain.
    ///
    /// # Returns
    ///
    /// The number of dropped samples.
    pub fn trim_front(&mut self, max_points: usize) -> usize {
        let excess = self.samples.len().saturating_sub(max_points);
        self.samples.drain(..excess);
        excess
    }

    /// Returns the oldest archived sample.
    pub fn first(&self) -> Option<&Sample> {
        self.samples.front()
    }

    /// Returns the newest archived sample.
    pub fn last(&self) -> Option<&Sample> {
        self.samples.back()
    }

    /// Iterates in chronological order.
    pub fn iter(&self) -> vec_deque::Iter<'_, Sample> {
        self.samples.iter()
    }

    /// Returns the first index whose sample fails `predicate`.
    ///
    /// The archive must be partitioned by the predicate, as with
    /// `slice::partition_point`.
    pub fn partition_point<P>(&self, predicate: P) -> usize
    where
        P: FnMut(&Sample) -> bool,
    {
        self.samples.partition_point(predicate)
    }

    /// Returns the archived samples as a vector.
    pub fn to_vec(&self) -> Vec<Sample> {
        self.samples.iter().copied().collect()
    }

    /// Removes every archived sample.
    pub fn clear(&mut self) {
        self.samples.clear();
    }

    /// Returns the number of archived samples.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Returns `true` if nothing is archived.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

impl<'a> IntoIterator for &'a Archive {
    type Item = &'a Sample;
    type IntoIter = vec_deque::Iter<'a, Sample>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
