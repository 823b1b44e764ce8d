//! Downsampling of sample sequences.
//!
//! Pure functions that reduce a sequence of samples to a target count while
//! keeping what matters for display. Nothing here holds state, allocates
//! beyond the output vector, or uses randomness: identical input and method
//! always give bit-identical output.
//!
//! # Methods
//!
//! | Method | Keeps | Typical use |
//! |---|---|---|
//! | [`Lttb`](DownsampleMethod::Lttb) | visually salient points | default for line charts |
//! | [`First`](DownsampleMethod::First) / [`Last`](DownsampleMethod::Last) | one raw sample per bucket | cheap decimation |
//! | [`Average`](DownsampleMethod::Average) | bucket centroid | smoothing noisy data |
//! | [`MinMax`](DownsampleMethod::MinMax) | both extremes per bucket | spikes must never vanish |
//!
//! # Bucketing
//!
//! `First`, `Last`, `Average` and `MinMax` split the input by index into
//! equal-width buckets using integer boundaries `i * n / buckets`, so every
//! bucket is non-empty when `n > buckets`. LTTB uses floating bucket widths
//! over the interior points, as in Steinarsson's reference formulation.

use serde::{Deserialize, Serialize};

use crate::sample::Sample;

/// Algorithm used to reduce a sample sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownsampleMethod {
    /// First sample of each bucket.
    First,

    /// Last sample of each bucket.
    Last,

    /// Centroid of each bucket: mean `x`, mean of the non-NaN `y` values.
    Average,

    /// Minimum- and maximum-`y` samples of each bucket, in `x` order.
    MinMax,

    /// Largest-Triangle-Three-Buckets.
    #[default]
    Lttb,
}

impl DownsampleMethod {
    /// Returns all methods, in declaration order.
    pub const ALL: [Self; 5] = [
        Self::First,
        Self::Last,
        Self::Average,
        Self::MinMax,
        Self::Lttb,
    ];

    /// Returns the lowercase name used in configuration files.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::First => "first",
            Self::Last => "last",
            Self::Average => "average",
            Self::MinMax => "min_max",
            Self::Lttb => "lttb",
        }
    }
}

/// Reduces `samples` to about `target_count` samples using `method`.
///
/// - If `samples.len() <= target_count` the input is returned unchanged.
/// - `target_count <= 1` returns the last sample; `target_count == 2` returns
///   the first and last samples, for every method.
/// - Otherwise the method decides; see [`DownsampleMethod`].
///
/// # Examples
///
/// ```rust
/// use sluice::downsample::{downsample, DownsampleMethod};
/// use sluice::sample::Sample;
///
/// let samples: Vec<Sample> = (0..100).map(|i| Sample::new(f64::from(i), f64::from(i))).collect();
/// let reduced = downsample(&samples, 10, DownsampleMethod::Lttb);
///
/// assert_eq!(reduced.len(), 10);
/// assert_eq!(reduced[0], Sample::new(0.0, 0.0));
/// assert_eq!(reduced[9], Sample::new(99.0, 99.0));
/// ```
pub fn downsample(
    samples: &[Sample],
    target_count: usize,
    method: DownsampleMethod,
) -> Vec<Sample> {
    let n = samples.len();
    if n <= target_count {
        return samples.to_vec();
    }

    // n > target_count >= 0, so samples is non-empty below
    let (first, last) = (samples[0], samples[n - 1]);
    match target_count {
        0 | 1 => return vec![last],
        2 => return vec![first, last],
        _ => {}
    }

    match method {
        DownsampleMethod::First => bucket_pick(samples, target_count, |bucket| bucket[0]),
        DownsampleMethod::Last => {
            bucket_pick(samples, target_count, |bucket| bucket[bucket.len() - 1])
        }
        DownsampleMethod::Average => bucket_pick(samples, target_count, centroid),
        DownsampleMethod::MinMax => min_max(samples, target_count),
        DownsampleMethod::Lttb => lttb(samples, target_count),
    }
}

/// Index range of bucket `index` out of `buckets` over `n` elements.
#[inline]
fn bucket_bounds(index: usize, buckets: usize, n: usize) -> (usize, usize) {
    (index * n / buckets, (index + 1) * n / buckets)
}

/// Emits one sample per equal-width bucket.
fn bucket_pick<F>(samples: &[Sample], buckets: usize, mut pick: F) -> Vec<Sample>
where
    F: FnMut(&[Sample]) -> Sample,
{
    let n = samples.len();
    (0..buckets)
        .map(|index| {
            let (start, end) = bucket_bounds(index, buckets, n);
            pick(&samples[start..end])
        })
        .collect()
}

/// Mean `x` and mean non-NaN `y` of a non-empty bucket.
///
/// A bucket made only of gaps stays a gap.
#[allow(clippy::cast_precision_loss)] // Bucket sizes are far below 2^52
fn centroid(bucket: &[Sample]) -> Sample {
    let x = bucket.iter().map(|s| s.x).sum::<f64>() / bucket.len() as f64;

    let (sum_y, count_y) = bucket
        .iter()
        .filter(|s| !s.y.is_nan())
        .fold((0.0, 0usize), |(sum, count), s| (sum + s.y, count + 1));
    let y = if count_y == 0 {
        f64::NAN
    } else {
        sum_y / count_y as f64
    };

    Sample { x, y }
}

/// Min/max decimation: two samples per bucket, `target_count / 2` buckets.
fn min_max(samples: &[Sample], target_count: usize) -> Vec<Sample> {
    let n = samples.len();
    let buckets = (target_count / 2).max(1);
    let mut out = Vec::with_capacity(buckets * 2);

    for index in 0..buckets {
        let (start, end) = bucket_bounds(index, buckets, n);
        let bucket = &samples[start..end];

        let mut min_index: Option<usize> = None;
        let mut max_index: Option<usize> = None;
        for (offset, sample) in bucket.iter().enumerate() {
            if sample.y.is_nan() {
                continue;
            }
            if min_index.is_none_or(|m| sample.y < bucket[m].y) {
                min_index = Some(offset);
            }
            if max_index.is_none_or(|m| sample.y > bucket[m].y) {
                max_index = Some(offset);
            }
        }

        match (min_index, max_index) {
            (Some(lo), Some(hi)) if lo == hi => out.push(bucket[lo]),
            (Some(lo), Some(hi)) => {
                let (a, b) = (bucket[lo], bucket[hi]);
                // Order by x; fall back to input order on equal x
                if b.x < a.x || (b.x == a.x && hi < lo) {
                    out.extend([b, a]);
                } else {
                    out.extend([a, b]);
                }
            }
            // All gaps: keep the gap so the renderer still breaks the line
            _ => out.push(bucket[0]),
        }
    }

    out
}

/// Largest-Triangle-Three-Buckets.
///
/// Always keeps the first and last sample. The `n - 2` interior samples are
/// split into `target_count - 2` buckets of floating width
/// `(n - 2) / (target_count - 2)`. From each bucket the sample forming the
/// largest triangle with the previously selected sample and the centroid of
/// the next bucket is kept; for the final bucket the true last sample stands
/// in for the centroid. Ties keep the earliest candidate, and candidates whose
/// area is NaN (gaps) never win over a finite area.
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)] // Indices are non-negative and far below 2^52
fn lttb(samples: &[Sample], target_count: usize) -> Vec<Sample> {
    let n = samples.len();
    let inner_buckets = target_count - 2;
    let every = (n - 2) as f64 / inner_buckets as f64;

    let bucket_start = |index: usize| -> usize { ((index as f64 * every) as usize + 1).min(n - 1) };

    let mut out = Vec::with_capacity(target_count);
    out.push(samples[0]);
    let mut anchor = samples[0];

    for index in 0..inner_buckets {
        let start = bucket_start(index);
        let end = bucket_start(index + 1).max(start + 1).min(n - 1);

        let (avg_x, avg_y) = if index + 1 == inner_buckets {
            (samples[n - 1].x, samples[n - 1].y)
        } else {
            let next_start = end;
            let next_end = bucket_start(index + 2).max(next_start + 1).min(n - 1);
            let next = &samples[next_start..next_end];
            let len = next.len() as f64;
            (
                next.iter().map(|s| s.x).sum::<f64>() / len,
                next.iter().map(|s| s.y).sum::<f64>() / len,
            )
        };

        let mut best = start;
        let mut best_area = -1.0;
        for (candidate, point) in samples[start..end].iter().enumerate() {
            let area = ((anchor.x - avg_x) * (point.y - anchor.y)
                - (anchor.x - point.x) * (avg_y - anchor.y))
                .abs()
                * 0.5;
            if area > best_area {
                best_area = area;
                best = start + candidate;
            }
        }

        anchor = samples[best];
        out.push(anchor);
    }

    out.push(samples[n - 1]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(n: u32) -> Vec<Sample> {
        (0..n)
            .map(|i| Sample::new(f64::from(i), f64::from(i)))
            .collect()
    }

    #[test]
    fn test_short_input_unchanged() {
        let samples = ramp(5);
        for method in DownsampleMethod::ALL {
            assert_eq!(downsample(&samples, 5, method), samples);
            assert_eq!(downsample(&samples, 50, method), samples);
        }
        assert!(downsample(&[], 0, DownsampleMethod::Lttb).is_empty());
    }

    #[test]
    fn test_tiny_targets() {
        let samples = ramp(10);
        for method in DownsampleMethod::ALL {
            assert_eq!(downsample(&samples, 0, method), vec![samples[9]]);
            assert_eq!(downsample(&samples, 1, method), vec![samples[9]]);
            assert_eq!(downsample(&samples, 2, method), vec![samples[0], samples[9]]);
        }
    }

    #[test]
    fn test_lttb_ramp() {
        let samples = ramp(100);
        let out = downsample(&samples, 10, DownsampleMethod::Lttb);

        assert_eq!(out.len(), 10);
        assert_eq!(out[0], Sample::new(0.0, 0.0));
        assert_eq!(out[9], Sample::new(99.0, 99.0));
        assert!(out.windows(2).all(|w| w[0].x < w[1].x));
    }

    #[test]
    fn test_lttb_keeps_spike() {
        let mut samples = ramp(200)
            .into_iter()
            .map(|s| Sample::new(s.x, 1.0))
            .collect::<Vec<_>>();
        samples[137].y = 500.0;

        let out = downsample(&samples, 20, DownsampleMethod::Lttb);
        assert!(out.iter().any(|s| s.y == 500.0));
    }

    #[test]
    fn test_lttb_exact_length_for_awkward_ratios() {
        for n in [7u32, 13, 101, 997] {
            let samples = ramp(n);
            for target in 3..(n as usize).min(40) {
                let out = downsample(&samples, target, DownsampleMethod::Lttb);
                assert_eq!(out.len(), target, "n={n} target={target}");
                assert!(out.windows(2).all(|w| w[0].x < w[1].x));
            }
        }
    }

    #[test]
    fn test_lttb_with_gaps_is_stable() {
        let samples: Vec<_> = (0..50)
            .map(|i| {
                let y = if i % 7 == 0 { f64::NAN } else { f64::from(i % 5) };
                Sample::new(f64::from(i), y)
            })
            .collect();

        let a = downsample(&samples, 12, DownsampleMethod::Lttb);
        let b = downsample(&samples, 12, DownsampleMethod::Lttb);
        assert_eq!(a.len(), 12);
        assert_eq!(format!("{a:?}"), format!("{b:?}"));
    }

    #[test]
    fn test_first_and_last() {
        let samples = ramp(10);

        let first = downsample(&samples, 5, DownsampleMethod::First);
        let xs: Vec<_> = first.iter().map(|s| s.x).collect();
        assert_eq!(xs, vec![0.0, 2.0, 4.0, 6.0, 8.0]);

        let last = downsample(&samples, 5, DownsampleMethod::Last);
        let xs: Vec<_> = last.iter().map(|s| s.x).collect();
        assert_eq!(xs, vec![1.0, 3.0, 5.0, 7.0, 9.0]);
    }

    #[test]
    fn test_average_centroids() {
        let samples = ramp(9);
        let out = downsample(&samples, 3, DownsampleMethod::Average);

        assert_eq!(out, vec![
            Sample::new(1.0, 1.0),
            Sample::new(4.0, 4.0),
            Sample::new(7.0, 7.0),
        ]);
    }

    #[test]
    fn test_average_skips_gaps() {
        let samples = vec![
            Sample::new(0.0, 2.0),
            Sample::new(1.0, f64::NAN),
            Sample::new(2.0, 4.0),
            Sample::new(3.0, f64::NAN),
            Sample::new(4.0, f64::NAN),
            Sample::new(5.0, f64::NAN),
        ];
        let out = downsample(&samples, 3, DownsampleMethod::Average);

        assert_eq!(out[0], Sample::new(0.5, 2.0));
        assert_eq!(out[1], Sample::new(2.5, 4.0));
        assert!(out[2].y.is_nan());
        assert_eq!(out[2].x, 4.5);
    }

    #[test]
    fn test_min_max_keeps_extremes_in_x_order() {
        let ys = [5.0, 9.0, 1.0, 4.0, 3.0, 3.0, 8.0, 0.0];
        let samples: Vec<_> = ys
            .iter()
            .enumerate()
            .map(|(i, &y)| Sample::new(i as f64, y))
            .collect();

        // 4 target -> 2 buckets of 4
        let out = downsample(&samples, 4, DownsampleMethod::MinMax);
        assert_eq!(out, vec![
            Sample::new(1.0, 9.0),
            Sample::new(2.0, 1.0),
            Sample::new(6.0, 8.0),
            Sample::new(7.0, 0.0),
        ]);
    }

    #[test]
    fn test_min_max_flat_bucket_emitted_once() {
        let samples: Vec<_> = (0..6).map(|i| Sample::new(f64::from(i), 7.0)).collect();
        let out = downsample(&samples, 4, DownsampleMethod::MinMax);

        // Each bucket's min and max are the same sample
        assert_eq!(out, vec![Sample::new(0.0, 7.0), Sample::new(3.0, 7.0)]);
    }

    #[test]
    fn test_min_max_single_bucket() {
        let samples = ramp(10);
        let out = downsample(&samples, 3, DownsampleMethod::MinMax);
        assert_eq!(out, vec![Sample::new(0.0, 0.0), Sample::new(9.0, 9.0)]);
    }

    #[test]
    fn test_method_names() {
        for method in DownsampleMethod::ALL {
            let json = serde_json::to_string(&method).unwrap();
            assert_eq!(json, format!("\"{}\"", method.as_str()));
        }
        assert_eq!(DownsampleMethod::default(), DownsampleMethod::Lttb);
    }
}
