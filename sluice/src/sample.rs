//! The `(x, y)` sample type and input sanitization.

use serde::{Deserialize, Serialize};

/// A single timestamped measurement.
///
/// `x` is logical time (commonly epoch milliseconds) and is opaque to the
/// pipeline beyond ordering and subtraction. `y` is the measured value. Once a
/// sample has passed [`Sample::sanitize`], `y` is either finite or NaN, where
/// NaN marks an intentional gap for the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Sample {
    /// Logical time.
    pub x: f64,
    /// Measured value.
    pub y: f64,
}

/// Outcome of sanitizing an incoming sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Sanitized {
    /// The sample was already well-formed.
    Clean(Sample),
    /// `y` is NaN and is kept as a rendering gap.
    Gap(Sample),
    /// `y` was infinite and has been replaced with `0.0`.
    Replaced {
        /// The sample with the substituted value.
        sample: Sample,
        /// The infinite value that was replaced.
        original: f64,
    },
    /// `x` is NaN or infinite; the sample cannot be ordered.
    InvalidX(Sample),
}

impl Sample {
    /// Creates a new sample.
    #[inline]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Returns `true` if `y` is a gap marker.
    #[inline]
    pub fn is_gap(&self) -> bool {
        self.y.is_nan()
    }

    /// Classifies and repairs a raw sample.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use sluice::sample::{Sample, Sanitized};
    ///
    /// let out = Sample::new(1.0, f64::INFINITY).sanitize();
    /// assert!(matches!(out, Sanitized::Replaced { sample, .. } if sample.y == 0.0));
    /// assert!(matches!(Sample::new(1.0, f64::NAN).sanitize(), Sanitized::Gap(_)));
    /// ```
    pub fn sanitize(self) -> Sanitized {
        if !self.x.is_finite() {
            Sanitized::InvalidX(self)
        } else if self.y.is_nan() {
            Sanitized::Gap(self)
        } else if self.y.is_infinite() {
            Sanitized::Replaced {
                sample: Self { x: self.x, y: 0.0 },
                original: self.y,
            }
        } else {
            Sanitized::Clean(self)
        }
    }
}

impl From<(f64, f64)> for Sample {
    fn from((x, y): (f64, f64)) -> Self {
        Self { x, y }
    }
}

impl From<Sample> for (f64, f64) {
    fn from(sample: Sample) -> Self {
        (sample.x, sample.y)
    }
}
