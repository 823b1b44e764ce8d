//! # sluice
//!
//! Bounded live time-series pipeline for real-time charts.
//!
//! sluice ingests unbounded streams of `(x, y)` samples per named series,
//! keeps memory bounded under configurable retention rules, preserves the
//! shape of older data through downsampling, and tells a consumer when to
//! redraw at most once per frame.
//!
//! **Status**: This crate is in early development. The API is not yet stable.
//!
//! ## Key Properties
//!
//! - Fixed-capacity ring buffers with O(1) amortized insert and evict
//! - Rolling count, rolling duration, combined and tiered-archive retention
//! - LTTB, min/max, average, first and last downsampling, all deterministic
//! - Out-of-order and duplicate timestamp policies
//! - Frame-coalesced repaint notifications
//! - No background threads unless the host asks for a [`FrameDriver`]
//!
//! ## Quick Start
//!
//! ```rust
//! use sluice::{ControllerConfig, DownsampleMethod, LiveSeriesController, RetentionPolicy};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Keep the last 30 s (x in milliseconds) of every series
//! let config = ControllerConfig::new(
//!     4096,
//!     RetentionPolicy::RollingDuration { duration: 30_000.0 },
//! );
//! let mut controller = LiveSeriesController::new(config)?;
//!
//! controller.on_repaint(|| {
//!     // schedule a redraw
//! });
//!
//! // Producer side
//! for i in 0..1000 {
//!     let t = f64::from(i) * 50.0;
//!     controller.add_point("cpu.usage", (t, (t / 1000.0).sin()));
//! }
//!
//! // Once per frame
//! if controller.tick() {
//!     let visible = controller.get_points_downsampled("cpu.usage", 200, DownsampleMethod::Lttb);
//!     assert_eq!(visible.len(), 200);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`LiveSeriesController`] — Owns every series; runs the ingest pipeline and answers queries
//! - [`ControllerConfig`] — Capacity, retention, ordering, duplicate and coalescing settings
//! - [`RetentionPolicy`] — When samples are evicted or archived
//! - [`FrameCoalescer`] — Collapses dirty marks into one notification per tick
//!
//! ## Modules
//!
//! For lower-level access, the individual modules are also public:
//!
//! - [`controller`] — Ingest pipeline, queries, pause and event listeners
//! - [`config`] — Controller configuration and ordering/duplicate policies
//! - [`ring`] — Fixed-capacity circular buffer
//! - [`retention`] — Retention policies and the tiered archive
//! - [`downsample`] — Downsampling algorithms
//! - [`coalesce`] — Frame-coalesced change notification
//! - [`rate`] — Sliding-window ingest rate and clocks
//! - [`stats`] — Statistics snapshots
//! - [`driver`] — Background frame thread for headless hosts
//! - [`sample`] — The sample type and sanitization
//! - [`error`] — Error types

pub mod coalesce;
pub mod config;
pub mod controller;
pub mod downsample;
pub mod driver;
pub mod error;
pub mod rate;
pub mod retention;
pub mod ring;
pub mod sample;
pub mod stats;

// Re-export primary API types at crate root for convenience.
pub use coalesce::{FrameCoalescer, ListenerId};
pub use config::{ControllerConfig, DuplicateTimestampBehavior, OutOfOrderBehavior};
pub use controller::{LiveEvent, LiveSeriesController, SubscriptionId};
pub use downsample::{DownsampleMethod, downsample};
pub use driver::{FrameDriver, SharedController};
pub use error::{Result, SluiceError};
pub use retention::{Archive, EvictionReport, RetentionPolicy};
pub use ring::RingBuffer;
pub use sample::Sample;
pub use stats::LiveStatistics;
