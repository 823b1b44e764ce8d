//! Integration tests for the live series controller.

use sluice::config::{ControllerConfig, DuplicateTimestampBehavior, OutOfOrderBehavior};
use sluice::controller::{LiveEvent, LiveSeriesController};
use sluice::downsample::DownsampleMethod;
use sluice::rate::ManualClock;
use sluice::retention::RetentionPolicy;
use sluice::ring::RingBuffer;
use sluice::sample::Sample;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[test]
fn test_ring_buffer_eviction_sequence() {
    let mut ring = RingBuffer::new(3);
    let evicted: Vec<_> = (1..=5).map(|i| ring.push(i)).collect();

    assert_eq!(evicted, vec![None, None, None, Some(1), Some(2)]);
    assert_eq!(ring.to_vec(), vec![3, 4, 5]);
}

#[test]
fn test_live_feed_end_to_end() {
    // 100 Hz feed, x in milliseconds, 10 s rolling window
    let clock = ManualClock::new();
    let config = ControllerConfig::new(
        2_000,
        RetentionPolicy::Combined {
            max_points: 1_500,
            max_duration: 10_000.0,
        },
    );
    let mut controller = LiveSeriesController::with_clock(config, Arc::new(clock.clone())).unwrap();

    let repaints = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&repaints);
    controller.on_repaint(move || {
        counter.fetch_add(1, Ordering::Relaxed);
    });

    // 30 s of data, delivered in 60 Hz frames
    let mut t: f64 = 0.0;
    let mut frames = 0;
    while t < 30_000.0 {
        let frame_end = t + 1000.0 / 60.0;
        while t < frame_end {
            controller.add_point("temp", (t, (t / 500.0).sin()));
            controller.add_point("load", (t, t / 30_000.0));
            t += 10.0;
        }
        clock.advance(Duration::from_micros(16_667));
        if controller.tick() {
            frames += 1;
        }
    }

    assert_eq!(repaints.load(Ordering::Relaxed), frames);

    let (min_x, max_x) = controller.get_data_range("temp").unwrap();
    assert!(max_x - min_x <= 10_000.0);
    assert!(controller.series_len("temp") <= 1_001);

    let stats = controller.get_statistics();
    assert_eq!(stats.totals.series_count, 2);
    assert_eq!(stats.per_series["temp"].total_received, 3_000);
    let rate = stats.per_series["temp"].ingest_rate_hz;
    assert!(rate > 80.0 && rate < 120.0, "rate = {rate}");

    let visible = controller.get_points_downsampled("temp", 300, DownsampleMethod::Lttb);
    assert_eq!(visible.len(), 300);
    assert_eq!(visible.first().copied(), controller.get_oldest("temp"));
    assert_eq!(visible.last().copied(), controller.get_latest("temp"));
}

#[test]
fn test_duplicate_average_scenario() {
    let config = ControllerConfig::default().with_duplicates(DuplicateTimestampBehavior::Average);
    let mut controller = LiveSeriesController::new(config).unwrap();

    controller.add_point("s", Sample::new(100.0, 10.0));
    controller.add_point("s", Sample::new(100.0, 20.0));

    assert_eq!(controller.get_points("s"), vec![Sample::new(100.0, 15.0)]);
}

#[test]
fn test_malformed_stream_does_not_stop_ingestion() {
    let config = ControllerConfig::default().with_out_of_order(OutOfOrderBehavior::Reject);
    let mut controller = LiveSeriesController::new(config).unwrap();

    let batch = [
        (0.0, 1.0),
        (f64::NAN, 2.0),
        (1.0, f64::INFINITY),
        (0.5, 3.0),
        (2.0, f64::NAN),
        (f64::INFINITY, 4.0),
        (3.0, 5.0),
    ];
    let accepted = controller.add_points("s", batch);

    assert_eq!(accepted, 4);
    let points = controller.get_points("s");
    let xs: Vec<_> = points.iter().map(|s| s.x).collect();
    assert_eq!(xs, vec![0.0, 1.0, 2.0, 3.0]);
    assert_eq!(points[1].y, 0.0);
    assert!(points[2].is_gap());

    let stats = controller.get_statistics();
    assert_eq!(stats.per_series["s"].total_rejected, 3);
    assert_eq!(stats.per_series["s"].total_accepted, 4);
}

#[test]
fn test_paused_consumer_is_warned_about_evictions() {
    let config = ControllerConfig::new(100, RetentionPolicy::RollingCount { max_points: 50 });
    let mut controller = LiveSeriesController::new(config).unwrap();
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    controller.subscribe(move |event| sink.lock().unwrap().push(event.clone()));

    controller.add_points("s", (0..50).map(|i| (f64::from(i), 0.0)));
    controller.pause();
    controller.add_points("s", (50..60).map(|i| (f64::from(i), 0.0)));
    let shrunk = controller.set_capacity(20).unwrap();
    controller.resume();

    assert_eq!(shrunk, 30);
    assert_eq!(controller.get_oldest("s"), Some(Sample::new(40.0, 0.0)));
    assert_eq!(*events.lock().unwrap(), vec![
        LiveEvent::PauseChanged { paused: true },
        LiveEvent::ViewedDataEvicted {
            series: "s".to_string(),
            count: 10,
        },
        LiveEvent::ViewedDataEvicted {
            series: "s".to_string(),
            count: 30,
        },
        LiveEvent::PauseChanged { paused: false },
    ]);
}

#[test]
fn test_tiered_controller_keeps_history_bounded() {
    let config = ControllerConfig::new(10_000, RetentionPolicy::TieredArchive {
        recent_duration: 1_000.0,
        recent_max_points: None,
        archive_resolution: 100.0,
        max_archive_points: Some(200),
        downsample_method: DownsampleMethod::MinMax,
    });
    let mut controller = LiveSeriesController::new(config).unwrap();

    // One hour at 10 Hz
    for i in 0..36_000u32 {
        let x = f64::from(i) * 100.0;
        controller.add_point("s", (x, f64::from(i % 100)));
    }

    let stats = controller.get_statistics();
    let series = &stats.per_series["s"];
    assert!(series.archived_count <= 200);
    assert!(series.point_count <= 200 + 11);
    assert!(series.total_evicted > 0);
    assert_eq!(controller.get_latest("s").map(|s| s.x), Some(3_599_900.0));

    let points = controller.get_points("s");
    assert!(points.windows(2).all(|w| w[0].x <= w[1].x));
    let in_last_second = controller.get_points_in_range("s", 3_598_900.0, 3_599_900.0);
    assert_eq!(in_last_second.len(), 11);
}

#[test]
fn test_clear_then_resume_ingestion() {
    let mut controller = LiveSeriesController::new(ControllerConfig::default()).unwrap();
    controller.add_points("a", [(5.0, 1.0), (6.0, 1.0)]);
    controller.clear(None);

    // Ordering restarts after clear
    assert!(controller.add_point("a", (1.0, 1.0)));
    assert_eq!(controller.get_points("a"), vec![Sample::new(1.0, 1.0)]);
    assert_eq!(controller.get_statistics().per_series["a"].total_received, 3);
}
