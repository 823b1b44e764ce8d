//! Integration tests for cross-thread ingestion with a frame driver.

use sluice::config::ControllerConfig;
use sluice::controller::LiveSeriesController;
use sluice::driver::{FrameDriver, shared};
use sluice::retention::RetentionPolicy;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

#[test]
fn test_producer_and_frame_threads() {
    let controller = shared(
        LiveSeriesController::new(ControllerConfig::new(
            512,
            RetentionPolicy::RollingCount { max_points: 256 },
        ))
        .unwrap(),
    );

    let frames = Arc::new(AtomicUsize::new(0));
    let seen = Arc::new(Mutex::new(Vec::new()));
    let driver = {
        let reader = Arc::clone(&controller);
        let frames = Arc::clone(&frames);
        let seen = Arc::clone(&seen);
        FrameDriver::spawn(Arc::clone(&controller), Duration::from_millis(2), move || {
            frames.fetch_add(1, Ordering::Relaxed);
            // The driver released the lock before calling back
            if let Ok(guard) = reader.lock() {
                seen.lock().unwrap().push(guard.series_len("s"));
            }
        })
    };

    let producer = {
        let controller = Arc::clone(&controller);
        thread::spawn(move || {
            for chunk in 0..50u32 {
                let batch: Vec<_> = (0..20u32)
                    .map(|i| (f64::from(chunk * 20 + i), f64::from(i)))
                    .collect();
                controller.lock().unwrap().add_points("s", batch);
                thread::sleep(Duration::from_millis(1));
            }
        })
    };
    producer.join().unwrap();

    let deadline = Instant::now() + Duration::from_secs(5);
    while controller.lock().unwrap().has_pending_repaint() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(2));
    }
    driver.stop();

    let frames = frames.load(Ordering::Relaxed);
    assert!(frames >= 1);
    // Never more frames than write batches
    assert!(frames <= 50);

    let seen = seen.lock().unwrap();
    assert!(seen.iter().all(|&len| len <= 256));
    assert_eq!(controller.lock().unwrap().series_len("s"), 256);
    assert_eq!(controller.lock().unwrap().get_latest("s").map(|s| s.x), Some(999.0));
}
