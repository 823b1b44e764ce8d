//! Background frame ticking for hosts without a render loop.
//!
//! A host that already has a frame callback calls
//! [`LiveSeriesController::tick`] from it. Headless hosts (tests, simulators,
//! terminal dashboards) can instead spawn a [`FrameDriver`], which ticks a
//! shared controller at a fixed interval on its own thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::controller::LiveSeriesController;

/// A controller shared between a producer thread and a frame thread.
pub type SharedController = Arc<Mutex<LiveSeriesController>>;

/// Wraps a controller for sharing across threads.
pub fn shared(controller: LiveSeriesController) -> SharedController {
    Arc::new(Mutex::new(controller))
}

/// Ticks a [`SharedController`] once per frame on a background thread.
///
/// After every tick that fired a notification, `on_frame` runs with the
/// controller unlocked, so the consumer can lock it again to read points.
/// The thread stops on [`stop`](Self::stop) or when the driver is dropped.
#[derive(Debug)]
pub struct FrameDriver {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl FrameDriver {
    /// Spawns the frame thread.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use std::sync::atomic::{AtomicUsize, Ordering};
    /// use std::sync::Arc;
    /// use std::time::Duration;
    ///
    /// use sluice::config::ControllerConfig;
    /// use sluice::controller::LiveSeriesController;
    /// use sluice::driver::{shared, FrameDriver};
    ///
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let controller = shared(LiveSeriesController::new(ControllerConfig::default())?);
    /// let frames = Arc::new(AtomicUsize::new(0));
    /// let counter = Arc::clone(&frames);
    ///
    /// let driver = FrameDriver::spawn(Arc::clone(&controller), Duration::from_millis(5), move || {
    ///     counter.fetch_add(1, Ordering::Relaxed);
    /// });
    /// driver.stop();
    /// # Ok(())
    /// # }
    /// ```
    pub fn spawn<F>(controller: SharedController, interval: Duration, mut on_frame: F) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);

        let handle = thread::spawn(move || {
            while !flag.load(Ordering::Acquire) {
                thread::sleep(interval);

                let fired = match controller.lock() {
                    Ok(mut guard) => guard.tick(),
                    Err(_) => {
                        tracing::warn!("controller mutex poisoned, stopping frame driver");
                        break;
                    }
                };

                if fired {
                    on_frame();
                }
            }
            tracing::trace!("frame driver stopped");
        });

        Self {
            stop,
            handle: Some(handle),
        }
    }

    /// Stops the frame thread and waits for it to exit.
    pub fn stop(mut self) {
        self.shutdown();
    }

    /// Returns `true` while the frame thread is running.
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            tracing::warn!("frame driver thread panicked");
        }
    }
}

impl Drop for FrameDriver {
    fn drop(&mut self) {
        self.shutdown();
    }
}
