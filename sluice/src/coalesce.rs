//! Frame-coalesced change notification.
//!
//! [`FrameCoalescer`] turns any number of dirty marks between two host ticks
//! into a single repaint notification. The host drives it by calling
//! [`tick`](FrameCoalescer::tick) once per frame, either from its own render
//! loop or through a [`FrameDriver`](crate::driver::FrameDriver).
//!
//! Guarantees:
//!
//! - at most one notification per tick
//! - one or more marks since the last tick fire exactly one notification on the next tick
//! - no marks, no notification
//! - with coalescing disabled, every mark notifies synchronously

use std::fmt;

/// Callback invoked when a repaint is due. Carries no payload.
pub type RepaintListener = Box<dyn FnMut() + Send>;

/// Handle returned when registering a listener, used to remove it later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(pub(crate) u64);

/// Collapses bursts of dirty marks into one notification per tick.
pub struct FrameCoalescer {
    enabled: bool,
    pending: bool,
    disposed: bool,
    next_id: u64,
    listeners: Vec<(ListenerId, RepaintListener)>,
    notifications: u64,
    absorbed: u64,
}

impl FrameCoalescer {
    /// Creates a coalescer. With `enabled == false` every mark notifies
    /// immediately.
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            pending: false,
            disposed: false,
            next_id: 0,
            listeners: Vec::new(),
            notifications: 0,
            absorbed: 0,
        }
    }

    /// Registers a repaint listener.
    ///
    /// Listeners registered after [`dispose`](Self::dispose) are dropped
    /// immediately and never called.
    pub fn add_listener(&mut self, listener: RepaintListener) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        if !self.disposed {
            self.listeners.push((id, listener));
        }
        id
    }

    /// Removes a listener. Returns `false` if it was not registered.
    pub fn remove_listener(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(listener_id, _)| *listener_id != id);
        self.listeners.len() != before
    }

    /// Records that something changed.
    ///
    /// A no-op after [`dispose`](Self::dispose).
    pub fn mark_dirty(&mut self) {
        if self.disposed {
            return;
        }
        if !self.enabled {
            self.notify();
        } else if self.pending {
            self.absorbed += 1;
        } else {
            self.pending = true;
        }
    }

    /// Host frame tick. Fires one notification if a mark is pending.
    ///
    /// # Returns
    ///
    /// `true` if a notification fired.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use std::sync::Arc;
    /// use std::sync::atomic::{AtomicUsize, Ordering};
    /// use sluice::coalesce::FrameCoalescer;
    ///
    /// let fired = Arc::new(AtomicUsize::new(0));
    /// let counter = Arc::clone(&fired);
    ///
    /// let mut coalescer = FrameCoalescer::new(true);
    /// coalescer.add_listener(Box::new(move || {
    ///     counter.fetch_add(1, Ordering::Relaxed);
    /// }));
    ///
    /// for _ in 0..1000 {
    ///     coalescer.mark_dirty();
    /// }
    /// assert!(coalescer.tick());
    /// assert!(!coalescer.tick());
    /// assert_eq!(fired.load(Ordering::Relaxed), 1);
    /// ```
    pub fn tick(&mut self) -> bool {
        if self.disposed || !self.pending {
            return false;
        }
        self.pending = false;
        self.notify();
        true
    }

    /// Cancels any pending notification and detaches every listener.
    ///
    /// Later marks and ticks are silent no-ops.
    pub fn dispose(&mut self) {
        self.pending = false;
        self.disposed = true;
        self.listeners.clear();
    }

    fn notify(&mut self) {
        self.notifications += 1;
        for (_, listener) in &mut self.listeners {
            listener();
        }
    }

    /// Returns `true` if a notification will fire on the next tick.
    pub fn is_pending(&self) -> bool {
        self.pending
    }

    /// Returns `true` if marks are batched per tick.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Returns `true` once [`dispose`](Self::dispose) has run.
    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Lifetime count of fired notifications.
    pub fn notifications_fired(&self) -> u64 {
        self.notifications
    }

    /// Lifetime count of marks folded into an already pending notification.
    pub fn marks_absorbed(&self) -> u64 {
        self.absorbed
    }

    /// Returns the number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}

impl Default for FrameCoalescer {
    fn default() -> Self {
        Self::new(true)
    }
}

impl fmt::Debug for FrameCoalescer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameCoalescer")
            .field("enabled", &self.enabled)
            .field("pending", &self.pending)
            .field("disposed", &self.disposed)
            .field("listeners", &self.listeners.len())
            .field("notifications", &self.notifications)
            .field("absorbed", &self.absorbed)
            .finish()
    }
}
