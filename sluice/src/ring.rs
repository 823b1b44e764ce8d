//! Fixed-capacity ring buffer for live series storage.
//!
//! This module provides the circular store that backs every live series. It
//! knows nothing about time or series names; it only guarantees bounded memory
//! and constant-time access at both ends.
//!
//! # Key Features
//!
//! - Slot array allocated once at construction; no reallocation on the write path
//! - O(1) push with automatic eviction of the oldest element when full
//! - O(1) random access by logical index (0 = oldest, `len - 1` = newest)
//! - Borrowing, double-ended view for hot read paths
//! - Lifetime `total_added` / `total_evicted` counters
//!
//! # Design
//!
//! The buffer keeps a physical `head` (oldest slot), `tail` (next write slot)
//! and `len`. Logical index `i` maps to physical slot `(head + i) % capacity`.
//! When `len == capacity`, `head == tail` and a push overwrites the oldest slot
//! and advances both cursors.

use std::cmp::Ordering;
use std::iter::FusedIterator;

use crate::error::RingError;

/// A fixed-capacity circular buffer.
///
/// # Thread Safety
///
/// `RingBuffer` is a plain owned value with no interior mutability. It is
/// owned by exactly one series inside the controller; consumers only ever see
/// [`RingView`]s or copies.
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    /// Slot storage; `None` marks a vacant slot.
    slots: Box<[Option<T>]>,
    /// Physical index of the oldest element.
    head: usize,
    /// Physical index the next push writes to.
    tail: usize,
    /// Number of live elements.
    len: usize,
    /// Lifetime count of pushed elements.
    total_added: u64,
    /// Lifetime count of elements removed by overflow, `pop_front` or shrink.
    total_evicted: u64,
}

impl<T> RingBuffer<T> {
    /// Creates an empty ring buffer holding at most `capacity` elements.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero. A zero capacity can only come from static
    /// misconfiguration; [`ControllerConfig::validate`](crate::config::ControllerConfig::validate)
    /// rejects it before any buffer is built.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use sluice::ring::RingBuffer;
    ///
    /// let ring: RingBuffer<i32> = RingBuffer::new(3);
    /// assert_eq!(ring.capacity(), 3);
    /// assert!(ring.is_empty());
    /// ```
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "ring buffer capacity must be greater than 0");
        Self {
            slots: (0..capacity).map(|_| None).collect(),
            head: 0,
            tail: 0,
            len: 0,
            total_added: 0,
            total_evicted: 0,
        }
    }

    /// Maps a logical index to a physical slot index.
    #[inline]
    fn physical(&self, index: usize) -> usize {
        (self.head + index) % self.slots.len()
    }

    /// Physical slot of the newest element. Only meaningful when `len > 0`.
    #[inline]
    fn newest_slot(&self) -> usize {
        (self.tail + self.slots.len() - 1) % self.slots.len()
    }

    /// Appends an element, evicting the oldest one if the buffer is full.
    ///
    /// # Returns
    ///
    /// The evicted element when the buffer was full, otherwise `None`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use sluice::ring::RingBuffer;
    ///
    /// let mut ring = RingBuffer::new(2);
    /// assert_eq!(ring.push(1), None);
    /// assert_eq!(ring.push(2), None);
    /// assert_eq!(ring.push(3), Some(1));
    /// assert_eq!(ring.to_vec(), vec![2, 3]);
    /// ```
    #[inline]
    pub fn push(&mut self, item: T) -> Option<T> {
        self.total_added += 1;

        if self.len == self.slots.len() {
            // Full: head == tail, overwrite the oldest slot in place
            let evicted = self.slots[self.head].replace(item);
            self.head = (self.head + 1) % self.slots.len();
            self.tail = self.head;
            self.total_evicted += 1;
            return evicted;
        }

        self.slots[self.tail] = Some(item);
        self.tail = (self.tail + 1) % self.slots.len();
        self.len += 1;
        None
    }

    /// Returns the element at a logical index (0 = oldest).
    ///
    /// # Errors
    ///
    /// Returns [`RingError::IndexOutOfRange`] if `index >= len()`. The index is
    /// never clamped, since an out-of-range request is a caller logic bug.
    pub fn get(&self, index: usize) -> Result<&T, RingError> {
        let out_of_range = RingError::IndexOutOfRange {
            index,
            len: self.len,
        };
        if index >= self.len {
            return Err(out_of_range);
        }
        self.slots[self.physical(index)].as_ref().ok_or(out_of_range)
    }

    /// Returns the oldest element.
    #[inline]
    pub fn first(&self) -> Option<&T> {
        if self.len == 0 {
            return None;
        }
        self.slots[self.head].as_ref()
    }

    /// Returns the newest element.
    #[inline]
    pub fn last(&self) -> Option<&T> {
        if self.len == 0 {
            return None;
        }
        self.slots[self.newest_slot()].as_ref()
    }

    /// Removes and returns the oldest element.
    pub fn pop_front(&mut self) -> Option<T> {
        if self.len == 0 {
            return None;
        }

        let item = self.slots[self.head].take();
        self.head = (self.head + 1) % self.slots.len();
        self.len -= 1;
        self.total_evicted += 1;
        item
    }

    /// Removes oldest elements while `predicate` holds.
    ///
    /// Stops at the first element for which the predicate is false, so the
    /// cost is proportional to the number of removed elements.
    ///
    /// # Returns
    ///
    /// The number of removed elements.
    pub fn pop_front_while<P>(&mut self, mut predicate: P) -> usize
    where
        P: FnMut(&T) -> bool,
    {
        let mut removed = 0;
        while self.first().is_some_and(&mut predicate) {
            self.pop_front();
            removed += 1;
        }
        removed
    }

    /// Overwrites the newest element in place.
    ///
    /// Capacity, length and the lifetime counters are left untouched; callers
    /// resolving duplicate timestamps account for the replacement themselves.
    ///
    /// # Errors
    ///
    /// Returns [`RingError::Empty`] if there is no element to replace.
    pub fn replace_last(&mut self, item: T) -> Result<T, RingError> {
        if self.len == 0 {
            return Err(RingError::Empty);
        }
        let slot = self.newest_slot();
        self.slots[slot].replace(item).ok_or(RingError::Empty)
    }

    /// Returns a read-only, non-copying view in logical order.
    pub fn view(&self) -> RingView<'_, T> {
        RingView {
            ring: self,
            front: 0,
            back: self.len,
        }
    }

    /// Alias for [`view`](Self::view).
    pub fn iter(&self) -> RingView<'_, T> {
        self.view()
    }

    /// Removes every element. Lifetime counters are preserved.
    pub fn clear(&mut self) {
        for slot in self.slots.iter_mut() {
            *slot = None;
        }
        self.head = 0;
        self.tail = 0;
        self.len = 0;
    }

    /// Rebuilds the buffer with a new capacity.
    ///
    /// When shrinking, the newest `new_capacity` elements are kept and the
    /// rest are counted in [`total_evicted`](Self::total_evicted). Lifetime
    /// counters carry over to the new buffer.
    ///
    /// # Panics
    ///
    /// Panics if `new_capacity` is zero, like [`new`](Self::new).
    ///
    /// # Examples
    ///
    /// ```rust
    /// use sluice::ring::RingBuffer;
    ///
    /// let mut ring = RingBuffer::new(4);
    /// for i in 0..4 {
    ///     ring.push(i);
    /// }
    /// let ring = ring.resize(2);
    /// assert_eq!(ring.to_vec(), vec![2, 3]);
    /// assert_eq!(ring.total_evicted(), 2);
    /// ```
    pub fn resize(mut self, new_capacity: usize) -> Self {
        let mut resized = Self::new(new_capacity);
        let total_added = self.total_added;
        let total_evicted = self.total_evicted;
        let dropped = self.len.saturating_sub(new_capacity);

        for _ in 0..dropped {
            self.pop_front();
        }
        while let Some(item) = self.pop_front() {
            resized.push(item);
        }

        resized.total_added = total_added;
        resized.total_evicted = total_evicted + dropped as u64;
        resized
    }

    /// Stable-sorts the live elements with `compare`, oldest slot first.
    ///
    /// Elements comparing equal keep their insertion order. The content is
    /// rewritten starting at physical slot 0. Cost is that of `slice::sort_by`:
    /// O(n log n) worst case, close to linear when only the tail is misplaced.
    pub fn sort_by<F>(&mut self, compare: F)
    where
        F: FnMut(&T, &T) -> Ordering,
    {
        let mut items: Vec<T> = Vec::with_capacity(self.len);
        for index in 0..self.len {
            let slot = self.physical(index);
            if let Some(item) = self.slots[slot].take() {
                items.push(item);
            }
        }

        items.sort_by(compare);

        self.head = 0;
        self.len = items.len();
        self.tail = self.len % self.slots.len();
        for (slot, item) in self.slots.iter_mut().zip(items) {
            *slot = Some(item);
        }
    }

    /// Returns the first logical index for which `predicate` is false.
    ///
    /// The buffer must be partitioned by the predicate (all `true` elements
    /// before all `false` ones), as with `slice::partition_point`.
    pub fn partition_point<P>(&self, mut predicate: P) -> usize
    where
        P: FnMut(&T) -> bool,
    {
        let (mut low, mut high) = (0, self.len);
        while low < high {
            let mid = low + (high - low) / 2;
            let holds = self.slots[self.physical(mid)]
                .as_ref()
                .is_some_and(&mut predicate);
            if holds {
                low = mid + 1;
            } else {
                high = mid;
            }
        }
        low
    }

    /// Returns the number of live elements.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns whether the buffer holds no elements.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns whether the next push will evict.
    #[inline]
    pub fn is_full(&self) -> bool {
        self.len == self.slots.len()
    }

    /// Returns the fixed capacity.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Lifetime count of pushed elements.
    pub fn total_added(&self) -> u64 {
        self.total_added
    }

    /// Lifetime count of elements removed by overflow, `pop_front` or shrink.
    pub fn total_evicted(&self) -> u64 {
        self.total_evicted
    }
}

impl<T: Clone> RingBuffer<T> {
    /// Copies the live elements into a `Vec` in logical order.
    pub fn to_vec(&self) -> Vec<T> {
        self.view().cloned().collect()
    }
}

impl<'a, T> IntoIterator for &'a RingBuffer<T> {
    type Item = &'a T;
    type IntoIter = RingView<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.view()
    }
}

/// Borrowing iterator over a ring buffer in logical order (oldest first).
///
/// The view cannot outlive the buffer, so eviction while a view is alive is
/// ruled out by the borrow checker.
#[derive(Debug)]
pub struct RingView<'a, T> {
    ring: &'a RingBuffer<T>,
    front: usize,
    back: usize,
}

impl<'a, T> Iterator for RingView<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        if self.front >= self.back {
            return None;
        }
        let slot = self.ring.physical(self.front);
        self.front += 1;
        self.ring.slots[slot].as_ref()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.back - self.front;
        (remaining, Some(remaining))
    }
}

impl<T> DoubleEndedIterator for RingView<'_, T> {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.front >= self.back {
            return None;
        }
        self.back -= 1;
        let slot = self.ring.physical(self.back);
        self.ring.slots[slot].as_ref()
    }
}

impl<T> ExactSizeIterator for RingView<'_, T> {}

impl<T> FusedIterator for RingView<'_, T> {}
