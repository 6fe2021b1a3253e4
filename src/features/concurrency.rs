//! Concurrent flight counting
//!
//! For every flight, the number of flights (itself included) whose
//! scheduled departure lies within `±window` of its own. The scan runs two
//! monotone pointers over a timestamp-sorted slice, so a batch costs one
//! sort plus a linear pass.

use chrono::NaiveDateTime;
use rayon::prelude::*;
use std::ops::Range;

/// Default half-width of the window, in hours
pub const DEFAULT_WINDOW_HOURS: f64 = 1.0;

/// Smallest chunk handed to a rayon worker
const MIN_PARALLEL_CHUNK: usize = 4096;

/// Counts flights scheduled close to each other
#[derive(Debug, Clone, Copy)]
pub struct ConcurrencyCounter {
    window_seconds: i64,
    parallel_threshold: usize,
}

impl Default for ConcurrencyCounter {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_HOURS)
    }
}

impl ConcurrencyCounter {
    /// Create a counter with a symmetric window of `window_hours`
    /// (negative windows are treated as zero)
    pub fn new(window_hours: f64) -> Self {
        ConcurrencyCounter {
            window_seconds: (window_hours * 3600.0).round().max(0.0) as i64,
            parallel_threshold: 0,
        }
    }

    /// Switch [`count`](Self::count) to the rayon scan for batches of at
    /// least `threshold` flights (0 keeps it sequential)
    pub fn with_parallel_threshold(mut self, threshold: usize) -> Self {
        self.parallel_threshold = threshold;
        self
    }

    pub fn window_seconds(&self) -> i64 {
        self.window_seconds
    }

    /// Count concurrent flights for an unordered batch
    ///
    /// The result is keyed by original position: `counts[k]` belongs to
    /// `timestamps[k]`. The input is left untouched.
    pub fn count(&self, timestamps: &[NaiveDateTime]) -> Vec<u32> {
        let n = timestamps.len();

        // Stable, so equal timestamps keep their relative order
        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by_key(|&idx| timestamps[idx]);

        let sorted: Vec<NaiveDateTime> = order.iter().map(|&idx| timestamps[idx]).collect();
        let sorted_counts = if self.parallel_threshold > 0 && n >= self.parallel_threshold {
            self.count_sorted_parallel(&sorted)
        } else {
            self.count_sorted(&sorted)
        };

        let mut counts = vec![0; n];
        for (pos, &idx) in order.iter().enumerate() {
            counts[idx] = sorted_counts[pos];
        }

        log::debug!(
            "Counted concurrency for {} flights (window ±{}s)",
            n,
            self.window_seconds
        );

        counts
    }

    /// Count concurrent flights over a slice already sorted ascending;
    /// counts are aligned to the slice
    pub fn count_sorted(&self, sorted: &[NaiveDateTime]) -> Vec<u32> {
        debug_assert!(sorted.windows(2).all(|w| w[0] <= w[1]));
        self.scan(sorted, 0..sorted.len())
    }

    /// Same as [`count_sorted`](Self::count_sorted), splitting the slice
    /// into disjoint chunks scanned on the rayon pool
    pub fn count_sorted_parallel(&self, sorted: &[NaiveDateTime]) -> Vec<u32> {
        debug_assert!(sorted.windows(2).all(|w| w[0] <= w[1]));
        let n = sorted.len();
        if n == 0 {
            return Vec::new();
        }

        let chunk = (n / rayon::current_num_threads().max(1)).max(MIN_PARALLEL_CHUNK);
        self.scan_chunks(sorted, chunk)
    }

    fn scan_chunks(&self, sorted: &[NaiveDateTime], chunk: usize) -> Vec<u32> {
        let n = sorted.len();
        let n_chunks = n.div_ceil(chunk);

        (0..n_chunks)
            .into_par_iter()
            .map(|c| self.scan(sorted, c * chunk..((c + 1) * chunk).min(n)))
            .collect::<Vec<_>>()
            .concat()
    }

    /// Two-pointer scan over `range` of a sorted slice
    ///
    /// `lo` is the first index still inside the window of the current
    /// flight and `hi` the last one. Both only move forward, because the
    /// window start and end grow with the departure time. Pointers are
    /// seeded by binary search so a chunk can start anywhere in the slice.
    fn scan(&self, sorted: &[NaiveDateTime], range: Range<usize>) -> Vec<u32> {
        let n = sorted.len();
        let mut counts = Vec::with_capacity(range.len());
        if range.is_empty() {
            return counts;
        }

        let w = self.window_seconds;
        let first = sorted[range.start];
        let mut lo = sorted.partition_point(|t| (first - *t).num_seconds() > w);
        let mut hi = sorted.partition_point(|t| (*t - first).num_seconds() <= w) - 1;

        for i in range {
            let t = sorted[i];
            while (t - sorted[lo]).num_seconds() > w {
                lo += 1;
            }
            if hi < i {
                hi = i;
            }
            while hi + 1 < n && (sorted[hi + 1] - t).num_seconds() <= w {
                hi += 1;
            }
            counts.push((hi - lo + 1) as u32);
        }

        counts
    }
}
