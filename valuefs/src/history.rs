//! Per-series sample history.
//!
//! A [`SampleHistory`] is the ordered list of samples for one series, oldest
//! first. The store stamps every write with the sequencer before appending,
//! so insertion order is time order and the history never needs sorting.
//!
//! # Windows
//!
//! Windowed queries split the history at a boundary timestamp:
//!
//! ```text
//!   samples:   s0   s1   s2 | s3   s4
//!                        ^  |
//!              preceding    boundary   windowed = [s3, s4]
//! ```
//!
//! The *preceding* sample is the latest one observed at or before the
//! boundary, i.e. the value already in effect when the window opens. The
//! *windowed* samples are those strictly after the boundary.

use std::collections::VecDeque;
use std::collections::vec_deque;

use crate::sample::Sample;
use crate::sequence::Timestamp;

/// Ordered samples for a single series.
#[derive(Debug, Clone, Default)]
pub struct SampleHistory {
    samples: VecDeque<Sample>,
}

impl SampleHistory {
    /// Creates an empty history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a sample. The caller guarantees it is not older than [`last`](Self::last).
    pub fn append(&mut self, sample: Sample) {
        debug_assert!(
            self.last().is_none_or(|last| last.observed_at <= sample.observed_at),
            "history append out of order"
        );
        self.samples.push_back(sample);
    }

    /// Returns the most recent sample, if any.
    pub fn last(&self) -> Option<&Sample> {
        self.samples.back()
    }

    /// Removes and returns the oldest sample. Used by eviction.
    pub fn pop_front(&mut self) -> Option<Sample> {
        self.samples.pop_front()
    }

    /// Splits the history at `boundary`.
    ///
    /// If no sample is at or before the boundary, there is no preceding
    /// sample and the window is the entire history.
    pub fn window_from(&self, boundary: Timestamp) -> Window<'_> {
        let split = self
            .samples
            .partition_point(|sample| sample.observed_at <= boundary);

        let preceding = split.checked_sub(1).map(|index| self.samples[index]);

        Window {
            samples: self.samples.range(split..),
            preceding,
        }
    }

    /// Returns the number of retained samples.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Returns whether the history holds no samples.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Iterates over samples, oldest first.
    pub fn iter(&self) -> vec_deque::Iter<'_, Sample> {
        self.samples.iter()
    }
}

/// A view of the samples strictly after a boundary, plus the sample that was
/// current at the boundary.
#[derive(Debug, Clone)]
pub struct Window<'a> {
    samples: vec_deque::Iter<'a, Sample>,
    preceding: Option<Sample>,
}

impl Window<'_> {
    /// The latest sample at or before the boundary.
    pub fn preceding(&self) -> Option<&Sample> {
        self.preceding.as_ref()
    }

    /// The newest sample inside the window.
    pub fn last(&self) -> Option<&Sample> {
        self.samples.clone().next_back()
    }

    /// Number of samples inside the window.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Returns whether the window holds no samples.
    pub fn is_empty(&self) -> bool {
        self.samples.len() == 0
    }

    /// Sum of the values inside the window.
    pub fn sum(&self) -> f64 {
        self.samples.clone().map(|sample| sample.value).sum()
    }

    /// Iterates over the samples inside the window, oldest first.
    pub fn iter(&self) -> vec_deque::Iter<'_, Sample> {
        self.samples.clone()
    }
}
