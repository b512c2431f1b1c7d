//! Windowed queries over a series' history.
//!
//! A query is described by a [`View`]: a [`QueryKind`] plus a lookback
//! duration. Queries are evaluated relative to "now", which the store takes
//! from its sequencer so that every query result is stamped with a unique,
//! ordered timestamp.
//!
//! # Semantics
//!
//! With `boundary = now - duration`:
//!
//! | Kind         | Result                                               |
//! |--------------|------------------------------------------------------|
//! | `Latest`     | the last sample, verbatim; duration ignored          |
//! | `ValueAt`    | the value in effect at the boundary (step function)  |
//! | `SafeLatest` | the last value, if it is no older than `duration`    |
//! | `Total`      | sum of samples strictly after the boundary           |
//! | `Average`    | mean of samples strictly after the boundary          |
//!
//! Every kind except `Latest` returns its value stamped with `now`. An empty
//! result (`None`) means "no value available", which callers must keep
//! distinct from zero.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::history::SampleHistory;
use crate::sample::Sample;
use crate::sequence::Timestamp;

/// How a view aggregates a series' history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryKind {
    /// The most recent sample.
    Latest,
    /// Mean of the samples inside the window.
    Average,
    /// Sum of the samples inside the window.
    Total,
    /// The value set most recently at or before the window's start.
    ValueAt,
    /// The most recent value, unless it is older than the window.
    SafeLatest,
}

/// A query over a series: what to compute and how far to look back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct View {
    /// The aggregation to apply.
    pub kind: QueryKind,
    /// The lookback duration.
    pub duration: Duration,
}

impl View {
    /// Creates a view.
    pub fn new(kind: QueryKind, duration: Duration) -> Self {
        Self { kind, duration }
    }

    /// The unconditional latest-value view.
    pub fn latest() -> Self {
        Self::new(QueryKind::Latest, Duration::ZERO)
    }

    /// The lookback duration in nanoseconds, saturating at `u64::MAX`.
    pub fn duration_ns(&self) -> u64 {
        u64::try_from(self.duration.as_nanos()).unwrap_or(u64::MAX)
    }
}

/// Evaluates `view` against `history` at time `now`.
///
/// A `None` view is the same as [`View::latest`].
pub fn evaluate(history: &SampleHistory, view: Option<&View>, now: Timestamp) -> Option<Sample> {
    let last = history.last()?;

    let view = match view {
        None => return Some(*last),
        Some(view) if view.kind == QueryKind::Latest => return Some(*last),
        Some(view) => view,
    };

    let boundary = now.saturating_sub(view.duration_ns());
    let window = history.window_from(boundary);
    tracing::trace!(
        kind = ?view.kind,
        boundary,
        windowed = window.len(),
        preceding = ?window.preceding(),
        "evaluating view"
    );

    let value = match view.kind {
        QueryKind::Latest => last.value,
        QueryKind::ValueAt => window.preceding()?.value,
        // A sample exactly `duration` old is still fresh.
        QueryKind::SafeLatest => {
            if last.observed_at < boundary {
                return None;
            }
            last.value
        }
        QueryKind::Total => {
            if window.is_empty() {
                return None;
            }
            window.sum()
        }
        QueryKind::Average => {
            if window.is_empty() {
                return None;
            }
            #[allow(clippy::cast_precision_loss)] // window sizes are bounded by the memory budget
            let count = window.len() as f64;
            window.sum() / count
        }
    };

    Some(Sample::new(value, now))
}
