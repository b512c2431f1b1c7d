//! The eviction ledger: a global, chronological index over every retained
//! sample.
//!
//! Each series keeps its own history, but the memory budget and the
//! write-through cursor are global. The ledger records every sample in the
//! order it was produced, together with the series it belongs to, so that
//! the store can:
//!
//! - forward samples to the persistence sink in production order, tracking
//!   progress with a watermark;
//! - evict the oldest samples across all series once the total exceeds the
//!   memory budget.
//!
//! # Watermark
//!
//! ```text
//!   entries:  [ e0  e1  e2  e3 | e4  e5 ]
//!                              ^
//!                         watermark = 4
//!   e0..e3 committed to the sink, e4..e5 not yet written
//! ```
//!
//! The committed entries always form a prefix. Evicting a committed entry
//! loses nothing; evicting one above the watermark drops data that never
//! reached the sink, which is logged as a warning.
//!
//! # Retention
//!
//! A live series never loses its last sample to eviction. Entries whose
//! series has been deleted are orphans and are evicted like any other.

use std::collections::VecDeque;
use std::collections::vec_deque;
use std::sync::Arc;

use crate::registry::{SeriesId, SeriesRegistry};
use crate::sample::{Record, Sample};
use crate::sink::SampleSink;

/// One sample, indexed globally.
#[derive(Debug, Clone)]
pub struct LedgerEntry {
    /// The series the sample was written to.
    pub series: SeriesId,
    /// The series' record, kept so orphaned samples can still be persisted.
    pub record: Arc<Record>,
    /// The sample itself.
    pub sample: Sample,
}

/// Outcome of a write-through pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteThrough {
    /// Entries committed by this pass.
    pub written: usize,
    /// Entries still above the watermark afterwards.
    pub pending: usize,
}

/// Outcome of an eviction pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Eviction {
    /// Entries removed from memory.
    pub evicted: usize,
    /// Over-budget entries kept because they are their series' last sample.
    pub retained: usize,
    /// Evicted entries that had not been written to the sink.
    pub dropped_unwritten: usize,
}

/// Chronological index of all retained samples.
#[derive(Debug, Default)]
pub struct EvictionLedger {
    entries: VecDeque<LedgerEntry>,
    /// Number of leading entries already committed to the sink.
    watermark: usize,
}

impl EvictionLedger {
    /// Creates an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a freshly written sample.
    pub fn push(&mut self, series: SeriesId, record: Arc<Record>, sample: Sample) {
        self.entries.push_back(LedgerEntry {
            series,
            record,
            sample,
        });
    }

    /// Records a sample that is already persisted, e.g. one restored at
    /// startup. Only valid while every existing entry is committed.
    pub fn push_committed(&mut self, series: SeriesId, record: Arc<Record>, sample: Sample) {
        debug_assert_eq!(self.watermark, self.entries.len());
        self.push(series, record, sample);
        self.watermark = self.entries.len();
    }

    /// Total number of retained samples.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns whether the ledger is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of leading entries committed to the sink.
    pub fn watermark(&self) -> usize {
        self.watermark
    }

    /// Number of entries not yet committed.
    pub fn unwritten(&self) -> usize {
        self.entries.len() - self.watermark
    }

    /// Iterates over entries, oldest first.
    pub fn iter(&self) -> vec_deque::Iter<'_, LedgerEntry> {
        self.entries.iter()
    }

    /// Marks every entry as committed. Used in transient mode, where there
    /// is no sink to write to.
    pub fn commit_all(&mut self) -> WriteThrough {
        let written = self.unwritten();
        self.watermark = self.entries.len();
        WriteThrough {
            written,
            pending: 0,
        }
    }

    /// Forwards uncommitted entries to `sink`, advancing the watermark.
    ///
    /// Stops at the first failure; that entry and everything after it are
    /// retried on the next pass.
    pub fn write_through(&mut self, sink: &mut dyn SampleSink) -> WriteThrough {
        let start = self.watermark;
        for entry in self.entries.range(start..) {
            if let Err(e) = sink.store(&entry.record, &entry.sample) {
                tracing::warn!(
                    series = %entry.record.name,
                    observed_at = entry.sample.observed_at,
                    "can't write to sink: {e}"
                );
                break;
            }
            self.watermark += 1;
        }

        let written = self.watermark - start;
        if written > 0
            && let Err(e) = sink.flush()
        {
            tracing::warn!("can't flush sink: {e}");
        }

        WriteThrough {
            written,
            pending: self.unwritten(),
        }
    }

    /// Evicts the oldest entries until at most `budget` remain, or no
    /// remaining entry may be evicted.
    ///
    /// Evicted samples are removed from the front of their series' history
    /// in `registry` as well.
    pub fn evict(&mut self, registry: &mut SeriesRegistry, budget: usize) -> Eviction {
        let before = self.entries.len();
        let watermark = self.watermark;

        let mut stats = Eviction::default();
        let mut kept = Vec::new();
        let mut kept_committed = 0;
        let mut popped = 0;

        while self.entries.len() + kept.len() > budget {
            let Some(entry) = self.entries.pop_front() else {
                break;
            };
            let committed = popped < watermark;
            popped += 1;

            if let Some(series) = registry.by_id_mut(entry.series) {
                if series.history().len() <= 1 {
                    if committed {
                        kept_committed += 1;
                    }
                    kept.push(entry);
                    continue;
                }
                let oldest = series.history_mut().pop_front();
                debug_assert_eq!(
                    oldest.map(|s| s.observed_at),
                    Some(entry.sample.observed_at),
                    "ledger out of step with series history"
                );
            }

            stats.evicted += 1;
            if !committed {
                stats.dropped_unwritten += 1;
            }
        }

        stats.retained = kept.len();
        // Kept entries go back to the front in their original order. Committed
        // entries among them precede every uncommitted one, so the watermark
        // still describes a prefix.
        self.watermark = kept_committed + watermark.saturating_sub(popped);
        for entry in kept.into_iter().rev() {
            self.entries.push_front(entry);
        }

        if stats.dropped_unwritten > 0 {
            tracing::warn!("dropped {} unwritten values", stats.dropped_unwritten);
        }
        if stats.evicted > 0 {
            tracing::info!(
                retained = stats.retained,
                "pruned rows from {before} => {}",
                self.entries.len()
            );
        }

        debug_assert!(self.watermark <= self.entries.len());
        stats
    }
}
