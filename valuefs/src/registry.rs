//! Series registration and lookup.
//!
//! The registry maps series names to their [`Series`]: the record that
//! identifies it and the history of samples written to it. It is owned by the
//! store actor and never shared.
//!
//! # Identity
//!
//! Each series is also assigned a [`SeriesId`] that is never reused. The
//! eviction ledger refers to series by id rather than by name, so that a name
//! which is deleted and created again starts from a clean history and never
//! sees samples that belonged to its predecessor.

use std::collections::HashMap;
use std::sync::Arc;

use crate::history::SampleHistory;
use crate::sample::{Record, Sample};
use crate::sequence::Timestamp;

/// Opaque, never-reused identity of a series within one store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SeriesId(u64);

/// A record together with its sample history.
#[derive(Debug)]
pub struct Series {
    id: SeriesId,
    record: Arc<Record>,
    history: SampleHistory,
}

impl Series {
    /// The series' identity.
    pub fn id(&self) -> SeriesId {
        self.id
    }

    /// The series' record.
    pub fn record(&self) -> &Record {
        &self.record
    }

    /// A shared handle to the record, for ledger entries.
    pub fn record_arc(&self) -> Arc<Record> {
        Arc::clone(&self.record)
    }

    /// The series' sample history.
    pub fn history(&self) -> &SampleHistory {
        &self.history
    }

    /// Mutable access to the history.
    pub fn history_mut(&mut self) -> &mut SampleHistory {
        &mut self.history
    }
}

/// Registry of live series.
#[derive(Debug, Default)]
pub struct SeriesRegistry {
    /// Live series by id.
    series: HashMap<SeriesId, Series>,
    /// Name index into `series`.
    names: HashMap<String, SeriesId>,
    /// Next id to hand out.
    next_id: u64,
}

impl SeriesRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of every live record.
    pub fn list(&self) -> Vec<Record> {
        self.series
            .values()
            .map(|series| series.record().clone())
            .collect()
    }

    /// Looks up `name`, creating it when absent and `create` is set.
    ///
    /// A new record is stamped with `now`. An empty name never matches and
    /// never creates anything.
    pub fn load_or_create(&mut self, name: &str, create: bool, now: Timestamp) -> Option<&Series> {
        if name.is_empty() {
            return None;
        }

        let id = match self.names.get(name) {
            Some(&id) => id,
            None if create => {
                let id = SeriesId(self.next_id);
                self.next_id += 1;

                let series = Series {
                    id,
                    record: Arc::new(Record::new(name, now)),
                    history: SampleHistory::new(),
                };
                tracing::debug!(name, created_at = now, "created series");

                self.names.insert(name.to_string(), id);
                self.series.insert(id, series);
                id
            }
            None => return None,
        };

        self.series.get(&id)
    }

    /// Returns the live series called `name`.
    pub fn get(&self, name: &str) -> Option<&Series> {
        self.names.get(name).and_then(|id| self.series.get(id))
    }

    /// Returns the live series `record` was issued for.
    ///
    /// A record from a series that was deleted and then re-created under
    /// the same name does not resolve.
    pub fn resolve(&self, record: &Record) -> Option<&Series> {
        self.get(&record.name)
            .filter(|series| series.record.created_at == record.created_at)
    }

    /// Returns the live series called `name`, mutably.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut Series> {
        let id = self.names.get(name)?;
        self.series.get_mut(id)
    }

    /// Returns the live series with `id`, if it has not been removed.
    pub fn by_id_mut(&mut self, id: SeriesId) -> Option<&mut Series> {
        self.series.get_mut(&id)
    }

    /// Appends `sample` to the series called `name`.
    ///
    /// Returns the series' id and record when it exists, `None` otherwise.
    pub fn append(&mut self, name: &str, sample: Sample) -> Option<(SeriesId, Arc<Record>)> {
        let series = self.get_mut(name)?;
        series.history.append(sample);
        Some((series.id, series.record_arc()))
    }

    /// Drops the mapping for `name`. Samples already in the ledger are left
    /// for eviction to clean up.
    ///
    /// Returns whether a series was removed.
    pub fn remove(&mut self, name: &str) -> bool {
        let Some(id) = self.names.remove(name) else {
            return false;
        };
        let removed = self.series.remove(&id);
        if let Some(series) = &removed {
            tracing::debug!(name, retained = series.history.len(), "removed series");
        }
        removed.is_some()
    }

    /// Number of live series.
    pub fn len(&self) -> usize {
        self.series.len()
    }

    /// Returns whether there are no live series.
    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_registry_is_empty() {
        let registry = SeriesRegistry::new();
        assert!(registry.is_empty());
        assert!(registry.list().is_empty());
    }

    #[test]
    fn test_load_without_create() {
        let mut registry = SeriesRegistry::new();
        assert!(registry.load_or_create("cpu", false, 100).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_load_with_create() {
        let mut registry = SeriesRegistry::new();

        let record = registry.load_or_create("cpu", true, 100).unwrap().record().clone();
        assert_eq!(record, Record::new("cpu", 100));

        // Loading again returns the same record; creation time is unchanged.
        let again = registry.load_or_create("cpu", true, 200).unwrap().record().clone();
        assert_eq!(again, record);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_empty_name_is_rejected() {
        let mut registry = SeriesRegistry::new();
        assert!(registry.load_or_create("", true, 100).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_append_requires_existing_series() {
        let mut registry = SeriesRegistry::new();
        assert!(registry.append("cpu", Sample::new(1.0, 10)).is_none());
        assert!(registry.get("cpu").is_none());

        registry.load_or_create("cpu", true, 5);
        let (id, record) = registry.append("cpu", Sample::new(1.0, 10)).unwrap();
        assert_eq!(record.name, "cpu");

        let series = registry.by_id_mut(id).unwrap();
        assert_eq!(series.history().len(), 1);
    }

    #[test]
    fn test_remove() {
        let mut registry = SeriesRegistry::new();
        registry.load_or_create("cpu", true, 100);
        registry.load_or_create("mem", true, 101);

        assert!(registry.remove("cpu"));
        assert!(!registry.remove("cpu"));

        let names: Vec<_> = registry.list().into_iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["mem".to_string()]);
    }

    #[test]
    fn test_recreated_series_gets_new_identity() {
        let mut registry = SeriesRegistry::new();
        let first = registry.load_or_create("cpu", true, 100).unwrap().id();
        registry.append("cpu", Sample::new(1.0, 110));
        registry.remove("cpu");

        let second = registry.load_or_create("cpu", true, 200).unwrap();
        assert_ne!(second.id(), first);
        assert!(second.history().is_empty());
        assert_eq!(second.record().created_at, 200);

        assert!(registry.by_id_mut(first).is_none());
    }

    #[test]
    fn test_resolve_rejects_stale_record() {
        let mut registry = SeriesRegistry::new();
        let old = registry.load_or_create("cpu", true, 100).unwrap().record().clone();
        assert!(registry.resolve(&old).is_some());

        registry.remove("cpu");
        assert!(registry.resolve(&old).is_none());

        let new = registry.load_or_create("cpu", true, 200).unwrap().record().clone();
        assert!(registry.resolve(&old).is_none());
        assert_eq!(registry.resolve(&new).map(|s| s.record().created_at), Some(200));
    }
}
