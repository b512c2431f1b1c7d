//! The value store: a single actor that owns every series.
//!
//! All state (the series registry, the eviction ledger, the time sequence and
//! the persistence sink) lives on one dedicated thread. Callers hold a cheap,
//! cloneable [`Store`] handle and talk to that thread through a bounded
//! request queue, each request carrying a one-shot reply channel:
//!
//! ```text
//!   Store ──┐
//!   Store ──┼──► mpsc (queue_capacity) ──► actor thread ──► SampleSink
//!   Store ──┘            ▲                    │
//!                        └─── oneshot reply ◄─┘
//! ```
//!
//! The actor handles one request at a time and replies before taking the
//! next, so every operation observes a single global order. Each request
//! takes exactly one tick from the [`TimeSequence`]; that tick stamps the
//! reply, any sample the request writes, any record it creates, and is the
//! "now" a query is evaluated at.
//!
//! Sink calls are synchronous on the actor thread, so a slow sink delays the
//! requests queued behind a prune.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//!
//! use valuefs::{QueryKind, Store, StoreConfig, View};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Store::builder(StoreConfig::default()).spawn()?;
//!
//! if let Some(cpu) = store.load("cpu", true).await? {
//!     store.write(&cpu, 85.5).await?;
//!
//!     let latest = store.query(&cpu, None).await?;
//!     let average = store
//!         .query(&cpu, Some(&View::new(QueryKind::Average, Duration::from_secs(60))))
//!         .await?;
//!     println!("{latest:?} {average:?}");
//! }
//!
//! store.shutdown().await?;
//! # Ok(())
//! # }
//! ```

use std::ops::ControlFlow;

use tokio::sync::{mpsc, oneshot};

use crate::config::StoreConfig;
use crate::error::{Result, StoreError};
use crate::ledger::{EvictionLedger, WriteThrough};
use crate::query::{View, evaluate};
use crate::registry::SeriesRegistry;
use crate::sample::{Record, Sample};
use crate::sequence::{Clock, SystemClock, TimeSequence, Timestamp};
use crate::sink::SampleSink;

/// Result type for calls on a [`Store`] handle.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Name of the actor thread.
const ACTOR_THREAD_NAME: &str = "valuefs-store";

/// A reply from the actor, stamped with the operation's timestamp.
#[derive(Debug)]
struct Stamped<T> {
    at: Timestamp,
    value: T,
}

/// What a prune did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PruneReport {
    /// Samples committed to the sink by this prune.
    pub written: usize,
    /// Samples still waiting for the sink afterwards.
    pub pending: usize,
    /// Samples evicted from memory.
    pub evicted: usize,
    /// Over-budget samples kept as their series' last value.
    pub retained: usize,
    /// Evicted samples that never reached the sink.
    pub dropped_unwritten: usize,
    /// Samples in memory after the prune.
    pub remaining: usize,
}

type Reply<T> = oneshot::Sender<Stamped<T>>;

/// Requests understood by the actor.
#[derive(Debug)]
enum Request {
    Sync {
        reply: Reply<()>,
    },
    List {
        reply: Reply<Vec<Record>>,
    },
    Load {
        name: String,
        create: bool,
        reply: Reply<Option<Record>>,
    },
    Write {
        record: Record,
        value: f64,
        reply: Reply<bool>,
    },
    Query {
        record: Record,
        view: Option<View>,
        reply: Reply<Option<Sample>>,
    },
    Delete {
        record: Record,
        reply: Reply<bool>,
    },
    Prune {
        reply: Reply<PruneReport>,
    },
    Shutdown {
        reply: Reply<()>,
    },
}

/// Configures and starts a [`Store`].
pub struct StoreBuilder {
    config: StoreConfig,
    clock: Box<dyn Clock>,
    sink: Option<Box<dyn SampleSink>>,
    restore: Vec<(String, Sample)>,
}

impl std::fmt::Debug for StoreBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreBuilder")
            .field("config", &self.config)
            .field("sink", &self.sink.is_some())
            .field("restore", &self.restore.len())
            .finish_non_exhaustive()
    }
}

impl StoreBuilder {
    /// Uses `clock` instead of the system clock.
    #[must_use]
    pub fn clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /// Forwards samples to `sink` on every prune. Without a sink the store
    /// runs in transient mode.
    #[must_use]
    pub fn sink(mut self, sink: impl SampleSink + 'static) -> Self {
        self.sink = Some(Box::new(sink));
        self
    }

    /// Seeds the store with previously persisted values, such as those
    /// returned by [`read_last_values`](crate::sink::read_last_values).
    /// Restored samples count as already written to the sink.
    #[must_use]
    pub fn restore(mut self, values: Vec<(String, Sample)>) -> Self {
        self.restore = values;
        self
    }

    /// Validates the configuration and starts the actor thread.
    ///
    /// # Errors
    ///
    /// Returns a config error if the configuration is invalid, or
    /// [`StoreError::Spawn`] if the thread cannot be started.
    pub fn spawn(self) -> Result<Store> {
        self.config.validate()?;

        let mut actor = StoreActor {
            registry: SeriesRegistry::new(),
            ledger: EvictionLedger::new(),
            sequence: TimeSequence::new(self.clock),
            sink: self.sink,
            memory_values: self.config.memory_values,
        };
        actor.restore(self.restore);

        let (tx, rx) = mpsc::channel(self.config.queue_capacity);
        std::thread::Builder::new()
            .name(ACTOR_THREAD_NAME.to_string())
            .spawn(move || actor.run(rx))
            .map_err(|source| StoreError::Spawn { source })?;

        tracing::debug!(
            memory_values = self.config.memory_values,
            queue_capacity = self.config.queue_capacity,
            "store started"
        );
        Ok(Store { tx })
    }
}

/// Handle to a running store.
///
/// Handles are cheap to clone and may be used from any task. Every method
/// waits for the actor's reply. Once the store is shut down, every method
/// returns [`StoreError::Closed`].
///
/// Methods taking a [`Record`] address the series by name; a record with an
/// empty name is rejected without contacting the actor.
#[derive(Debug, Clone)]
pub struct Store {
    tx: mpsc::Sender<Request>,
}

impl Store {
    /// Starts configuring a store.
    pub fn builder(config: StoreConfig) -> StoreBuilder {
        StoreBuilder {
            config,
            clock: Box::new(SystemClock),
            sink: None,
            restore: Vec::new(),
        }
    }

    async fn request<T>(&self, make: impl FnOnce(Reply<T>) -> Request) -> StoreResult<Stamped<T>> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(make(reply))
            .await
            .map_err(|_| StoreError::Closed)?;
        rx.await.map_err(|_| StoreError::Closed)
    }

    /// Round-trips through the actor without touching state.
    ///
    /// Returns the issued timestamp. Once this returns, every request sent
    /// earlier from this handle has completed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Closed`] if the store has shut down.
    pub async fn sync(&self) -> StoreResult<Timestamp> {
        Ok(self.request(|reply| Request::Sync { reply }).await?.at)
    }

    /// Returns a snapshot of every live record, in no particular order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Closed`] if the store has shut down.
    pub async fn list(&self) -> StoreResult<Vec<Record>> {
        Ok(self.request(|reply| Request::List { reply }).await?.value)
    }

    /// Returns the record called `name`, creating it first if `create` is
    /// set.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Closed`] if the store has shut down.
    pub async fn load(&self, name: &str, create: bool) -> StoreResult<Option<Record>> {
        if name.is_empty() {
            return Ok(None);
        }
        let name = name.to_string();
        let stamped = self
            .request(|reply| Request::Load {
                name,
                create,
                reply,
            })
            .await?;
        Ok(stamped.value)
    }

    /// Appends `value` to the record's series.
    ///
    /// Returns `false` if the series does not exist, or if `record` belongs
    /// to an earlier series of the same name that has since been deleted.
    /// Nothing is created.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Closed`] if the store has shut down.
    pub async fn write(&self, record: &Record, value: f64) -> StoreResult<bool> {
        if !record.is_valid() {
            return Ok(false);
        }
        let record = record.clone();
        let stamped = self
            .request(|reply| Request::Write { record, value, reply })
            .await?;
        Ok(stamped.value)
    }

    /// Evaluates `view` over the record's series. `None` means the latest
    /// value.
    ///
    /// Returns `None` if the record's series no longer exists or the view
    /// has no value.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Closed`] if the store has shut down.
    pub async fn query(&self, record: &Record, view: Option<&View>) -> StoreResult<Option<Sample>> {
        if !record.is_valid() {
            return Ok(None);
        }
        let record = record.clone();
        let view = view.copied();
        let stamped = self
            .request(|reply| Request::Query { record, view, reply })
            .await?;
        Ok(stamped.value)
    }

    /// Removes the record's series. Samples already written stay in memory
    /// until evicted, and are still forwarded to the sink.
    ///
    /// Returns whether a series was removed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Closed`] if the store has shut down.
    pub async fn delete(&self, record: &Record) -> StoreResult<bool> {
        if !record.is_valid() {
            return Ok(false);
        }
        let record = record.clone();
        let stamped = self.request(|reply| Request::Delete { record, reply }).await?;
        Ok(stamped.value)
    }

    /// Writes pending samples to the sink, then evicts down to the memory
    /// budget.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Closed`] if the store has shut down.
    pub async fn prune(&self) -> StoreResult<PruneReport> {
        Ok(self.request(|reply| Request::Prune { reply }).await?.value)
    }

    /// Writes pending samples to the sink and stops the actor.
    ///
    /// Requests queued behind the shutdown, and every later call on any
    /// handle, fail with [`StoreError::Closed`]. Returns the shutdown's
    /// timestamp.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Closed`] if the store was already shut down.
    pub async fn shutdown(&self) -> StoreResult<Timestamp> {
        Ok(self.request(|reply| Request::Shutdown { reply }).await?.at)
    }
}

/// Latest timestamp accepted from persisted values, in the year 2262.
const MAX_RESTORED_AT: Timestamp = u64::MAX / 2;

/// State owned by the actor thread.
struct StoreActor {
    registry: SeriesRegistry,
    ledger: EvictionLedger,
    sequence: TimeSequence,
    sink: Option<Box<dyn SampleSink>>,
    memory_values: usize,
}

fn respond<T>(reply: Reply<T>, at: Timestamp, value: T) {
    if reply.send(Stamped { at, value }).is_err() {
        tracing::trace!(at, "caller went away before reply");
    }
}

impl StoreActor {
    fn run(mut self, mut rx: mpsc::Receiver<Request>) {
        while let Some(request) = rx.blocking_recv() {
            if self.handle(request).is_break() {
                rx.close();
                tracing::debug!("store shut down");
                return;
            }
        }

        // Every handle was dropped.
        let result = self.write_through();
        tracing::debug!(
            written = result.written,
            pending = result.pending,
            "store handles dropped, stopping"
        );
    }

    fn handle(&mut self, request: Request) -> ControlFlow<()> {
        let now = self.sequence.next();

        match request {
            Request::Sync { reply } => respond(reply, now, ()),
            Request::List { reply } => respond(reply, now, self.registry.list()),
            Request::Load {
                name,
                create,
                reply,
            } => {
                let record = self
                    .registry
                    .load_or_create(&name, create, now)
                    .map(|series| series.record().clone());
                tracing::trace!(name = %name, create, found = record.is_some(), at = now, "load");
                respond(reply, now, record);
            }
            Request::Write { record, value, reply } => {
                let sample = Sample::new(value, now);
                let appended = if self.registry.resolve(&record).is_some() {
                    self.registry.append(&record.name, sample)
                } else {
                    None
                };
                let written = match appended {
                    Some((id, series_record)) => {
                        self.ledger.push(id, series_record, sample);
                        true
                    }
                    None => false,
                };
                tracing::trace!(name = %record.name, value, written, at = now, "write");
                respond(reply, now, written);
            }
            Request::Query { record, view, reply } => {
                let sample = self
                    .registry
                    .resolve(&record)
                    .and_then(|series| evaluate(series.history(), view.as_ref(), now));
                tracing::trace!(name = %record.name, ?view, ?sample, at = now, "query");
                respond(reply, now, sample);
            }
            Request::Delete { record, reply } => {
                let removed =
                    self.registry.resolve(&record).is_some() && self.registry.remove(&record.name);
                tracing::trace!(name = %record.name, removed, at = now, "delete");
                respond(reply, now, removed);
            }
            Request::Prune { reply } => {
                let report = self.prune();
                respond(reply, now, report);
            }
            Request::Shutdown { reply } => {
                let result = self.write_through();
                if result.pending > 0 {
                    tracing::warn!("shutting down with {} unwritten values", result.pending);
                }
                respond(reply, now, ());
                return ControlFlow::Break(());
            }
        }

        ControlFlow::Continue(())
    }

    fn write_through(&mut self) -> WriteThrough {
        match self.sink.as_mut() {
            Some(sink) => self.ledger.write_through(&mut **sink),
            None => self.ledger.commit_all(),
        }
    }

    fn prune(&mut self) -> PruneReport {
        let written = self.write_through();
        let eviction = self.ledger.evict(&mut self.registry, self.memory_values);

        let report = PruneReport {
            written: written.written,
            pending: self.ledger.unwritten(),
            evicted: eviction.evicted,
            retained: eviction.retained,
            dropped_unwritten: eviction.dropped_unwritten,
            remaining: self.ledger.len(),
        };
        tracing::debug!(?report, "prune");
        report
    }

    /// Loads persisted values before the first request is accepted.
    ///
    /// Values stamped after [`MAX_RESTORED_AT`] are skipped.
    fn restore(&mut self, mut values: Vec<(String, Sample)>) {
        values.retain(|(name, sample)| {
            let plausible = sample.observed_at <= MAX_RESTORED_AT;
            if !plausible {
                tracing::warn!(
                    name = %name,
                    observed_at = sample.observed_at,
                    "skipping restored value from the far future"
                );
            }
            plausible
        });
        if values.is_empty() {
            return;
        }
        values.sort_by_key(|(_, sample)| sample.observed_at);

        if let Some((_, newest)) = values.last() {
            self.sequence.advance_to(newest.observed_at);
        }

        let mut restored = 0;
        for (name, sample) in values {
            let created_at = self.sequence.next();
            if self.registry.load_or_create(&name, true, created_at).is_none() {
                tracing::warn!(name = %name, "skipping restored value with invalid name");
                continue;
            }
            let Some((id, record)) = self.registry.append(&name, sample) else {
                continue;
            };
            self.ledger.push_committed(id, record, sample);
            restored += 1;
        }

        tracing::info!(restored, "restored persisted values");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequence::ManualClock;

    fn actor(clock: ManualClock, memory_values: usize) -> StoreActor {
        StoreActor {
            registry: SeriesRegistry::new(),
            ledger: EvictionLedger::new(),
            sequence: TimeSequence::new(Box::new(clock)),
            sink: None,
            memory_values,
        }
    }

    #[test]
    fn test_restore_advances_sequence_and_commits() {
        let mut actor = actor(ManualClock::new(100), 10);
        actor.restore(vec![
            ("mem".to_string(), Sample::new(2.0, 5_000)),
            ("cpu".to_string(), Sample::new(1.0, 4_000)),
        ]);

        assert_eq!(actor.registry.len(), 2);
        assert_eq!(actor.ledger.len(), 2);
        assert_eq!(actor.ledger.watermark(), 2);
        // Ledger is in observation order regardless of input order.
        let order: Vec<_> = actor.ledger.iter().map(|e| e.record.name.clone()).collect();
        assert_eq!(order, vec!["cpu".to_string(), "mem".to_string()]);
        assert!(actor.sequence.next() > 5_000);
    }

    #[test]
    fn test_restore_skips_invalid_names() {
        let mut actor = actor(ManualClock::new(100), 10);
        actor.restore(vec![
            (String::new(), Sample::new(1.0, 10)),
            ("cpu".to_string(), Sample::new(2.0, 20)),
            ("cpu".to_string(), Sample::new(3.0, 30)),
        ]);

        assert_eq!(actor.registry.len(), 1);
        assert_eq!(actor.ledger.len(), 2);
        let history: Vec<_> = actor.registry.get("cpu").unwrap().history().iter().copied().collect();
        assert_eq!(history, vec![Sample::new(2.0, 20), Sample::new(3.0, 30)]);
    }

    #[test]
    fn test_restore_skips_far_future_values() {
        let mut actor = actor(ManualClock::new(100), 10);
        actor.restore(vec![
            ("cpu".to_string(), Sample::new(1.0, 50)),
            ("bad".to_string(), Sample::new(2.0, u64::MAX)),
        ]);

        assert_eq!(actor.registry.len(), 1);
        assert!(actor.registry.get("bad").is_none());

        let first = actor.sequence.next();
        let second = actor.sequence.next();
        assert!(first < MAX_RESTORED_AT);
        assert!(second > first);
    }

    #[test]
    fn test_one_tick_per_request() {
        let mut actor = actor(ManualClock::new(1_000), 10);

        let (reply, mut rx) = oneshot::channel();
        let _ = actor.handle(Request::Load {
            name: "cpu".to_string(),
            create: true,
            reply,
        });
        let load = rx.try_recv().unwrap();
        assert_eq!(load.at, 1_000);
        let record = load.value.unwrap();
        assert_eq!(record.created_at, 1_000);

        let (reply, mut rx) = oneshot::channel();
        let _ = actor.handle(Request::Write {
            record,
            value: 4.0,
            reply,
        });
        let write = rx.try_recv().unwrap();
        assert_eq!(write.at, 1_001);

        let sample = actor.registry.get("cpu").unwrap().history().last().copied();
        assert_eq!(sample, Some(Sample::new(4.0, 1_001)));
    }

    #[test]
    fn test_shutdown_breaks_loop() {
        let mut actor = actor(ManualClock::new(1), 10);
        let (reply, mut rx) = oneshot::channel();

        assert!(actor.handle(Request::Shutdown { reply }).is_break());
        assert!(rx.try_recv().is_ok());
    }
}
