//! # valuefs
//!
//! A bounded, in-memory store of named numeric values, shaped like a
//! filesystem.
//!
//! Each series is a file. Writing a number to `cpu` records a sample;
//! reading `cpu` returns the latest value, and reading `cpu#5m` returns the
//! average over the last five minutes. Samples beyond a fixed memory budget
//! are forwarded to a persistence sink and evicted, oldest first, always
//! keeping each series' last value.
//!
//! **Status**: This crate is in early development. The API is not yet stable.
//!
//! ## Key Properties
//!
//! - One actor thread owns all state; callers share a cloneable async handle
//! - Every operation is stamped by a strictly increasing clock, even when
//!   the wall clock stalls or goes backwards
//! - Five queries per series: latest, average, total, value-at, safe-latest
//! - Bounded memory with best-effort, in-order write-through
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::time::Duration;
//!
//! use valuefs::{QueryKind, Store, StoreConfig, View};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Store::builder(StoreConfig {
//!     memory_values: 1_000,
//!     ..Default::default()
//! })
//! .spawn()?;
//!
//! let cpu = store.load("cpu", true).await?.ok_or("no record")?;
//! store.write(&cpu, 85.5).await?;
//! store.write(&cpu, 87.0).await?;
//!
//! let last_minute = View::new(QueryKind::Average, Duration::from_secs(60));
//! if let Some(sample) = store.query(&cpu, Some(&last_minute)).await? {
//!     println!("average: {}", sample.value);
//! }
//!
//! store.prune().await?;
//! store.shutdown().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`Store`]: Cloneable handle to the actor; built with [`StoreBuilder`]
//! - [`fs::ValueFs`]: Directory and file semantics on top of a store
//! - [`SampleSink`]: Where samples go when they leave memory
//! - [`View`]: A query kind plus a lookback window
//!
//! ## Modules
//!
//! - [`store`]: The request actor and its handle
//! - [`sequence`]: Monotonic timestamps and injectable clocks
//! - [`history`]: Per-series sample lists and windows
//! - [`registry`]: Name to series mapping
//! - [`query`]: Query kinds and evaluation
//! - [`ledger`]: Global eviction order and write-through watermark
//! - [`sink`]: Persistence sinks and restore
//! - [`path`]: File-name grammar
//! - [`fs`]: Filesystem adapter
//! - [`config`]: Configuration
//! - [`error`]: Error types

pub mod config;
pub mod error;
pub mod fs;
pub mod history;
pub mod ledger;
pub mod path;
pub mod query;
pub mod registry;
pub mod sample;
pub mod sequence;
pub mod sink;
pub mod store;

// Re-export primary API types at crate root for convenience.
pub use config::{StoreConfig, ValueFsConfig};
pub use error::{Result, ValueFsError};
pub use query::{QueryKind, View};
pub use sample::{Record, Sample};
pub use sequence::{Clock, ManualClock, SystemClock, Timestamp};
pub use sink::SampleSink;
pub use store::{PruneReport, Store, StoreBuilder};
