//! Error types for the valuefs value store.

use std::path::PathBuf;

use thiserror::Error;

/// The main error type for all valuefs operations.
///
/// Absence is never an error here: a missing series or an empty query window
/// is reported as `None` by the store API. These variants cover the cases
/// where an operation could not be carried out at all.
#[derive(Error, Debug)]
pub enum ValueFsError {
    /// The store actor could not be reached or started.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// A persistence sink failed.
    #[error("sink error: {0}")]
    Sink(#[from] SinkError),

    /// Configuration could not be loaded or is invalid.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// A filesystem-adapter operation failed.
    #[error("fs error: {0}")]
    Fs(#[from] FsError),
}

/// Errors raised by the store handle when talking to its actor.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The actor has shut down and no longer accepts requests.
    #[error("store is closed")]
    Closed,

    /// The actor thread could not be spawned.
    #[error("failed to spawn store actor: {source}")]
    Spawn {
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Errors returned by a [`SampleSink`](crate::sink::SampleSink).
///
/// Sink errors never abort the store. The write-through pass stops at the
/// first failing sample and retries it on the next prune.
#[derive(Error, Debug)]
pub enum SinkError {
    /// Writing to the underlying output failed.
    #[error("sink I/O failed: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// A sample could not be serialized or parsed.
    #[error("sink serialization failed: {source}")]
    Serialize {
        /// The underlying JSON error.
        #[from]
        source: serde_json::Error,
    },

    /// The sink refused the sample.
    #[error("sink rejected sample: {reason}")]
    Rejected {
        /// Why the sample was rejected.
        reason: String,
    },
}

/// Errors that can occur while loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read config '{}': {source}", path.display())]
    Read {
        /// The config file path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid JSON for the expected shape.
    #[error("failed to parse config '{}': {source}", path.display())]
    Parse {
        /// The config file path.
        path: PathBuf,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// The request queue must hold at least one request.
    #[error("invalid queue_capacity: {capacity} (must be > 0)")]
    InvalidQueueCapacity {
        /// The rejected capacity.
        capacity: usize,
    },

    /// The prune interval must be non-zero.
    #[error("invalid prune interval: must be greater than zero")]
    InvalidPruneInterval,
}

/// Errors surfaced by the filesystem adapter.
///
/// These map one-to-one onto the errno values a mounted filesystem would
/// return (`ENOENT`, `EROFS`, `EIO`).
#[derive(Error, Debug)]
pub enum FsError {
    /// No such file, or the name does not match the path grammar.
    #[error("no such file: {name}")]
    NotFound {
        /// The name that was looked up.
        name: String,
    },

    /// The file is a windowed view and cannot be written.
    #[error("file is read-only: {name}")]
    ReadOnly {
        /// The file name.
        name: String,
    },

    /// Writes must replace the whole value starting at offset zero.
    #[error("write at offset {offset} not supported")]
    NonZeroOffset {
        /// The rejected offset.
        offset: u64,
    },

    /// The written bytes are not a finite number.
    #[error("invalid value: {input:?}")]
    InvalidValue {
        /// The trimmed text that failed to parse.
        input: String,
    },

    /// The store behind the adapter is unavailable.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Type alias for `Result<T, ValueFsError>`.
pub type Result<T> = std::result::Result<T, ValueFsError>;
