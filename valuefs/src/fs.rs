//! Directory and file semantics over a [`Store`].
//!
//! [`ValueFs`] presents the store as a single flat, read-only directory with
//! one file per series. Reading a file yields the series' value rendered as
//! text; writing a number to a plain file appends a sample. Extended names
//! (see [`crate::path`]) open read-only views such as `cpu#5m`.
//!
//! The adapter speaks in terms a mount layer needs (inodes, modes, sizes,
//! errno-like [`FsError`]s) but does not depend on any particular one.
//!
//! # Example
//!
//! ```rust,no_run
//! use valuefs::fs::ValueFs;
//! use valuefs::{Store, StoreConfig};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let fs = ValueFs::new(Store::builder(StoreConfig::default()).spawn()?);
//!
//! let mut file = fs.create("temperature").await?;
//! fs.write(&mut file, 0, b"21.5\n").await?;
//!
//! let mut view = fs.lookup("temperature#10m").await?;
//! let attr = fs.attr(&mut view).await?;
//! println!("{} bytes: {:?}", attr.size, fs.read(&view));
//! # Ok(())
//! # }
//! ```

use serde::Serialize;

use crate::error::FsError;
use crate::path::{parse_latest_path, parse_path};
use crate::query::{QueryKind, View};
use crate::sample::{Record, Sample};
use crate::sequence::Timestamp;
use crate::store::Store;

/// Inode of the root directory.
pub const ROOT_INODE: u64 = 1;

/// Permission bits of the root directory.
pub const DIR_MODE: u32 = 0o555;

/// Permission bits of every value file.
pub const FILE_MODE: u32 = 0o664;

/// Attributes of a file or the root directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FileAttr {
    /// Inode number.
    pub inode: u64,
    /// Content length in bytes.
    pub size: u64,
    /// Modification time, in nanoseconds since the Unix epoch.
    pub mtime: Timestamp,
    /// Permission bits.
    pub mode: u32,
    /// Whether this is the root directory.
    pub is_dir: bool,
}

/// One entry of the root directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DirEntry {
    /// The series name.
    pub name: String,
    /// The record's inode.
    pub inode: u64,
}

/// An open file.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueFile {
    /// Just created; no value has been fetched yet. Becomes
    /// [`Latest`](Self::Latest) on the first [`ValueFs::attr`].
    Bare {
        /// The series.
        record: Record,
    },
    /// The series' latest value. Writable.
    Latest {
        /// The series.
        record: Record,
        /// The value fetched by the last [`ValueFs::attr`].
        sample: Option<Sample>,
        /// `sample` rendered as text.
        content: Vec<u8>,
    },
    /// An aggregate over a window of the series. Read-only.
    Windowed {
        /// The series.
        record: Record,
        /// The query this file shows.
        view: View,
        /// The value fetched by the last [`ValueFs::attr`].
        sample: Option<Sample>,
        /// `sample` rendered as text.
        content: Vec<u8>,
    },
}

impl ValueFile {
    /// The series behind this file.
    pub fn record(&self) -> &Record {
        match self {
            Self::Bare { record }
            | Self::Latest { record, .. }
            | Self::Windowed { record, .. } => record,
        }
    }

    /// The view this file shows, or `None` for the latest value.
    pub fn view(&self) -> Option<&View> {
        match self {
            Self::Windowed { view, .. } => Some(view),
            Self::Bare { .. } | Self::Latest { .. } => None,
        }
    }

    /// The value fetched by the last [`ValueFs::attr`].
    pub fn sample(&self) -> Option<&Sample> {
        match self {
            Self::Bare { .. } => None,
            Self::Latest { sample, .. } | Self::Windowed { sample, .. } => sample.as_ref(),
        }
    }

    /// Whether values can be written through this file.
    pub fn is_writable(&self) -> bool {
        !matches!(self, Self::Windowed { .. })
    }

    fn content(&self) -> &[u8] {
        match self {
            Self::Bare { .. } => &[],
            Self::Latest { content, .. } | Self::Windowed { content, .. } => content,
        }
    }
}

/// The filesystem adapter.
#[derive(Debug, Clone)]
pub struct ValueFs {
    store: Store,
}

impl ValueFs {
    /// Wraps a store.
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// The underlying store.
    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Attributes of the root directory.
    pub fn root_attr(&self) -> FileAttr {
        FileAttr {
            inode: ROOT_INODE,
            size: 0,
            mtime: 0,
            mode: DIR_MODE,
            is_dir: true,
        }
    }

    /// Lists the root directory, sorted by name.
    ///
    /// # Errors
    ///
    /// Returns [`FsError::Store`] if the store has shut down.
    pub async fn read_dir(&self) -> Result<Vec<DirEntry>, FsError> {
        let mut entries: Vec<_> = self
            .store
            .list()
            .await?
            .into_iter()
            .map(|record| DirEntry {
                inode: record.inode(),
                name: record.name,
            })
            .collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    /// Opens an existing series, optionally through a view.
    ///
    /// # Errors
    ///
    /// Returns [`FsError::NotFound`] if the name does not parse or the series
    /// does not exist, or [`FsError::Store`] if the store has shut down.
    pub async fn lookup(&self, name: &str) -> Result<ValueFile, FsError> {
        let Some((series, view)) = parse_path(name) else {
            tracing::debug!(name, "lookup of unparseable name");
            return Err(not_found(name));
        };
        let Some(record) = self.store.load(&series, false).await? else {
            return Err(not_found(name));
        };

        let file = match view {
            Some(view) if view.kind != QueryKind::Latest => ValueFile::Windowed {
                record,
                view,
                sample: None,
                content: Vec::new(),
            },
            _ => ValueFile::Latest {
                record,
                sample: None,
                content: Vec::new(),
            },
        };
        Ok(file)
    }

    /// Creates a series, or opens it if it already exists. Only plain names
    /// can be created.
    ///
    /// # Errors
    ///
    /// Returns [`FsError::NotFound`] if `name` is not a plain series name, or
    /// [`FsError::Store`] if the store has shut down.
    pub async fn create(&self, name: &str) -> Result<ValueFile, FsError> {
        let Some(series) = parse_latest_path(name) else {
            return Err(not_found(name));
        };
        let Some(record) = self.store.load(&series, true).await? else {
            return Err(not_found(name));
        };
        tracing::debug!(name, created_at = record.created_at, "created file");
        Ok(ValueFile::Bare { record })
    }

    /// Deletes a series. Only plain names can be removed.
    ///
    /// # Errors
    ///
    /// Returns [`FsError::NotFound`] if `name` is not a plain series name or
    /// the series does not exist, or [`FsError::Store`] if the store has shut
    /// down.
    pub async fn remove(&self, name: &str) -> Result<(), FsError> {
        let Some(series) = parse_latest_path(name) else {
            return Err(not_found(name));
        };
        let Some(record) = self.store.load(&series, false).await? else {
            return Err(not_found(name));
        };
        if !self.store.delete(&record).await? {
            return Err(not_found(name));
        }
        tracing::debug!(name, "removed file");
        Ok(())
    }

    /// Refreshes `file` from the store and returns its attributes.
    ///
    /// The inode and modification time come from the fetched sample when
    /// there is one, and from the record otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`FsError::Store`] if the store has shut down.
    pub async fn attr(&self, file: &mut ValueFile) -> Result<FileAttr, FsError> {
        let record = file.record().clone();
        let view = file.view().copied();
        let fetched = self.store.query(&record, view.as_ref()).await?;
        let rendered = fetched.map(|s| s.to_bytes()).unwrap_or_default();

        let (inode, mtime) = match &fetched {
            Some(s) => (s.observed_at, s.observed_at),
            None => (record.inode(), record.created_at),
        };

        *file = match view {
            Some(view) => ValueFile::Windowed {
                record,
                view,
                sample: fetched,
                content: rendered,
            },
            None => ValueFile::Latest {
                record,
                sample: fetched,
                content: rendered,
            },
        };

        Ok(FileAttr {
            inode,
            size: file.content().len() as u64,
            mtime,
            mode: FILE_MODE,
            is_dir: false,
        })
    }

    /// Returns the content cached by the last [`attr`](Self::attr).
    pub fn read<'a>(&self, file: &'a ValueFile) -> &'a [u8] {
        file.content()
    }

    /// Writes a number to a plain file, appending it to the series.
    ///
    /// The whole value must be written at offset zero; surrounding
    /// whitespace is ignored. Returns the number of bytes accepted.
    ///
    /// # Errors
    ///
    /// Returns [`FsError::ReadOnly`] for windowed files,
    /// [`FsError::NonZeroOffset`] for partial writes,
    /// [`FsError::InvalidValue`] if the data is not a finite number,
    /// [`FsError::NotFound`] if the series was deleted, or
    /// [`FsError::Store`] if the store has shut down.
    pub async fn write(&self, file: &mut ValueFile, offset: u64, data: &[u8]) -> Result<usize, FsError> {
        if !file.is_writable() {
            return Err(FsError::ReadOnly {
                name: file.record().name.clone(),
            });
        }
        if offset != 0 {
            return Err(FsError::NonZeroOffset { offset });
        }

        let text = String::from_utf8_lossy(data);
        let text = text.trim();
        let value = text
            .parse::<f64>()
            .ok()
            .filter(|value| value.is_finite())
            .ok_or_else(|| FsError::InvalidValue {
                input: text.to_string(),
            })?;

        let record = file.record();
        tracing::debug!(name = %record.name, value, "got write");
        if !self.store.write(record, value).await? {
            return Err(not_found(&record.name));
        }
        Ok(data.len())
    }
}

fn not_found(name: &str) -> FsError {
    FsError::NotFound {
        name: name.to_string(),
    }
}
