//! Persistence sinks for write-through.
//!
//! A [`SampleSink`] receives every sample exactly once, in production order,
//! when the store prunes. Sinks are best-effort: a failure stops the current
//! write-through pass and the same sample is offered again on the next one.
//! A store without a sink runs in transient mode and treats every sample as
//! already persisted.
//!
//! Two sinks are provided:
//!
//! - [`WriterSink`]: tab-separated lines on any `Write`, e.g. stdout or stderr
//! - [`JsonLinesSink`]: one JSON object per line in an append-only file,
//!   readable again with [`read_last_values`] to restore a store
//!
//! # Example
//!
//! ```rust,no_run
//! use valuefs::sink::{JsonLinesSink, read_last_values};
//! use valuefs::{Store, StoreConfig};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let restored = read_last_values("values.jsonl")?;
//! let sink = JsonLinesSink::open("values.jsonl")?;
//! let store = Store::builder(StoreConfig::default())
//!     .sink(sink)
//!     .restore(restored)
//!     .spawn()?;
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::SinkError;
use crate::sample::{Record, Sample};
use crate::sequence::Timestamp;

/// Destination for samples leaving memory.
pub trait SampleSink: Send {
    /// Persists one sample of `record`.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError`] if the sample could not be stored. The store
    /// will offer the same sample again on its next write-through pass.
    fn store(&mut self, record: &Record, sample: &Sample) -> Result<(), SinkError>;

    /// Flushes buffered output. Called after every write-through pass.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError`] if buffered data could not be written out.
    fn flush(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}

impl<S: SampleSink + ?Sized> SampleSink for Box<S> {
    fn store(&mut self, record: &Record, sample: &Sample) -> Result<(), SinkError> {
        (**self).store(record, sample)
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        (**self).flush()
    }
}

/// Writes `name\tobserved_at\tvalue` lines to an output.
#[derive(Debug)]
pub struct WriterSink<W> {
    out: W,
}

impl<W: Write + Send> WriterSink<W> {
    /// Wraps an output.
    pub fn new(out: W) -> Self {
        Self { out }
    }

    /// Returns the wrapped output.
    pub fn into_inner(self) -> W {
        self.out
    }
}

impl WriterSink<std::io::Stdout> {
    /// A sink printing to stdout.
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl WriterSink<std::io::Stderr> {
    /// A sink printing to stderr.
    pub fn stderr() -> Self {
        Self::new(std::io::stderr())
    }
}

impl<W: Write + Send> SampleSink for WriterSink<W> {
    fn store(&mut self, record: &Record, sample: &Sample) -> Result<(), SinkError> {
        writeln!(
            self.out,
            "{}\t{}\t{}",
            record.name, sample.observed_at, sample.value
        )?;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        self.out.flush()?;
        Ok(())
    }
}

/// One persisted sample, as stored by [`JsonLinesSink`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedSample {
    /// Series name.
    pub name: String,
    /// When the series was created.
    pub created_at: Timestamp,
    /// The sample value.
    pub value: f64,
    /// When the sample was observed.
    pub observed_at: Timestamp,
}

/// Appends samples as JSON lines to a file.
#[derive(Debug)]
pub struct JsonLinesSink {
    out: BufWriter<File>,
}

impl JsonLinesSink {
    /// Opens `path` for appending, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::Io`] if the file cannot be opened.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, SinkError> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            out: BufWriter::new(file),
        })
    }
}

impl SampleSink for JsonLinesSink {
    fn store(&mut self, record: &Record, sample: &Sample) -> Result<(), SinkError> {
        let line = PersistedSample {
            name: record.name.clone(),
            created_at: record.created_at,
            value: sample.value,
            observed_at: sample.observed_at,
        };
        serde_json::to_writer(&mut self.out, &line)?;
        self.out.write_all(b"\n")?;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        self.out.flush()?;
        Ok(())
    }
}

/// Reads a [`JsonLinesSink`] file and returns the newest sample per name,
/// ordered by observation time.
///
/// A missing file yields no samples. Blank lines are skipped.
///
/// # Errors
///
/// Returns [`SinkError::Io`] if the file cannot be read, or
/// [`SinkError::Serialize`] if a line is not a persisted sample.
pub fn read_last_values<P: AsRef<Path>>(path: P) -> Result<Vec<(String, Sample)>, SinkError> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(Vec::new());
    }

    let reader = BufReader::new(File::open(path)?);
    let mut latest: HashMap<String, Sample> = HashMap::new();

    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let persisted: PersistedSample = serde_json::from_str(&line)?;
        let sample = Sample::new(persisted.value, persisted.observed_at);

        latest
            .entry(persisted.name)
            .and_modify(|current| {
                if sample.observed_at >= current.observed_at {
                    *current = sample;
                }
            })
            .or_insert(sample);
    }

    let mut values: Vec<_> = latest.into_iter().collect();
    values.sort_by_key(|(name, sample)| (sample.observed_at, name.clone()));
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_writer_sink_format() {
        let mut sink = WriterSink::new(Vec::new());
        let record = Record::new("cpu", 1);

        sink.store(&record, &Sample::new(85.5, 1_000)).unwrap();
        sink.store(&record, &Sample::new(3.0, 2_000)).unwrap();
        sink.flush().unwrap();

        let out = String::from_utf8(sink.into_inner()).unwrap();
        assert_eq!(out, "cpu\t1000\t85.5\ncpu\t2000\t3\n");
    }

    #[test]
    fn test_json_lines_restore_keeps_newest_per_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("values.jsonl");

        let cpu = Record::new("cpu", 1);
        let mem = Record::new("mem", 2);
        {
            let mut sink = JsonLinesSink::open(&path).unwrap();
            sink.store(&cpu, &Sample::new(1.0, 10)).unwrap();
            sink.store(&mem, &Sample::new(7.0, 15)).unwrap();
            sink.store(&cpu, &Sample::new(2.0, 20)).unwrap();
            sink.flush().unwrap();
        }
        // Reopening appends rather than truncating.
        {
            let mut sink = JsonLinesSink::open(&path).unwrap();
            sink.store(&cpu, &Sample::new(3.0, 30)).unwrap();
            sink.flush().unwrap();
        }

        let restored = read_last_values(&path).unwrap();
        assert_eq!(
            restored,
            vec![
                ("mem".to_string(), Sample::new(7.0, 15)),
                ("cpu".to_string(), Sample::new(3.0, 30)),
            ]
        );
    }

    #[test]
    fn test_read_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let restored = read_last_values(dir.path().join("absent.jsonl")).unwrap();
        assert!(restored.is_empty());
    }

    #[test]
    fn test_read_corrupt_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.jsonl");
        std::fs::write(&path, "{ not json }\n").unwrap();

        let result = read_last_values(&path);
        assert!(matches!(result, Err(SinkError::Serialize { .. })));
    }
}
