//! Locality output sinks
//!
//! Both sinks accept records in arrival order through [`LocalitySink::append`]:
//!
//! - [`json::JsonAccumulator`] keeps every record in memory and atomically
//!   rewrites `{"results": [...]}` on each flush
//! - [`jsonl::JsonlWriter`] appends one compact line per record and flushes it
//!   immediately

use crate::config::SaveFormat;
use crate::Locality;
use std::path::{Path, PathBuf};

pub mod json;
pub mod jsonl;
pub mod path;

pub use json::{JsonAccumulator, PersistedDocument};
pub use jsonl::JsonlWriter;
pub use path::output_path;

/// Output writer errors
#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    /// IO error
    #[error("IO error on {path}: {message}")]
    IoError {
        /// File involved
        path: PathBuf,
        /// Underlying error message
        message: String,
    },

    /// Serialization error
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// Advisory lock could not be taken
    #[error("lock error: {0}")]
    LockError(String),

    /// Output name cannot be turned into a safe path
    #[error("invalid output path: {0}")]
    InvalidPath(String),

    /// Existing output file is not a valid document
    #[error("invalid document {path}: {message}")]
    InvalidDocument {
        /// File involved
        path: PathBuf,
        /// Parser message
        message: String,
    },
}

impl OutputError {
    pub(crate) fn io(path: &Path, err: impl std::fmt::Display) -> Self {
        OutputError::IoError {
            path: path.to_path_buf(),
            message: err.to_string(),
        }
    }
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;

/// Generic output writer trait
pub trait OutputWriter {
    /// Make everything appended so far durable
    fn flush(&mut self) -> OutputResult<()>;

    /// Final flush; the writer is unusable afterwards
    fn close(self) -> OutputResult<()>;
}

/// Sink for locality records
pub trait LocalitySink: OutputWriter {
    /// Accept one record
    fn append(&mut self, record: &Locality) -> OutputResult<()>;

    /// Target file
    fn path(&self) -> &Path;

    /// Records appended during this run
    fn appended(&self) -> usize;
}

/// The sink chosen by configuration
pub enum SinkType {
    /// Whole-document JSON
    Json(JsonAccumulator),
    /// JSON lines
    Jsonl(JsonlWriter),
}

impl SinkType {
    /// Open the sink for `format` at `path`
    ///
    /// `seed` is the content a previous run persisted. The JSON accumulator
    /// carries it into every rewrite; the JSONL writer appends after the
    /// existing lines. Without a seed the JSONL file is truncated.
    pub fn open(path: &Path, format: SaveFormat, seed: Option<PersistedDocument>) -> OutputResult<Self> {
        match format {
            SaveFormat::Json => Ok(SinkType::Json(JsonAccumulator::seeded(
                path,
                seed.unwrap_or_default(),
            ))),
            SaveFormat::Jsonl => Ok(SinkType::Jsonl(JsonlWriter::open(path, seed.is_some())?)),
        }
    }

    /// Format of this sink
    pub fn format(&self) -> SaveFormat {
        match self {
            SinkType::Json(_) => SaveFormat::Json,
            SinkType::Jsonl(_) => SaveFormat::Jsonl,
        }
    }
}

impl OutputWriter for SinkType {
    fn flush(&mut self) -> OutputResult<()> {
        match self {
            SinkType::Json(writer) => writer.flush(),
            SinkType::Jsonl(writer) => writer.flush(),
        }
    }

    fn close(self) -> OutputResult<()> {
        match self {
            SinkType::Json(writer) => writer.close(),
            SinkType::Jsonl(writer) => writer.close(),
        }
    }
}

impl LocalitySink for SinkType {
    fn append(&mut self, record: &Locality) -> OutputResult<()> {
        match self {
            SinkType::Json(writer) => writer.append(record),
            SinkType::Jsonl(writer) => writer.append(record),
        }
    }

    fn path(&self) -> &Path {
        match self {
            SinkType::Json(writer) => writer.path(),
            SinkType::Jsonl(writer) => writer.path(),
        }
    }

    fn appended(&self) -> usize {
        match self {
            SinkType::Json(writer) => writer.appended(),
            SinkType::Jsonl(writer) => writer.appended(),
        }
    }
}
