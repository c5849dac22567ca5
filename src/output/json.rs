//! Whole-document JSON accumulator
//!
//! Every flush writes the complete `{"results": [...]}` document to a
//! temporary file in the target directory, syncs it, and renames it over the
//! target. A reader therefore sees either the previous checkpoint or the new
//! one, never a truncated file.
//!
//! A document carried over from an earlier run is rewritten with its
//! `results` entries and other top-level keys untouched.

use super::{LocalitySink, OutputError, OutputResult, OutputWriter};
use crate::Locality;
use fd_lock::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Serialize)]
struct DocumentRef<'a, T> {
    results: &'a [T],
    #[serde(flatten)]
    extra: &'a Map<String, Value>,
}

#[derive(Deserialize)]
struct Document {
    results: Vec<Value>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

/// Content of an output document written by an earlier run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PersistedDocument {
    /// `results` entries in file order, whatever their shape
    pub results: Vec<Value>,
    /// Top-level keys other than `results`
    pub extra: Map<String, Value>,
}

impl From<Vec<Locality>> for PersistedDocument {
    fn from(records: Vec<Locality>) -> Self {
        Self {
            results: records.into_iter().map(Locality::into_value).collect(),
            extra: Map::new(),
        }
    }
}

/// In-memory accumulator with atomic checkpoints
#[derive(Debug)]
pub struct JsonAccumulator {
    path: PathBuf,
    records: Vec<Value>,
    extra: Map<String, Value>,
    appended: usize,
    dirty: bool,
    written: bool,
}

impl JsonAccumulator {
    /// Start an empty document at `path`; nothing is written until the first flush
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::seeded(path, PersistedDocument::default())
    }

    /// Continue a document persisted by a previous run
    pub fn seeded(path: impl Into<PathBuf>, document: PersistedDocument) -> Self {
        Self {
            path: path.into(),
            records: document.results,
            extra: document.extra,
            appended: 0,
            dirty: false,
            written: false,
        }
    }

    /// All `results` entries held, seeded ones first
    pub fn records(&self) -> &[Value] {
        &self.records
    }
}

impl OutputWriter for JsonAccumulator {
    fn flush(&mut self) -> OutputResult<()> {
        if !self.dirty && self.written {
            return Ok(());
        }
        write_document_with(&self.path, &self.records, &self.extra)?;
        self.dirty = false;
        self.written = true;
        Ok(())
    }

    fn close(mut self) -> OutputResult<()> {
        self.flush()
    }
}

impl LocalitySink for JsonAccumulator {
    fn append(&mut self, record: &Locality) -> OutputResult<()> {
        self.records.push(record.clone().into_value());
        self.appended += 1;
        self.dirty = true;
        Ok(())
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn appended(&self) -> usize {
        self.appended
    }
}

/// Atomically replace `path` with a `{"results": [...]}` document
pub fn write_document(path: &Path, records: &[Locality]) -> OutputResult<()> {
    write_document_with(path, records, &Map::new())
}

/// Atomically replace `path` with `results` plus the extra top-level keys
///
/// Holds an exclusive advisory lock on the sibling `.lock` file for the
/// duration of the write.
pub fn write_document_with<T: Serialize>(
    path: &Path,
    results: &[T],
    extra: &Map<String, Value>,
) -> OutputResult<()> {
    let parent_dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent_dir).map_err(|e| OutputError::io(parent_dir, e))?;

    let body = serde_json::to_vec_pretty(&DocumentRef { results, extra })
        .map_err(|e| OutputError::SerializationError(e.to_string()))?;

    let lock_path = path.with_extension("lock");
    let lock_file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(&lock_path)
        .map_err(|e| OutputError::LockError(format!("Failed to create lock file: {e}")))?;
    let mut lock = RwLock::new(lock_file);
    let _guard = lock
        .write()
        .map_err(|e| OutputError::LockError(format!("Failed to acquire write lock: {e}")))?;

    let mut temp_file =
        tempfile::NamedTempFile::new_in(parent_dir).map_err(|e| OutputError::io(parent_dir, e))?;
    temp_file
        .write_all(&body)
        .and_then(|_| temp_file.flush())
        .and_then(|_| temp_file.as_file().sync_all())
        .map_err(|e| OutputError::io(temp_file.path(), e))?;
    temp_file
        .persist(path)
        .map_err(|e| OutputError::io(path, e.error))?;

    // Make the rename itself durable
    if let Err(e) = std::fs::File::open(parent_dir).and_then(|dir| dir.sync_all()) {
        warn!(dir = %parent_dir.display(), error = %e, "Failed to sync output directory after rename");
    }

    debug!(path = %path.display(), records = results.len(), "Checkpoint written");
    Ok(())
}

/// Read the `results` array of a document written by [`write_document`]
pub fn read_document(path: &Path) -> OutputResult<Vec<Value>> {
    Ok(read_persisted(path)?.results)
}

/// Read a whole document, keeping every `results` entry and top-level key
pub fn read_persisted(path: &Path) -> OutputResult<PersistedDocument> {
    let text = std::fs::read_to_string(path).map_err(|e| OutputError::io(path, e))?;
    let doc: Document = serde_json::from_str(&text).map_err(|e| OutputError::InvalidDocument {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    Ok(PersistedDocument {
        results: doc.results,
        extra: doc.extra,
    })
}
