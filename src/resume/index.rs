//! Index of localities already persisted

use super::ResumeError;
use crate::config::SaveFormat;
use crate::output::json::{read_persisted, PersistedDocument};
use crate::output::jsonl::read_lines;
use crate::output::OutputError;
use crate::{LocalityId, LOCALITY_ID_FIELD};
use chrono::Local;
use serde_json::Value;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Locality ids found in an existing output file
#[derive(Debug, Default)]
pub struct ResumeIndex {
    ids: HashSet<LocalityId>,
    document: PersistedDocument,
    quarantined: Option<PathBuf>,
}

impl ResumeIndex {
    /// An index that knows nothing
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build the index from the output file at `path`
    ///
    /// A missing file gives an empty index. A JSON document that does not
    /// parse is renamed to `<file>.corrupt-<timestamp>` so the next checkpoint
    /// cannot destroy it, and the run starts empty. Torn JSONL lines are
    /// skipped.
    pub fn load(path: &Path, format: SaveFormat) -> Result<Self, ResumeError> {
        if !path.exists() {
            return Ok(Self::empty());
        }

        let read_error = |e: OutputError| ResumeError::ReadError {
            path: path.to_path_buf(),
            message: e.to_string(),
        };

        let mut index = Self::empty();
        match format {
            SaveFormat::Json => match read_persisted(path) {
                Ok(document) => {
                    for value in &document.results {
                        index.insert_value(value);
                    }
                    index.document = document;
                }
                Err(OutputError::InvalidDocument { message, .. }) => {
                    let target = quarantine(path)?;
                    warn!(
                        path = %path.display(),
                        moved_to = %target.display(),
                        error = %message,
                        "Existing output is not a valid document, starting fresh"
                    );
                    index.quarantined = Some(target);
                }
                Err(e) => return Err(read_error(e)),
            },
            SaveFormat::Jsonl => {
                for value in read_lines(path).map_err(read_error)? {
                    index.insert_value(&value);
                }
            }
        }

        info!(
            path = %path.display(),
            persisted = index.len(),
            "Loaded resume index"
        );
        Ok(index)
    }

    fn insert_value(&mut self, value: &Value) {
        match value.get(LOCALITY_ID_FIELD).and_then(LocalityId::from_value) {
            Some(id) => {
                self.ids.insert(id);
            }
            None => debug!("Persisted entry has no locality id, kept as is"),
        }
    }

    /// Whether `id` is already persisted
    pub fn contains(&self, id: &LocalityId) -> bool {
        self.ids.contains(id)
    }

    /// Number of distinct persisted ids
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Whether no ids are known
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Where a corrupt output file was moved, if one was found
    pub fn quarantined(&self) -> Option<&Path> {
        self.quarantined.as_deref()
    }

    /// Persisted document to seed a whole-document sink with; empty for JSONL
    pub fn take_document(&mut self) -> PersistedDocument {
        std::mem::take(&mut self.document)
    }
}

fn quarantine(path: &Path) -> Result<PathBuf, ResumeError> {
    let stamp = Local::now().format("%Y%m%d_%H%M%S");
    let mut name = path.as_os_str().to_os_string();
    name.push(format!(".corrupt-{stamp}"));
    let target = PathBuf::from(name);
    std::fs::rename(path, &target).map_err(|e| ResumeError::QuarantineError {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    Ok(target)
}
