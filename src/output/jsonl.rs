//! Streaming JSON-lines writer
//!
//! Each record is one compact JSON object on its own line, written and
//! flushed as soon as it is appended. Readers parse line by line and do not
//! depend on a trailing newline.

use super::{LocalitySink, OutputError, OutputResult, OutputWriter};
use crate::Locality;
use serde_json::Value;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Append-only JSONL writer
#[derive(Debug)]
pub struct JsonlWriter {
    path: PathBuf,
    file: File,
    appended: usize,
}

impl JsonlWriter {
    /// Open `path`, appending to existing content when `append` is set and truncating otherwise
    pub fn open(path: impl Into<PathBuf>, append: bool) -> OutputResult<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| OutputError::io(parent, e))?;
        }

        let mut options = OpenOptions::new();
        options.create(true).read(true);
        if append {
            options.append(true);
        } else {
            options.write(true).truncate(true);
        }
        let mut file = options.open(&path).map_err(|e| OutputError::io(&path, e))?;

        // A previous run killed mid-line leaves no newline; start on a fresh line
        if append && !ends_with_newline(&mut file).map_err(|e| OutputError::io(&path, e))? {
            file.write_all(b"\n").map_err(|e| OutputError::io(&path, e))?;
        }

        Ok(Self {
            path,
            file,
            appended: 0,
        })
    }
}

fn ends_with_newline(file: &mut File) -> std::io::Result<bool> {
    let len = file.metadata()?.len();
    if len == 0 {
        return Ok(true);
    }
    file.seek(SeekFrom::Start(len - 1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] == b'\n')
}

impl OutputWriter for JsonlWriter {
    fn flush(&mut self) -> OutputResult<()> {
        self.file
            .flush()
            .and_then(|_| self.file.sync_data())
            .map_err(|e| OutputError::io(&self.path, e))
    }

    fn close(mut self) -> OutputResult<()> {
        self.flush()
    }
}

impl LocalitySink for JsonlWriter {
    fn append(&mut self, record: &Locality) -> OutputResult<()> {
        let mut line = serde_json::to_vec(record)
            .map_err(|e| OutputError::SerializationError(e.to_string()))?;
        line.push(b'\n');
        self.file
            .write_all(&line)
            .and_then(|_| self.file.flush())
            .map_err(|e| OutputError::io(&self.path, e))?;
        self.appended += 1;
        Ok(())
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn appended(&self) -> usize {
        self.appended
    }
}

/// Parse every line of a JSONL file; blank and malformed lines are skipped with a warning
pub fn read_lines(path: &Path) -> OutputResult<Vec<Value>> {
    let file = File::open(path).map_err(|e| OutputError::io(path, e))?;
    let mut out = Vec::new();
    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|e| OutputError::io(path, e))?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match serde_json::from_str::<Value>(trimmed) {
            Ok(value) => out.push(value),
            Err(e) => warn!(
                path = %path.display(),
                line = index + 1,
                error = %e,
                "Skipping malformed JSON line"
            ),
        }
    }
    Ok(out)
}
