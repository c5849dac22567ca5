//! Resume support for interrupted runs
//!
//! A rerun over an existing output file reads the localities it already holds
//! so they are neither fetched again nor duplicated. The strategy sequence
//! still starts from the beginning; only the per-locality work is skipped.

pub mod index;

pub use index::ResumeIndex;

/// Resume errors
#[derive(Debug, thiserror::Error)]
pub enum ResumeError {
    /// Existing output could not be read
    #[error("failed to read existing output {path}: {message}")]
    ReadError {
        /// Output file
        path: std::path::PathBuf,
        /// Underlying error
        message: String,
    },

    /// A corrupt output file could not be moved aside
    #[error("failed to move corrupt output {path} aside: {message}")]
    QuarantineError {
        /// Output file
        path: std::path::PathBuf,
        /// Underlying error
        message: String,
    },
}
