//! Output file naming
//!
//! Files are named `{Country}_Mine_enriched.{json|jsonl}` inside the save
//! directory, for example `mindat_data/South_Africa_Mine_enriched.jsonl`.

use super::OutputError;
use crate::config::SaveFormat;
use std::path::{Path, PathBuf};

/// Fixed part of every output file name
pub const FILE_SUFFIX: &str = "_Mine_enriched";

/// Build the output path for a country
///
/// Spaces become `_`. Names containing path separators, `..`, or nothing but
/// whitespace are rejected so a country can never escape the save directory.
pub fn output_path(dir: &Path, country: &str, format: SaveFormat) -> Result<PathBuf, OutputError> {
    let name = sanitize_country(country)?;
    Ok(dir.join(format!("{name}{FILE_SUFFIX}.{}", format.extension())))
}

fn sanitize_country(country: &str) -> Result<String, OutputError> {
    let trimmed = country.trim();
    if trimmed.is_empty() {
        return Err(OutputError::InvalidPath("country name is empty".to_string()));
    }
    if trimmed.contains(['/', '\\', '\0']) || trimmed.contains("..") {
        return Err(OutputError::InvalidPath(format!(
            "country name {country:?} contains path separators"
        )));
    }
    Ok(trimmed.replace(' ', "_"))
}
