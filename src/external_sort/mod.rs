pub mod config;
pub mod constants;
pub mod processor;
pub mod progress;
pub mod source;
pub mod writer;


pub use config::{DataTransport, SortConfig};
pub use processor::{ExternalSortProcessor, KeyExtractor, LoadedIndex, RowFilter};
pub use progress::{SortPhase, SortProgress};
pub use source::{FileSource, LineReader};
pub use writer::Passthrough;

use serde::Serialize;
use std::path::PathBuf;

use crate::error::{Result, SortError};
use crate::keys::{column_extractor, pad_key_with_zero, Key, KeyDefinition, KeyDefinitionSet, KeyType, SortDirection};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SortResult {
    /// Data lines read, header excluded.
    pub lines_read: usize,
    pub lines_sorted: usize,
    pub duplicates: usize,
    pub filtered: usize,
    /// `None` when output went to the passthrough only.
    pub sorted_path: Option<PathBuf>,
    /// Set only when duplicates were requested and at least one was found.
    pub duplicates_path: Option<PathBuf>,
    pub processing_time_ms: u64,
}

/// Sorts a delimited file on a single column.
pub fn sort_delimited_by_column(
    source: FileSource,
    column: usize,
    key_type: KeyType,
    direction: SortDirection,
    is_unique: bool,
    config: SortConfig,
) -> Result<SortResult> {
    let mut definition = KeyDefinition::new(key_type, direction);
    definition.is_unique = is_unique;
    ExternalSortProcessor::new(
        config,
        source,
        KeyDefinitionSet::single(definition),
        column_extractor(vec![(column, key_type)]),
    )?
    .sort()
}

/// Sorts a fixed-width file on the characters `start..start + len` of each
/// line. Text keys are zero-padded to `len` after trimming.
pub fn sort_fixed_width_by_range(
    source: FileSource,
    start: usize,
    len: usize,
    key_type: KeyType,
    direction: SortDirection,
    is_unique: bool,
    config: SortConfig,
) -> Result<SortResult> {
    if len == 0 {
        return Err(SortError::invalid("Key length must be greater than zero"));
    }
    let mut definition = KeyDefinition::new(key_type, direction);
    definition.is_unique = is_unique;
    ExternalSortProcessor::new(
        config,
        source,
        KeyDefinitionSet::single(definition),
        move |_fields: &[String], line: &str| {
            let raw: String = line.chars().skip(start).take(len).collect();
            let key = match key_type {
                KeyType::Numeric => Key::numeric_from_str(&raw)?,
                KeyType::Text => Key::Text(pad_key_with_zero(&raw, len)),
            };
            Ok(vec![key])
        },
    )?
    .sort()
}

/// Runs a sort on the blocking thread pool.
pub async fn sort_file_async<F>(
    config: SortConfig,
    source: FileSource,
    keys: KeyDefinitionSet,
    extractor: F,
) -> Result<SortResult>
where
    F: FnMut(&[String], &str) -> Result<Vec<Key>> + Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        ExternalSortProcessor::new(config, source, keys, extractor)?.sort()
    })
    .await
    .map_err(|e| SortError::Task(e.to_string()))?
}
