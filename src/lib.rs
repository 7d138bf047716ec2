// Line codec for delimited and fixed-width records
pub mod codec;

pub mod constants;
pub mod error;
pub mod keys;

// Disk-backed staging store used as sort and lookup index
pub mod staging;

// External sort - load, order, dedup and write out
pub mod external_sort;

pub mod merge_purge;
pub mod utils;

// Re-export main types for convenience
pub use codec::{DelimitedFormat, FileFormat, FixedWidthFormat};
pub use error::{ErrorKind, Result, SortError};
pub use external_sort::{
    DataTransport, ExternalSortProcessor, FileSource, SortConfig, SortPhase, SortProgress,
    SortResult,
};
pub use keys::{Key, KeyDefinition, KeyDefinitionSet, KeyType, SortDirection};
pub use merge_purge::{
    MergePurgeAction, MergePurgeEngine, MergePurgeMode, MergePurgeParam, MergePurgeResult,
};
