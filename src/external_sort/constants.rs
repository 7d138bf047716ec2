pub const DEFAULT_MAX_BATCH_SIZE: usize = 250_000;
pub const MIN_MAX_BATCH_SIZE: usize = 1;
pub const MAX_MAX_BATCH_SIZE: usize = i32::MAX as usize;

pub const DEFAULT_CACHE_CAPACITY_MB: usize = 64;
pub const MIN_CACHE_CAPACITY_MB: usize = 1;
pub const MAX_CACHE_CAPACITY_MB: usize = 4096;

pub const DEFAULT_IO_BUFFER_SIZE_KB: usize = 64;
pub const MIN_IO_BUFFER_SIZE_KB: usize = 1;
pub const MAX_IO_BUFFER_SIZE_KB: usize = 1_048_576;
pub const OUTPUT_BUFFER_SIZE_KB: usize = 512;

pub const PROGRESS_REPORT_INTERVAL_RECORDS: usize = 100_000;

pub const STAGING_DIR_PREFIX: &str = "flatsift_";
pub const STAGING_DIR_EXTENSION: &str = ".stage";
pub const STAGING_NAME_RANDOM_LEN: usize = 12;

pub const ROWS_TREE_NAME: &str = "rows";
pub const INDEX_TREE_NAME: &str = "by_key";
pub const INDEX_BUILD_BATCH_SIZE: usize = 100_000;
