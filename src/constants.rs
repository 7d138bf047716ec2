pub const DEFAULT_DELIMITER: char = ',';
pub const TAB_DELIMITER: char = '\t';
pub const QUOTE_CHAR: char = '"';

// Appended to payloads before staging so trailing empty fields and
// trailing whitespace survive the round trip; stripped again on write-out.
pub const PRESERVE_CHAR: char = '~';

pub const SORTED_FILE_SUFFIX: &str = "sorted";
pub const DUPES_FILE_SUFFIX: &str = "dupes";
pub const ADDS_FILE_SUFFIX: &str = "adds";
pub const DELETES_FILE_SUFFIX: &str = "deletes";
pub const UPDATES_FILE_SUFFIX: &str = "updates";
pub const IGNORED_FILE_SUFFIX: &str = "ignored";
pub const MASTER_FILE_SUFFIX: &str = "master";

pub const BYTES_PER_KB: usize = 1024;
pub const BYTES_PER_MB: usize = 1_048_576;

pub const ZSTD_COMPRESSION_LEVEL: i32 = 3;
