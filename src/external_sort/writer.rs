use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::{debug, info};

use crate::error::Result;
use crate::external_sort::progress::{ProgressTracker, SortPhase};
use crate::keys::Key;
use crate::staging::StagingStore;

pub type Passthrough<'a> = Box<dyn FnMut(&str) + 'a>;

/// Where and how a drained store is written.
pub(crate) struct WriteOutTarget<'p> {
    pub header: Option<&'p str>,
    pub sorted_path: Option<&'p Path>,
    /// Created on the first duplicate; `None` discards duplicates.
    pub duplicates_path: Option<&'p Path>,
    /// Leading key columns compared for duplicate suppression.
    pub dedup_prefix: Option<usize>,
    pub buffer_size: usize,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct WriteOutStats {
    pub lines_sorted: usize,
    pub duplicates: usize,
    pub duplicates_written: bool,
}

pub(crate) fn open_output(path: &Path, buffer_size: usize, header: Option<&str>) -> Result<BufWriter<File>> {
    let file = File::create(path)?;
    let mut writer = BufWriter::with_capacity(buffer_size, file);
    if let Some(header) = header {
        writeln!(writer, "{}", header)?;
    }
    Ok(writer)
}

/// Drains the store in key order. Duplicates are found by comparing each
/// record with the previous emitted one, which is enough because the scan
/// places equal keys next to each other.
pub(crate) fn write_out_sorted(
    store: &StagingStore,
    target: &WriteOutTarget<'_>,
    mut passthrough: Option<&mut Passthrough<'_>>,
    tracker: &mut ProgressTracker<'_>,
) -> Result<WriteOutStats> {
    tracker.start(SortPhase::Writing);
    debug!("Writing {} staged records in key order", store.len());

    let mut sorted = match target.sorted_path {
        Some(path) => Some(open_output(path, target.buffer_size, target.header)?),
        None => None,
    };
    let mut dupes: Option<BufWriter<File>> = None;
    let mut last_key: Option<Vec<Key>> = None;
    let mut stats = WriteOutStats::default();

    for record in store.scan_ordered()? {
        let record = record?;

        if let Some(prefix) = target.dedup_prefix {
            let current = &record.keys[..prefix.min(record.keys.len())];
            if last_key.as_deref() == Some(current) {
                stats.duplicates += 1;
                if let Some(path) = target.duplicates_path {
                    if dupes.is_none() {
                        dupes = Some(open_output(path, target.buffer_size, target.header)?);
                    }
                    if let Some(writer) = dupes.as_mut() {
                        writeln!(writer, "{}", record.line)?;
                    }
                }
                continue;
            }
            last_key = Some(current.to_vec());
        }

        if let Some(writer) = sorted.as_mut() {
            writeln!(writer, "{}", record.line)?;
        }
        if let Some(emit) = passthrough.as_mut() {
            emit(&record.line);
        }
        stats.lines_sorted += 1;
        tracker.tick();
    }

    if let Some(mut writer) = sorted {
        writer.flush()?;
    }
    if let Some(mut writer) = dupes {
        writer.flush()?;
        stats.duplicates_written = true;
    }

    info!(
        "Wrote {} records ({} duplicates suppressed)",
        stats.lines_sorted, stats.duplicates
    );
    Ok(stats)
}
