use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::constants::{DUPES_FILE_SUFFIX, SORTED_FILE_SUFFIX};
use crate::error::{Result, SortError};
use crate::external_sort::progress::{ProgressObserver, ProgressTracker, SortPhase, SortProgress};
use crate::external_sort::source::FileSource;
use crate::external_sort::writer::{write_out_sorted, Passthrough, WriteOutTarget};
use crate::external_sort::{SortConfig, SortResult};
use crate::keys::{Key, KeyDefinitionSet};
use crate::staging::{BatchInserter, StagingStore};
use crate::utils::{format_duration, lines_per_second};

/// Produces the key tuple for one record from its fields and raw line.
pub type KeyExtractor<'a> = Box<dyn FnMut(&[String], &str) -> Result<Vec<Key>> + 'a>;
/// Returns `Ok(false)` to leave a record out of the sort.
pub type RowFilter<'a> = Box<dyn FnMut(&[String], &str) -> Result<bool> + 'a>;

/// A loaded and indexed staging store, ready for ordered scans and lookups.
pub struct LoadedIndex {
    pub store: StagingStore,
    pub header: Option<String>,
    pub stats: SortResult,
}

pub struct ExternalSortProcessor<'a> {
    config: SortConfig,
    source: FileSource,
    keys: KeyDefinitionSet,
    extractor: KeyExtractor<'a>,
    filter: Option<RowFilter<'a>>,
    progress: Option<ProgressObserver<'a>>,
    passthrough: Option<Passthrough<'a>>,
}

impl<'a> ExternalSortProcessor<'a> {
    pub fn new<F>(
        config: SortConfig,
        source: FileSource,
        keys: KeyDefinitionSet,
        extractor: F,
    ) -> Result<Self>
    where
        F: FnMut(&[String], &str) -> Result<Vec<Key>> + 'a,
    {
        config.validate()?;
        source.validate()?;

        Ok(Self {
            config,
            source,
            keys,
            extractor: Box::new(extractor),
            filter: None,
            progress: None,
            passthrough: None,
        })
    }

    pub fn with_filter<F>(mut self, filter: F) -> Self
    where
        F: FnMut(&[String], &str) -> Result<bool> + 'a,
    {
        self.filter = Some(Box::new(filter));
        self
    }

    pub fn with_progress<F>(mut self, observer: F) -> Self
    where
        F: FnMut(&SortProgress) + 'a,
    {
        self.progress = Some(Box::new(observer));
        self
    }

    pub fn with_passthrough<F>(mut self, passthrough: F) -> Self
    where
        F: FnMut(&str) + 'a,
    {
        self.passthrough = Some(Box::new(passthrough));
        self
    }

    pub fn config(&self) -> &SortConfig {
        &self.config
    }

    pub fn source(&self) -> &FileSource {
        &self.source
    }

    pub fn keys(&self) -> &KeyDefinitionSet {
        &self.keys
    }

    pub fn destination_folder(&self) -> PathBuf {
        self.config.destination_for(&self.source.path)
    }

    /// Loads, orders and writes out the source. On failure no sorted or
    /// duplicates file is left behind.
    pub fn sort(mut self) -> Result<SortResult> {
        let started = Instant::now();
        let transport = self.config.transport;
        if transport.uses_passthrough() && self.passthrough.is_none() {
            return Err(SortError::invalid(
                "A passthrough callback is required for the configured data transport",
            ));
        }

        let destination = self.destination_folder();
        let sorted_path = transport
            .writes_file()
            .then(|| self.source.derived_path(&destination, SORTED_FILE_SUFFIX));
        let duplicates_path = self.source.derived_path(&destination, DUPES_FILE_SUFFIX);
        remove_if_exists(&duplicates_path)?;

        info!("Sorting {}", self.source.path.display());

        let mut tracker = ProgressTracker::new(
            self.progress.take(),
            self.config.progress_log_interval,
            "sort",
        );
        let mut result = SortResult::default();

        let outcome = self.run_sort(
            &mut tracker,
            &mut result,
            sorted_path.as_deref(),
            &duplicates_path,
            &destination,
        );

        if let Err(e) = outcome {
            warn!("Sort of {} failed, removing partial output: {}", self.source.path.display(), e);
            if let Some(path) = &sorted_path {
                let _ = remove_if_exists(path);
            }
            let _ = remove_if_exists(&duplicates_path);
            return Err(e);
        }

        result.sorted_path = sorted_path;
        result.processing_time_ms = started.elapsed().as_millis() as u64;
        info!(
            "Sorted {}: {} read, {} sorted, {} duplicates, {} filtered in {}",
            self.source.path.display(),
            result.lines_read,
            result.lines_sorted,
            result.duplicates,
            result.filtered,
            format_duration(result.processing_time_ms)
        );
        if let Some(rate) = lines_per_second(result.lines_read, result.processing_time_ms) {
            debug!("{:.0} lines/s", rate);
        }
        Ok(result)
    }

    /// Loads and indexes the source without writing anything out.
    pub fn load_headless(&mut self) -> Result<LoadedIndex> {
        let mut tracker = ProgressTracker::new(
            self.progress.take(),
            self.config.progress_log_interval,
            "load",
        );
        let loaded = self.load_headless_with(&mut tracker);
        self.progress = tracker.into_observer();
        loaded
    }

    pub(crate) fn load_headless_with(&mut self, tracker: &mut ProgressTracker<'_>) -> Result<LoadedIndex> {
        let started = Instant::now();
        let destination = self.destination_folder();
        let mut store = self.open_store(&destination)?;
        let mut stats = SortResult::default();
        let header = self.load_into(&mut store, &mut stats, tracker)?;
        stats.processing_time_ms = started.elapsed().as_millis() as u64;
        Ok(LoadedIndex {
            store,
            header,
            stats,
        })
    }

    /// Runs the key extractor and checks the tuple against the key definitions.
    pub fn extract_keys(&mut self, fields: &[String], line: &str, line_number: usize) -> Result<Vec<Key>> {
        let keys = (self.extractor)(fields, line)?;
        self.keys
            .validate_tuple(&keys)
            .map_err(|message| SortError::KeyMismatch {
                line_number,
                message,
            })?;
        Ok(keys)
    }

    fn run_sort(
        &mut self,
        tracker: &mut ProgressTracker<'_>,
        result: &mut SortResult,
        sorted_path: Option<&Path>,
        duplicates_path: &Path,
        destination: &Path,
    ) -> Result<()> {
        let mut store = self.open_store(destination)?;
        let header = self.load_into(&mut store, result, tracker)?;

        let target = WriteOutTarget {
            header: header.as_deref(),
            sorted_path,
            duplicates_path: self.config.return_duplicates.then_some(duplicates_path),
            dedup_prefix: self.keys.dedup_prefix_len(),
            buffer_size: self.config.output_buffer_size_bytes(),
        };
        let passthrough = if self.config.transport.uses_passthrough() {
            self.passthrough.as_mut()
        } else {
            None
        };
        let written = write_out_sorted(&store, &target, passthrough, tracker)?;

        result.lines_sorted = written.lines_sorted;
        result.duplicates = written.duplicates;
        if written.duplicates_written {
            result.duplicates_path = Some(duplicates_path.to_path_buf());
        }
        Ok(())
    }

    fn open_store(&self, destination: &Path) -> Result<StagingStore> {
        let staging_dir = self.config.staging_directory(destination);
        StagingStore::open(
            &staging_dir,
            self.keys.clone(),
            self.source.format.payload_codec(),
            self.config.cache_capacity_mb,
        )
    }

    // Streams the source into the store and builds its index; returns the header.
    fn load_into(
        &mut self,
        store: &mut StagingStore,
        stats: &mut SortResult,
        tracker: &mut ProgressTracker<'_>,
    ) -> Result<Option<String>> {
        let mut reader = self.source.open_lines(self.config.io_buffer_size_bytes())?;
        let header = if self.source.has_header {
            reader.next_line()?
        } else {
            None
        };

        tracker.start(SortPhase::Reading);
        let mut inserter = BatchInserter::new(store, self.config.max_batch_size);

        while let Some(line) = reader.next_line()? {
            let line_number = reader.line_number();
            stats.lines_read += 1;
            tracker.tick();

            let fields = self
                .source
                .format
                .parse(&line)
                .map_err(|e| SortError::MalformedLine {
                    line_number,
                    field_index: e.field_index,
                    reason: e.reason,
                })?;

            if let Some(filter) = self.filter.as_mut() {
                if !filter(&fields, &line)? {
                    stats.filtered += 1;
                    continue;
                }
            }

            let keys = self.extract_keys(&fields, &line, line_number)?;
            inserter.add_record(keys, line)?;
        }

        let staged = inserter.finish()?;
        debug!(
            "Staged {} of {} lines from {}",
            staged,
            stats.lines_read,
            self.source.path.display()
        );
        store.finalize_indexes()?;
        Ok(header)
    }
}

pub(crate) fn remove_if_exists(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
