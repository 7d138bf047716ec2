use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::codec::FileFormat;
use crate::constants::{
    ADDS_FILE_SUFFIX, DELETES_FILE_SUFFIX, IGNORED_FILE_SUFFIX, MASTER_FILE_SUFFIX,
    UPDATES_FILE_SUFFIX,
};
use crate::error::{Result, SortError};
use crate::external_sort::processor::remove_if_exists;
use crate::external_sort::progress::{ProgressObserver, ProgressTracker, SortPhase};
use crate::external_sort::writer::{open_output, write_out_sorted, WriteOutTarget};
use crate::external_sort::{ExternalSortProcessor, FileSource, KeyExtractor, LoadedIndex, SortProgress};
use crate::keys::Key;
use crate::merge_purge::param::{MergePurgeAction, MergePurgeMode, MergePurgeParam};
use crate::merge_purge::result::MergePurgeResult;
use crate::staging::{StagingStore, StoredRecord};

/// Decides what should happen to a detail record by setting `action`.
pub type Classifier<'a> = Box<dyn FnMut(&mut MergePurgeParam) -> Result<()> + 'a>;

struct CategoryPaths {
    adds: PathBuf,
    deletes: PathBuf,
    updates: PathBuf,
    ignored: PathBuf,
}

impl CategoryPaths {
    fn for_detail(detail: &FileSource, folder: &Path) -> Self {
        Self {
            adds: detail.derived_path(folder, ADDS_FILE_SUFFIX),
            deletes: detail.derived_path(folder, DELETES_FILE_SUFFIX),
            updates: detail.derived_path(folder, UPDATES_FILE_SUFFIX),
            ignored: detail.derived_path(folder, IGNORED_FILE_SUFFIX),
        }
    }

    fn all(&self) -> [&Path; 4] {
        [&self.adds, &self.deletes, &self.updates, &self.ignored]
    }
}

struct CategoryWriters {
    adds: BufWriter<File>,
    deletes: BufWriter<File>,
    updates: BufWriter<File>,
    ignored: BufWriter<File>,
}

impl CategoryWriters {
    fn create(paths: &CategoryPaths, header: Option<&str>, buffer_size: usize) -> Result<Self> {
        Ok(Self {
            adds: open_output(&paths.adds, buffer_size, header)?,
            deletes: open_output(&paths.deletes, buffer_size, header)?,
            updates: open_output(&paths.updates, buffer_size, header)?,
            ignored: open_output(&paths.ignored, buffer_size, header)?,
        })
    }

    fn write(&mut self, action: MergePurgeAction, line: &str) -> Result<()> {
        let writer = match action {
            MergePurgeAction::Add => &mut self.adds,
            MergePurgeAction::Delete => &mut self.deletes,
            MergePurgeAction::Update => &mut self.updates,
            MergePurgeAction::Ignore => &mut self.ignored,
        };
        writeln!(writer, "{}", line)?;
        Ok(())
    }

    fn finish(mut self) -> Result<()> {
        self.adds.flush()?;
        self.deletes.flush()?;
        self.updates.flush()?;
        self.ignored.flush()?;
        Ok(())
    }
}

/// Reconciles a detail file against a master file.
pub struct MergePurgeEngine<'a> {
    master: ExternalSortProcessor<'a>,
    detail: FileSource,
    detail_extractor: KeyExtractor<'a>,
    classifier: Classifier<'a>,
    mode: MergePurgeMode,
    progress: Option<ProgressObserver<'a>>,
}

impl<'a> MergePurgeEngine<'a> {
    /// `master` supplies the master source, its keys and the output
    /// configuration. The detail extractor returns the leading master key
    /// values used for lookup.
    pub fn new<D, C>(
        master: ExternalSortProcessor<'a>,
        detail: FileSource,
        detail_extractor: D,
        classifier: C,
    ) -> Result<Self>
    where
        D: FnMut(&[String], &str) -> Result<Vec<Key>> + 'a,
        C: FnMut(&mut MergePurgeParam) -> Result<()> + 'a,
    {
        detail.validate()?;
        Ok(Self {
            master,
            detail,
            detail_extractor: Box::new(detail_extractor),
            classifier: Box::new(classifier),
            mode: MergePurgeMode::Passive,
            progress: None,
        })
    }

    pub fn with_mode(mut self, mode: MergePurgeMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_progress<F>(mut self, observer: F) -> Self
    where
        F: FnMut(&SortProgress) + 'a,
    {
        self.progress = Some(Box::new(observer));
        self
    }

    pub fn run(mut self) -> Result<MergePurgeResult> {
        let started = Instant::now();
        let destination = self.master.destination_folder();
        let paths = CategoryPaths::for_detail(&self.detail, &destination);
        let new_master_path = self
            .master
            .source()
            .derived_path(&destination, MASTER_FILE_SUFFIX);

        info!(
            "Merge-purge ({:?}) of {} against {}",
            self.mode,
            self.detail.path.display(),
            self.master.source().path.display()
        );

        // category files from an earlier run must not outlive this one
        for path in paths.all() {
            remove_if_exists(path)?;
        }

        let mut tracker = ProgressTracker::new(
            self.progress.take(),
            self.master.config().progress_log_interval,
            "merge-purge",
        );
        let mut loaded = self.master.load_headless_with(&mut tracker)?;
        let mut result = MergePurgeResult {
            mode: self.mode,
            master: loaded.stats.clone(),
            ..MergePurgeResult::default()
        };

        if let Err(e) = self.reconcile(&mut loaded, &mut result, &paths, &new_master_path, &mut tracker) {
            warn!("Merge-purge failed, removing partial output: {}", e);
            for path in paths.all() {
                let _ = remove_if_exists(path);
            }
            let _ = remove_if_exists(&new_master_path);
            return Err(e);
        }
        drop(loaded);

        result.processing_time_ms = started.elapsed().as_millis() as u64;
        info!(
            "Merge-purge done: {} detail lines, {} matches, {} adds, {} updates, {} deletes, {} ignored ({} mismatched)",
            result.detail_lines_read,
            result.matches,
            result.adds,
            result.updates,
            result.deletes,
            result.ignored,
            result.mismatched
        );
        Ok(result)
    }

    fn reconcile(
        &mut self,
        loaded: &mut LoadedIndex,
        result: &mut MergePurgeResult,
        paths: &CategoryPaths,
        new_master_path: &Path,
        tracker: &mut ProgressTracker<'_>,
    ) -> Result<()> {
        let master_format = self.master.source().format.clone();
        let io_buffer = self.master.config().io_buffer_size_bytes();
        let out_buffer = self.master.config().output_buffer_size_bytes();

        let mut reader = self.detail.open_lines(io_buffer)?;
        let detail_header = if self.detail.has_header {
            reader.next_line()?
        } else {
            None
        };

        let mut writers = match self.mode {
            MergePurgeMode::Passive => Some(CategoryWriters::create(
                paths,
                detail_header.as_deref(),
                out_buffer,
            )?),
            MergePurgeMode::Active => None,
        };

        tracker.start(SortPhase::Reading);
        while let Some(line) = reader.next_line()? {
            let line_number = reader.line_number();
            result.detail_lines_read += 1;
            tracker.tick();

            let fields = self
                .detail
                .format
                .parse(&line)
                .map_err(|e| SortError::MalformedLine {
                    line_number,
                    field_index: e.field_index,
                    reason: e.reason,
                })?;
            let keys = (self.detail_extractor)(&fields, &line)?;
            self.master
                .keys()
                .validate_prefix(&keys)
                .map_err(|message| SortError::KeyMismatch {
                    line_number,
                    message,
                })?;

            let found = loaded.store.lookup(&keys)?;
            let master_fields = match &found {
                Some(record) => Some(parse_stored(&master_format, record)?),
                None => None,
            };

            let mut param = MergePurgeParam::new(fields, master_fields);
            (self.classifier)(&mut param)?;

            let effective = param.effective_action();
            if param.key_found {
                result.matches += 1;
            }
            if !param.is_honoured() {
                result.mismatched += 1;
                debug!(
                    "Line {}: {:?} requested with key_found={}, ignoring",
                    line_number, param.action, param.key_found
                );
            }
            result.record(effective);

            match writers.as_mut() {
                Some(writers) => writers.write(effective, &line)?,
                None => self.apply(
                    &mut loaded.store,
                    &master_format,
                    effective,
                    param,
                    found.as_ref(),
                    line_number,
                )?,
            }
        }

        if let Some(writers) = writers {
            writers.finish()?;
            result.adds_path = keep_if_counted(&paths.adds, result.adds)?;
            result.deletes_path = keep_if_counted(&paths.deletes, result.deletes)?;
            result.updates_path = keep_if_counted(&paths.updates, result.updates)?;
            result.ignored_path = keep_if_counted(&paths.ignored, result.ignored)?;
        }

        let target = WriteOutTarget {
            header: loaded.header.as_deref(),
            sorted_path: Some(new_master_path),
            duplicates_path: None,
            dedup_prefix: None,
            buffer_size: out_buffer,
        };
        let written = write_out_sorted(&loaded.store, &target, None, tracker)?;
        result.new_master_records = written.lines_sorted;
        result.new_master_path = Some(new_master_path.to_path_buf());
        Ok(())
    }

    fn apply(
        &mut self,
        store: &mut StagingStore,
        master_format: &FileFormat,
        effective: MergePurgeAction,
        param: MergePurgeParam,
        found: Option<&StoredRecord>,
        line_number: usize,
    ) -> Result<()> {
        match (effective, found) {
            (MergePurgeAction::Add, _) => {
                let new_line = master_format.serialize(&param.into_master_record());
                // key the new record the same way the master file was keyed
                let reparsed = master_format
                    .parse(&new_line)
                    .map_err(|e| SortError::MalformedLine {
                        line_number,
                        field_index: e.field_index,
                        reason: e.reason,
                    })?;
                let keys = self.master.extract_keys(&reparsed, &new_line, line_number)?;
                store.insert(keys, &new_line)?;
            }
            (MergePurgeAction::Update, Some(record)) => {
                let new_line = master_format.serialize(&param.into_master_record());
                store.update(record.id, &new_line)?;
            }
            (MergePurgeAction::Delete, Some(record)) => {
                store.delete(record.id)?;
            }
            _ => {}
        }
        Ok(())
    }
}

fn parse_stored(format: &FileFormat, record: &StoredRecord) -> Result<Vec<String>> {
    format.parse(&record.line).map_err(|e| {
        SortError::Codec(format!(
            "Stored master record {} no longer parses: {}",
            record.id, e
        ))
    })
}

fn keep_if_counted(path: &Path, count: usize) -> Result<Option<PathBuf>> {
    if count == 0 {
        remove_if_exists(path)?;
        Ok(None)
    } else {
        Ok(Some(path.to_path_buf()))
    }
}
