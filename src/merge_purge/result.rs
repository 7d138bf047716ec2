use serde::Serialize;
use std::path::PathBuf;

use crate::external_sort::SortResult;
use crate::merge_purge::param::{MergePurgeAction, MergePurgeMode};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MergePurgeResult {
    pub mode: MergePurgeMode,
    pub detail_lines_read: usize,
    /// Detail records whose key exists in the master.
    pub matches: usize,
    pub adds: usize,
    pub updates: usize,
    pub deletes: usize,
    pub ignored: usize,
    /// Classifier requests that did not fit the lookup outcome and were
    /// treated as ignored.
    pub mismatched: usize,
    pub adds_path: Option<PathBuf>,
    pub deletes_path: Option<PathBuf>,
    pub updates_path: Option<PathBuf>,
    pub ignored_path: Option<PathBuf>,
    pub new_master_path: Option<PathBuf>,
    pub new_master_records: usize,
    /// Load statistics of the master file.
    pub master: SortResult,
    pub processing_time_ms: u64,
}

impl MergePurgeResult {
    pub fn count_for(&self, action: MergePurgeAction) -> usize {
        match action {
            MergePurgeAction::Add => self.adds,
            MergePurgeAction::Update => self.updates,
            MergePurgeAction::Delete => self.deletes,
            MergePurgeAction::Ignore => self.ignored,
        }
    }

    pub fn path_for(&self, action: MergePurgeAction) -> Option<&PathBuf> {
        match action {
            MergePurgeAction::Add => self.adds_path.as_ref(),
            MergePurgeAction::Update => self.updates_path.as_ref(),
            MergePurgeAction::Delete => self.deletes_path.as_ref(),
            MergePurgeAction::Ignore => self.ignored_path.as_ref(),
        }
    }

    pub(crate) fn record(&mut self, effective: MergePurgeAction) {
        match effective {
            MergePurgeAction::Add => self.adds += 1,
            MergePurgeAction::Update => self.updates += 1,
            MergePurgeAction::Delete => self.deletes += 1,
            MergePurgeAction::Ignore => self.ignored += 1,
        }
    }
}
