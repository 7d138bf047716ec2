use tracing::debug;

use crate::error::Result;
use crate::external_sort::constants::DEFAULT_MAX_BATCH_SIZE;
use crate::keys::Key;
use crate::staging::{PendingRecord, StagingStore};

/// Buffers records and writes them to the store one batch at a time, so a
/// large load is neither one huge transaction nor one transaction per row.
pub struct BatchInserter<'a> {
    store: &'a mut StagingStore,
    buffer: Vec<PendingRecord>,
    batch_size: usize,
    records_written: usize,
    batches_applied: usize,
}

impl<'a> BatchInserter<'a> {
    pub fn new(store: &'a mut StagingStore, batch_size: usize) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            store,
            buffer: Vec::with_capacity(batch_size.min(DEFAULT_MAX_BATCH_SIZE)),
            batch_size,
            records_written: 0,
            batches_applied: 0,
        }
    }

    pub fn add_record(&mut self, keys: Vec<Key>, line: String) -> Result<()> {
        self.buffer.push(PendingRecord { keys, line });

        if self.buffer.len() >= self.batch_size {
            self.flush_batch()?;
        }

        Ok(())
    }

    pub fn flush_batch(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }

        self.store.append_batch(&self.buffer)?;
        self.records_written += self.buffer.len();
        self.batches_applied += 1;
        debug!(
            "Applied staging batch {} ({} records, {} total)",
            self.batches_applied,
            self.buffer.len(),
            self.records_written
        );
        self.buffer.clear();
        Ok(())
    }

    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Flushes the partial batch and returns the number of records written.
    pub fn finish(mut self) -> Result<usize> {
        self.flush_batch()?;
        Ok(self.records_written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::PayloadCodec;
    use crate::keys::{KeyDefinition, KeyDefinitionSet, SortDirection};
    use tempfile::tempdir;

    #[test]
    fn test_flushes_at_batch_size() {
        let temp = tempdir().unwrap();
        let keys = KeyDefinitionSet::single(KeyDefinition::text(SortDirection::Ascending));
        let mut store = StagingStore::open(temp.path(), keys, PayloadCodec::Plain, 8).unwrap();

        {
            let mut inserter = BatchInserter::new(&mut store, 2);
            inserter.add_record(vec![Key::text("b")], "b".into()).unwrap();
            assert_eq!(inserter.pending(), 1);
            inserter.add_record(vec![Key::text("a")], "a".into()).unwrap();
            assert_eq!(inserter.pending(), 0);
            inserter.add_record(vec![Key::text("c")], "c".into()).unwrap();
            assert_eq!(inserter.finish().unwrap(), 3);
        }

        assert_eq!(store.len(), 3);
        store.finalize_indexes().unwrap();
        let lines: Vec<String> = store.scan_ordered().unwrap().map(|r| r.unwrap().line).collect();
        assert_eq!(lines, vec!["a", "b", "c"]);
    }
}
