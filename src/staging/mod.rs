//! Disk-backed staging store holding records during a sort or merge-purge
//! call. Rows are appended in batches, indexed once loading is done, and
//! then scanned in key order or looked up by key prefix.

pub mod batch;
pub mod encoding;

pub use batch::BatchInserter;

use rand::distributions::Alphanumeric;
use rand::Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::codec::PayloadCodec;
use crate::constants::BYTES_PER_MB;
use crate::error::{Result, SortError};
use crate::external_sort::constants::*;
use crate::keys::{Key, KeyDefinitionSet};
use encoding::{encode_key_tuple, index_key, row_id_from_index_key, row_key};

/// A record on its way into the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRecord {
    pub keys: Vec<Key>,
    pub line: String,
}

/// A record read back from the store, payload already decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRecord {
    pub id: u64,
    pub keys: Vec<Key>,
    pub line: String,
}

#[derive(Serialize)]
struct StagedRecordRef<'a> {
    keys: &'a [Key],
    payload: &'a str,
}

#[derive(Deserialize)]
struct StagedRecord {
    keys: Vec<Key>,
    payload: String,
}

/// Owns the store directory and removes it when dropped.
#[derive(Debug)]
pub struct StagingDir {
    path: PathBuf,
}

impl StagingDir {
    pub fn create(parent: &Path) -> Result<Self> {
        let suffix: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(STAGING_NAME_RANDOM_LEN)
            .map(char::from)
            .collect();
        let path = parent.join(format!(
            "{}{}{}",
            STAGING_DIR_PREFIX, suffix, STAGING_DIR_EXTENSION
        ));
        std::fs::create_dir_all(&path)?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StagingDir {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_dir_all(&self.path) {
            warn!("Failed to remove staging store {}: {}", self.path.display(), e);
        } else {
            debug!("Removed staging store {}", self.path.display());
        }
    }
}

pub struct StagingStore {
    db: sled::Db,
    rows: sled::Tree,
    index: sled::Tree,
    keys: KeyDefinitionSet,
    codec: PayloadCodec,
    next_id: u64,
    indexed: bool,
    // dropped last so the database is closed before its files go away
    dir: StagingDir,
}

impl StagingStore {
    pub fn open(
        parent: &Path,
        keys: KeyDefinitionSet,
        codec: PayloadCodec,
        cache_capacity_mb: usize,
    ) -> Result<Self> {
        let dir = StagingDir::create(parent)?;
        let db = sled::Config::default()
            .path(dir.path())
            .cache_capacity((cache_capacity_mb * BYTES_PER_MB) as u64)
            .flush_every_ms(None)
            .mode(sled::Mode::HighThroughput)
            .open()?;
        let rows = db.open_tree(ROWS_TREE_NAME)?;
        let index = db.open_tree(INDEX_TREE_NAME)?;

        debug!(
            "Opened staging store at {} ({} key columns, {:?} payloads)",
            dir.path().display(),
            keys.len(),
            codec
        );

        Ok(Self {
            db,
            rows,
            index,
            keys,
            codec,
            next_id: 0,
            indexed: false,
            dir,
        })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn keys(&self) -> &KeyDefinitionSet {
        &self.keys
    }

    pub fn codec(&self) -> PayloadCodec {
        self.codec
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn is_indexed(&self) -> bool {
        self.indexed
    }

    /// Appends records as one atomic batch. Payload encoding runs in parallel.
    pub fn append_batch(&mut self, records: &[PendingRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        let codec = self.codec;
        let definitions = self.keys.definitions();
        let encoded = records
            .par_iter()
            .map(|record| -> Result<(Vec<u8>, Vec<u8>)> {
                let payload = codec.encode(&record.line)?;
                let bytes = serde_json::to_vec(&StagedRecordRef {
                    keys: &record.keys,
                    payload: &payload,
                })?;
                Ok((encode_key_tuple(&record.keys, definitions), bytes))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut rows_batch = sled::Batch::default();
        let mut index_batch = sled::Batch::default();
        for (tuple, bytes) in encoded {
            let id = self.allocate_id();
            rows_batch.insert(row_key(id).to_vec(), bytes);
            if self.indexed {
                index_batch.insert(index_key(&tuple, id), &[] as &[u8]);
            }
        }
        self.rows.apply_batch(rows_batch)?;
        if self.indexed {
            self.index.apply_batch(index_batch)?;
        }
        Ok(())
    }

    /// Builds the key index over every loaded row. Scans and lookups are
    /// only valid after this; later inserts and deletes keep it current.
    pub fn finalize_indexes(&mut self) -> Result<()> {
        if self.indexed {
            return Ok(());
        }

        let mut batch = sled::Batch::default();
        let mut pending = 0usize;
        let mut total = 0usize;
        for entry in self.rows.iter() {
            let (key, value) = entry?;
            let id = row_id_from_index_key(&key)
                .ok_or_else(|| SortError::Codec("Corrupt row id in staging store".to_string()))?;
            let staged: StagedRecord = serde_json::from_slice(&value)?;
            let tuple = encode_key_tuple(&staged.keys, self.keys.definitions());
            batch.insert(index_key(&tuple, id), &[] as &[u8]);
            pending += 1;
            total += 1;
            if pending >= INDEX_BUILD_BATCH_SIZE {
                self.index.apply_batch(std::mem::take(&mut batch))?;
                pending = 0;
            }
        }
        if pending > 0 {
            self.index.apply_batch(batch)?;
        }

        self.indexed = true;
        debug!("Indexed {} staged records", total);
        Ok(())
    }

    /// Every record in key order. Records with equal key tuples come back in
    /// insertion order, which callers should not rely on.
    pub fn scan_ordered(&self) -> Result<OrderedScan<'_>> {
        self.require_index()?;
        Ok(OrderedScan {
            store: self,
            iter: self.index.iter(),
        })
    }

    /// First record (in key order) whose leading keys equal `prefix`.
    pub fn lookup(&self, prefix: &[Key]) -> Result<Option<StoredRecord>> {
        self.require_index()?;
        let encoded = encode_key_tuple(prefix, self.keys.definitions());
        match self.index.scan_prefix(encoded).next() {
            Some(entry) => {
                let (key, _) = entry?;
                self.record_for_index_key(&key).map(Some)
            }
            None => Ok(None),
        }
    }

    pub fn get(&self, id: u64) -> Result<Option<StoredRecord>> {
        match self.rows.get(row_key(id))? {
            Some(value) => self.decode_row(id, &value).map(Some),
            None => Ok(None),
        }
    }

    pub fn insert(&mut self, keys: Vec<Key>, line: &str) -> Result<u64> {
        let payload = self.codec.encode(line)?;
        let bytes = serde_json::to_vec(&StagedRecordRef {
            keys: &keys,
            payload: &payload,
        })?;
        let id = self.allocate_id();
        self.rows.insert(row_key(id), bytes)?;
        if self.indexed {
            let tuple = encode_key_tuple(&keys, self.keys.definitions());
            self.index.insert(index_key(&tuple, id), &[] as &[u8])?;
        }
        Ok(id)
    }

    /// Replaces the payload of a row, keeping its key tuple.
    pub fn update(&mut self, id: u64, line: &str) -> Result<bool> {
        let existing = match self.rows.get(row_key(id))? {
            Some(value) => serde_json::from_slice::<StagedRecord>(&value)?,
            None => return Ok(false),
        };
        let payload = self.codec.encode(line)?;
        let bytes = serde_json::to_vec(&StagedRecordRef {
            keys: &existing.keys,
            payload: &payload,
        })?;
        self.rows.insert(row_key(id), bytes)?;
        Ok(true)
    }

    pub fn delete(&mut self, id: u64) -> Result<bool> {
        let removed = match self.rows.remove(row_key(id))? {
            Some(value) => serde_json::from_slice::<StagedRecord>(&value)?,
            None => return Ok(false),
        };
        if self.indexed {
            let tuple = encode_key_tuple(&removed.keys, self.keys.definitions());
            self.index.remove(index_key(&tuple, id))?;
        }
        Ok(true)
    }

    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }

    fn allocate_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn require_index(&self) -> Result<()> {
        if self.indexed {
            Ok(())
        } else {
            Err(SortError::invalid(
                "Staging store indexes must be finalized before scanning or lookup",
            ))
        }
    }

    fn record_for_index_key(&self, key: &[u8]) -> Result<StoredRecord> {
        let id = row_id_from_index_key(key)
            .ok_or_else(|| SortError::Codec("Corrupt index entry in staging store".to_string()))?;
        self.get(id)?.ok_or_else(|| {
            SortError::Codec(format!("Index entry points at missing row {}", id))
        })
    }

    fn decode_row(&self, id: u64, value: &[u8]) -> Result<StoredRecord> {
        let staged: StagedRecord = serde_json::from_slice(value)?;
        Ok(StoredRecord {
            id,
            keys: staged.keys,
            line: self.codec.decode(&staged.payload)?,
        })
    }
}

/// Iterator over the store in index order.
pub struct OrderedScan<'a> {
    store: &'a StagingStore,
    iter: sled::Iter,
}

impl Iterator for OrderedScan<'_> {
    type Item = Result<StoredRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        let entry = self.iter.next()?;
        Some(
            entry
                .map_err(SortError::from)
                .and_then(|(key, _)| self.store.record_for_index_key(&key)),
        )
    }
}
