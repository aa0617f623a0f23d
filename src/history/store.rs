use std::path::Path;
use std::sync::Mutex;

use fjall::{Config, Keyspace, PartitionCreateOptions, PartitionHandle};
use tracing::{debug, info};

use super::HistoryStore;
use super::error::{HistoryError, Result};
use super::models::{HistoryRecord, HistoryUpdate, VideoSource};
use super::partitions::{encode_lookup_key, encode_path_key, encode_record_key, record_prefix};

/// Fjall-backed persistent storage for history records
pub struct FjallHistoryStore {
    keyspace: Keyspace,
    records: PartitionHandle,
    lookup: PartitionHandle,
    /// Serializes read-modify-write sequences
    write_lock: Mutex<()>,
}

impl FjallHistoryStore {
    /// Open or create a Fjall store at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening history store at: {}", path.display());

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let keyspace = Config::new(path).open()?;
        let records = keyspace.open_partition("records", PartitionCreateOptions::default())?;
        let lookup = keyspace.open_partition("lookup", PartitionCreateOptions::default())?;

        info!("History store opened successfully");
        Ok(Self {
            keyspace,
            records,
            lookup,
            write_lock: Mutex::new(()),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ()> {
        self.write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn read_indexed(&self, lookup_key: Vec<u8>) -> Result<Option<HistoryRecord>> {
        let Some(id) = self.lookup.get(lookup_key)? else {
            return Ok(None);
        };
        let id = String::from_utf8_lossy(&id).to_string();
        self.read(&id)
    }

    fn read(&self, id: &str) -> Result<Option<HistoryRecord>> {
        match self.records.get(encode_record_key(id))? {
            Some(value) => Ok(Some(serde_json::from_slice(&value)?)),
            None => Ok(None),
        }
    }

    /// Writes a new record and its lookup entries; callers hold the write lock.
    fn write_new(&self, record: &HistoryRecord) -> Result<()> {
        let value = serde_json::to_vec(record)?;
        let mut batch = self.keyspace.batch();
        batch.insert(&self.records, encode_record_key(&record.id), value);
        batch.insert(
            &self.lookup,
            encode_lookup_key(record.source, &record.title),
            record.id.as_bytes(),
        );
        batch.insert(
            &self.lookup,
            encode_path_key(record.source, &record.video_path),
            record.id.as_bytes(),
        );
        batch.commit()?;
        Ok(())
    }

    /// Persist all pending writes to disk
    pub fn persist(&self) -> Result<()> {
        self.keyspace.persist(fjall::PersistMode::SyncAll)?;
        Ok(())
    }

    fn newest_first(&self, skip: usize, take: usize) -> Result<Vec<HistoryRecord>> {
        let mut out = Vec::with_capacity(take.min(64));
        for item in self.records.prefix(record_prefix()).rev().skip(skip).take(take) {
            let (_, value) = item?;
            out.push(serde_json::from_slice(&value)?);
        }
        Ok(out)
    }
}

impl HistoryStore for FjallHistoryStore {
    fn insert(&self, record: HistoryRecord) -> Result<HistoryRecord> {
        let _guard = self.lock();
        self.write_new(&record)?;

        debug!(id = %record.id, title = %record.title, "Inserted history record");
        Ok(record)
    }

    fn update(&self, id: &str, update: HistoryUpdate) -> Result<HistoryRecord> {
        let _guard = self.lock();

        let mut record = self
            .read(id)?
            .ok_or_else(|| HistoryError::NotFound(id.to_string()))?;
        update.apply(&mut record);

        self.records
            .insert(encode_record_key(id), serde_json::to_vec(&record)?)?;
        debug!(id, "Updated history record");
        Ok(record)
    }

    fn upsert(&self, mut record: HistoryRecord, update: HistoryUpdate) -> Result<HistoryRecord> {
        let _guard = self.lock();

        let existing = match self.find_by_path(&record.video_path, record.source)? {
            Some(found) => Some(found),
            None => self.find(&record.title, record.source)?,
        };

        match existing {
            Some(mut found) => {
                update.apply(&mut found);
                self.records
                    .insert(encode_record_key(&found.id), serde_json::to_vec(&found)?)?;
                debug!(id = %found.id, "Updated history record in place");
                Ok(found)
            }
            None => {
                update.apply(&mut record);
                self.write_new(&record)?;
                debug!(id = %record.id, title = %record.title, "Inserted history record");
                Ok(record)
            }
        }
    }

    fn find(&self, title: &str, source: VideoSource) -> Result<Option<HistoryRecord>> {
        self.read_indexed(encode_lookup_key(source, title))
    }

    fn find_by_path(&self, video_path: &str, source: VideoSource) -> Result<Option<HistoryRecord>> {
        self.read_indexed(encode_path_key(source, video_path))
    }

    fn get(&self, id: &str) -> Result<Option<HistoryRecord>> {
        self.read(id)
    }

    fn delete(&self, id: &str) -> Result<Option<HistoryRecord>> {
        let _guard = self.lock();

        let Some(record) = self.read(id)? else {
            return Ok(None);
        };

        let mut batch = self.keyspace.batch();
        batch.remove(&self.records, encode_record_key(id));
        for lookup_key in [
            encode_lookup_key(record.source, &record.title),
            encode_path_key(record.source, &record.video_path),
        ] {
            // a newer record may own the index entry by now
            if self
                .lookup
                .get(&lookup_key)?
                .is_some_and(|current| current.as_ref() == id.as_bytes())
            {
                batch.remove(&self.lookup, lookup_key);
            }
        }
        batch.commit()?;

        debug!(id, "Deleted history record");
        Ok(Some(record))
    }

    fn list_recent(&self, limit: usize) -> Result<Vec<HistoryRecord>> {
        self.newest_first(0, limit)
    }

    fn page(&self, page: usize, per_page: usize) -> Result<Vec<HistoryRecord>> {
        let page = page.max(1);
        self.newest_first((page - 1).saturating_mul(per_page), per_page)
    }

    fn count(&self) -> Result<usize> {
        let mut count = 0;
        for item in self.records.prefix(record_prefix()) {
            item?;
            count += 1;
        }
        Ok(count)
    }
}
