//! The object population store
//!
//! An in-memory index over segmented record files. Writers append under the
//! store lock; readers check names out non-exclusively; deleters check names
//! out exclusively and, on commit, the victim record is swapped with the
//! final record of the final segment and the segment is truncated.
//!
//! A JSON sidecar (`<prefix>.json`) records the highest segment index for
//! recovery. A corrupt segment tail is truncated at the last intact record on
//! load.

use crate::record::{ObjectRecord, RECORDS_PER_SEGMENT, RECORD_SIZE};
use og_common::{Error, ObjectName, Result};
use parking_lot::RwLock;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs::{self, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Sidecar recovery metadata
#[derive(Debug, Serialize, Deserialize)]
struct Sidecar {
    prefix: String,
    #[serde(rename = "currentMax")]
    current_max: u64,
}

/// Persistent, content-addressed population of object names
pub struct ObjectStore {
    dir: PathBuf,
    prefix: String,
    records_per_segment: u64,
    state: RwLock<StoreState>,
}

#[derive(Debug, Default)]
struct StoreState {
    records: Vec<ObjectRecord>,
    index: HashMap<ObjectName, usize>,
    /// Names checked out for delete; blocks other deleters and new readers
    /// of those names
    deleting: HashSet<ObjectName>,
    /// Read borrow counts
    readers: HashMap<ObjectName, u32>,
    /// Highest segment index on disk
    current_max: u64,
}

impl ObjectStore {
    /// Open (or create) the population under `dir` with the given file prefix
    pub fn open(dir: impl AsRef<Path>, prefix: impl Into<String>) -> Result<Self> {
        Self::open_inner(dir.as_ref(), prefix.into(), RECORDS_PER_SEGMENT)
    }

    #[cfg(test)]
    fn open_small(dir: impl AsRef<Path>, prefix: impl Into<String>, cap: u64) -> Result<Self> {
        Self::open_inner(dir.as_ref(), prefix.into(), cap)
    }

    fn open_inner(dir: &Path, prefix: String, records_per_segment: u64) -> Result<Self> {
        fs::create_dir_all(dir)?;

        let store = Self {
            dir: dir.to_path_buf(),
            prefix,
            records_per_segment,
            state: RwLock::new(StoreState::default()),
        };
        store.load()?;
        Ok(store)
    }

    /// Number of live records
    pub fn len(&self) -> usize {
        self.state.read().records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.read().records.is_empty()
    }

    /// Append a record; returns once it is durable enough to be selected
    pub fn add(&self, record: ObjectRecord) -> Result<()> {
        let mut state = self.state.write();

        let slot = state.records.len();
        let segment = slot as u64 / self.records_per_segment;
        let path = self.segment_path(segment);

        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        file.write_all(&record.to_bytes())?;
        file.flush()?;

        if segment > state.current_max || slot == 0 {
            state.current_max = segment;
            self.write_sidecar(state.current_max)?;
        }

        state.index.insert(record.name, slot);
        state.records.push(record);
        Ok(())
    }

    /// Check a record out for reading; many readers may hold the same name
    pub fn name_for_read(&self) -> Result<ObjectRecord> {
        let mut state = self.state.write();
        let record = Self::select(&state)?;
        *state.readers.entry(record.name).or_insert(0) += 1;
        Ok(record)
    }

    /// Return a read borrow
    pub fn release_read(&self, name: ObjectName) {
        let mut state = self.state.write();
        if let Some(count) = state.readers.get_mut(&name) {
            *count -= 1;
            if *count == 0 {
                state.readers.remove(&name);
            }
        }
    }

    /// Check a record out for deletion; exclusive against other deleters and
    /// blocks new readers from this name. Readers that already hold the name
    /// proceed on their snapshot.
    pub fn name_for_delete(&self) -> Result<ObjectRecord> {
        let mut state = self.state.write();
        let record = Self::select(&state)?;
        state.deleting.insert(record.name);
        Ok(record)
    }

    /// Return a delete borrow; on commit the record is removed from disk and
    /// from the in-memory view
    pub fn release_delete(&self, name: ObjectName, committed: bool) -> Result<()> {
        let mut state = self.state.write();
        state.deleting.remove(&name);
        if !committed {
            return Ok(());
        }

        let Some(&slot) = state.index.get(&name) else {
            return Err(Error::internal(format!("unknown record released: {name}")));
        };

        // Disk first; the in-memory view only changes once the files agree.
        self.remove_on_disk(&mut state, slot)?;

        let removed = state.records.swap_remove(slot);
        state.index.remove(&removed.name);
        if slot < state.records.len() {
            let moved = state.records[slot].name;
            state.index.insert(moved, slot);
        }
        Ok(())
    }

    /// Uniform random selection over all non-deleting records
    fn select(state: &StoreState) -> Result<ObjectRecord> {
        let live = state.records.len();
        if live == 0 || state.deleting.len() >= live {
            return Err(Error::EmptyPopulation);
        }
        let mut rng = rand::thread_rng();
        loop {
            let slot = rng.gen_range(0..live);
            let record = state.records[slot];
            if !state.deleting.contains(&record.name) {
                return Ok(record);
            }
        }
    }

    fn remove_on_disk(&self, state: &mut StoreState, slot: usize) -> Result<()> {
        let last = state.records.len() - 1;

        if slot != last {
            // Overwrite the victim slot with the final record.
            let final_record = state.records[last];
            let segment = slot as u64 / self.records_per_segment;
            let offset = (slot as u64 % self.records_per_segment) * RECORD_SIZE as u64;
            let mut file = OpenOptions::new()
                .write(true)
                .open(self.segment_path(segment))?;
            file.seek(SeekFrom::Start(offset))?;
            file.write_all(&final_record.to_bytes())?;
            file.flush()?;
        }

        // Truncate the final record out of the final segment.
        let last_segment = last as u64 / self.records_per_segment;
        let new_len = (last as u64 % self.records_per_segment) * RECORD_SIZE as u64;
        let path = self.segment_path(last_segment);
        if new_len == 0 && last_segment > 0 {
            fs::remove_file(&path)?;
            state.current_max = last_segment - 1;
            self.write_sidecar(state.current_max)?;
        } else {
            let file = OpenOptions::new().write(true).open(&path)?;
            file.set_len(new_len)?;
        }
        Ok(())
    }

    fn load(&self) -> Result<()> {
        let sidecar_max = self.read_sidecar();

        let mut state = self.state.write();
        let mut segment = 0u64;
        loop {
            let path = self.segment_path(segment);
            if !path.exists() {
                break;
            }
            let mut data = Vec::new();
            OpenOptions::new()
                .read(true)
                .open(&path)?
                .read_to_end(&mut data)?;

            let intact = data.len() - data.len() % RECORD_SIZE;
            if intact != data.len() {
                warn!(
                    segment,
                    lost = data.len() - intact,
                    "segment has a torn tail record, truncating"
                );
                let file = OpenOptions::new().write(true).open(&path)?;
                file.set_len(intact as u64)?;
            }

            for chunk in data[..intact].chunks_exact(RECORD_SIZE) {
                let record = ObjectRecord::from_bytes(chunk)?;
                let slot = state.records.len();
                state.index.insert(record.name, slot);
                state.records.push(record);
            }
            state.current_max = segment;
            segment += 1;
        }

        if let Some(expected) = sidecar_max {
            if segment > 0 && expected + 1 != segment {
                warn!(
                    expected,
                    found = segment - 1,
                    "sidecar segment count disagrees with discovered segments"
                );
            }
        }
        if segment > 0 {
            self.write_sidecar(state.current_max)?;
        }
        debug!(records = state.records.len(), "object population loaded");
        Ok(())
    }

    fn segment_path(&self, index: u64) -> PathBuf {
        self.dir.join(format!("{}-{}.bin", self.prefix, index))
    }

    fn sidecar_path(&self) -> PathBuf {
        self.dir.join(format!("{}.json", self.prefix))
    }

    fn read_sidecar(&self) -> Option<u64> {
        let data = fs::read(self.sidecar_path()).ok()?;
        let sidecar: Sidecar = serde_json::from_slice(&data).ok()?;
        Some(sidecar.current_max)
    }

    fn write_sidecar(&self, current_max: u64) -> Result<()> {
        let sidecar = Sidecar {
            prefix: self.prefix.clone(),
            current_max,
        };
        let json = serde_json::to_vec(&sidecar)
            .map_err(|e| Error::internal(format!("sidecar encode: {e}")))?;
        fs::write(self.sidecar_path(), json)?;
        Ok(())
    }
}
