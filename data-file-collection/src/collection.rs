// Copyright (c) The Merkle Core Contributors
// SPDX-License-Identifier: Apache-2.0

//! The data file collection itself (§4.6): a directory of immutable data
//! files plus a metadata sidecar, serving one writer, many readers, and a
//! single merger concurrently.

use crate::errors::DataFileError;
use crate::file_format::{self, metadata_file_name, DataFile, FileItemReader, OpenWriter};
use crate::index::ExternalIndex;
use crate::item::DataItem;
use crate::pause::PauseToken;
use merkle_config::MerkleConfig;
use merkle_node::DataLocation;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Clone, Debug, Serialize, Deserialize)]
struct CollectionMetadata {
    format_version: u32,
    item_format_version: u32,
    min_valid_key: u64,
    max_valid_key: u64,
}

fn now_millis() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

/// The file set and metadata captured by [`DataFileCollection::start_snapshot`],
/// hard-linked into place by [`DataFileCollection::middle_snapshot`].
pub struct SnapshotHandle {
    captured_files: Vec<Arc<DataFile>>,
}

pub struct DataFileCollection {
    dir: PathBuf,
    store_name: String,
    item_format_version: u32,
    files: RwLock<Vec<Arc<DataFile>>>,
    writer: Mutex<Option<OpenWriter>>,
    next_file_index: AtomicU32,
    valid_key_range: RwLock<(u64, u64)>,
    config: MerkleConfig,
}

impl DataFileCollection {
    /// Creates a fresh, empty collection rooted at `dir`.
    pub fn create(dir: impl Into<PathBuf>, item_format_version: u32, config: MerkleConfig) -> Result<Self, DataFileError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        let store_name = config.store_name.clone();
        Ok(Self {
            dir,
            store_name,
            item_format_version,
            files: RwLock::new(Vec::new()),
            writer: Mutex::new(None),
            next_file_index: AtomicU32::new(0),
            valid_key_range: RwLock::new((1, 0)),
            config,
        })
    }

    /// Reopens an existing collection directory, rebuilding the read set
    /// from each file's own footer and the key range from the metadata
    /// sidecar (§8 "Snapshot then load ... valid key range unchanged").
    pub fn open(dir: impl Into<PathBuf>, item_format_version: u32, config: MerkleConfig) -> Result<Self, DataFileError> {
        let dir = dir.into();
        let store_name = config.store_name.clone();
        let prefix = format!("{store_name}_");
        let mut files = Vec::new();
        let mut max_index = None;

        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else { continue };
            if !name.starts_with(&prefix) || !name.ends_with(".dat") {
                continue;
            }
            let stem = &name[prefix.len()..name.len() - ".dat".len()];
            let Some((index_str, creation_str)) = stem.split_once('_') else { continue };
            let (Ok(file_index), Ok(creation_millis)) = (index_str.parse::<u32>(), creation_str.parse::<u64>()) else {
                continue;
            };
            let data_file = DataFile::open(path, file_index, creation_millis)?;
            max_index = Some(max_index.map_or(file_index, |m: u32| m.max(file_index)));
            files.push(Arc::new(data_file));
        }
        files.sort_by_key(|f| f.file_index);

        let metadata_path = dir.join(metadata_file_name(&store_name));
        let valid_key_range = if metadata_path.exists() {
            let bytes = std::fs::read(&metadata_path)?;
            let metadata: CollectionMetadata = bcs::from_bytes(&bytes)?;
            (metadata.min_valid_key, metadata.max_valid_key)
        } else if let (Some(min), Some(max)) = (files.iter().map(|f| f.min_key).min(), files.iter().map(|f| f.max_key).max()) {
            (min, max)
        } else {
            (1, 0)
        };

        Ok(Self {
            dir,
            store_name,
            item_format_version,
            files: RwLock::new(files),
            writer: Mutex::new(None),
            next_file_index: AtomicU32::new(max_index.map_or(0, |m| m + 1)),
            valid_key_range: RwLock::new(valid_key_range),
            config,
        })
    }

    pub fn valid_key_range(&self) -> (u64, u64) {
        *self.valid_key_range.read()
    }

    /// Explicitly narrows or widens the valid key range, e.g. when the
    /// application retires an old epoch's keys ahead of a merge. Unlike
    /// [`Self::end_writing`], which only ever widens the range to cover the
    /// file it just published, this directly replaces it and persists the
    /// new bound to the metadata sidecar.
    pub fn set_valid_key_range(&self, min_key: u64, max_key: u64) -> Result<(), DataFileError> {
        *self.valid_key_range.write() = (min_key, max_key);
        self.write_metadata_sidecar()
    }

    pub fn files(&self) -> Vec<Arc<DataFile>> {
        self.files.read().clone()
    }

    fn open_new_writer(&self) -> Result<OpenWriter, DataFileError> {
        let file_index = self.next_file_index.fetch_add(1, Ordering::SeqCst);
        let creation_millis = now_millis();
        Ok(OpenWriter::create(&self.dir, &self.store_name, file_index, creation_millis, self.item_format_version)?)
    }

    pub fn start_writing(&self) -> Result<(), DataFileError> {
        let mut guard = self.writer.lock();
        if guard.is_some() {
            return Err(DataFileError::WriterAlreadyOpen);
        }
        *guard = Some(self.open_new_writer()?);
        Ok(())
    }

    pub fn store_data_item<T: DataItem>(&self, item: &T) -> Result<DataLocation, DataFileError> {
        let mut guard = self.writer.lock();
        let writer = guard.as_mut().ok_or(DataFileError::NoWriterOpen)?;
        let bytes = bcs::to_bytes(item)?;
        Ok(writer.store_item(&bytes)?)
    }

    /// Closes the current writer, publishes its file into the read set, and
    /// widens the valid key range to cover it — published only after the
    /// file is linked (§5 ordering guarantee). The range is cumulative
    /// across every file the collection has ever written, not just the
    /// most recent one, since a merge must still be able to see keys that
    /// arrived in an earlier file.
    pub fn end_writing(&self, min_key: u64, max_key: u64) -> Result<(), DataFileError> {
        let mut guard = self.writer.lock();
        let writer = guard.take().ok_or(DataFileError::NoWriterOpen)?;
        let data_file = writer.finish(min_key, max_key)?;
        self.files.write().push(Arc::new(data_file));
        {
            let mut range = self.valid_key_range.write();
            *range = if range.0 > range.1 {
                (min_key, max_key)
            } else {
                (range.0.min(min_key), range.1.max(max_key))
            };
        }
        self.write_metadata_sidecar()
    }

    fn write_metadata_sidecar(&self) -> Result<(), DataFileError> {
        let (min, max) = self.valid_key_range();
        let metadata = CollectionMetadata {
            format_version: 1,
            item_format_version: self.item_format_version,
            min_valid_key: min,
            max_valid_key: max,
        };
        let bytes = bcs::to_bytes(&metadata)?;
        std::fs::write(self.dir.join(metadata_file_name(&self.store_name)), bytes)?;
        Ok(())
    }

    fn find_file(&self, file_index: u32) -> Option<Arc<DataFile>> {
        self.files.read().iter().find(|f| f.file_index == file_index).cloned()
    }

    /// Resolves a location directly; `Ok(None)` if the backing file has been
    /// concurrently retired by a merge.
    pub fn read_data_item<T: DataItem>(&self, location: DataLocation) -> Result<Option<T>, DataFileError> {
        let Some(data_file) = self.find_file(location.file_index) else {
            return Ok(None);
        };
        match file_format::read_item_at(&data_file.path, location.byte_offset)? {
            Some(bytes) => Ok(Some(bcs::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Resolves `key` via `index`, retrying on a transient "file retired
    /// concurrently" result up to `config.read_using_index_retries` times.
    pub fn read_using_index<T: DataItem>(&self, index: &dyn ExternalIndex, key: u64) -> Result<T, DataFileError> {
        let Some(location) = index.get(key) else {
            return Err(DataFileError::KeyNotFound(key));
        };
        for _ in 0..self.config.read_using_index_retries {
            match self.read_data_item::<T>(location)? {
                Some(item) => return Ok(item),
                None => continue,
            }
        }
        Err(DataFileError::RetriesExhausted(key))
    }

    fn decode_next<T: DataItem>(reader: &mut FileItemReader, file_index: u32) -> Result<Option<(T, DataLocation)>, DataFileError> {
        match reader.next_item()? {
            Some((bytes, offset)) => Ok(Some((bcs::from_bytes(&bytes)?, DataLocation::new(file_index, offset)))),
            None => Ok(None),
        }
    }

    fn finalize_merge_output(
        &self,
        writer: &mut Option<OpenWriter>,
        min_key: &mut Option<u64>,
        max_key: &mut Option<u64>,
        outputs: &mut Vec<DataFile>,
    ) -> Result<(), DataFileError> {
        if let Some(w) = writer.take() {
            if w.item_count == 0 {
                let _ = std::fs::remove_file(&w.path);
            } else {
                let mn = min_key.take().unwrap_or(0);
                let mx = max_key.take().unwrap_or(0);
                outputs.push(w.finish(mn, mx)?);
            }
        }
        Ok(())
    }

    /// Compacts `files` into one or more fresh files, per §4.6.2: a k-way
    /// merge by ascending key (newest-file-wins on ties), a seen check
    /// against `index` gating every copy, a fatal error on non-monotonic
    /// output, and a put-if-equal index update per moved key. The old files
    /// are deleted once the new ones are published.
    pub fn merge_files<T: DataItem>(
        &self,
        index: &dyn ExternalIndex,
        files: Vec<Arc<DataFile>>,
        pause: &PauseToken,
    ) -> Result<Vec<Arc<DataFile>>, DataFileError> {
        if files.is_empty() {
            return Ok(Vec::new());
        }
        let (valid_min, valid_max) = self.valid_key_range();
        let mut readers: Vec<FileItemReader> = files.iter().map(|f| FileItemReader::open(f)).collect::<Result<_, _>>()?;
        let mut heads: Vec<Option<(T, DataLocation)>> = Vec::with_capacity(readers.len());
        for (i, reader) in readers.iter_mut().enumerate() {
            heads.push(Self::decode_next(reader, files[i].file_index)?);
        }

        let mut outputs: Vec<DataFile> = Vec::new();
        let mut current_writer: Option<OpenWriter> = None;
        let mut current_min_key: Option<u64> = None;
        let mut current_max_key: Option<u64> = None;
        let mut last_written_key: Option<u64> = None;

        loop {
            pause.wait_if_paused();

            let mut winner: Option<usize> = None;
            for (i, head) in heads.iter().enumerate() {
                let Some((item, _)) = head else { continue };
                winner = Some(match winner {
                    None => i,
                    Some(w) => {
                        let (w_item, _) = heads[w].as_ref().expect("winner always has a head");
                        match item.key().cmp(&w_item.key()) {
                            std::cmp::Ordering::Less => i,
                            std::cmp::Ordering::Greater => w,
                            std::cmp::Ordering::Equal => {
                                if files[i].creation_millis != files[w].creation_millis {
                                    if files[i].creation_millis > files[w].creation_millis { i } else { w }
                                } else if files[i].file_index > files[w].file_index {
                                    i
                                } else {
                                    w
                                }
                            }
                        }
                    }
                });
            }
            let Some(w) = winner else { break };
            let (item, location) = heads[w].take().expect("winner index always holds a head");
            let key = item.key();

            if key >= valid_min && key <= valid_max && index.get(key) == Some(location) {
                if let Some(last) = last_written_key {
                    if key <= last {
                        return Err(DataFileError::NonMonotonicKeys(key));
                    }
                }
                let bytes = bcs::to_bytes(&item)?;
                if let Some(open) = &current_writer {
                    let would_overflow_bytes = open.offset + 4 + bytes.len() as u64 > self.config.merge_max_bytes_per_file;
                    let would_overflow_count = open.item_count >= self.config.merge_max_items_per_file as u64;
                    if would_overflow_bytes || would_overflow_count {
                        self.finalize_merge_output(&mut current_writer, &mut current_min_key, &mut current_max_key, &mut outputs)?;
                    }
                }
                if current_writer.is_none() {
                    current_writer = Some(self.open_new_writer()?);
                }
                let new_location = current_writer.as_mut().expect("just opened").store_item(&bytes)?;
                if index.compare_and_swap(key, Some(location), Some(new_location)) {
                    last_written_key = Some(key);
                    current_min_key = Some(current_min_key.map_or(key, |m| m.min(key)));
                    current_max_key = Some(current_max_key.map_or(key, |m| m.max(key)));
                }
                // A lost race here (another writer updated the index between
                // our seen check and the swap) leaves an orphan item in the
                // output file; harmless, since nothing indexes it.
            } else if index.get(key) == Some(location) {
                // Out of the valid range: this item is being dropped, and the
                // index still points at the location it's dropped from. Null
                // it so a lookup doesn't resolve to a file we're about to
                // delete. If the CAS loses the race, something else already
                // moved the entry past this location, which is what we want.
                index.compare_and_swap(key, Some(location), None);
            }

            heads[w] = Self::decode_next(&mut readers[w], files[w].file_index)?;
        }

        self.finalize_merge_output(&mut current_writer, &mut current_min_key, &mut current_max_key, &mut outputs)?;

        let published: Vec<Arc<DataFile>> = outputs.into_iter().map(Arc::new).collect();
        {
            let old_indices: HashSet<u32> = files.iter().map(|f| f.file_index).collect();
            let mut files_guard = self.files.write();
            let mut new_list: Vec<Arc<DataFile>> =
                files_guard.iter().filter(|f| !old_indices.contains(&f.file_index)).cloned().collect();
            new_list.extend(published.iter().cloned());
            *files_guard = new_list;
        }

        for old in &files {
            if let Err(e) = std::fs::remove_file(&old.path) {
                tracing::warn!(path = %old.path.display(), error = %e, "failed to delete a merged-away data file");
            }
        }

        Ok(published)
    }

    /// Phase one of §4.6.1's three-phase snapshot: briefly quiesces the
    /// writer, captures the current file set, and writes the metadata
    /// sidecar into `dir`.
    pub fn start_snapshot(&self, dir: &Path) -> Result<SnapshotHandle, DataFileError> {
        std::fs::create_dir_all(dir)?;
        let _quiesce = self.writer.lock();
        let captured_files = self.files.read().clone();
        let (min, max) = self.valid_key_range();
        let metadata = CollectionMetadata {
            format_version: 1,
            item_format_version: self.item_format_version,
            min_valid_key: min,
            max_valid_key: max,
        };
        let bytes = bcs::to_bytes(&metadata)?;
        std::fs::write(dir.join(metadata_file_name(&self.store_name)), bytes)?;
        Ok(SnapshotHandle { captured_files })
    }

    /// Phase two: hard-links each captured file into `dir` while writers
    /// run freely.
    pub fn middle_snapshot(&self, dir: &Path, handle: &SnapshotHandle) -> Result<(), DataFileError> {
        for file in &handle.captured_files {
            let dest = dir.join(file.path.file_name().expect("data file paths always have a file name"));
            match std::fs::hard_link(&file.path, &dest) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    /// Phase three: a no-op cleanup hook.
    pub fn end_snapshot(&self, _dir: &Path, _handle: &SnapshotHandle) -> Result<(), DataFileError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use tempfile::tempdir;

    #[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
    pub(crate) struct Item {
        pub(crate) key: u64,
        pub(crate) value: String,
    }

    impl DataItem for Item {
        fn key(&self) -> u64 {
            self.key
        }
    }

    fn config(store_name: &str) -> MerkleConfig {
        MerkleConfig { store_name: store_name.to_string(), ..MerkleConfig::default() }
    }

    #[test]
    fn store_close_and_read_round_trips() {
        let dir = tempdir().unwrap();
        let collection = DataFileCollection::create(dir.path(), 1, config("s4")).unwrap();
        collection.start_writing().unwrap();
        let loc1 = collection.store_data_item(&Item { key: 1, value: "a".into() }).unwrap();
        let loc2 = collection.store_data_item(&Item { key: 2, value: "b".into() }).unwrap();
        let loc3 = collection.store_data_item(&Item { key: 3, value: "c".into() }).unwrap();
        collection.end_writing(1, 3).unwrap();

        assert_eq!(collection.valid_key_range(), (1, 3));
        let item: Item = collection.read_data_item(loc2).unwrap().unwrap();
        assert_eq!(item.value, "b");
        let _ = (loc1, loc3);
    }

    #[test]
    fn a_second_writer_cannot_open_while_one_is_open() {
        let dir = tempdir().unwrap();
        let collection = DataFileCollection::create(dir.path(), 1, config("dup")).unwrap();
        collection.start_writing().unwrap();
        assert!(matches!(collection.start_writing(), Err(DataFileError::WriterAlreadyOpen)));
    }

    #[test]
    fn snapshot_then_open_resolves_identical_locations() {
        let dir = tempdir().unwrap();
        let collection = DataFileCollection::create(dir.path(), 1, config("snap")).unwrap();
        collection.start_writing().unwrap();
        let loc = collection.store_data_item(&Item { key: 5, value: "v".into() }).unwrap();
        collection.end_writing(5, 5).unwrap();

        let snapshot_dir = tempdir().unwrap();
        let handle = collection.start_snapshot(snapshot_dir.path()).unwrap();
        collection.middle_snapshot(snapshot_dir.path(), &handle).unwrap();
        collection.end_snapshot(snapshot_dir.path(), &handle).unwrap();

        let reopened = DataFileCollection::open(snapshot_dir.path(), 1, config("snap")).unwrap();
        assert_eq!(reopened.valid_key_range(), (5, 5));
        let item: Item = reopened.read_data_item(loc).unwrap().unwrap();
        assert_eq!(item.value, "v");
    }

    #[test]
    fn merge_keeps_only_the_newest_still_indexed_copy_per_key() {
        let dir = tempdir().unwrap();
        let collection = DataFileCollection::create(dir.path(), 1, config("merge")).unwrap();
        let index = crate::index::InMemoryIndex::new();

        collection.start_writing().unwrap();
        let old_loc = collection.store_data_item(&Item { key: 1, value: "old".into() }).unwrap();
        collection.end_writing(1, 1).unwrap();
        index.put(1, old_loc);
        let file_a = collection.files()[0].clone();

        collection.start_writing().unwrap();
        let new_loc = collection.store_data_item(&Item { key: 1, value: "new".into() }).unwrap();
        let loc2 = collection.store_data_item(&Item { key: 2, value: "two".into() }).unwrap();
        collection.end_writing(1, 2).unwrap();
        index.put(1, new_loc);
        index.put(2, loc2);
        let file_b = collection.files()[1].clone();

        let pause = PauseToken::new();
        let merged = collection.merge_files::<Item>(&index, vec![file_a, file_b], &pause).unwrap();
        assert_eq!(merged.len(), 1);

        let resolved: Item = collection.read_using_index(&index, 1).unwrap();
        assert_eq!(resolved.value, "new");
        assert_eq!(collection.files().len(), 1);
    }

    #[test]
    fn merge_drops_a_key_the_index_no_longer_points_at() {
        let dir = tempdir().unwrap();
        let collection = DataFileCollection::create(dir.path(), 1, config("drop")).unwrap();
        let index = crate::index::InMemoryIndex::new();

        collection.start_writing().unwrap();
        let loc = collection.store_data_item(&Item { key: 9, value: "stale".into() }).unwrap();
        collection.end_writing(9, 9).unwrap();
        // Index was never pointed at this location (superseded elsewhere).
        index.put(9, DataLocation::new(99, 0));
        let _ = loc;
        let file = collection.files()[0].clone();

        let pause = PauseToken::new();
        let merged = collection.merge_files::<Item>(&index, vec![file], &pause).unwrap();
        assert!(merged.is_empty());
    }
}

#[cfg(any(test, feature = "fuzzing"))]
mod proptests {
    use super::*;
    use super::tests::Item;
    use proptest::prelude::*;
    use tempfile::tempdir;

    fn config(store_name: &str) -> MerkleConfig {
        MerkleConfig { store_name: store_name.to_string(), ..MerkleConfig::default() }
    }

    // Each input file is a run of strictly increasing keys (what every
    // writer path in this crate already guarantees); files may interleave
    // arbitrarily with each other.
    fn arb_sorted_runs() -> impl Strategy<Value = Vec<Vec<u64>>> {
        proptest::collection::vec(1u64..6, 1..5).prop_map(|lengths| {
            let mut next_key = 1u64;
            lengths
                .into_iter()
                .map(|len| {
                    let run: Vec<u64> = (0..len).map(|i| next_key + i).collect();
                    next_key += len + 1; // leave a gap so runs across files don't overlap in this model
                    run
                })
                .collect()
        })
    }

    proptest! {
        // §8 invariant 7: merge output keys are written in strictly
        // increasing order, and the output is a permutation of every input
        // key still reachable through the index at merge time.
        #[test]
        fn merge_output_keys_are_strictly_increasing(runs in arb_sorted_runs()) {
            let dir = tempdir().unwrap();
            let collection = DataFileCollection::create(dir.path(), 1, config("prop-merge")).unwrap();
            let index = crate::index::InMemoryIndex::new();

            let mut files = Vec::new();
            let mut expected_keys = std::collections::BTreeSet::new();
            for run in &runs {
                collection.start_writing().unwrap();
                let mut min = None;
                let mut max = None;
                for &key in run {
                    let loc = collection.store_data_item(&Item { key, value: format!("v{key}") }).unwrap();
                    index.put(key, loc);
                    expected_keys.insert(key);
                    min = Some(min.map_or(key, |m: u64| m.min(key)));
                    max = Some(max.map_or(key, |m: u64| m.max(key)));
                }
                collection.end_writing(min.unwrap(), max.unwrap()).unwrap();
                files.push(collection.files().last().unwrap().clone());
            }

            let pause = PauseToken::new();
            let outputs = collection.merge_files::<Item>(&index, files, &pause).unwrap();

            let mut seen_keys = Vec::new();
            for output in &outputs {
                let mut reader = FileItemReader::open(output).unwrap();
                let mut last: Option<u64> = None;
                while let Some((bytes, _offset)) = reader.next_item().unwrap() {
                    let item: Item = bcs::from_bytes(&bytes).unwrap();
                    if let Some(l) = last {
                        prop_assert!(item.key > l, "merge output keys must strictly increase within a file");
                    }
                    last = Some(item.key);
                    seen_keys.push(item.key);
                }
            }

            let seen_set: std::collections::BTreeSet<u64> = seen_keys.iter().copied().collect();
            prop_assert_eq!(seen_set, expected_keys);
            prop_assert_eq!(seen_keys.len(), seen_keys.iter().copied().collect::<std::collections::BTreeSet<_>>().len());
        }
    }
}
