// Copyright (c) The Merkle Core Contributors
// SPDX-License-Identifier: Apache-2.0

//! On-disk layout of a single data file (§6): a fixed header, a sequence of
//! length-prefixed items, and a footer whose own start offset is recorded in
//! the file's last 8 bytes so a reader can find it without scanning.

use crate::errors::DataFileError;
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use merkle_node::DataLocation;
use std::fs::File;
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

const MAGIC: [u8; 4] = *b"MDFC";
const FORMAT_VERSION: u32 = 1;
const HEADER_LEN: u64 = 4 + 4 + 4 + 8 + 4;
const FOOTER_BODY_LEN: u64 = 8 + 8 + 8;
const TRAILER_LEN: u64 = 8;

pub fn file_name(store_name: &str, file_index: u32, creation_millis: u64) -> String {
    format!("{store_name}_{file_index}_{creation_millis}.dat")
}

pub fn metadata_file_name(store_name: &str) -> String {
    format!("{store_name}_metadata.dfc")
}

/// A published, immutable data file in the collection's read set.
#[derive(Clone, Debug)]
pub struct DataFile {
    pub path: PathBuf,
    pub file_index: u32,
    pub creation_millis: u64,
    pub min_key: u64,
    pub max_key: u64,
    pub item_count: u64,
}

impl DataFile {
    pub fn contains_key(&self, key: u64) -> bool {
        key >= self.min_key && key <= self.max_key
    }

    /// Reopens the footer of an on-disk file to recover a [`DataFile`]
    /// record; used both when opening an existing collection and after a
    /// writer closes a new file.
    pub fn open(path: PathBuf, file_index: u32, creation_millis: u64) -> Result<Self, DataFileError> {
        let (min_key, max_key, item_count) = read_footer(&path)?;
        Ok(Self { path, file_index, creation_millis, min_key, max_key, item_count })
    }
}

pub(crate) struct OpenWriter {
    pub file: BufWriter<File>,
    pub path: PathBuf,
    pub file_index: u32,
    pub creation_millis: u64,
    pub offset: u64,
    pub item_count: u64,
}

impl OpenWriter {
    pub fn create(
        dir: &Path,
        store_name: &str,
        file_index: u32,
        creation_millis: u64,
        item_format_version: u32,
    ) -> io::Result<Self> {
        let path = dir.join(file_name(store_name, file_index, creation_millis));
        let mut file = File::create(&path)?;
        write_header(&mut file, file_index, creation_millis, item_format_version)?;
        Ok(Self {
            file: BufWriter::new(file),
            path,
            file_index,
            creation_millis,
            offset: HEADER_LEN,
            item_count: 0,
        })
    }

    pub fn store_item(&mut self, bytes: &[u8]) -> io::Result<DataLocation> {
        let location = DataLocation::new(self.file_index, self.offset);
        self.file.write_u32::<BigEndian>(bytes.len() as u32)?;
        self.file.write_all(bytes)?;
        self.offset += 4 + bytes.len() as u64;
        self.item_count += 1;
        Ok(location)
    }

    /// Writes the footer, flushes and syncs to disk, and returns the
    /// published [`DataFile`] record.
    pub fn finish(mut self, min_key: u64, max_key: u64) -> Result<DataFile, DataFileError> {
        let footer_start = self.offset;
        self.file.write_u64::<BigEndian>(min_key)?;
        self.file.write_u64::<BigEndian>(max_key)?;
        self.file.write_u64::<BigEndian>(self.item_count)?;
        self.file.write_u64::<BigEndian>(footer_start)?;
        self.file.flush()?;
        self.file.get_ref().sync_all()?;
        Ok(DataFile {
            path: self.path,
            file_index: self.file_index,
            creation_millis: self.creation_millis,
            min_key,
            max_key,
            item_count: self.item_count,
        })
    }
}

fn write_header(file: &mut File, file_index: u32, creation_millis: u64, item_format_version: u32) -> io::Result<()> {
    file.write_all(&MAGIC)?;
    file.write_u32::<BigEndian>(FORMAT_VERSION)?;
    file.write_u32::<BigEndian>(file_index)?;
    file.write_u64::<BigEndian>(creation_millis)?;
    file.write_u32::<BigEndian>(item_format_version)?;
    Ok(())
}

/// Reads and validates a file's header; returns the item serialization
/// version it was written with.
pub fn read_header(path: &Path) -> Result<u32, DataFileError> {
    let mut file = File::open(path)?;
    let mut magic = [0u8; 4];
    file.read_exact(&mut magic)?;
    if magic != MAGIC {
        return Err(DataFileError::CorruptFooter(path.to_path_buf()));
    }
    let format_version = file.read_u32::<BigEndian>()?;
    if format_version != FORMAT_VERSION {
        return Err(DataFileError::CorruptFooter(path.to_path_buf()));
    }
    let _file_index = file.read_u32::<BigEndian>()?;
    let _creation_millis = file.read_u64::<BigEndian>()?;
    let item_format_version = file.read_u32::<BigEndian>()?;
    Ok(item_format_version)
}

fn read_footer(path: &Path) -> Result<(u64, u64, u64), DataFileError> {
    let mut file = File::open(path)?;
    let len = file.metadata()?.len();
    if len < HEADER_LEN + FOOTER_BODY_LEN + TRAILER_LEN {
        return Err(DataFileError::CorruptFooter(path.to_path_buf()));
    }
    file.seek(SeekFrom::End(-(TRAILER_LEN as i64)))?;
    let footer_start = file.read_u64::<BigEndian>()?;
    if footer_start < HEADER_LEN || footer_start > len - FOOTER_BODY_LEN - TRAILER_LEN {
        return Err(DataFileError::CorruptFooter(path.to_path_buf()));
    }
    file.seek(SeekFrom::Start(footer_start))?;
    let min_key = file.read_u64::<BigEndian>()?;
    let max_key = file.read_u64::<BigEndian>()?;
    let item_count = file.read_u64::<BigEndian>()?;
    Ok((min_key, max_key, item_count))
}

/// Reads the length-prefixed item at `byte_offset`. `Ok(None)` only on a
/// missing file (concurrently retired by a merge); any other I/O failure or
/// short read is a hard error.
pub fn read_item_at(path: &Path, byte_offset: u64) -> Result<Option<Vec<u8>>, DataFileError> {
    let mut file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    file.seek(SeekFrom::Start(byte_offset))?;
    let len = file.read_u32::<BigEndian>()?;
    let mut buf = vec![0u8; len as usize];
    file.read_exact(&mut buf)?;
    Ok(Some(buf))
}

/// Sequential reader over one file's items, in on-disk (append) order. Used
/// by the merge algorithm, which requires each input file's items to
/// already be in non-decreasing key order — an invariant every writer path
/// in this crate (including merge's own output) upholds.
pub(crate) struct FileItemReader {
    file: File,
    cursor: u64,
    footer_start: u64,
}

impl FileItemReader {
    pub fn open(data_file: &DataFile) -> Result<Self, DataFileError> {
        let file = File::open(&data_file.path)?;
        let len = file.metadata()?.len();
        let footer_start = if len >= TRAILER_LEN {
            let mut trailer_reader = File::open(&data_file.path)?;
            trailer_reader.seek(SeekFrom::End(-(TRAILER_LEN as i64)))?;
            trailer_reader.read_u64::<BigEndian>()?
        } else {
            HEADER_LEN
        };
        Ok(Self { file, cursor: HEADER_LEN, footer_start })
    }

    /// Returns `(bytes, byte_offset_of_this_item)`.
    pub fn next_item(&mut self) -> Result<Option<(Vec<u8>, u64)>, DataFileError> {
        if self.cursor >= self.footer_start {
            return Ok(None);
        }
        self.file.seek(SeekFrom::Start(self.cursor))?;
        let len = self.file.read_u32::<BigEndian>()?;
        let mut buf = vec![0u8; len as usize];
        self.file.read_exact(&mut buf)?;
        let offset = self.cursor;
        self.cursor += 4 + len as u64;
        Ok(Some((buf, offset)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn header_and_footer_round_trip() {
        let dir = tempdir().unwrap();
        let mut writer = OpenWriter::create(dir.path(), "store", 0, 1000, 1).unwrap();
        let loc1 = writer.store_item(b"alpha").unwrap();
        let loc2 = writer.store_item(b"beta").unwrap();
        assert_eq!(loc1.file_index, 0);
        assert!(loc2.byte_offset > loc1.byte_offset);
        let data_file = writer.finish(1, 2).unwrap();

        assert_eq!(data_file.min_key, 1);
        assert_eq!(data_file.max_key, 2);
        assert_eq!(data_file.item_count, 2);

        let version = read_header(&data_file.path).unwrap();
        assert_eq!(version, 1);

        assert_eq!(read_item_at(&data_file.path, loc1.byte_offset).unwrap(), Some(b"alpha".to_vec()));
        assert_eq!(read_item_at(&data_file.path, loc2.byte_offset).unwrap(), Some(b"beta".to_vec()));
    }

    #[test]
    fn missing_file_reads_as_none() {
        let dir = tempdir().unwrap();
        let ghost = dir.path().join("gone.dat");
        assert!(read_item_at(&ghost, 24).unwrap().is_none());
    }

    #[test]
    fn sequential_reader_walks_items_in_order() {
        let dir = tempdir().unwrap();
        let mut writer = OpenWriter::create(dir.path(), "store", 0, 1000, 1).unwrap();
        writer.store_item(b"a").unwrap();
        writer.store_item(b"bb").unwrap();
        let data_file = writer.finish(1, 2).unwrap();

        let mut reader = FileItemReader::open(&data_file).unwrap();
        let (first, _) = reader.next_item().unwrap().unwrap();
        assert_eq!(first, b"a");
        let (second, _) = reader.next_item().unwrap().unwrap();
        assert_eq!(second, b"bb");
        assert!(reader.next_item().unwrap().is_none());
    }
}
