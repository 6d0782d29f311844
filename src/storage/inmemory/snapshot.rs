//! Chunked dump and restore of an in-memory store.
//!
//! A dump of store `name` is a set of files `name_0`, `name_1`, ... in one
//! directory. Each file is a snappy frame stream holding, big-endian:
//!
//! ```text
//! u32 row count
//! per row:   u32 key length, key bytes, u32 entry count
//! per entry: u32 column length, column, u32 value length, value,
//!            u8 flags, [u32 ttl if flags & 1], [i64 timestamp if flags & 2]
//! ```

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use parking_lot::RwLock;
use tracing::debug;

use super::{ColumnValueStore, InMemoryKeyColumnValueStore};
use crate::primitives::bytes::StaticBuffer;
use crate::storage::kcv::Entry;
use crate::types::{Result, StorageError};

/// Stores with more rows than this are split across several chunk files.
const CHUNKING_THRESHOLD: usize = 1000;
const IO_BUFFER_SIZE: usize = 64 * 1024;

const FLAG_TTL: u8 = 1;
const FLAG_TIMESTAMP: u8 = 2;

type Row = (StaticBuffer, Arc<ColumnValueStore>);

impl InMemoryKeyColumnValueStore {
    /// Writes every row into chunk files under `dir`, one writer thread per
    /// chunk, and returns the number of files written.
    ///
    /// An empty store writes nothing. Existing chunk files are never
    /// overwritten; the dump fails with [`StorageError::Io`] instead.
    pub fn dump_to(&self, dir: &Path) -> Result<usize> {
        let rows: Vec<Row> = self
            .rows
            .read()
            .iter()
            .map(|(key, row)| (key.clone(), Arc::clone(row)))
            .collect();
        if rows.is_empty() {
            return Ok(0);
        }
        let chunk_size = if rows.len() > CHUNKING_THRESHOLD {
            let parallelism = thread::available_parallelism().map_or(1, |n| n.get());
            (rows.len() / (parallelism * 2)).max(1)
        } else {
            rows.len()
        };
        let chunks: Vec<&[Row]> = rows.chunks(chunk_size).collect();

        thread::scope(|scope| {
            let writers: Vec<_> = chunks
                .iter()
                .enumerate()
                .map(|(i, chunk)| {
                    let path = dir.join(format!("{}_{i}", self.name));
                    scope.spawn(move || write_chunk(&path, chunk))
                })
                .collect();
            writers.into_iter().try_for_each(|writer| {
                writer
                    .join()
                    .map_err(|_| StorageError::permanent("snapshot writer panicked"))?
            })
        })?;
        debug!(store = %self.name, rows = rows.len(), files = chunks.len(), "kcv.inmemory.dump");
        Ok(chunks.len())
    }

    /// Rebuilds store `name` from the chunk files [`Self::dump_to`] left in
    /// `dir`. Files of other stores are ignored; a directory without chunks
    /// yields an empty store.
    pub fn read_from(dir: &Path, name: &str) -> Result<Self> {
        let prefix = format!("{name}_");
        let mut paths: Vec<PathBuf> = Vec::new();
        for item in fs::read_dir(dir)? {
            let path = item?.path();
            let is_chunk = path
                .file_name()
                .and_then(|file| file.to_str())
                .and_then(|file| file.strip_prefix(&prefix))
                .is_some_and(|index| index.parse::<usize>().is_ok());
            if is_chunk && path.is_file() {
                paths.push(path);
            }
        }
        paths.sort();

        let chunks = thread::scope(|scope| {
            let readers: Vec<_> = paths
                .iter()
                .map(|path| scope.spawn(move || read_chunk(path)))
                .collect();
            readers
                .into_iter()
                .map(|reader| {
                    reader
                        .join()
                        .map_err(|_| StorageError::permanent("snapshot reader panicked"))?
                })
                .collect::<Result<Vec<_>>>()
        })?;

        let mut rows = BTreeMap::new();
        for chunk in chunks {
            for (key, row) in chunk {
                rows.insert(key, Arc::new(row));
            }
        }
        debug!(store = name, rows = rows.len(), files = paths.len(), "kcv.inmemory.restore");
        let store = Self::new(name);
        *store.rows.write() = rows;
        Ok(store)
    }
}

fn write_chunk(path: &Path, rows: &[Row]) -> Result<()> {
    let file = OpenOptions::new().write(true).create_new(true).open(path)?;
    let mut out = snap::write::FrameEncoder::new(BufWriter::with_capacity(IO_BUFFER_SIZE, file));
    write_len(&mut out, rows.len())?;
    for (key, row) in rows {
        write_block(&mut out, key.as_slice())?;
        let entries = row.entries();
        write_len(&mut out, entries.len())?;
        for entry in entries.iter() {
            write_entry(&mut out, entry)?;
        }
    }
    out.flush()?;
    Ok(())
}

fn write_entry(out: &mut impl Write, entry: &Entry) -> Result<()> {
    write_block(out, entry.column().as_slice())?;
    write_block(out, entry.value().as_slice())?;
    let meta = entry.meta();
    let mut flags = 0u8;
    if meta.ttl.is_some() {
        flags |= FLAG_TTL;
    }
    if meta.timestamp.is_some() {
        flags |= FLAG_TIMESTAMP;
    }
    out.write_all(&[flags])?;
    if let Some(ttl) = meta.ttl {
        out.write_all(&ttl.to_be_bytes())?;
    }
    if let Some(timestamp) = meta.timestamp {
        out.write_all(&timestamp.to_be_bytes())?;
    }
    Ok(())
}

fn write_len(out: &mut impl Write, len: usize) -> Result<()> {
    let len = u32::try_from(len).map_err(|_| StorageError::Invalid("snapshot field exceeds u32 length"))?;
    out.write_all(&len.to_be_bytes())?;
    Ok(())
}

fn write_block(out: &mut impl Write, bytes: &[u8]) -> Result<()> {
    write_len(out, bytes.len())?;
    out.write_all(bytes)?;
    Ok(())
}

fn read_chunk(path: &Path) -> Result<Vec<(StaticBuffer, ColumnValueStore)>> {
    let file = File::open(path)?;
    let mut input = snap::read::FrameDecoder::new(BufReader::with_capacity(IO_BUFFER_SIZE, file));
    let num_rows = read_u32(&mut input)?;
    let mut rows = Vec::with_capacity(num_rows.min(CHUNKING_THRESHOLD));
    for _ in 0..num_rows {
        let key = read_block(&mut input)?;
        let num_entries = read_u32(&mut input)?;
        let mut entries = Vec::with_capacity(num_entries.min(CHUNKING_THRESHOLD));
        for _ in 0..num_entries {
            entries.push(read_entry(&mut input)?);
        }
        rows.push((key, ColumnValueStore::from_entries(entries)));
    }
    Ok(rows)
}

fn read_entry(input: &mut impl Read) -> Result<Entry> {
    let column = read_block(input)?;
    let value = read_block(input)?;
    let mut flags = [0u8; 1];
    input.read_exact(&mut flags)?;
    let mut entry = Entry::new(column, value);
    if flags[0] & FLAG_TTL != 0 {
        let mut raw = [0u8; 4];
        input.read_exact(&mut raw)?;
        entry = entry.with_ttl(u32::from_be_bytes(raw));
    }
    if flags[0] & FLAG_TIMESTAMP != 0 {
        let mut raw = [0u8; 8];
        input.read_exact(&mut raw)?;
        entry = entry.with_timestamp(i64::from_be_bytes(raw));
    }
    Ok(entry)
}

fn read_u32(input: &mut impl Read) -> Result<usize> {
    let mut raw = [0u8; 4];
    input.read_exact(&mut raw)?;
    Ok(u32::from_be_bytes(raw) as usize)
}

fn read_block(input: &mut impl Read) -> Result<StaticBuffer> {
    let len = read_u32(input)?;
    let mut bytes = vec![0u8; len];
    input.read_exact(&mut bytes)?;
    Ok(StaticBuffer::from(bytes))
}
