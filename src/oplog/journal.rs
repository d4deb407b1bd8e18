//! Append-only on-disk journal for an in-process oplog.
//!
//! Layout: a 5 byte header (magic + version) followed by frames of
//! `len: u32 LE | MessagePack ChangeRecord | crc32: u32 LE`.

use crate::error::{Result, StoreError};
use crate::record::ChangeRecord;
use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Magic bytes for journal files.
const JOURNAL_MAGIC: &[u8; 4] = b"OPJ\0";

/// Current journal format version.
const JOURNAL_VERSION: u8 = 1;

/// Magic plus version byte.
const HEADER_LEN: u64 = 5;

/// Frames larger than this are treated as corruption.
const MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

/// Durable append-only journal of oplog entries.
pub struct OplogJournal {
    path: PathBuf,
    writer: BufWriter<File>,
    writes_since_sync: u64,
    /// fsync every N appends (1 = every append).
    sync_every: u64,
}

impl OplogJournal {
    /// Open or create a journal, returning it with every entry already on
    /// disk, in append order.
    ///
    /// A trailing partial frame (torn write) is truncated away so later
    /// appends land directly after the last complete frame. A checksum
    /// mismatch on a complete frame is reported as corruption.
    pub fn open(path: impl AsRef<Path>, sync_every: u64) -> Result<(Self, Vec<ChangeRecord>)> {
        let path = path.as_ref().to_path_buf();

        let records = if path.exists() {
            let file = File::open(&path)?;
            let file_len = file.metadata()?.len();
            let mut reader = BufReader::new(file);
            Self::read_header(&mut reader)?;

            // End of the last complete frame.
            let mut valid_len = HEADER_LEN;
            let mut records = Vec::new();
            while let Some((record, frame_len)) = Self::read_frame(&mut reader)? {
                valid_len += frame_len;
                records.push(record);
            }

            if file_len > valid_len {
                warn!(
                    path = %path.display(),
                    valid_len,
                    dropped = file_len - valid_len,
                    "truncating torn frame at end of oplog journal"
                );
                OpenOptions::new().write(true).open(&path)?.set_len(valid_len)?;
            }
            records
        } else {
            let mut file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&path)?;
            file.write_all(JOURNAL_MAGIC)?;
            file.write_all(&[JOURNAL_VERSION])?;
            file.sync_all()?;
            Vec::new()
        };

        let file = OpenOptions::new().append(true).open(&path)?;

        Ok((
            Self {
                path,
                writer: BufWriter::new(file),
                writes_since_sync: 0,
                sync_every: sync_every.max(1),
            },
            records,
        ))
    }

    /// Append one entry.
    pub fn append(&mut self, record: &ChangeRecord) -> Result<()> {
        let encoded = rmp_serde::to_vec_named(record)?;

        self.writer.write_all(&(encoded.len() as u32).to_le_bytes())?;
        self.writer.write_all(&encoded)?;
        self.writer
            .write_all(&crc32fast::hash(&encoded).to_le_bytes())?;
        self.writer.flush()?;

        self.writes_since_sync += 1;
        if self.writes_since_sync >= self.sync_every {
            self.writer.get_ref().sync_all()?;
            self.writes_since_sync = 0;
        }
        Ok(())
    }

    /// Force pending appends to disk.
    pub fn sync(&mut self) -> Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;
        self.writes_since_sync = 0;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_header(reader: &mut impl Read) -> Result<()> {
        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;
        if &magic != JOURNAL_MAGIC {
            return Err(StoreError::InvalidFormat("Invalid journal magic".into()));
        }

        let mut version = [0u8; 1];
        reader.read_exact(&mut version)?;
        if version[0] != JOURNAL_VERSION {
            return Err(StoreError::InvalidFormat(format!(
                "Unsupported journal version: {}",
                version[0]
            )));
        }
        Ok(())
    }

    /// Next complete frame and its size on disk; `None` at end of file or
    /// at a torn frame.
    fn read_frame(reader: &mut impl Read) -> Result<Option<(ChangeRecord, u64)>> {
        let mut len_bytes = [0u8; 4];
        if !read_full(reader, &mut len_bytes)? {
            return Ok(None);
        }
        let len = u32::from_le_bytes(len_bytes) as usize;
        if len > MAX_FRAME_LEN {
            return Err(StoreError::Corruption("journal frame too large".into()));
        }

        let mut encoded = vec![0u8; len];
        let mut checksum_bytes = [0u8; 4];
        if !read_full(reader, &mut encoded)? || !read_full(reader, &mut checksum_bytes)? {
            return Ok(None);
        }

        let stored = u32::from_le_bytes(checksum_bytes);
        let computed = crc32fast::hash(&encoded);
        if stored != computed {
            return Err(StoreError::Corruption(format!(
                "journal checksum mismatch: expected {stored:#010x}, got {computed:#010x}"
            )));
        }

        let record = rmp_serde::from_slice(&encoded)?;
        Ok(Some((record, (4 + len + 4) as u64)))
    }
}

/// Fill `buf` completely; `false` if the stream ended first.
fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> Result<bool> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e.into()),
    }
}
