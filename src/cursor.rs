//! Sequential reader for replay.
//!
//! Single-use, single-threaded cursor over one segment: created at recovery,
//! optionally fast-forwarded to the sidecar checkpoint, then driven with
//! `next()` until it reports end of stream. End of stream is the physical
//! end of file, the first sentinel byte of the preallocated tail, or any
//! byte that is not a legal op; the last case is logged so the layer driving
//! replay can decide whether a truncated middle matters.

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use log::{debug, info, warn};

use crate::codec::Codec;
use crate::error::{Error, Result};
use crate::frame::{OP_EOF, OP_RECORD};
use crate::meta::{read_sidecar, Checkpoint};
use crate::record::LogRecord;
use crate::segment::{parse_file_id, segment_path, sidecar_path, sidecar_path_for};
use crate::writer::DEFAULT_MAX_FILE_SIZE;

pub struct LogSequentialReader {
    file_id: u32,
    codec: Codec,
    reader: BufReader<File>,
    last_checkpoint: Checkpoint,
}

impl LogSequentialReader {
    /// Open a sequential reader over `log-<file_id>` in `dir`, positioned at
    /// offset 0.
    pub fn open(dir: impl AsRef<Path>, file_id: u32) -> Result<Self> {
        let dir = dir.as_ref();
        Self::open_inner(&segment_path(dir, file_id), &sidecar_path(dir, file_id), file_id)
    }

    /// Open a sequential reader from a segment file path, deriving the
    /// sidecar path and the file id from the filename.
    pub fn open_path(segment: impl AsRef<Path>) -> Result<Self> {
        let segment = segment.as_ref();
        let file_id = parse_file_id(segment)
            .ok_or(Error::Unsupported("segment filename is not log-<id>"))?;
        Self::open_inner(segment, &sidecar_path_for(segment), file_id)
    }

    fn open_inner(segment: &Path, sidecar: &Path, file_id: u32) -> Result<Self> {
        let sidecar = read_sidecar(sidecar)?;
        let codec = Codec::from_version(sidecar.version)?;
        let file = File::open(segment)?;
        Ok(Self {
            file_id,
            codec,
            reader: BufReader::new(file),
            last_checkpoint: sidecar.checkpoint,
        })
    }

    pub fn file_id(&self) -> u32 {
        self.file_id
    }

    /// Checkpoint pair recovered from the sidecar at open.
    pub fn last_checkpoint(&self) -> Checkpoint {
        self.last_checkpoint
    }

    /// Fast-forward to the sidecar checkpoint if it is usable for
    /// `requested_write_order_id`; otherwise stay put so the caller replays
    /// from the current position.
    pub fn skip_to_last_checkpoint_position(
        &mut self,
        requested_write_order_id: u64,
    ) -> Result<()> {
        if self.last_checkpoint.offset > 0
            && self.last_checkpoint.write_order_id <= requested_write_order_id
        {
            self.reader
                .seek(SeekFrom::Start(self.last_checkpoint.offset))?;
            debug!(
                "log-{}: fast-forward to checkpoint offset {} (write order {})",
                self.file_id, self.last_checkpoint.offset, self.last_checkpoint.write_order_id
            );
        } else {
            info!(
                "log-{}: checkpoint (offset {}, write order {}) not usable for requested \
                 write order {}; not seeking",
                self.file_id,
                self.last_checkpoint.offset,
                self.last_checkpoint.write_order_id,
                requested_write_order_id
            );
        }
        Ok(())
    }

    /// Read the next record, or `None` at end of stream.
    pub fn next(&mut self) -> Result<Option<LogRecord>> {
        let offset = self.reader.stream_position()?;
        if offset > DEFAULT_MAX_FILE_SIZE {
            warn!(
                "log-{}: position {} is beyond the default segment cap",
                self.file_id, offset
            );
        }

        let mut op = [0u8; 1];
        match self.reader.read_exact(&mut op) {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => {
                debug!("log-{}: end of file at offset {offset}", self.file_id);
                return Ok(None);
            }
            Err(err) => return Err(err.into()),
        }

        match op[0] as i8 {
            OP_EOF => {
                debug!(
                    "log-{}: reached preallocated tail at offset {offset}",
                    self.file_id
                );
                Ok(None)
            }
            OP_RECORD => {
                let record = self.codec.decode_record(&mut self.reader)?;
                Ok(Some(LogRecord { offset, record }))
            }
            _ => {
                warn!(
                    "log-{}: unexpected op byte {:#04x} at offset {offset}; halting replay",
                    self.file_id, op[0]
                );
                Ok(None)
            }
        }
    }

    /// Release the handle. Dropping the reader is equivalent.
    pub fn close(self) {}
}
