//! Segment writer.
//!
//! Owns the write handle of one active segment. Appends are serialized under
//! an interior lock; the file grows by whole sentinel chunks ahead of the
//! logical position, so the bytes past `position()` are always `OP_EOF`.
//! Only `commit` (and `close`) force bytes to stable storage; `put`, `take`
//! and `rollback` stay in the page cache so a batch of operations amortizes
//! one fsync.
//!
//! Writers are opened when a segment is created and closed when the segment
//! is rolled or the channel stops; they are never re-opened. The writer does
//! not roll by itself: callers watch `is_roll_required` and switch to a new
//! segment before the configured cap is crossed.

use std::fs::OpenOptions;
use std::os::unix::fs::FileExt;
use std::path::Path;
use std::sync::Mutex;

use log::{debug, warn};

use crate::codec::Codec;
use crate::error::{Error, Result};
use crate::frame::{sentinel_chunk, FILL_CHUNK, OP_RECORD};
use crate::meta::MetadataWriter;
use crate::record::{Event, EventPtr, RecordBody, TxRecord};
use crate::segment::{segment_path, sidecar_path};

/// Largest permitted segment cap. Leaves room for one full preallocation
/// chunk below the 2^31 offset ceiling.
pub const DEFAULT_MAX_FILE_SIZE: u64 = i32::MAX as u64 - FILL_CHUNK as u64;

struct WriterInner {
    file: Option<std::fs::File>,
    /// Logical end of the record region. Monotone for the writer's lifetime.
    position: u64,
    /// Physical file size; always a multiple of `FILL_CHUNK` once non-zero.
    allocated: u64,
    fill: Box<[u8]>,
}

pub struct LogFileWriter {
    file_id: u32,
    max_file_size: u64,
    codec: Codec,
    meta: MetadataWriter,
    inner: Mutex<WriterInner>,
}

impl LogFileWriter {
    /// Create a fresh segment `log-<file_id>` and its metadata sidecar in
    /// `dir`. Fails if either file already exists.
    ///
    /// `max_file_size` is clamped to [`DEFAULT_MAX_FILE_SIZE`].
    pub fn create(dir: impl AsRef<Path>, file_id: u32, max_file_size: u64) -> Result<Self> {
        if file_id > i32::MAX as u32 {
            return Err(Error::Unsupported("file id exceeds i32 range"));
        }
        let max_file_size = if max_file_size > DEFAULT_MAX_FILE_SIZE {
            debug!(
                "log-{file_id}: clamping max_file_size {max_file_size} to {DEFAULT_MAX_FILE_SIZE}"
            );
            DEFAULT_MAX_FILE_SIZE
        } else {
            max_file_size
        };

        let codec = Codec::V1;
        let file = OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(segment_path(dir.as_ref(), file_id))?;
        let meta = MetadataWriter::create(&sidecar_path(dir.as_ref(), file_id), codec.version())?;

        Ok(Self {
            file_id,
            max_file_size,
            codec,
            meta,
            inner: Mutex::new(WriterInner {
                file: Some(file),
                position: 0,
                allocated: 0,
                fill: sentinel_chunk(),
            }),
        })
    }

    pub fn file_id(&self) -> u32 {
        self.file_id
    }

    pub fn max_file_size(&self) -> u64 {
        self.max_file_size
    }

    /// Current logical write position.
    pub fn position(&self) -> u64 {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .position
    }

    pub fn is_open(&self) -> bool {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .file
            .is_some()
    }

    /// The checkpoint sidecar paired with this segment.
    pub fn metadata(&self) -> &MetadataWriter {
        &self.meta
    }

    /// Record the current position under `write_order_id` in the sidecar.
    pub fn mark_checkpoint(&self, write_order_id: u64) -> Result<()> {
        self.meta.mark_checkpoint(self.position(), write_order_id)
    }

    /// Append a `PUT` frame, returning the pointer to its first byte.
    pub fn put(&self, transaction_id: u64, write_order_id: u64, event: Event) -> Result<EventPtr> {
        let record = TxRecord::new(transaction_id, write_order_id, RecordBody::Put(event));
        let offset = self.append(&record, false)?;
        Ok(EventPtr::new(self.file_id, offset as u32))
    }

    /// Append a `TAKE` frame referencing an earlier `PUT`.
    pub fn take(&self, transaction_id: u64, write_order_id: u64, ptr: EventPtr) -> Result<()> {
        let record = TxRecord::new(transaction_id, write_order_id, RecordBody::Take(ptr));
        self.append(&record, false).map(|_| ())
    }

    /// Append a `ROLLBACK` frame.
    pub fn rollback(&self, transaction_id: u64, write_order_id: u64) -> Result<()> {
        let record = TxRecord::new(transaction_id, write_order_id, RecordBody::Rollback);
        self.append(&record, false).map(|_| ())
    }

    /// Append a `COMMIT` frame, then flush all appended bytes to stable
    /// storage. Durability covers every frame written so far, not just the
    /// commit itself.
    pub fn commit(&self, transaction_id: u64, write_order_id: u64) -> Result<()> {
        let record = TxRecord::new(transaction_id, write_order_id, RecordBody::Commit);
        self.append(&record, true).map(|_| ())
    }

    /// True when appending a `PUT` of `event` would push the position past
    /// the configured cap. The writer never rolls by itself; a true result
    /// is the caller's cue to switch segments.
    pub fn is_roll_required(&self, event: &Event) -> bool {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let frame_len = 1 + self.codec.put_record_len(event) as u64;
        inner.file.is_some() && inner.position + frame_len > self.max_file_size
    }

    /// Flush data and metadata, then release the handle. Idempotent;
    /// errors are logged, not surfaced.
    pub fn close(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(file) = inner.file.take() {
            if let Err(err) = file.sync_all() {
                warn!("log-{}: sync on close failed: {err}", self.file_id);
            }
            self.meta.close();
        }
    }

    fn append(&self, record: &TxRecord, sync: bool) -> Result<u64> {
        let payload = self.codec.encode_record(record);
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| Error::Corrupt("writer lock poisoned"))?;
        let WriterInner {
            file,
            position,
            allocated,
            fill,
        } = &mut *inner;
        let file = file.as_ref().ok_or(Error::Closed)?;

        let offset = *position;
        let frame_len = 1 + payload.len() as u64;
        if offset + frame_len > i32::MAX as u64 {
            return Err(Error::OffsetOverflow);
        }

        // Grow by whole sentinel chunks ahead of the logical position. The
        // slack amortizes inode updates and keeps the tail at OP_EOF.
        while *allocated < offset + frame_len {
            file.write_all_at(fill, *allocated)?;
            *allocated += FILL_CHUNK as u64;
        }

        let mut frame = Vec::with_capacity(frame_len as usize);
        frame.push(OP_RECORD as u8);
        frame.extend_from_slice(&payload);
        file.write_all_at(&frame, offset)?;
        *position += frame_len;

        if sync {
            file.sync_data()?;
        }
        Ok(offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::RECORD_HEADER_LEN;
    use tempfile::tempdir;

    #[test]
    fn positions_are_frame_size_sums() {
        let dir = tempdir().unwrap();
        let writer = LogFileWriter::create(dir.path(), 7, DEFAULT_MAX_FILE_SIZE).unwrap();

        // No headers: frame = op + record header + nheaders + blen + body.
        let frame_len = |body: usize| (1 + RECORD_HEADER_LEN + 4 + 4 + body) as u64;

        let p1 = writer.put(1, 10, Event::from_body(&b"a"[..])).unwrap();
        assert_eq!(p1, EventPtr::new(7, 0));
        assert_eq!(writer.position(), frame_len(1));

        let p2 = writer.put(1, 11, Event::from_body(&b"bb"[..])).unwrap();
        assert_eq!(p2.offset as u64, frame_len(1));
        assert_eq!(writer.position(), frame_len(1) + frame_len(2));

        writer.commit(1, 12).unwrap();
        assert_eq!(
            writer.position(),
            frame_len(1) + frame_len(2) + (1 + RECORD_HEADER_LEN) as u64
        );
    }

    #[test]
    fn append_after_close_fails() {
        let dir = tempdir().unwrap();
        let writer = LogFileWriter::create(dir.path(), 0, DEFAULT_MAX_FILE_SIZE).unwrap();
        writer.put(1, 1, Event::from_body(&b"x"[..])).unwrap();
        writer.close();
        writer.close(); // idempotent
        assert!(!writer.is_open());
        assert!(matches!(
            writer.put(1, 2, Event::from_body(&b"y"[..])),
            Err(Error::Closed)
        ));
        assert!(matches!(writer.commit(1, 2), Err(Error::Closed)));
    }

    #[test]
    fn append_past_offset_ceiling_fails() {
        let dir = tempdir().unwrap();
        let writer = LogFileWriter::create(dir.path(), 0, DEFAULT_MAX_FILE_SIZE).unwrap();
        writer.inner.lock().unwrap().position = i32::MAX as u64 - 4;
        assert!(matches!(
            writer.put(1, 1, Event::from_body(&b"too big"[..])),
            Err(Error::OffsetOverflow)
        ));
    }

    #[test]
    fn max_file_size_is_clamped() {
        let dir = tempdir().unwrap();
        let writer = LogFileWriter::create(dir.path(), 0, u64::MAX).unwrap();
        assert_eq!(writer.max_file_size(), DEFAULT_MAX_FILE_SIZE);
    }

    #[test]
    fn roll_required_when_frame_would_cross_cap() {
        let dir = tempdir().unwrap();
        let writer = LogFileWriter::create(dir.path(), 0, 64).unwrap();
        let event = Event::from_body(vec![0u8; 64]);
        assert!(writer.is_roll_required(&event));
        let small = Event::from_body(&b"s"[..]);
        assert!(!writer.is_roll_required(&small));
        writer.close();
        assert!(!writer.is_roll_required(&small));
    }

    #[test]
    fn oversized_file_id_is_rejected() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            LogFileWriter::create(dir.path(), u32::MAX, DEFAULT_MAX_FILE_SIZE),
            Err(Error::Unsupported(_))
        ));
    }
}
