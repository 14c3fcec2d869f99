//! Random reader over one segment.
//!
//! Dereferences event pointers: `get(offset)` reads the frame at that byte
//! and returns the embedded event, requiring the frame to be a committed
//! `PUT`. Reads are positional (`read_at`), so a handle carries no seek
//! state; the pool exists to bound open descriptors and to hand one handle
//! to one caller at a time.
//!
//! Checkout blocks once all 50 handles are out. `close` marks the pool
//! closed, drops the idle handles, and waits on a condition variable until
//! in-flight handles come back; a handle returned after close is dropped
//! instead of pooled, and a handle that saw a read error is dropped on the
//! spot rather than returned.

use std::fs::File;
use std::io::{BufReader, Read};
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};
use std::sync::{Condvar, Mutex};

use crate::codec::Codec;
use crate::error::{Error, Result};
use crate::frame::OP_RECORD;
use crate::meta::read_sidecar;
use crate::record::{Event, RecordBody};
use crate::segment::{segment_path, sidecar_path};

/// Upper bound on read handles one reader may hold open.
pub const READ_HANDLE_POOL_CAPACITY: usize = 50;

struct PoolState {
    idle: Vec<File>,
    /// Handles in existence: idle plus checked out.
    opened: usize,
    open: bool,
}

struct HandlePool {
    state: Mutex<PoolState>,
    available: Condvar,
}

pub struct LogRandomReader {
    file_id: u32,
    path: PathBuf,
    codec: Codec,
    pool: HandlePool,
}

impl LogRandomReader {
    /// Open a random reader over `log-<file_id>` in `dir`, binding the codec
    /// recorded in the segment's sidecar.
    pub fn open(dir: impl AsRef<Path>, file_id: u32) -> Result<Self> {
        let dir = dir.as_ref();
        let sidecar = read_sidecar(&sidecar_path(dir, file_id))?;
        let codec = Codec::from_version(sidecar.version)?;
        let path = segment_path(dir, file_id);
        // Probe the segment now so a missing file fails at open, not at the
        // first get.
        drop(File::open(&path)?);

        Ok(Self {
            file_id,
            path,
            codec,
            pool: HandlePool {
                state: Mutex::new(PoolState {
                    idle: Vec::new(),
                    opened: 0,
                    open: true,
                }),
                available: Condvar::new(),
            },
        })
    }

    pub fn file_id(&self) -> u32 {
        self.file_id
    }

    /// Handles currently in existence (idle plus checked out).
    pub fn open_handles(&self) -> usize {
        self.pool
            .state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .opened
    }

    /// Read the event stored by the `PUT` frame starting at `offset`.
    pub fn get(&self, offset: u32) -> Result<Event> {
        let file = self.checkout()?;
        match read_put(&self.codec, &file, offset as u64) {
            Ok(event) => {
                self.checkin(file);
                Ok(event)
            }
            Err(err) => {
                self.discard(file);
                Err(err)
            }
        }
    }

    /// Close the reader and reclaim every handle. Blocks until in-flight
    /// `get` calls have returned their handles. Idempotent.
    pub fn close(&self) {
        let mut state = self.pool.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.open {
            state.open = false;
            let drained: Vec<File> = state.idle.drain(..).collect();
            state.opened -= drained.len();
            drop(drained);
            self.pool.available.notify_all();
        }
        while state.opened > 0 {
            state = self
                .pool
                .available
                .wait(state)
                .unwrap_or_else(|e| e.into_inner());
        }
    }

    fn checkout(&self) -> Result<File> {
        let mut state = self
            .pool
            .state
            .lock()
            .map_err(|_| Error::Corrupt("reader pool lock poisoned"))?;
        loop {
            if !state.open {
                return Err(Error::Closed);
            }
            if let Some(file) = state.idle.pop() {
                return Ok(file);
            }
            if state.opened < READ_HANDLE_POOL_CAPACITY {
                state.opened += 1;
                drop(state);
                return match File::open(&self.path) {
                    Ok(file) => Ok(file),
                    Err(err) => {
                        let mut state =
                            self.pool.state.lock().unwrap_or_else(|e| e.into_inner());
                        state.opened -= 1;
                        self.pool.available.notify_all();
                        Err(err.into())
                    }
                };
            }
            state = self
                .pool
                .available
                .wait(state)
                .map_err(|_| Error::Corrupt("reader pool lock poisoned"))?;
        }
    }

    fn checkin(&self, file: File) {
        let mut state = self.pool.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.open {
            state.idle.push(file);
        } else {
            state.opened -= 1;
            drop(file);
        }
        self.pool.available.notify_all();
    }

    fn discard(&self, file: File) {
        let mut state = self.pool.state.lock().unwrap_or_else(|e| e.into_inner());
        state.opened -= 1;
        drop(file);
        self.pool.available.notify_all();
    }
}

fn read_put(codec: &Codec, file: &File, offset: u64) -> Result<Event> {
    let mut op = [0u8; 1];
    file.read_exact_at(&mut op, offset)?;
    if op[0] != OP_RECORD as u8 {
        return Err(Error::Corruption { op: op[0] });
    }
    let mut reader = BufReader::new(PositionalReader {
        file,
        pos: offset + 1,
    });
    let record = codec.decode_record(&mut reader)?;
    match record.body {
        RecordBody::Put(event) => Ok(event),
        _ => Err(Error::UnexpectedRecordKind),
    }
}

/// `Read` adapter over `read_at`; tracks its own position so the underlying
/// handle keeps none.
struct PositionalReader<'a> {
    file: &'a File,
    pos: u64,
}

impl Read for PositionalReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.file.read_at(buf, self.pos)?;
        self.pos += n as u64;
        Ok(n)
    }
}
