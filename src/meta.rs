//! Checkpoint metadata sidecar.
//!
//! Every segment `log-<id>` has a sibling `log-<id>.meta` recording the
//! position up to which replay may fast-forward and the write-order id at
//! that instant. Updates must be crash-atomic: recovery reads either the old
//! pair or the new pair, never a tear.
//!
//! The file is a fixed header (magic + version) followed by two checkpoint
//! slots. Each `mark_checkpoint` bumps a generation counter and overwrites
//! the slot the new generation selects, leaving the other slot intact; a crc
//! guards each slot and recovery picks the highest valid generation. The
//! sidecar also carries the version word the factory uses to bind codecs.

use std::fs::{File, OpenOptions};
use std::io::Read;
use std::os::unix::fs::FileExt;
use std::path::Path;
use std::sync::Mutex;

use log::warn;

use crate::error::{Error, Result};

pub const META_MAGIC: u32 = 0x544C_4F47; // "TLOG"

const HEADER_LEN: usize = 8;
const SLOT_LEN: usize = 28;
const FILE_LEN: usize = HEADER_LEN + 2 * SLOT_LEN;

/// Checkpoint pair as recovered from a sidecar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Checkpoint {
    pub offset: u64,
    pub write_order_id: u64,
}

/// Decoded sidecar: version word plus the winning checkpoint slot.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Sidecar {
    pub version: u32,
    pub checkpoint: Checkpoint,
}

struct MetaState {
    offset: u64,
    write_order_id: u64,
    generation: u64,
}

/// Writer side of the sidecar. One per segment writer, same lifespan.
pub struct MetadataWriter {
    file: File,
    version: u32,
    state: Mutex<MetaState>,
}

impl MetadataWriter {
    /// Create the sidecar for a fresh segment and persist an initial
    /// `(0, 0)` checkpoint.
    pub(crate) fn create(path: &Path, version: u32) -> Result<Self> {
        let file = OpenOptions::new()
            .create_new(true)
            .read(true)
            .write(true)
            .open(path)?;
        let mut header = [0u8; HEADER_LEN];
        header[0..4].copy_from_slice(&META_MAGIC.to_le_bytes());
        header[4..8].copy_from_slice(&version.to_le_bytes());
        file.write_all_at(&header, 0)?;
        file.set_len(FILE_LEN as u64)?;

        let writer = Self {
            file,
            version,
            state: Mutex::new(MetaState {
                offset: 0,
                write_order_id: 0,
                generation: 0,
            }),
        };
        writer.mark_checkpoint(0, 0)?;
        Ok(writer)
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    /// Current in-memory checkpoint pair.
    pub fn checkpoint(&self) -> Checkpoint {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        Checkpoint {
            offset: state.offset,
            write_order_id: state.write_order_id,
        }
    }

    /// Durably record `(position, write_order_id)`.
    pub fn mark_checkpoint(&self, position: u64, write_order_id: u64) -> Result<()> {
        let state = self
            .state
            .lock()
            .map_err(|_| Error::CorruptMetadata("metadata lock poisoned"))?;
        self.mark_locked(state, position, write_order_id)
    }

    /// Record a new write-order id against the previously stored offset.
    ///
    /// Covers the "nothing new was appended but time advanced" update.
    pub fn mark_checkpoint_write_order_id(&self, write_order_id: u64) -> Result<()> {
        let state = self
            .state
            .lock()
            .map_err(|_| Error::CorruptMetadata("metadata lock poisoned"))?;
        let offset = state.offset;
        self.mark_locked(state, offset, write_order_id)
    }

    fn mark_locked(
        &self,
        mut state: std::sync::MutexGuard<'_, MetaState>,
        position: u64,
        write_order_id: u64,
    ) -> Result<()> {
        let generation = state.generation + 1;
        let slot = encode_slot(position, write_order_id, generation);
        let slot_offset = HEADER_LEN + (generation % 2) as usize * SLOT_LEN;
        self.file.write_all_at(&slot, slot_offset as u64)?;
        self.file.sync_data()?;
        state.offset = position;
        state.write_order_id = write_order_id;
        state.generation = generation;
        Ok(())
    }

    /// Best-effort flush; errors are logged, not surfaced.
    pub fn close(&self) {
        if let Err(err) = self.file.sync_data() {
            warn!("metadata sidecar close: sync failed: {err}");
        }
    }
}

/// Read and validate a sidecar, returning the version word and the winning
/// checkpoint slot.
pub(crate) fn read_sidecar(path: &Path) -> Result<Sidecar> {
    let mut file = File::open(path)?;
    let mut header = [0u8; HEADER_LEN];
    read_full(&mut file, &mut header)?;

    let magic = u32::from_le_bytes(header[0..4].try_into().expect("slice length"));
    if magic != META_MAGIC {
        return Err(Error::CorruptMetadata("sidecar magic mismatch"));
    }
    let version = u32::from_le_bytes(header[4..8].try_into().expect("slice length"));
    // Slot layout is version-specific; nothing past the header can be parsed
    // for a version this build does not know.
    if version != 1 {
        return Err(Error::UnsupportedVersion(version));
    }

    let mut slots = [0u8; 2 * SLOT_LEN];
    read_full(&mut file, &mut slots)?;
    let slot0 = decode_slot(&slots[0..SLOT_LEN]);
    let slot1 = decode_slot(&slots[SLOT_LEN..2 * SLOT_LEN]);
    let (checkpoint, _generation) = match (slot0, slot1) {
        (None, None) => return Err(Error::CorruptMetadata("no valid checkpoint slot")),
        (Some(slot), None) | (None, Some(slot)) => slot,
        (Some(a), Some(b)) => {
            if b.1 > a.1 {
                b
            } else {
                a
            }
        }
    };

    Ok(Sidecar { version, checkpoint })
}

/// Convenience loader for the checkpoint pair alone.
pub fn load_checkpoint(path: &Path) -> Result<Checkpoint> {
    read_sidecar(path).map(|sidecar| sidecar.checkpoint)
}

fn read_full(file: &mut File, buf: &mut [u8]) -> Result<()> {
    let mut read = 0;
    while read < buf.len() {
        match file.read(&mut buf[read..])? {
            0 => return Err(Error::CorruptMetadata("sidecar truncated")),
            n => read += n,
        }
    }
    Ok(())
}

fn encode_slot(offset: u64, write_order_id: u64, generation: u64) -> [u8; SLOT_LEN] {
    let mut buf = [0u8; SLOT_LEN];
    buf[0..8].copy_from_slice(&offset.to_le_bytes());
    buf[8..16].copy_from_slice(&write_order_id.to_le_bytes());
    buf[16..24].copy_from_slice(&generation.to_le_bytes());
    let crc = slot_crc(&buf[0..24]);
    buf[24..28].copy_from_slice(&crc.to_le_bytes());
    buf
}

fn decode_slot(buf: &[u8]) -> Option<(Checkpoint, u64)> {
    let crc = u32::from_le_bytes(buf[24..28].try_into().ok()?);
    if slot_crc(&buf[0..24]) != crc {
        return None;
    }
    let offset = u64::from_le_bytes(buf[0..8].try_into().ok()?);
    let write_order_id = u64::from_le_bytes(buf[8..16].try_into().ok()?);
    let generation = u64::from_le_bytes(buf[16..24].try_into().ok()?);
    if generation == 0 {
        return None;
    }
    Some((
        Checkpoint {
            offset,
            write_order_id,
        },
        generation,
    ))
}

fn slot_crc(payload: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(payload);
    hasher.finalize()
}
