//! Segmented append-only transaction log for a durable event channel.
//!
//! Producers append event payloads and transaction markers to the current
//! segment through [`LogFileWriter`]; committed `PUT` frames are fetched by
//! pointer through [`LogRandomReader`]; recovery replays a segment with
//! [`LogSequentialReader`], fast-forwarding over already-checkpointed frames
//! using the per-segment metadata sidecar.

pub mod codec;
pub mod cursor;
pub mod error;
pub mod frame;
pub mod meta;
pub mod reader;
pub mod record;
pub mod segment;
pub mod writer;

pub use codec::Codec;
pub use cursor::LogSequentialReader;
pub use error::{Error, Result};
pub use frame::{FILL_CHUNK, OP_EOF, OP_RECORD};
pub use meta::{load_checkpoint, Checkpoint, MetadataWriter};
pub use reader::{LogRandomReader, READ_HANDLE_POOL_CAPACITY};
pub use record::{Event, EventPtr, LogRecord, RecordBody, TxRecord};
pub use segment::{discover_segments, next_file_id};
pub use writer::{LogFileWriter, DEFAULT_MAX_FILE_SIZE};
