//! Transaction record types carried by the log.

/// Event payload stored by a `PUT`: string headers plus an opaque body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Event {
    pub fn new(headers: Vec<(String, String)>, body: Vec<u8>) -> Self {
        Self { headers, body }
    }

    /// Event with a body and no headers.
    pub fn from_body(body: impl Into<Vec<u8>>) -> Self {
        Self {
            headers: Vec::new(),
            body: body.into(),
        }
    }
}

/// Location of a `PUT` frame: segment id plus the frame's first byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventPtr {
    pub file_id: u32,
    pub offset: u32,
}

impl EventPtr {
    pub fn new(file_id: u32, offset: u32) -> Self {
        Self { file_id, offset }
    }
}

/// Variant data of a transaction record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordBody {
    Put(Event),
    Take(EventPtr),
    Rollback,
    Commit,
}

impl RecordBody {
    pub fn kind_name(&self) -> &'static str {
        match self {
            RecordBody::Put(_) => "PUT",
            RecordBody::Take(_) => "TAKE",
            RecordBody::Rollback => "ROLLBACK",
            RecordBody::Commit => "COMMIT",
        }
    }
}

/// One record as appended to a segment. The identifiers are supplied by the
/// caller and must be monotonic per the channel's write-order clock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxRecord {
    pub transaction_id: u64,
    pub write_order_id: u64,
    pub body: RecordBody,
}

impl TxRecord {
    pub fn new(transaction_id: u64, write_order_id: u64, body: RecordBody) -> Self {
        Self {
            transaction_id,
            write_order_id,
            body,
        }
    }
}

/// A record paired with the segment offset its frame starts at, as yielded
/// by sequential replay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub offset: u64,
    pub record: TxRecord,
}
