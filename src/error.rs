use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("log file is closed")]
    Closed,
    #[error("append would exceed the segment offset limit")]
    OffsetOverflow,
    #[error("unexpected op byte: {op:#04x}")]
    Corruption { op: u8 },
    #[error("record is not a put")]
    UnexpectedRecordKind,
    #[error("corrupt record: {0}")]
    Corrupt(&'static str),
    #[error("corrupt metadata: {0}")]
    CorruptMetadata(&'static str),
    #[error("unsupported log version: {0}")]
    UnsupportedVersion(u32),
    #[error("unsupported: {0}")]
    Unsupported(&'static str),
}

pub type Result<T> = std::result::Result<T, Error>;
