//! Version-tagged record codec.
//!
//! Versions differ only in the record payload layout and in the metadata
//! sidecar layout; the op-byte framing is version-invariant. The codec for a
//! segment is selected once by the factory (from the sidecar's version word)
//! and then drives every encode and decode on that segment.
//!
//! Version 1 payload, all integers little-endian:
//!
//! ```text
//! payload  : tx_id:u64 woid:u64 rtype:i16 body
//! PUT body : nheaders:u32 { klen:u32 key kvlen:u32 value }* blen:u32 body
//! TAKE body: file_id:i32 offset:i32
//! other    : empty
//! ```

use std::io::Read;

use crate::error::{Error, Result};
use crate::record::{Event, EventPtr, RecordBody, TxRecord};

/// Fixed part of every record payload: tx_id + write_order_id + rtype.
pub const RECORD_HEADER_LEN: usize = 8 + 8 + 2;

const REC_PUT: i16 = 1;
const REC_TAKE: i16 = 2;
const REC_ROLLBACK: i16 = 3;
const REC_COMMIT: i16 = 4;

// Offsets are bounded by 2^31, so no length field can legitimately reach it.
const MAX_FIELD_LEN: u32 = i32::MAX as u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    V1,
}

impl Codec {
    /// Bind the codec for an on-disk version word.
    pub fn from_version(version: u32) -> Result<Self> {
        match version {
            1 => Ok(Codec::V1),
            other => Err(Error::UnsupportedVersion(other)),
        }
    }

    pub fn version(&self) -> u32 {
        match self {
            Codec::V1 => 1,
        }
    }

    /// Encoded payload size of `record`, excluding the op byte.
    pub fn record_len(&self, record: &TxRecord) -> usize {
        match self {
            Codec::V1 => {
                RECORD_HEADER_LEN
                    + match &record.body {
                        RecordBody::Put(event) => event_len(event),
                        RecordBody::Take(_) => 8,
                        RecordBody::Rollback | RecordBody::Commit => 0,
                    }
            }
        }
    }

    /// Payload size of a `PUT` of `event`, excluding the op byte.
    pub fn put_record_len(&self, event: &Event) -> usize {
        match self {
            Codec::V1 => RECORD_HEADER_LEN + event_len(event),
        }
    }

    pub fn encode_record(&self, record: &TxRecord) -> Vec<u8> {
        match self {
            Codec::V1 => {
                let mut buf = Vec::with_capacity(self.record_len(record));
                buf.extend_from_slice(&record.transaction_id.to_le_bytes());
                buf.extend_from_slice(&record.write_order_id.to_le_bytes());
                match &record.body {
                    RecordBody::Put(event) => {
                        buf.extend_from_slice(&REC_PUT.to_le_bytes());
                        encode_event(&mut buf, event);
                    }
                    RecordBody::Take(ptr) => {
                        buf.extend_from_slice(&REC_TAKE.to_le_bytes());
                        buf.extend_from_slice(&(ptr.file_id as i32).to_le_bytes());
                        buf.extend_from_slice(&(ptr.offset as i32).to_le_bytes());
                    }
                    RecordBody::Rollback => buf.extend_from_slice(&REC_ROLLBACK.to_le_bytes()),
                    RecordBody::Commit => buf.extend_from_slice(&REC_COMMIT.to_le_bytes()),
                }
                buf
            }
        }
    }

    /// Decode one record payload, consuming exactly its encoded size.
    pub fn decode_record<R: Read>(&self, reader: &mut R) -> Result<TxRecord> {
        match self {
            Codec::V1 => {
                let transaction_id = read_u64(reader)?;
                let write_order_id = read_u64(reader)?;
                let body = match read_i16(reader)? {
                    REC_PUT => RecordBody::Put(decode_event(reader)?),
                    REC_TAKE => {
                        let file_id = read_i32(reader)?;
                        let offset = read_i32(reader)?;
                        if file_id < 0 || offset < 0 {
                            return Err(Error::Corrupt("negative take pointer field"));
                        }
                        RecordBody::Take(EventPtr::new(file_id as u32, offset as u32))
                    }
                    REC_ROLLBACK => RecordBody::Rollback,
                    REC_COMMIT => RecordBody::Commit,
                    _ => return Err(Error::Corrupt("unknown record type")),
                };
                Ok(TxRecord {
                    transaction_id,
                    write_order_id,
                    body,
                })
            }
        }
    }
}

fn event_len(event: &Event) -> usize {
    let headers: usize = event.headers.iter().map(|(k, v)| 8 + k.len() + v.len()).sum();
    4 + headers + 4 + event.body.len()
}

fn encode_event(buf: &mut Vec<u8>, event: &Event) {
    buf.extend_from_slice(&(event.headers.len() as u32).to_le_bytes());
    for (key, value) in &event.headers {
        buf.extend_from_slice(&(key.len() as u32).to_le_bytes());
        buf.extend_from_slice(key.as_bytes());
        buf.extend_from_slice(&(value.len() as u32).to_le_bytes());
        buf.extend_from_slice(value.as_bytes());
    }
    buf.extend_from_slice(&(event.body.len() as u32).to_le_bytes());
    buf.extend_from_slice(&event.body);
}

fn decode_event<R: Read>(reader: &mut R) -> Result<Event> {
    let nheaders = read_len(reader, "header count out of range")?;
    let mut headers = Vec::with_capacity(nheaders.min(64));
    for _ in 0..nheaders {
        let key = decode_string(reader)?;
        let value = decode_string(reader)?;
        headers.push((key, value));
    }
    let blen = read_len(reader, "body length out of range")?;
    let mut body = vec![0u8; blen];
    reader.read_exact(&mut body)?;
    Ok(Event { headers, body })
}

fn decode_string<R: Read>(reader: &mut R) -> Result<String> {
    let len = read_len(reader, "string length out of range")?;
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf)?;
    String::from_utf8(buf).map_err(|_| Error::Corrupt("header string is not utf-8"))
}

fn read_len<R: Read>(reader: &mut R, msg: &'static str) -> Result<usize> {
    let len = read_u32(reader)?;
    if len > MAX_FIELD_LEN {
        return Err(Error::Corrupt(msg));
    }
    Ok(len as usize)
}

fn read_u32<R: Read>(reader: &mut R) -> Result<u32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_i32<R: Read>(reader: &mut R) -> Result<i32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(i32::from_le_bytes(buf))
}

fn read_u64<R: Read>(reader: &mut R) -> Result<u64> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

fn read_i16<R: Read>(reader: &mut R) -> Result<i16> {
    let mut buf = [0u8; 2];
    reader.read_exact(&mut buf)?;
    Ok(i16::from_le_bytes(buf))
}
