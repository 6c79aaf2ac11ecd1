use crate::cluster::Epoch;
use crate::commitlog;
use crate::commitlog::Index;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use chrono::{DateTime, TimeZone, Utc};
use std::convert::TryFrom;
use std::{fmt, io};

/// SeqNo is an operation's position in a node's operation log. The first operation is 1, and
/// `SeqNo::ZERO` means "nothing written yet".
#[derive(Copy, Clone, Default, PartialOrd, PartialEq, Ord, Eq, Hash)]
pub struct SeqNo(u64);

impl SeqNo {
    pub const ZERO: SeqNo = SeqNo(0);

    pub fn new(seq: u64) -> Self {
        SeqNo(seq)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }

    pub fn next(&self) -> SeqNo {
        SeqNo(self.0 + 1)
    }

    pub(crate) fn saturating_prev(&self) -> SeqNo {
        SeqNo(self.0.saturating_sub(1))
    }

    pub(crate) fn to_index(self) -> Option<Index> {
        Index::try_new(self.0)
    }

    pub(crate) fn from_index(index: Index) -> Self {
        SeqNo(index.as_u64())
    }
}

impl fmt::Debug for SeqNo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for SeqNo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Operation is one accepted write. It never changes once appended.
#[derive(Clone, Debug, PartialEq)]
pub struct Operation {
    pub seq: SeqNo,
    /// Epoch of the primary that accepted the write.
    pub epoch: Epoch,
    pub timestamp: DateTime<Utc>,
    pub payload: Bytes,
}

impl Operation {
    pub(crate) fn from_parts(seq: SeqNo, epoch: Epoch, timestamp_millis: i64, payload: Bytes) -> io::Result<Self> {
        let timestamp = Utc
            .timestamp_millis_opt(timestamp_millis)
            .single()
            .ok_or_else(|| invalid_data(format!("timestamp {} out of range", timestamp_millis)))?;

        Ok(Operation {
            seq,
            epoch,
            timestamp,
            payload,
        })
    }

    pub fn timestamp_millis(&self) -> i64 {
        self.timestamp.timestamp_millis()
    }
}

/// Byte representation of an operation inside the commit log. The sequence number is not stored;
/// it is the log index.
///
/// ```text
/// | 0 | 1 ... 8          | 9 ... 16                   | 17 ...           |
/// +---+------------------+----------------------------+------------------+
/// |Vrs| Epoch (u64, BE)  | Timestamp millis (i64, BE) | Payload ...      |
/// +---+------------------+----------------------------+------------------+
/// ```
#[derive(Clone)]
pub(crate) struct OpLogEntry {
    pub(crate) epoch: Epoch,
    pub(crate) timestamp_millis: i64,
    pub(crate) payload: Bytes,
}

const OPLOG_ENTRY_FORMAT_VERSION: u8 = 1;
const OPLOG_ENTRY_HEADER_LEN: usize = 1 + 8 + 8;

impl OpLogEntry {
    pub(crate) fn from_operation(op: &Operation) -> Self {
        OpLogEntry {
            epoch: op.epoch,
            timestamp_millis: op.timestamp_millis(),
            payload: op.payload.clone(),
        }
    }

    pub(crate) fn into_operation(self, seq: SeqNo) -> io::Result<Operation> {
        Operation::from_parts(seq, self.epoch, self.timestamp_millis, self.payload)
    }
}

impl commitlog::Entry for OpLogEntry {}

impl From<OpLogEntry> for Vec<u8> {
    fn from(entry: OpLogEntry) -> Self {
        let mut buf = BytesMut::with_capacity(OPLOG_ENTRY_HEADER_LEN + entry.payload.len());
        buf.put_u8(OPLOG_ENTRY_FORMAT_VERSION);
        buf.put_u64(entry.epoch.as_u64());
        buf.put_i64(entry.timestamp_millis);
        buf.put_slice(&entry.payload);

        buf.to_vec()
    }
}

impl TryFrom<Vec<u8>> for OpLogEntry {
    type Error = io::Error;

    fn try_from(bytes: Vec<u8>) -> Result<Self, Self::Error> {
        if bytes.len() < OPLOG_ENTRY_HEADER_LEN {
            return Err(invalid_data(format!("oplog entry too short: {} bytes", bytes.len())));
        }

        let mut buf = Bytes::from(bytes);
        let version = buf.get_u8();
        if version != OPLOG_ENTRY_FORMAT_VERSION {
            return Err(invalid_data(format!("unknown oplog entry version {}", version)));
        }
        let epoch = Epoch::new(buf.get_u64());
        let timestamp_millis = buf.get_i64();

        Ok(OpLogEntry {
            epoch,
            timestamp_millis,
            payload: buf,
        })
    }
}

fn invalid_data(message: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_preserves_operation_fields() {
        let op = Operation::from_parts(SeqNo::new(7), Epoch::new(3), 1_600_000_000_123, Bytes::from("{}")).unwrap();

        let bytes: Vec<u8> = OpLogEntry::from_operation(&op).into();
        assert_eq!(bytes[0], OPLOG_ENTRY_FORMAT_VERSION);

        let decoded = OpLogEntry::try_from(bytes).unwrap().into_operation(SeqNo::new(7)).unwrap();
        assert_eq!(decoded, op);
    }

    #[test]
    fn rejects_truncated_and_unknown_versions() {
        assert!(OpLogEntry::try_from(vec![OPLOG_ENTRY_FORMAT_VERSION, 0, 0]).is_err());

        let mut bytes = vec![0u8; OPLOG_ENTRY_HEADER_LEN];
        bytes[0] = 42;
        let err = OpLogEntry::try_from(bytes).err().unwrap();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
