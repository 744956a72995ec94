//! Byte-exact encode/decode for the backend's binary protocol.
//!
//! The transport is a raw byte stream with no message boundaries, so every
//! variable-length field carries a 4-byte big-endian length prefix. Requests
//! are `op_type:i32, payload_len:i32, payload`; responses are read until the
//! peer closes and decoded from the accumulated buffer.
//!
//! All declared lengths are validated against [`MAX_RECORD_BYTES`] and the
//! available buffer before any allocation, so a malformed length field can
//! never trigger an unbounded allocation.

use std::collections::BTreeMap;

use crate::task::{Column, OpType, TaskRecord};

/// Upper bound on a single encoded task record, matching the backend's
/// serialization buffer.
pub const MAX_RECORD_BYTES: usize = 2048;

/// Error type for codec encode/decode operations.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The input ended before a declared field was complete.
    #[error("truncated input: {0}")]
    Truncated(String),
    /// A declared length exceeds the record bound or the available buffer.
    #[error("declared length {declared} exceeds limit {limit}")]
    Oversized {
        /// Length claimed by the frame.
        declared: usize,
        /// Maximum the decoder will accept.
        limit: usize,
    },
    /// A field held a value outside its closed set.
    #[error("invalid field value: {0}")]
    InvalidValue(String),
}

/// Authoritative verdict for one mutation, as reported by the backend.
///
/// `conflict` and `rejected` are opaque verdicts from the backend's own
/// conflict-resolution rule; this layer only relays them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MutationVerdict {
    /// Whether the operation was applied.
    pub success: bool,
    /// Write applied but reconciled against a concurrent edit (advisory).
    pub conflict: bool,
    /// Write refused by the backend's ordering rule.
    pub rejected: bool,
    /// Assigned id for creates, echoed id otherwise.
    pub task_id: i32,
}

/// Encodes a full request frame: op code, payload length, payload.
#[must_use]
pub fn encode_request(op: OpType, record: &TaskRecord) -> Vec<u8> {
    let payload = encode_record(record);
    let mut frame = Vec::with_capacity(8 + payload.len());
    frame.extend_from_slice(&i32::from(op).to_be_bytes());
    frame.extend_from_slice(&to_len_i32(payload.len()).to_be_bytes());
    frame.extend_from_slice(&payload);
    frame
}

/// Encodes one task record payload.
///
/// Layout: `task_id`, then length-prefixed title/description/board_id/
/// created_by, column code, client_id, created_at, updated_at, and the
/// vector-clock entry count followed by (actor, counter) pairs.
#[must_use]
pub fn encode_record(record: &TaskRecord) -> Vec<u8> {
    let mut buf = Vec::with_capacity(64);
    buf.extend_from_slice(&record.task_id.to_be_bytes());
    put_string(&mut buf, &record.title);
    put_string(&mut buf, &record.description);
    put_string(&mut buf, &record.board_id);
    put_string(&mut buf, &record.created_by);
    buf.extend_from_slice(&i32::from(record.column).to_be_bytes());
    buf.extend_from_slice(&record.client_id.to_be_bytes());
    buf.extend_from_slice(&record.created_at.to_be_bytes());
    buf.extend_from_slice(&record.updated_at.to_be_bytes());
    buf.extend_from_slice(&to_len_i32(record.vector_clock.len()).to_be_bytes());
    for (actor, counter) in &record.vector_clock {
        buf.extend_from_slice(&actor.to_be_bytes());
        buf.extend_from_slice(&counter.to_be_bytes());
    }
    buf
}

/// Decodes a request frame into its op code and record.
///
/// # Errors
///
/// Returns [`CodecError`] if the frame is truncated, a length field is out
/// of bounds, or the op/column code is unknown.
pub fn decode_request(bytes: &[u8]) -> Result<(OpType, TaskRecord), CodecError> {
    let mut cursor = Cursor::new(bytes);
    let op_code = cursor.take_i32("op_type")?;
    let op = OpType::try_from(op_code).map_err(CodecError::InvalidValue)?;
    let payload_len = cursor.take_len("payload length")?;
    let payload = cursor.take_bytes(payload_len, "payload")?;
    let (record, _) = decode_record(payload)?;
    Ok((op, record))
}

/// Decodes one task record payload, returning the record and the number of
/// bytes consumed.
///
/// # Errors
///
/// Returns [`CodecError`] if the payload is truncated, a declared string or
/// clock length is out of bounds, or the column code is unknown.
pub fn decode_record(bytes: &[u8]) -> Result<(TaskRecord, usize), CodecError> {
    let mut cursor = Cursor::new(bytes);
    let task_id = cursor.take_i32("task_id")?;
    let title = cursor.take_string("title")?;
    let description = cursor.take_string("description")?;
    let board_id = cursor.take_string("board_id")?;
    let created_by = cursor.take_string("created_by")?;
    let column_code = cursor.take_i32("column")?;
    let column = Column::try_from(column_code).map_err(CodecError::InvalidValue)?;
    let client_id = cursor.take_i32("client_id")?;
    let created_at = cursor.take_i64("created_at")?;
    let updated_at = cursor.take_i64("updated_at")?;

    let clock_len = cursor.take_len("vector clock count")?;
    let mut vector_clock = BTreeMap::new();
    for _ in 0..clock_len {
        let actor = cursor.take_i32("clock actor")?;
        let counter = cursor.take_u32("clock counter")?;
        vector_clock.insert(actor, counter);
    }

    Ok((
        TaskRecord {
            task_id,
            title,
            description,
            board_id,
            created_by,
            column,
            client_id,
            created_at,
            updated_at,
            vector_clock,
        },
        cursor.pos,
    ))
}

/// Decodes a mutation response.
///
/// The current backend sends four integers (success, conflict, rejected,
/// task_id). Older backends send only the success flag; in that case
/// conflict and rejected default to `false` and the task id to 0.
///
/// # Errors
///
/// Returns [`CodecError::Truncated`] if even the success flag is missing.
pub fn decode_mutation_response(bytes: &[u8]) -> Result<MutationVerdict, CodecError> {
    if bytes.len() >= 16 {
        let mut cursor = Cursor::new(bytes);
        return Ok(MutationVerdict {
            success: cursor.take_i32("success")? == 1,
            conflict: cursor.take_i32("conflict")? == 1,
            rejected: cursor.take_i32("rejected")? == 1,
            task_id: cursor.take_i32("task_id")?,
        });
    }
    // Backward-compat path: a bare success flag.
    let mut cursor = Cursor::new(bytes);
    let success = cursor.take_i32("success")? == 1;
    Ok(MutationVerdict {
        success,
        conflict: false,
        rejected: false,
        task_id: 0,
    })
}

/// Encodes a mutation response in the current four-integer format.
#[must_use]
pub fn encode_mutation_response(verdict: &MutationVerdict) -> Vec<u8> {
    let mut buf = Vec::with_capacity(16);
    buf.extend_from_slice(&i32::from(verdict.success).to_be_bytes());
    buf.extend_from_slice(&i32::from(verdict.conflict).to_be_bytes());
    buf.extend_from_slice(&i32::from(verdict.rejected).to_be_bytes());
    buf.extend_from_slice(&verdict.task_id.to_be_bytes());
    buf
}

/// Decodes a list response: a count, then `count` length-prefixed records.
///
/// # Errors
///
/// Returns [`CodecError`] if the buffer is truncated or a record length is
/// out of bounds.
pub fn decode_board_response(bytes: &[u8]) -> Result<Vec<TaskRecord>, CodecError> {
    let mut cursor = Cursor::new(bytes);
    let count = cursor.take_count("task count")?;
    let mut records = Vec::with_capacity(count.min(MAX_RECORD_BYTES));
    for _ in 0..count {
        let record_len = cursor.take_len("record length")?;
        let record_bytes = cursor.take_bytes(record_len, "record")?;
        let (record, _) = decode_record(record_bytes)?;
        records.push(record);
    }
    Ok(records)
}

/// Encodes a list response from a board snapshot.
#[must_use]
pub fn encode_board_response(records: &[TaskRecord]) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.extend_from_slice(&to_len_i32(records.len()).to_be_bytes());
    for record in records {
        let encoded = encode_record(record);
        buf.extend_from_slice(&to_len_i32(encoded.len()).to_be_bytes());
        buf.extend_from_slice(&encoded);
    }
    buf
}

fn put_string(buf: &mut Vec<u8>, value: &str) {
    buf.extend_from_slice(&to_len_i32(value.len()).to_be_bytes());
    buf.extend_from_slice(value.as_bytes());
}

/// Clamps an in-memory length into the wire's i32 length field. Records are
/// bounded well below `i32::MAX`, so saturation is unreachable in practice.
fn to_len_i32(len: usize) -> i32 {
    i32::try_from(len).unwrap_or(i32::MAX)
}

/// Bounds-checked forward reader over a decode buffer.
struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    const fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take_bytes(&mut self, len: usize, what: &str) -> Result<&'a [u8], CodecError> {
        let end = self.pos.checked_add(len).ok_or_else(|| {
            CodecError::Truncated(format!("{what}: length overflows buffer offset"))
        })?;
        if end > self.buf.len() {
            return Err(CodecError::Truncated(format!(
                "{what}: need {len} bytes at offset {}, have {}",
                self.pos,
                self.buf.len() - self.pos
            )));
        }
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn take_i32(&mut self, what: &str) -> Result<i32, CodecError> {
        let bytes = self.take_bytes(4, what)?;
        let array: [u8; 4] = bytes
            .try_into()
            .map_err(|_| CodecError::Truncated(what.to_string()))?;
        Ok(i32::from_be_bytes(array))
    }

    fn take_u32(&mut self, what: &str) -> Result<u32, CodecError> {
        let bytes = self.take_bytes(4, what)?;
        let array: [u8; 4] = bytes
            .try_into()
            .map_err(|_| CodecError::Truncated(what.to_string()))?;
        Ok(u32::from_be_bytes(array))
    }

    fn take_i64(&mut self, what: &str) -> Result<i64, CodecError> {
        let bytes = self.take_bytes(8, what)?;
        let array: [u8; 8] = bytes
            .try_into()
            .map_err(|_| CodecError::Truncated(what.to_string()))?;
        Ok(i64::from_be_bytes(array))
    }

    /// Reads a length field and validates it against [`MAX_RECORD_BYTES`]
    /// and the bytes remaining in the buffer.
    fn take_len(&mut self, what: &str) -> Result<usize, CodecError> {
        let raw = self.take_i32(what)?;
        let len = usize::try_from(raw)
            .map_err(|_| CodecError::InvalidValue(format!("{what}: negative length {raw}")))?;
        if len > MAX_RECORD_BYTES {
            return Err(CodecError::Oversized {
                declared: len,
                limit: MAX_RECORD_BYTES,
            });
        }
        Ok(len)
    }

    /// Reads an element count. Counts bound loop iterations, not one
    /// record's bytes, so only negativity is rejected here; each element
    /// still pays for its own bytes through [`Self::take_len`].
    fn take_count(&mut self, what: &str) -> Result<usize, CodecError> {
        let raw = self.take_i32(what)?;
        usize::try_from(raw)
            .map_err(|_| CodecError::InvalidValue(format!("{what}: negative count {raw}")))
    }

    fn take_string(&mut self, what: &str) -> Result<String, CodecError> {
        let len = self.take_len(what)?;
        let bytes = self.take_bytes(len, what)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| CodecError::InvalidValue(format!("{what}: invalid UTF-8")))
    }
}
