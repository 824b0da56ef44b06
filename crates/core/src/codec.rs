//! Binary message codec - the spool segment record format
//!
//! Each record is a little-endian header followed by the payload:
//!
//! ```text
//! [4  bytes] payload length
//! [8  bytes] stream id
//! [8  bytes] prev stream id
//! [8  bytes] sequence
//! [8  bytes] timestamp (nanoseconds since the Unix epoch)
//! [N  bytes] payload
//! ```
//!
//! Segments are a plain concatenation of records and are never rewritten;
//! decode → encode is the identity on
//! (payload, stream id, prev stream id, sequence, timestamp).

use std::io::{ErrorKind, Read};

use bytes::Bytes;

use crate::error::{CoreError, Result};
use crate::message::Message;
use crate::stream::StreamId;

/// Fixed record header size in bytes
pub const RECORD_HEADER_LEN: usize = 4 + 8 * 4;

/// Upper bound on a record payload; anything larger marks a corrupt segment
const MAX_PAYLOAD_LEN: u32 = 256 << 20;

/// Encoded size of one message record
#[inline]
pub fn encoded_len(msg: &Message) -> usize {
    RECORD_HEADER_LEN + msg.data.len()
}

/// Write one record into `dest`, returning the bytes written
///
/// `dest` must hold at least [`encoded_len`] bytes.
pub fn encode_to_slice(msg: &Message, dest: &mut [u8]) -> usize {
    let len = msg.data.len() as u32;
    dest[0..4].copy_from_slice(&len.to_le_bytes());
    dest[4..12].copy_from_slice(&msg.stream_id().raw().to_le_bytes());
    dest[12..20].copy_from_slice(&msg.prev_stream_id().raw().to_le_bytes());
    dest[20..28].copy_from_slice(&msg.sequence.to_le_bytes());
    dest[28..36].copy_from_slice(&msg.timestamp_ns.to_le_bytes());
    dest[RECORD_HEADER_LEN..RECORD_HEADER_LEN + msg.data.len()].copy_from_slice(&msg.data);
    RECORD_HEADER_LEN + msg.data.len()
}

/// Encode one record into a fresh buffer
pub fn encode(msg: &Message) -> Bytes {
    let mut buf = vec![0u8; encoded_len(msg)];
    encode_to_slice(msg, &mut buf);
    Bytes::from(buf)
}

/// Read the next record from `reader`
///
/// Returns `Ok(None)` on a clean end of segment (EOF at a record
/// boundary). A truncated header or payload, or an implausible length,
/// is a [`CoreError::CorruptRecord`].
pub fn decode_from<R: Read>(reader: &mut R) -> Result<Option<Message>> {
    let mut len_buf = [0u8; 4];
    match read_exact_or_eof(reader, &mut len_buf)? {
        ReadOutcome::Eof => return Ok(None),
        ReadOutcome::Full => {}
    }

    let payload_len = u32::from_le_bytes(len_buf);
    if payload_len > MAX_PAYLOAD_LEN {
        return Err(CoreError::CorruptRecord(format!(
            "payload length {payload_len} exceeds limit"
        )));
    }

    let mut header = [0u8; RECORD_HEADER_LEN - 4];
    reader
        .read_exact(&mut header)
        .map_err(|e| CoreError::CorruptRecord(format!("truncated record header: {e}")))?;

    let stream_id = u64::from_le_bytes(header[0..8].try_into().expect("fixed slice"));
    let prev_stream_id = u64::from_le_bytes(header[8..16].try_into().expect("fixed slice"));
    let sequence = u64::from_le_bytes(header[16..24].try_into().expect("fixed slice"));
    let timestamp_ns = u64::from_le_bytes(header[24..32].try_into().expect("fixed slice"));

    let mut payload = vec![0u8; payload_len as usize];
    reader
        .read_exact(&mut payload)
        .map_err(|e| CoreError::CorruptRecord(format!("truncated record payload: {e}")))?;

    Ok(Some(Message::restored(
        Bytes::from(payload),
        StreamId::from_raw(stream_id),
        StreamId::from_raw(prev_stream_id),
        sequence,
        timestamp_ns,
    )))
}

enum ReadOutcome {
    Full,
    Eof,
}

/// Fill `buf` completely, distinguishing a clean EOF before the first byte
fn read_exact_or_eof<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<ReadOutcome> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) if filled == 0 => return Ok(ReadOutcome::Eof),
            Ok(0) => {
                return Err(CoreError::CorruptRecord(
                    "segment ended inside a record header".into(),
                ))
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(CoreError::Io(e)),
        }
    }
    Ok(ReadOutcome::Full)
}

#[cfg(test)]
#[path = "codec_test.rs"]
mod codec_test;
