//! Binary record format for queue and retention files
//!
//! Record format: `[type_id: 4 bytes LE][length: 4 bytes LE][payload: length bytes]`

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::types::Event;

/// Size of the record header (type + length)
pub const RECORD_HEADER_SIZE: usize = 8;

/// Largest payload a record length can describe
pub const MAX_PAYLOAD_SIZE: usize = u32::MAX as usize;

/// Whether a payload of `size` bytes can be encoded
pub fn fits(size: usize) -> bool {
    size <= MAX_PAYLOAD_SIZE
}

/// Encode an event as one record
///
/// The payload must [`fit`](fits); callers check before encoding.
pub fn encode(event: &Event, out: &mut BytesMut) {
    debug_assert!(fits(event.size()));
    out.reserve(RECORD_HEADER_SIZE + event.size());
    out.put_u32_le(event.type_id());
    out.put_u32_le(event.size() as u32);
    out.put_slice(event.payload());
}

/// Parse a record header, returning `(type_id, payload_len)`
pub fn decode_header(mut header: &[u8]) -> Option<(u32, usize)> {
    if header.len() < RECORD_HEADER_SIZE {
        return None;
    }
    let type_id = header.get_u32_le();
    let len = header.get_u32_le() as usize;
    Some((type_id, len))
}

/// Decode one complete record from the front of `buf`
///
/// Returns `None` and leaves `buf` untouched when the record is incomplete.
pub fn decode(buf: &mut BytesMut) -> Option<Event> {
    let (type_id, len) = decode_header(&buf[..])?;
    if buf.len() < RECORD_HEADER_SIZE + len {
        return None;
    }
    buf.advance(RECORD_HEADER_SIZE);
    let payload: Bytes = buf.split_to(len).freeze();
    Some(Event::new(type_id, payload))
}
