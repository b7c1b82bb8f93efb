//! On-disk container layout: the fixed file header and the frame record
//! header that precedes every frame's payload. Byte-level only; the actual
//! file I/O and back-patch bookkeeping live in [`crate::encoder`] and
//! [`crate::decoder`].
//!
//! A note on the frame record layout: §6 of the format spec lists the
//! keyframe-only fields in this order: 1-byte frameType, 4-byte
//! payloadLength, 4-byte keyframe ordinal, 4-byte "previous keyframe"
//! offset, 4-byte "next keyframe" offset -- placing the patched offset
//! pair at byte 9 of the record, not byte 5. Earlier prose describing the
//! back-patch step says "offset 5"; this implementation takes the §6
//! table as authoritative (see DESIGN.md).

use crate::byteio::{
    patch_i32_le, read_f32_le, read_i32_le, read_u16_le, read_u32_le,
    write_f32_le, write_u16_le, write_u32_le,
};
use crate::constants::{FILE_HEADER_SIZE, FRAME_TYPE_DELTA, FRAME_TYPE_KEYFRAME, MAGIC, VERSION};
use crate::error::{Error, Result};

/// Parsed fixed file header.
#[derive(Clone, Copy, Debug)]
pub struct FileHeader {
    pub frame_count: u32,
    pub fps: f32,
    pub keyframe_count: u32,
    pub width: u16,
    pub height: u16,
}

/// Byte offsets of the fields [`close`](crate::encoder::FrameEncoder::close)
/// back-patches in the fixed header.
pub(crate) const FRAME_COUNT_OFFSET: usize = 5;
pub(crate) const KEYFRAME_COUNT_OFFSET: usize = 13;

/// Offset, from the start of a keyframe record, of the 8-byte
/// prev/next-offset pair patched at close (§6 table order: frameType(1) +
/// payloadLength(4) + keyframe ordinal(4) = 9).
pub(crate) const KEYFRAME_LINKS_OFFSET: usize = 9;

/// Builds the 21-byte placeholder file header written when the encoder
/// sees its first frame. `frame_count` and `keyframe_count` start at zero
/// and are back-patched on close.
pub(crate) fn build_placeholder_header(fps: f32, width: u16, height: u16) -> Vec<u8> {
    let mut buf = Vec::with_capacity(FILE_HEADER_SIZE);
    buf.extend_from_slice(&MAGIC);
    buf.push(VERSION);
    write_u32_le(&mut buf, 0); // frame count, patched at close
    write_f32_le(&mut buf, fps);
    write_u32_le(&mut buf, 0); // keyframe count, patched at close
    write_u16_le(&mut buf, width);
    write_u16_le(&mut buf, height);
    debug_assert_eq!(buf.len(), FILE_HEADER_SIZE);
    buf
}

/// Parses and validates a fixed file header.
pub(crate) fn parse_header(buf: &[u8]) -> Result<FileHeader> {
    if buf.len() < FILE_HEADER_SIZE {
        return Err(Error::InvalidContainer(format!(
            "truncated header: expected {} bytes, got {}",
            FILE_HEADER_SIZE,
            buf.len()
        )));
    }
    if buf[0..4] != MAGIC {
        return Err(Error::InvalidContainer(
            "bad magic: not an ANIP stream".to_owned(),
        ));
    }
    let version = buf[4];
    if version != VERSION {
        return Err(Error::InvalidContainer(format!(
            "unsupported version: {}",
            version
        )));
    }
    Ok(FileHeader {
        frame_count: read_u32_le(buf, 5),
        fps: read_f32_le(buf, 9),
        keyframe_count: read_u32_le(buf, 13),
        width: read_u16_le(buf, 17),
        height: read_u16_le(buf, 19),
    })
}

/// Patches the total frame count and keyframe count fields in-place.
pub(crate) fn patch_header_counts(buf: &mut [u8], frame_count: u32, keyframe_count: u32) {
    patch_i32_le(buf, FRAME_COUNT_OFFSET, frame_count as i32);
    patch_i32_le(buf, KEYFRAME_COUNT_OFFSET, keyframe_count as i32);
}

/// Builds a delta-frame record header: 1-byte type + 4-byte payload length.
pub(crate) fn build_delta_record_header(payload_len: u32) -> Vec<u8> {
    let mut buf = Vec::with_capacity(5);
    buf.push(FRAME_TYPE_DELTA);
    write_u32_le(&mut buf, payload_len);
    buf
}

/// Builds a keyframe record header: 1-byte type, 4-byte payload length,
/// 4-byte keyframe ordinal, and an 8-byte prev/next offset pair left as
/// zero (patched at close).
pub(crate) fn build_keyframe_record_header(payload_len: u32, ordinal: u32) -> Vec<u8> {
    let mut buf = Vec::with_capacity(17);
    buf.push(FRAME_TYPE_KEYFRAME);
    write_u32_le(&mut buf, payload_len);
    write_u32_le(&mut buf, ordinal);
    write_u32_le(&mut buf, 0); // prev offset, patched at close
    write_u32_le(&mut buf, 0); // next offset, patched at close
    buf
}

/// Size, in bytes, of a keyframe record header (before the payload).
pub(crate) const KEYFRAME_RECORD_HEADER_SIZE: usize = 17;

/// Size, in bytes, of a delta record header (before the payload).
pub(crate) const DELTA_RECORD_HEADER_SIZE: usize = 5;

/// A parsed frame record header, as read by the decoder.
#[derive(Clone, Copy, Debug)]
pub(crate) struct FrameRecordHeader {
    pub is_keyframe: bool,
    pub payload_len: u32,
}

/// Reads the common and keyframe-specific record header fields from
/// `buf`, which must start at the record's first byte. Returns the header
/// and the number of bytes consumed.
pub(crate) fn parse_record_header(buf: &[u8]) -> Result<(FrameRecordHeader, usize)> {
    if buf.len() < DELTA_RECORD_HEADER_SIZE {
        return Err(Error::InvalidContainer(
            "truncated frame record header".to_owned(),
        ));
    }
    let frame_type = buf[0];
    let payload_len = read_u32_le(buf, 1);
    match frame_type {
        t if t == FRAME_TYPE_DELTA => Ok((
            FrameRecordHeader {
                is_keyframe: false,
                payload_len,
            },
            DELTA_RECORD_HEADER_SIZE,
        )),
        t if t == FRAME_TYPE_KEYFRAME => {
            if buf.len() < KEYFRAME_RECORD_HEADER_SIZE {
                return Err(Error::InvalidContainer(
                    "truncated keyframe record header".to_owned(),
                ));
            }
            // Ordinal and link fields are consumed but not needed for
            // pure sequential decode.
            let _ordinal = read_u32_le(buf, 5);
            let _prev = read_i32_le(buf, KEYFRAME_LINKS_OFFSET);
            let _next = read_i32_le(buf, KEYFRAME_LINKS_OFFSET + 4);
            Ok((
                FrameRecordHeader {
                    is_keyframe: true,
                    payload_len,
                },
                KEYFRAME_RECORD_HEADER_SIZE,
            ))
        }
        other => Err(Error::InvalidContainer(format!(
            "unknown frame type byte: {}",
            other
        ))),
    }
}
