//! Binary frame decoding.
//!
//! Under `Message` transport the server may gzip large frames and send them
//! as binary. Text frames and uncompressed binary frames pass through.

use crate::error::{AtlasLinkError, Result};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const FHCRC: u8 = 0x02;
const FEXTRA: u8 = 0x04;
const FNAME: u8 = 0x08;
const FCOMMENT: u8 = 0x10;

/// Check if data is gzip compressed (magic bytes check)
#[inline]
pub fn is_gzip(data: &[u8]) -> bool {
    data.len() >= 2 && data[..2] == GZIP_MAGIC
}

/// Inflate a gzip member with miniz_oxide.
pub fn decompress_gzip(data: &[u8]) -> Result<Vec<u8>> {
    // 10-byte header + 8-byte trailer (CRC32, ISIZE)
    if data.len() < 18 || !is_gzip(data) {
        return Err(malformed("not a gzip member"));
    }

    let flags = data[3];
    let mut pos = 10;

    if flags & FEXTRA != 0 {
        let xlen = data
            .get(pos..pos + 2)
            .map(|b| u16::from_le_bytes([b[0], b[1]]) as usize)
            .ok_or_else(|| malformed("truncated extra field"))?;
        pos += 2 + xlen;
    }
    for flag in [FNAME, FCOMMENT] {
        if flags & flag != 0 {
            let end = data
                .get(pos..)
                .and_then(|rest| rest.iter().position(|b| *b == 0))
                .ok_or_else(|| malformed("unterminated header string"))?;
            pos += end + 1;
        }
    }
    if flags & FHCRC != 0 {
        pos += 2;
    }

    if pos > data.len() - 8 {
        return Err(malformed("header overruns body"));
    }
    let body = &data[pos..data.len() - 8];
    let inflated = miniz_oxide::inflate::decompress_to_vec(body)
        .map_err(|e| malformed(&format!("inflate failed: {:?}", e.status)))?;

    let expected = u32::from_le_bytes([
        data[data.len() - 4],
        data[data.len() - 3],
        data[data.len() - 2],
        data[data.len() - 1],
    ]);
    if inflated.len() as u32 != expected {
        return Err(malformed("length mismatch"));
    }
    Ok(inflated)
}

/// Turn a binary frame into the JSON text it carries.
pub fn decode_binary_frame(data: &[u8]) -> Result<String> {
    let bytes = if is_gzip(data) {
        decompress_gzip(data)?
    } else {
        data.to_vec()
    };
    String::from_utf8(bytes)
        .map_err(|e| AtlasLinkError::SerializationError(format!("Frame is not UTF-8: {}", e)))
}

fn malformed(detail: &str) -> AtlasLinkError {
    AtlasLinkError::SerializationError(format!("Malformed gzip frame: {}", detail))
}
