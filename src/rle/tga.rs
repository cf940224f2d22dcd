//! TGA packet RLE.
//!
//! A packet header's top bit selects a repeat packet (one pixel, repeated)
//! or a raw packet (literal pixels); the low 7 bits hold the count minus
//! one. Pixels are 1 to 4 bytes wide.

use crate::error::CodecError;
use crate::reader::Reader;

/// Longest packet.
pub const MAX_PACKET: usize = 128;

/// Decode `count` pixels of `pixel_bytes` each.
///
/// Returns the pixels and the number of input bytes consumed. A packet
/// that would run past `count` is clipped.
pub fn decode(
    src: &[u8],
    pixel_bytes: usize,
    count: usize,
) -> Result<(Vec<u8>, usize), CodecError> {
    let total = count
        .checked_mul(pixel_bytes)
        .ok_or(CodecError::OutOfMemory { bytes: usize::MAX })?;
    let mut out = Vec::with_capacity(total);
    let mut r = Reader::new(src);
    while out.len() < total {
        let header = r.u8()?;
        let n = usize::from(header & 0x7F) + 1;
        let room = (total - out.len()) / pixel_bytes;
        if header & 0x80 != 0 {
            let px = r.bytes(pixel_bytes)?;
            for _ in 0..n.min(room) {
                out.extend_from_slice(px);
            }
        } else {
            let px = r.bytes(n * pixel_bytes)?;
            out.extend_from_slice(&px[..n.min(room) * pixel_bytes]);
        }
    }
    Ok((out, r.position()))
}

/// Append the packets for one row of pixels to `out`.
///
/// Packets never cross rows.
pub fn encode_row(row: &[u8], pixel_bytes: usize, out: &mut Vec<u8>) {
    let px: Vec<&[u8]> = row.chunks_exact(pixel_bytes).collect();
    let mut i = 0;
    while i < px.len() {
        let run = px[i..]
            .iter()
            .take(MAX_PACKET)
            .take_while(|&&p| p == px[i])
            .count();
        if run >= 2 {
            out.push(0x80 | (run - 1) as u8);
            out.extend_from_slice(px[i]);
            i += run;
            continue;
        }
        let mut n = 0;
        while i + n < px.len() && n < MAX_PACKET {
            if i + n + 1 < px.len() && px[i + n] == px[i + n + 1] {
                break;
            }
            n += 1;
        }
        let n = n.max(1);
        out.push((n - 1) as u8);
        for p in &px[i..i + n] {
            out.extend_from_slice(p);
        }
        i += n;
    }
}

/// Encode whole rows of `width` pixels.
pub fn encode(pixels: &[u8], width: usize, pixel_bytes: usize) -> Vec<u8> {
    let mut out = Vec::new();
    let stride = width * pixel_bytes;
    if stride == 0 {
        return out;
    }
    for row in pixels.chunks_exact(stride) {
        encode_row(row, pixel_bytes, &mut out);
    }
    out
}
