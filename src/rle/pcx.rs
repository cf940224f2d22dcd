//! PCX run-length encoding.
//!
//! A byte with both top bits set is a run prefix: its low 6 bits count
//! repeats of the next byte. Everything else is a literal. Literal values
//! that themselves have both top bits set go out as a run of one.

use crate::error::CodecError;
use crate::reader::Reader;

/// Longest run a prefix byte can express.
pub const MAX_RUN: usize = 63;

/// Decode exactly `len` bytes, returning them and the input consumed.
///
/// Runs may cross scanline and plane boundaries, as many writers emit
/// them; a run past `len` is clipped.
pub fn decode(src: &[u8], len: usize) -> Result<(Vec<u8>, usize), CodecError> {
    let mut out = Vec::with_capacity(len);
    let mut r = Reader::new(src);
    while out.len() < len {
        let b = r.u8()?;
        if b >= 0xC0 {
            let n = usize::from(b & 0x3F).min(len - out.len());
            let v = r.u8()?;
            out.resize(out.len() + n, v);
        } else {
            out.push(b);
        }
    }
    Ok((out, r.position()))
}

/// Append one encoded scanline (of one plane) to `out`.
pub fn encode_line(line: &[u8], out: &mut Vec<u8>) {
    let mut i = 0;
    while i < line.len() {
        let v = line[i];
        let run = line[i..]
            .iter()
            .take(MAX_RUN)
            .take_while(|&&b| b == v)
            .count();
        if run > 1 || v >= 0xC0 {
            out.extend_from_slice(&[0xC0 | run as u8, v]);
        } else {
            out.push(v);
        }
        i += run;
    }
}
