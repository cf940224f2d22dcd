//! BMP RLE4 and RLE8.
//!
//! Rows are kept in stream order: row 0 is the first row in the payload,
//! which is the bottom row of a BMP. The driver flips.

use crate::error::CodecError;
use crate::reader::Reader;

/// Sample width of an RLE stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RleBits {
    Four,
    Eight,
}

/// Decoded RLE payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Decoded {
    /// `width * height` samples in stream row order.
    pub samples: Vec<u8>,
    /// 255 for pixels a block wrote, 0 for pixels skipped over. `None` when
    /// every pixel was written; otherwise the driver installs it as alpha.
    pub coverage: Option<Vec<u8>>,
}

struct Canvas {
    samples: Vec<u8>,
    written: Vec<u8>,
    width: usize,
    height: usize,
    clipped: usize,
}

impl Canvas {
    #[inline]
    fn put(&mut self, x: usize, y: usize, v: u8) {
        if x < self.width && y < self.height {
            let i = y * self.width + x;
            self.samples[i] = v;
            self.written[i] = 255;
        } else {
            self.clipped += 1;
        }
    }
}

/// Decode an RLE4/RLE8 payload.
///
/// Blocks that run past the row end are clipped. Running out of input
/// before an end-of-bitmap marker or the last row is `TruncatedStream`.
pub fn decode(
    src: &[u8],
    width: usize,
    height: usize,
    bits: RleBits,
) -> Result<Decoded, CodecError> {
    let total = width.checked_mul(height).ok_or(CodecError::OutOfMemory {
        bytes: usize::MAX,
    })?;
    let mut canvas = Canvas {
        samples: vec![0; total],
        written: vec![0; total],
        width,
        height,
        clipped: 0,
    };
    let mut r = Reader::new(src);
    let (mut x, mut y) = (0usize, 0usize);

    while y < height {
        let count = usize::from(r.u8()?);
        let code = r.u8()?;
        if count > 0 {
            for k in 0..count {
                let v = match bits {
                    RleBits::Eight => code,
                    RleBits::Four if k % 2 == 0 => code >> 4,
                    RleBits::Four => code & 0x0F,
                };
                canvas.put(x + k, y, v);
            }
            x += count;
            continue;
        }
        match code {
            0 => {
                x = 0;
                y += 1;
            }
            1 => break,
            2 => {
                x += usize::from(r.u8()?);
                y += usize::from(r.u8()?);
            }
            n => {
                let n = usize::from(n);
                let len = match bits {
                    RleBits::Eight => n,
                    RleBits::Four => n.div_ceil(2),
                };
                let data = r.bytes(len)?;
                for k in 0..n {
                    let v = match bits {
                        RleBits::Eight => data[k],
                        RleBits::Four if k % 2 == 0 => data[k / 2] >> 4,
                        RleBits::Four => data[k / 2] & 0x0F,
                    };
                    canvas.put(x + k, y, v);
                }
                x += n;
                // Literal runs are padded to a 16-bit boundary.
                if len % 2 == 1 {
                    r.skip(1)?;
                }
            }
        }
    }

    if canvas.clipped > 0 {
        log::warn!("BMP RLE: clipped {} pixels outside the bitmap", canvas.clipped);
    }
    let coverage = if canvas.written.iter().all(|&w| w == 255) {
        None
    } else {
        Some(canvas.written)
    };
    Ok(Decoded {
        samples: canvas.samples,
        coverage,
    })
}

/// Encode rows (stream order) of `width` samples each.
///
/// Rows are separated by end-of-line markers and the stream is closed
/// with an end-of-bitmap marker.
pub fn encode(samples: &[u8], width: usize, bits: RleBits) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() / 2 + 2);
    if width > 0 {
        let rows = samples.len() / width;
        for (i, row) in samples.chunks_exact(width).enumerate() {
            match bits {
                RleBits::Eight => encode_row8(row, &mut out),
                RleBits::Four => encode_row4(row, &mut out),
            }
            if i + 1 < rows {
                out.extend_from_slice(&[0, 0]);
            }
        }
    }
    out.extend_from_slice(&[0, 1]);
    out
}

const MAX_BLOCK: usize = 255;

fn run_length(s: &[u8]) -> usize {
    s.iter().take(MAX_BLOCK).take_while(|&&v| v == s[0]).count()
}

/// Samples up to (not including) the start of the next run.
fn literal_length(s: &[u8]) -> usize {
    let mut n = 0;
    while n < s.len() && n < MAX_BLOCK {
        if n + 1 < s.len() && s[n] == s[n + 1] {
            break;
        }
        n += 1;
    }
    n.max(1)
}

fn encode_row8(row: &[u8], out: &mut Vec<u8>) {
    let mut i = 0;
    while i < row.len() {
        let run = run_length(&row[i..]);
        if run >= 2 {
            out.extend_from_slice(&[run as u8, row[i]]);
            i += run;
            continue;
        }
        let lit = literal_length(&row[i..]);
        let span = &row[i..i + lit];
        if lit >= 3 {
            out.extend_from_slice(&[0, lit as u8]);
            out.extend_from_slice(span);
            if lit % 2 == 1 {
                out.push(0);
            }
        } else {
            for &v in span {
                out.extend_from_slice(&[1, v]);
            }
        }
        i += lit;
    }
}

fn encode_row4(row: &[u8], out: &mut Vec<u8>) {
    let row: Vec<u8> = row.iter().map(|&v| v & 0x0F).collect();
    let mut i = 0;
    while i < row.len() {
        let run = run_length(&row[i..]);
        if run >= 2 {
            out.extend_from_slice(&[run as u8, row[i] << 4 | row[i]]);
            i += run;
            continue;
        }
        let lit = literal_length(&row[i..]);
        let span = &row[i..i + lit];
        if lit >= 3 {
            out.extend_from_slice(&[0, lit as u8]);
            let start = out.len();
            for pair in span.chunks(2) {
                out.push(pair[0] << 4 | pair.get(1).copied().unwrap_or(0));
            }
            if (out.len() - start) % 2 == 1 {
                out.push(0);
            }
        } else {
            // One or two pixels: a repeat block alternating between them.
            let lo = span.get(1).copied().unwrap_or(0);
            out.extend_from_slice(&[lit as u8, span[0] << 4 | lo]);
        }
        i += lit;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn rle8_run_and_literal_rows() {
        let mut samples = vec![5u8; 8];
        samples.extend(1..=8u8);
        let encoded = encode(&samples, 8, RleBits::Eight);
        assert_eq!(
            encoded,
            [8, 5, 0, 0, 0, 8, 1, 2, 3, 4, 5, 6, 7, 8, 0, 1],
        );
        let decoded = decode(&encoded, 8, 2, RleBits::Eight).unwrap();
        assert_eq!(decoded.samples, samples);
        assert_eq!(decoded.coverage, None);
    }

    #[test]
    fn delta_skip_reveals_untouched_pixels() {
        // Two 7s, skip right 1 and up 1, one 9, end of bitmap.
        let src = [2, 7, 0, 2, 1, 1, 1, 9, 0, 1];
        let d = decode(&src, 4, 2, RleBits::Eight).unwrap();
        assert_eq!(d.samples, [7, 7, 0, 0, 0, 0, 0, 9]);
        assert_eq!(d.coverage.unwrap(), [255, 255, 0, 0, 0, 0, 0, 255]);
    }

    #[test]
    fn early_end_of_bitmap_leaves_rest_uncovered() {
        let d = decode(&[4, 3, 0, 1], 4, 2, RleBits::Eight).unwrap();
        assert_eq!(d.coverage.unwrap(), [255, 255, 255, 255, 0, 0, 0, 0]);
    }

    #[test]
    fn overrun_is_clipped() {
        let d = decode(&[5, 3, 0, 1], 2, 1, RleBits::Eight).unwrap();
        assert_eq!(d.samples, [3, 3]);
        assert_eq!(d.coverage, None);
    }

    #[test]
    fn missing_rows_are_truncation() {
        let err = decode(&[4, 1], 4, 2, RleBits::Eight).unwrap_err();
        assert!(matches!(err, CodecError::TruncatedStream));
        let err = decode(&[0, 5, 1, 2], 8, 1, RleBits::Eight).unwrap_err();
        assert!(matches!(err, CodecError::TruncatedStream));
    }

    #[test]
    fn rle4_odd_literal_is_word_padded() {
        let encoded = encode(&[1, 2, 3, 4, 5], 5, RleBits::Four);
        assert_eq!(encoded, [0, 5, 0x12, 0x34, 0x50, 0, 0, 1]);
        let d = decode(&encoded, 5, 1, RleBits::Four).unwrap();
        assert_eq!(d.samples, [1, 2, 3, 4, 5]);
    }

    #[test]
    fn rle4_short_leftovers_use_alternating_repeat() {
        let encoded = encode(&[7, 7, 7, 1, 2], 5, RleBits::Four);
        assert_eq!(encoded, [3, 0x77, 2, 0x12, 0, 1]);
        let d = decode(&encoded, 5, 1, RleBits::Four).unwrap();
        assert_eq!(d.samples, [7, 7, 7, 1, 2]);
    }

    fn rows(max: u8) -> impl Strategy<Value = (usize, Vec<u8>)> {
        (1usize..600, 1usize..4).prop_flat_map(move |(w, h)| {
            let runs = proptest::collection::vec((0..=max, 1usize..300), 1..20);
            (Just(w), Just(h), runs).prop_map(|(w, h, runs)| {
                let mut v: Vec<u8> = runs
                    .into_iter()
                    .flat_map(|(s, n)| std::iter::repeat_n(s, n))
                    .collect();
                v.resize(w * h, 0);
                (w, v)
            })
        })
    }

    proptest! {
        #[test]
        fn rle8_inverse((w, samples) in rows(255)) {
            let h = samples.len() / w;
            let d = decode(&encode(&samples, w, RleBits::Eight), w, h, RleBits::Eight).unwrap();
            prop_assert_eq!(d.samples, samples);
            prop_assert!(d.coverage.is_none());
        }

        #[test]
        fn rle4_inverse((w, samples) in rows(15)) {
            let h = samples.len() / w;
            let d = decode(&encode(&samples, w, RleBits::Four), w, h, RleBits::Four).unwrap();
            prop_assert_eq!(d.samples, samples);
        }

        #[test]
        fn distinct_samples_round_trip(w in 1usize..300) {
            let samples: Vec<u8> = (0..w).map(|i| i as u8).collect();
            let d = decode(&encode(&samples, w, RleBits::Eight), w, 1, RleBits::Eight).unwrap();
            prop_assert_eq!(d.samples, samples);
        }
    }
}
