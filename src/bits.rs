//! Sub-byte sample packing.
//!
//! [`unpack`] pulls `bits`-wide samples (1..=16) out of a packed buffer at an
//! arbitrary bit offset and stride. Reads past the end of `src` yield zero
//! bits, so callers may size rows to the logical bit length without the one
//! byte of slack a raw pointer walk would need.

/// Which end of a byte holds the first sample.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BitOrder {
    /// First sample in the high-order bits (BMP, PCX, PNM, TGA).
    Msb,
    /// First sample in the low-order bits (XBM, LSS16 nibbles).
    Lsb,
}

#[inline]
fn byte_at(src: &[u8], i: usize) -> u32 {
    src.get(i).copied().map_or(0, u32::from)
}

#[inline]
fn sample_at(src: &[u8], bitpos: usize, bits: u32, order: BitOrder) -> u16 {
    let byte = bitpos >> 3;
    let shift = (bitpos & 7) as u32;
    let mask = (1u32 << bits) - 1;
    let v = match order {
        BitOrder::Msb => {
            let w = (byte_at(src, byte) << 16)
                | (byte_at(src, byte + 1) << 8)
                | byte_at(src, byte + 2);
            w >> (24 - shift - bits)
        }
        BitOrder::Lsb => {
            let w = byte_at(src, byte)
                | (byte_at(src, byte + 1) << 8)
                | (byte_at(src, byte + 2) << 16);
            w >> shift
        }
    };
    (v & mask) as u16
}

/// Extract `dest.len()` samples into `dest`.
///
/// # Panics
///
/// Panics if `bits` is not in `1..=16`.
pub fn unpack_into(
    src: &[u8],
    dest: &mut [u16],
    bits: u32,
    bit_offset: usize,
    bit_stride: usize,
    order: BitOrder,
) {
    assert!((1..=16).contains(&bits), "sample width {bits} out of range");
    let mut pos = bit_offset;
    for d in dest.iter_mut() {
        *d = sample_at(src, pos, bits, order);
        pos += bit_stride;
    }
}

/// Extract `count` samples of `bits` width, `bit_stride` bits apart.
pub fn unpack(
    src: &[u8],
    count: usize,
    bits: u32,
    bit_offset: usize,
    bit_stride: usize,
    order: BitOrder,
) -> Vec<u16> {
    let mut out = vec![0u16; count];
    unpack_into(src, &mut out, bits, bit_offset, bit_stride, order);
    out
}

/// Byte-sized variant for the common `bits <= 8` case (palette indices).
pub(crate) fn unpack_bytes(src: &[u8], dest: &mut [u8], bits: u32, order: BitOrder) {
    debug_assert!((1..=8).contains(&bits));
    if bits == 8 {
        let n = dest.len().min(src.len());
        dest[..n].copy_from_slice(&src[..n]);
        dest[n..].fill(0);
        return;
    }
    let mut pos = 0;
    for d in dest.iter_mut() {
        *d = sample_at(src, pos, bits, order) as u8;
        pos += bits as usize;
    }
}

/// Inverse of [`unpack`]: write samples into `dest`.
///
/// Only the addressed bits are modified. Samples wider than `bits` are
/// truncated; bits that fall past the end of `dest` are dropped.
pub fn pack(
    samples: &[u16],
    dest: &mut [u8],
    bits: u32,
    bit_offset: usize,
    bit_stride: usize,
    order: BitOrder,
) {
    assert!((1..=16).contains(&bits), "sample width {bits} out of range");
    let mut pos = bit_offset;
    for &s in samples {
        for b in 0..bits as usize {
            let bit = match order {
                BitOrder::Msb => (s >> (bits as usize - 1 - b)) & 1,
                BitOrder::Lsb => (s >> b) & 1,
            };
            let p = pos + b;
            let Some(byte) = dest.get_mut(p >> 3) else {
                break;
            };
            let mask = match order {
                BitOrder::Msb => 0x80u8 >> (p & 7),
                BitOrder::Lsb => 1u8 << (p & 7),
            };
            if bit != 0 {
                *byte |= mask;
            } else {
                *byte &= !mask;
            }
        }
        pos += bit_stride;
    }
}

/// Pack a row of byte samples tightly (`bits` apart).
pub(crate) fn pack_bytes(samples: &[u8], dest: &mut [u8], bits: u32, order: BitOrder) {
    if bits == 8 {
        let n = dest.len().min(samples.len());
        dest[..n].copy_from_slice(&samples[..n]);
        return;
    }
    let wide: Vec<u16> = samples.iter().map(|&s| u16::from(s)).collect();
    pack(&wide, dest, bits, 0, bits as usize, order);
}

/// Bytes needed for `count` samples of `bits` width.
pub(crate) fn packed_len(count: usize, bits: u32) -> usize {
    (count * bits as usize).div_ceil(8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn msb_nibbles() {
        let src = [0xAB, 0xCD];
        assert_eq!(unpack(&src, 4, 4, 0, 4, BitOrder::Msb), [0xA, 0xB, 0xC, 0xD]);
        assert_eq!(unpack(&src, 4, 4, 0, 4, BitOrder::Lsb), [0xB, 0xA, 0xD, 0xC]);
    }

    #[test]
    fn strided_channel_extraction() {
        // 3 bytes per pixel, take the green byte of each.
        let src = [1, 2, 3, 4, 5, 6, 7, 8, 9];
        assert_eq!(unpack(&src, 3, 8, 8, 24, BitOrder::Msb), [2, 5, 8]);
    }

    #[test]
    fn sixteen_bit_unaligned() {
        // 0b1_1111111_10000000_0 at offset 1
        let src = [0x7F, 0xC0, 0x00];
        assert_eq!(unpack(&src, 1, 16, 1, 16, BitOrder::Msb), [0xFF80]);
    }

    #[test]
    fn reads_past_end_are_zero() {
        let src = [0xFF];
        assert_eq!(unpack(&src, 3, 4, 0, 4, BitOrder::Msb), [0xF, 0xF, 0]);
    }

    #[test]
    fn xbm_style_lsb_bits() {
        let src = [0b0000_0101];
        assert_eq!(
            unpack(&src, 8, 1, 0, 1, BitOrder::Lsb),
            [1, 0, 1, 0, 0, 0, 0, 0]
        );
    }

    fn order_strategy() -> impl Strategy<Value = BitOrder> {
        prop_oneof![Just(BitOrder::Msb), Just(BitOrder::Lsb)]
    }

    proptest! {
        #[test]
        fn pack_then_unpack_recovers_samples(
            bits in 1u32..=16,
            offset in 0usize..16,
            extra_stride in 0usize..5,
            order in order_strategy(),
            raw in proptest::collection::vec(any::<u16>(), 0..64),
            edge in 0usize..2,
        ) {
            let mask = ((1u32 << bits) - 1) as u16;
            let samples: Vec<u16> = raw.iter().map(|s| s & mask).collect();
            let stride = bits as usize + extra_stride;
            let end_bit = offset + samples.len() * stride;
            // Either exactly on a byte edge or one bit past it.
            let len = end_bit.div_ceil(8) + edge;
            let mut buf = vec![0u8; len];
            pack(&samples, &mut buf, bits, offset, stride, order);
            let back = unpack(&buf, samples.len(), bits, offset, stride, order);
            prop_assert_eq!(back, samples);
        }
    }
}
