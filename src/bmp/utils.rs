//! BMP bitfield scaling.
//!
//! The scale tables follow zune-bmp 0.5.2 by Caleb Etemesi
//! (MIT/Apache-2.0/Zlib).

/// Multipliers replicating an N-bit value across 8 bits.
const MUL_TABLE: [u32; 9] = [0, 0xff, 0x55, 0x49, 0x11, 0x21, 0x41, 0x81, 0x01];

const SHIFT_TABLE: [i32; 9] = [0, 0, 0, 1, 0, 2, 4, 6, 0];

/// One channel mask of a 16/32-bit BMP.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Bitfield {
    mask: u32,
    shift: i32,
    bits: u32,
}

impl Bitfield {
    pub(crate) fn new(mask: u32) -> Self {
        Self {
            mask,
            shift: (32 - mask.leading_zeros() as i32) - 8,
            bits: mask.count_ones(),
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.mask == 0
    }

    /// Extract this channel from a pixel word and scale it to 8 bits.
    pub(crate) fn extract(&self, v: u32) -> u8 {
        if self.mask == 0 {
            return 0;
        }
        let mut v = v & self.mask;
        if self.shift < 0 {
            v <<= -self.shift;
        } else {
            v >>= self.shift;
        }
        let bits = self.bits.clamp(1, 8);
        v >>= 8 - bits;
        ((v.wrapping_mul(MUL_TABLE[bits as usize])) >> SHIFT_TABLE[bits as usize]) as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn five_bit_channels_scale_to_full_range() {
        let r = Bitfield::new(0x7C00);
        assert_eq!(r.extract(0x7C00), 255);
        assert_eq!(r.extract(0), 0);
        let b = Bitfield::new(0x1F);
        assert_eq!(b.extract(0x10), 132);
    }

    #[test]
    fn byte_masks_pass_through() {
        let g = Bitfield::new(0x0000_FF00);
        assert_eq!(g.extract(0x0012_3456), 0x34);
        let a = Bitfield::new(0xFF00_0000);
        assert_eq!(a.extract(0x8000_0000), 0x80);
    }
}
