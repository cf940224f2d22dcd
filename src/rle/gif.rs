//! GIF interlaced row order.
//!
//! LZW itself is done by the `gif` crate; rows come back in stream order and
//! are placed here.

/// (first row, step) of each interlace pass.
pub const PASSES: [(usize, usize); 4] = [(0, 8), (4, 8), (2, 4), (1, 2)];

/// Destination row of each stream row, in arrival order.
pub fn interlaced_rows(height: usize) -> impl Iterator<Item = usize> {
    PASSES
        .into_iter()
        .flat_map(move |(start, step)| (start..height).step_by(step))
}

/// Rows in arrival order to rows in display order.
pub fn deinterlace(data: &[u8], width: usize, height: usize) -> Vec<u8> {
    let mut out = vec![0; width * height];
    if width == 0 {
        return out;
    }
    for (src, dst) in data.chunks_exact(width).zip(interlaced_rows(height)) {
        out[dst * width..(dst + 1) * width].copy_from_slice(src);
    }
    out
}

/// Rows in display order to rows in arrival order.
pub fn interlace(data: &[u8], width: usize, height: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(width * height);
    for row in interlaced_rows(height) {
        if let Some(src) = data.get(row * width..(row + 1) * width) {
            out.extend_from_slice(src);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn ten_row_order() {
        let rows: Vec<usize> = interlaced_rows(10).collect();
        assert_eq!(rows, [0, 8, 4, 2, 6, 1, 3, 5, 7, 9]);
    }

    #[test]
    fn single_row_is_unchanged() {
        assert_eq!(deinterlace(&[1, 2, 3], 3, 1), [1, 2, 3]);
    }

    proptest! {
        #[test]
        fn inverse(width in 1usize..8, height in 1usize..40, seed in any::<u8>()) {
            let data: Vec<u8> = (0..width * height).map(|i| (i as u8).wrapping_add(seed)).collect();
            prop_assert_eq!(deinterlace(&interlace(&data, width, height), width, height), data);
        }
    }
}
