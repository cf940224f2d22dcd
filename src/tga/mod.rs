//! Truevision TGA: color-mapped, true-color and grayscale images, raw or
//! RLE packed.

mod decode;
mod encode;

pub(crate) use decode::load;
pub(crate) use encode::save;

const HEADER_SIZE: usize = 18;

/// Descriptor bit: rows run top to bottom.
const TOP_DOWN: u8 = 0x20;
/// Descriptor bit: columns run right to left.
const RIGHT_TO_LEFT: u8 = 0x10;

/// TGA 2.0 footer signature.
const SIGNATURE: &[u8; 18] = b"TRUEVISION-XFILE.\0";

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::LoadMode;
    use crate::image::{Channel, Image};
    use crate::limits::Limits;
    use crate::palette::{Palette, RGB8};
    use crate::progress::Progress;
    use crate::settings::Settings;
    use enough::Unstoppable;

    fn roundtrip(settings: &Settings) -> Settings {
        let bytes = save(settings, &Progress::new(&Unstoppable, None)).unwrap();
        assert!(bytes.ends_with(SIGNATURE));
        let mut out = Settings::new(LoadMode::Image);
        let mut p = Progress::new(&Unstoppable, None);
        load(&bytes, &mut out, &Limits::default(), &mut p).unwrap();
        out
    }

    #[test]
    fn indexed_with_transparency_roundtrips() {
        for rle in [false, true] {
            let mut palette = Palette::new(vec![
                RGB8::new(1, 2, 3),
                RGB8::new(4, 5, 6),
                RGB8::new(7, 8, 9),
            ])
            .unwrap();
            palette.set_transparent(Some(2)).unwrap();
            let indices = vec![0, 0, 0, 1, 2, 2, 1, 0, 2, 2, 2, 2];
            let mut s = Settings::from_image(Image::indexed(4, 3, indices.clone()).unwrap(), palette);
            s.tga_rle = rle;
            let back = roundtrip(&s);
            assert_eq!(back.image.channel(Channel::Image), Some(&indices[..]));
            assert_eq!(back.palette, s.palette);
        }
    }

    #[test]
    fn rgba_roundtrips() {
        for rle in [false, true] {
            let rgb: Vec<u8> = (0..15 * 3).map(|i| (i / 7) as u8).collect();
            let mut img = Image::rgb(5, 3, rgb).unwrap();
            img.set_channel(Channel::Alpha, (0..15).map(|i| if i < 5 { 0 } else { 255 }).collect())
                .unwrap();
            let mut s = Settings::from_image(img.clone(), Palette::default());
            s.tga_rle = rle;
            assert_eq!(roundtrip(&s).image, img);
        }
    }
}
