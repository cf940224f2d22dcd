//! PNM family: P1-P6 (PBM/PGM/PPM, plain and raw) and P7 (PAM).
//!
//! Credits: Draws from [zune-ppm](https://github.com/etemesi254/zune-image)
//! by Caleb Etemesi (MIT/Apache-2.0/Zlib licensed).

mod decode;
mod encode;

pub(crate) use decode::load;
pub(crate) use encode::save;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum PnmKind {
    Bitmap { plain: bool },
    Graymap { plain: bool },
    Pixmap { plain: bool },
    Pam,
}

impl PnmKind {
    fn is_plain(self) -> bool {
        matches!(
            self,
            PnmKind::Bitmap { plain: true }
                | PnmKind::Graymap { plain: true }
                | PnmKind::Pixmap { plain: true }
        )
    }
}

/// PAM tuple types (P1-P6 map onto the first three).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum TupleType {
    BlackAndWhite,
    Grayscale,
    Rgb,
    BlackAndWhiteAlpha,
    GrayscaleAlpha,
    RgbAlpha,
}

impl TupleType {
    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "BLACKANDWHITE" => Self::BlackAndWhite,
            "GRAYSCALE" => Self::Grayscale,
            "RGB" => Self::Rgb,
            "BLACKANDWHITE_ALPHA" => Self::BlackAndWhiteAlpha,
            "GRAYSCALE_ALPHA" => Self::GrayscaleAlpha,
            "RGB_ALPHA" => Self::RgbAlpha,
            _ => return None,
        })
    }

    fn depth(self) -> u32 {
        match self {
            Self::BlackAndWhite | Self::Grayscale => 1,
            Self::BlackAndWhiteAlpha | Self::GrayscaleAlpha => 2,
            Self::Rgb => 3,
            Self::RgbAlpha => 4,
        }
    }

    fn has_alpha(self) -> bool {
        matches!(
            self,
            Self::BlackAndWhiteAlpha | Self::GrayscaleAlpha | Self::RgbAlpha
        )
    }
}

/// Parsed PNM header (internal).
struct Header {
    kind: PnmKind,
    width: u32,
    height: u32,
    maxval: u32,
    tuple: TupleType,
    data_offset: usize,
}

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

    fn roundtrip(settings: &Settings) -> (Vec<u8>, Settings) {
        let bytes = save(settings, &Progress::new(&Unstoppable, None)).unwrap();
        let mut out = Settings::new(LoadMode::Image);
        let mut p = Progress::new(&Unstoppable, None);
        load(&bytes, &mut out, &Limits::default(), &mut p).unwrap();
        (bytes, out)
    }

    #[test]
    fn two_colors_become_pbm() {
        let s = Settings::from_image(
            Image::indexed(10, 2, (0..20).map(|i| (i % 3 == 0) as u8).collect()).unwrap(),
            Palette::mono(),
        );
        let (bytes, back) = roundtrip(&s);
        assert!(bytes.starts_with(b"P4\n"));
        let expect: Vec<RGB8> = (0..20).map(|i| s.image.rgb_at(&s.palette, i)).collect();
        let got: Vec<RGB8> = (0..20).map(|i| back.image.rgb_at(&back.palette, i)).collect();
        assert_eq!(got, expect);
    }

    #[test]
    fn gray_palette_becomes_pgm() {
        let indices: Vec<u8> = (0..=255).collect();
        let s = Settings::from_image(
            Image::indexed(16, 16, indices.clone()).unwrap(),
            Palette::grayscale(256),
        );
        let (bytes, back) = roundtrip(&s);
        assert!(bytes.starts_with(b"P5\n"));
        assert_eq!(back.image.channel(Channel::Image), Some(&indices[..]));
    }

    #[test]
    fn color_palette_becomes_ppm() {
        let palette = Palette::new(vec![RGB8::new(1, 2, 3), RGB8::new(200, 100, 50), RGB8::new(9, 9, 9)]).unwrap();
        let s = Settings::from_image(Image::indexed(3, 1, vec![0, 1, 2]).unwrap(), palette);
        let (bytes, back) = roundtrip(&s);
        assert!(bytes.starts_with(b"P6\n"));
        assert_eq!(
            back.image.channel(Channel::Image).unwrap(),
            &[1, 2, 3, 200, 100, 50, 9, 9, 9]
        );
    }

    #[test]
    fn alpha_becomes_pam() {
        let mut img = Image::rgb(2, 1, vec![1, 2, 3, 4, 5, 6]).unwrap();
        img.set_channel(Channel::Alpha, vec![0, 255]).unwrap();
        let (bytes, back) = roundtrip(&Settings::from_image(img.clone(), Palette::default()));
        assert!(bytes.starts_with(b"P7\n"));
        assert_eq!(back.image, img);
    }
}
