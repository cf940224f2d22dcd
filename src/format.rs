//! Format registry and signature sniffing.

use std::path::Path;

use crate::image::Channel;
use crate::settings::Settings;

/// Version of the layers text format this build understands.
pub const LAYERS_VERSION: u32 = 1;

/// Every file format the engine knows about.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum FormatId {
    Png,
    Jpeg,
    /// JPEG 2000 in a JP2 container.
    Jp2,
    /// Raw JPEG 2000 codestream.
    J2k,
    Tiff,
    Gif,
    Bmp,
    /// Syslinux splash screen.
    Lss16,
    Pam,
    Pbm,
    Pgm,
    Ppm,
    /// GIMP palette.
    Gpl,
    /// mtPaint layers text file.
    Layers,
    Svg,
    Pcx,
    Tga,
    /// Plain-text palette: a color count, then `r,g,b` lines.
    TxtPalette,
    Xpm,
    Xbm,
}

/// What a driver can do with a format.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FormatCaps {
    pub load: bool,
    pub save: bool,
    pub indexed: bool,
    pub rgb: bool,
    pub alpha: bool,
    pub animation: bool,
    /// Holds only a palette.
    pub palette_only: bool,
}

/// Static description of one format.
#[derive(Clone, Copy, Debug)]
pub struct FormatInfo {
    pub id: FormatId,
    pub name: &'static str,
    /// Lowercase extensions, the preferred one first.
    pub extensions: &'static [&'static str],
    pub caps: FormatCaps,
}

const fn caps(load: bool, save: bool, indexed: bool, rgb: bool, alpha: bool) -> FormatCaps {
    FormatCaps {
        load,
        save,
        indexed,
        rgb,
        alpha,
        animation: false,
        palette_only: false,
    }
}

const PALETTE: FormatCaps = FormatCaps {
    load: true,
    save: true,
    indexed: true,
    rgb: false,
    alpha: false,
    animation: false,
    palette_only: true,
};

const NONE: FormatCaps = caps(false, false, false, false, false);

/// All formats, in no particular order. Detection order lives in [`detect`].
pub static REGISTRY: &[FormatInfo] = &[
    FormatInfo {
        id: FormatId::Png,
        name: "PNG",
        extensions: &["png"],
        caps: caps(true, true, true, true, true),
    },
    FormatInfo {
        id: FormatId::Jpeg,
        name: "JPEG",
        extensions: &["jpg", "jpeg", "jpe"],
        caps: caps(true, true, false, true, false),
    },
    FormatInfo {
        id: FormatId::Jp2,
        name: "JPEG2000",
        extensions: &["jp2"],
        caps: caps(true, false, false, true, true),
    },
    FormatInfo {
        id: FormatId::J2k,
        name: "J2K",
        extensions: &["j2k", "j2c", "jpc"],
        caps: caps(true, false, false, true, true),
    },
    FormatInfo {
        id: FormatId::Tiff,
        name: "TIFF",
        extensions: &["tif", "tiff"],
        caps: caps(true, true, true, true, true),
    },
    FormatInfo {
        id: FormatId::Gif,
        name: "GIF",
        extensions: &["gif"],
        caps: FormatCaps {
            animation: true,
            ..caps(true, true, true, false, false)
        },
    },
    FormatInfo {
        id: FormatId::Bmp,
        name: "BMP",
        extensions: &["bmp"],
        caps: caps(true, true, true, true, true),
    },
    FormatInfo {
        id: FormatId::Lss16,
        name: "LSS16",
        extensions: &["lss"],
        caps: caps(true, true, true, false, false),
    },
    FormatInfo {
        id: FormatId::Pam,
        name: "PAM",
        extensions: &["pam"],
        caps: caps(true, true, true, true, true),
    },
    FormatInfo {
        id: FormatId::Pbm,
        name: "PBM",
        extensions: &["pbm"],
        caps: caps(true, true, true, false, false),
    },
    FormatInfo {
        id: FormatId::Pgm,
        name: "PGM",
        extensions: &["pgm"],
        caps: caps(true, true, true, false, false),
    },
    FormatInfo {
        id: FormatId::Ppm,
        name: "PPM",
        extensions: &["ppm", "pnm"],
        caps: caps(true, true, false, true, false),
    },
    FormatInfo {
        id: FormatId::Gpl,
        name: "GPL",
        extensions: &["gpl"],
        caps: PALETTE,
    },
    FormatInfo {
        id: FormatId::Layers,
        name: "LAYERS",
        extensions: &["txt"],
        caps: NONE,
    },
    FormatInfo {
        id: FormatId::Svg,
        name: "SVG",
        extensions: &["svg"],
        caps: NONE,
    },
    FormatInfo {
        id: FormatId::Pcx,
        name: "PCX",
        extensions: &["pcx"],
        caps: caps(true, true, true, true, false),
    },
    FormatInfo {
        id: FormatId::Tga,
        name: "TGA",
        extensions: &["tga"],
        caps: caps(true, true, true, true, true),
    },
    FormatInfo {
        id: FormatId::TxtPalette,
        name: "TXT",
        extensions: &["txt"],
        caps: PALETTE,
    },
    FormatInfo {
        id: FormatId::Xpm,
        name: "XPM",
        extensions: &["xpm"],
        caps: caps(true, true, true, false, false),
    },
    FormatInfo {
        id: FormatId::Xbm,
        name: "XBM",
        extensions: &["xbm"],
        caps: caps(true, true, true, false, false),
    },
];

impl FormatId {
    pub fn info(self) -> &'static FormatInfo {
        REGISTRY
            .iter()
            .find(|f| f.id == self)
            .unwrap_or(&REGISTRY[0])
    }

    pub fn name(self) -> &'static str {
        self.info().name
    }

    /// Preferred file extension.
    pub fn extension(self) -> &'static str {
        self.info().extensions[0]
    }

    pub fn caps(self) -> FormatCaps {
        self.info().caps
    }

    /// Format for a file extension (case-insensitive, without the dot).
    pub fn from_extension(ext: &str) -> Option<FormatId> {
        let ext = ext.to_ascii_lowercase();
        REGISTRY
            .iter()
            .filter(|f| f.caps.load || f.caps.save)
            .find(|f| f.extensions.contains(&ext.as_str()))
            .map(|f| f.id)
    }

    /// Format for a registry name such as `"PNG"`.
    pub fn from_name(name: &str) -> Option<FormatId> {
        REGISTRY
            .iter()
            .find(|f| f.name.eq_ignore_ascii_case(name))
            .map(|f| f.id)
    }

    /// Whether this format can store `settings` without losing anything
    /// beyond what its drivers deliberately drop (e.g. JPEG quality).
    pub fn can_save(self, settings: &Settings) -> bool {
        let caps = self.caps();
        if !caps.save {
            return false;
        }
        if caps.palette_only {
            return true;
        }
        let indexed = settings.bpp() == 1;
        let alpha = settings.image.has(Channel::Alpha);
        let colors = settings.palette.len();
        if alpha && !caps.alpha {
            return false;
        }
        match self {
            FormatId::Gif | FormatId::Xpm => indexed,
            FormatId::Lss16 => indexed && colors <= 16,
            FormatId::Pbm | FormatId::Xbm => indexed && colors <= 2,
            FormatId::Pgm => indexed && settings.palette.is_gray_ramp(),
            _ => true,
        }
    }
}

fn extension_of(hint: Option<&Path>) -> Option<String> {
    hint?
        .extension()?
        .to_str()
        .map(str::to_ascii_lowercase)
}

fn first_line(buf: &[u8]) -> &[u8] {
    let end = buf.iter().position(|&b| b == b'\n').unwrap_or(buf.len());
    let line = &buf[..end];
    line.strip_suffix(b"\r").unwrap_or(line)
}

fn is_pnm_space(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\n' | b'\r' | 0x0B | 0x0C)
}

fn layers_version_ok(buf: &[u8]) -> bool {
    let Some(rest) = buf.strip_prefix(b"# mtPaint layers") else {
        return false;
    };
    let text = String::from_utf8_lossy(rest);
    text.split_whitespace()
        .next()
        .and_then(|v| v.parse::<u32>().ok())
        .is_some_and(|v| v <= LAYERS_VERSION)
}

#[cfg(feature = "svg")]
fn looks_like_xml(buf: &[u8]) -> bool {
    let buf = buf.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(buf);
    let start = buf.iter().position(|b| !b.is_ascii_whitespace()).unwrap_or(buf.len());
    let buf = &buf[start..];
    buf.starts_with(b"<?xml") || buf.starts_with(b"<svg")
}

#[cfg(not(feature = "svg"))]
fn looks_like_xml(_buf: &[u8]) -> bool {
    false
}

fn looks_like_tga(buf: &[u8]) -> bool {
    if buf.len() < 18 {
        return false;
    }
    let (cmap, kind, depth) = (buf[1], buf[2], buf[16]);
    cmap <= 1
        && matches!(kind, 1 | 2 | 3 | 9 | 10 | 11)
        && (cmap == 1 || !matches!(kind, 1 | 9))
        && matches!(depth, 8 | 15 | 16 | 24 | 32)
}

fn looks_like_txt_palette(buf: &[u8]) -> bool {
    std::str::from_utf8(first_line(buf))
        .ok()
        .and_then(|l| l.trim().parse::<u32>().ok())
        .is_some_and(|n| (2..=256).contains(&n))
}

fn contains(buf: &[u8], needle: &[u8]) -> bool {
    buf.windows(needle.len()).any(|w| w == needle)
}

/// Identify a file from its first bytes (1 KiB is plenty) and, where the
/// signature is ambiguous, its name.
///
/// Exact magic numbers are checked first, then progressively weaker
/// heuristics. `None` means no rule matched.
pub fn detect(buf: &[u8], hint: Option<&Path>) -> Option<FormatId> {
    const MAGICS: &[(&[u8], FormatId)] = &[
        (b"\x89PNG\r\n\x1a\n", FormatId::Png),
        (b"\xFF\xD8\xFF", FormatId::Jpeg),
        (b"\x00\x00\x00\x0CjP  \r\n\x87\n", FormatId::Jp2),
        (b"\xFF\x4F\xFF\x51", FormatId::J2k),
        (b"II*\x00", FormatId::Tiff),
        (b"MM\x00*", FormatId::Tiff),
        (b"GIF87a", FormatId::Gif),
        (b"GIF89a", FormatId::Gif),
        (b"BM", FormatId::Bmp),
        (b"\x3D\xF3\x13\x14", FormatId::Lss16),
    ];
    let found = MAGICS
        .iter()
        .find(|(magic, _)| buf.starts_with(magic))
        .map(|&(_, id)| id)
        .or_else(|| detect_weak(buf, hint));
    log::debug!("detected {found:?}");
    found
}

fn detect_weak(buf: &[u8], hint: Option<&Path>) -> Option<FormatId> {
    if buf.len() >= 3 && buf[0] == b'P' && is_pnm_space(buf[2]) {
        match buf[1] {
            b'7' => return Some(FormatId::Pam),
            b'1' | b'4' => return Some(FormatId::Pbm),
            b'2' | b'5' => return Some(FormatId::Pgm),
            b'3' | b'6' => return Some(FormatId::Ppm),
            _ => {}
        }
    }
    if buf.starts_with(crate::palfile::GPL_MAGIC) {
        return Some(FormatId::Gpl);
    }
    if layers_version_ok(buf) {
        return Some(FormatId::Layers);
    }
    if looks_like_xml(buf) {
        return Some(FormatId::Svg);
    }
    if buf.len() >= 3 && buf[0] == 0x0A && buf[1] <= 5 && buf[2] == 1 {
        // A TGA with a 10-byte image ID and RLE type can start the same way.
        if extension_of(hint).as_deref() == Some("tga") {
            return Some(FormatId::Tga);
        }
        return Some(FormatId::Pcx);
    }
    if looks_like_tga(buf) {
        return Some(FormatId::Tga);
    }
    if looks_like_txt_palette(buf) {
        return Some(FormatId::TxtPalette);
    }
    if contains(buf, b"/* XPM */") {
        return Some(FormatId::Xpm);
    }
    let line = first_line(buf);
    if !line.is_empty() && !line.iter().any(|&b| (b < 0x20 && b != b'\t') || b == 0x7F) {
        return Some(FormatId::Xbm);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_magics() {
        assert_eq!(detect(b"\x89PNG\r\n\x1a\n....", None), Some(FormatId::Png));
        assert_eq!(detect(b"GIF89a\x01\x00", None), Some(FormatId::Gif));
        assert_eq!(detect(b"BM\x00\x00", None), Some(FormatId::Bmp));
        assert_eq!(detect(b"\x3D\xF3\x13\x14", None), Some(FormatId::Lss16));
        assert_eq!(detect(b"P7\nWIDTH 1\n", None), Some(FormatId::Pam));
    }

    #[test]
    fn pnm_needs_whitespace_after_type() {
        assert_eq!(detect(b"P6\n1 1\n255\n", None), Some(FormatId::Ppm));
        assert_eq!(detect(b"P4 8 1\n", None), Some(FormatId::Pbm));
        // "P9x" is not PNM; line 1 has no control chars, so XBM.
        assert_eq!(detect(b"P9x\n", None), Some(FormatId::Xbm));
    }

    #[test]
    fn layers_version_is_bounded() {
        assert_eq!(detect(b"# mtPaint layers\n1\n", None), Some(FormatId::Layers));
        assert_ne!(detect(b"# mtPaint layers\n2\n", None), Some(FormatId::Layers));
    }

    #[test]
    fn pcx_unless_named_tga() {
        let mut buf = vec![0x0A, 5, 1, 8];
        buf.resize(128, 0);
        assert_eq!(detect(&buf, None), Some(FormatId::Pcx));
        assert_eq!(detect(&buf, Some(Path::new("x.pcx"))), Some(FormatId::Pcx));
        assert_eq!(detect(&buf, Some(Path::new("dir/X.TGA"))), Some(FormatId::Tga));
    }

    #[test]
    fn every_pcx_version_up_to_five() {
        for version in 0..=5 {
            let mut buf = vec![0x0A, version, 1, 8];
            buf.resize(128, 0);
            assert_eq!(detect(&buf, None), Some(FormatId::Pcx), "version {version}");
        }
        let mut buf = vec![0x0A, 6, 1, 8];
        buf.resize(128, 0);
        assert_ne!(detect(&buf, None), Some(FormatId::Pcx));
    }

    #[test]
    fn tga_heuristic() {
        let mut hdr = [0u8; 18];
        hdr[2] = 2;
        hdr[16] = 24;
        assert_eq!(detect(&hdr, None), Some(FormatId::Tga));
        hdr[16] = 7;
        assert_eq!(detect(&hdr, None), None);
    }

    #[test]
    fn text_formats() {
        assert_eq!(detect(b"16\n0,0,0\n", None), Some(FormatId::TxtPalette));
        assert_eq!(detect(b"GIMP Palette\nName: x\n", None), Some(FormatId::Gpl));
        assert_eq!(
            detect(b"#define x_width 8\n/* XPM */", None),
            Some(FormatId::Xpm)
        );
        assert_eq!(detect(b"#define x_width 8\n", None), Some(FormatId::Xbm));
        assert_eq!(detect(b"\x01\x02\x03\n", None), None);
        assert_eq!(detect(b"", None), None);
    }

    #[test]
    fn registry_lookups() {
        assert_eq!(FormatId::from_extension("JPEG"), Some(FormatId::Jpeg));
        assert_eq!(FormatId::from_name("tga"), Some(FormatId::Tga));
        assert_eq!(FormatId::Tiff.extension(), "tif");
        for info in REGISTRY {
            assert_eq!(info.id.info().name, info.name);
        }
    }

    #[test]
    fn save_capability_follows_image_shape() {
        use crate::image::Image;
        use crate::palette::Palette;
        let indexed = Settings::from_image(Image::indexed(1, 1, vec![0]).unwrap(), Palette::grayscale(16));
        let rgb = Settings::from_image(Image::rgb(1, 1, vec![0; 3]).unwrap(), Palette::default());
        assert!(FormatId::Gif.can_save(&indexed));
        assert!(!FormatId::Gif.can_save(&rgb));
        assert!(FormatId::Lss16.can_save(&indexed));
        assert!(!FormatId::Xbm.can_save(&indexed));
        assert!(FormatId::Pgm.can_save(&indexed));
        assert!(!FormatId::Jp2.can_save(&rgb));
    }
}
