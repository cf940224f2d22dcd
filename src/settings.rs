//! The per-call transport record between callers and format drivers.

use crate::channels::{self, AllocRequest, Allocation, LoadMode};
use crate::error::CodecError;
use crate::format::FormatId;
use crate::image::{Channel, ChannelMask, Image};
use crate::limits::Limits;
use crate::palette::{Palette, RGB8};
use crate::progress::Progress;

/// Everything one decode produces, or one encode consumes.
///
/// Built fresh for every call and handed to exactly one driver. On load the
/// driver fills it in; on save it is read-only input.
#[derive(Clone, Debug)]
pub struct Settings {
    /// Destination semantics of the load that produced this record.
    pub mode: LoadMode,
    /// Format the data was decoded from, if any.
    pub format: Option<FormatId>,
    pub image: Image,
    pub palette: Palette,
    /// Color-key transparency for RGB images.
    pub rgb_transparent: Option<RGB8>,
    /// Cursor hotspot (XBM, XPM).
    pub hotspot: Option<(u32, u32)>,
    /// Frame delay in hundredths of a second (GIF).
    pub gif_delay: u16,
    /// JPEG quality, 1..=100.
    pub jpeg_quality: u8,
    /// PNG deflate level, 0..=9.
    pub png_compression: u8,
    /// Write TGA with RLE packets.
    pub tga_rle: bool,
    /// Write indexed BMP with RLE4/RLE8 compression.
    pub bmp_rle: bool,
    /// Embedded ICC profile, carried through untouched.
    pub icc_profile: Option<Vec<u8>>,
    /// No progress reports for this image.
    pub silent: bool,
    /// The file held further frames that a single-image load skipped.
    pub has_more_frames: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self::new(LoadMode::Image)
    }
}

impl Settings {
    pub fn new(mode: LoadMode) -> Self {
        Self {
            mode,
            format: None,
            image: Image::new(0, 0, 1),
            palette: Palette::default(),
            rgb_transparent: None,
            hotspot: None,
            gif_delay: 0,
            jpeg_quality: 85,
            png_compression: 9,
            tga_rle: false,
            bmp_rle: false,
            icc_profile: None,
            silent: false,
            has_more_frames: false,
        }
    }

    /// Wrap an existing image for saving.
    pub fn from_image(image: Image, palette: Palette) -> Self {
        Self {
            image,
            palette,
            ..Self::default()
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn bpp(&self) -> u8 {
        self.image.bpp()
    }

    /// The transparent palette index, if the image is indexed and has one.
    pub fn transparent_index(&self) -> Option<u8> {
        if self.bpp() == 1 {
            self.palette.transparent()
        } else {
            None
        }
    }

    /// Reserve channels through the allocator, recording the silent policy.
    pub(crate) fn allocate(
        &mut self,
        width: u32,
        height: u32,
        bpp: u8,
        channels: ChannelMask,
        limits: &Limits,
    ) -> Result<Allocation, CodecError> {
        let req = AllocRequest {
            mode: self.mode,
            width,
            height,
            bpp,
            channels,
        };
        let alloc = channels::allocate(&mut self.image, &req, limits)?;
        self.silent |= alloc.silent;
        Ok(alloc)
    }

    /// Allocate channels and arm row progress for `height` rows.
    pub(crate) fn begin(
        &mut self,
        width: u32,
        height: u32,
        bpp: u8,
        channels: ChannelMask,
        limits: &Limits,
        progress: &mut Progress<'_>,
    ) -> Result<(), CodecError> {
        self.allocate(width, height, bpp, channels, limits)?;
        progress.set_silent(self.silent);
        progress.start(height);
        Ok(())
    }

    /// Image channel, which drivers can rely on after a successful
    /// [`allocate`](Self::allocate) outside palette mode.
    pub(crate) fn pixels_mut(&mut self) -> Result<&mut [u8], CodecError> {
        self.image
            .channel_mut(Channel::Image)
            .ok_or_else(|| CodecError::InvalidData("image channel was not allocated".into()))
    }

    /// Add an alpha channel mid-decode, if the load mode allows one.
    pub(crate) fn add_alpha(&mut self, limits: &Limits) -> Result<Option<&mut [u8]>, CodecError> {
        let (w, h, bpp) = (self.width(), self.height(), self.bpp());
        self.allocate(w, h, bpp, ChannelMask::ALPHA, limits)?;
        Ok(self.image.channel_mut(Channel::Alpha))
    }

    /// Drop the alpha channel if every sample is fully opaque. Clipboard
    /// loads keep the whole channel group.
    pub(crate) fn drop_opaque_alpha(&mut self) {
        if self.mode == LoadMode::Clipboard {
            return;
        }
        if let Some(alpha) = self.image.channel(Channel::Alpha) {
            if alpha.iter().all(|&a| a == 255) {
                self.image.take_channel(Channel::Alpha);
            }
        }
    }

    /// Like [`drop_opaque_alpha`](Self::drop_opaque_alpha), but an all-zero
    /// channel is also read as opaque. Only for formats where the fourth
    /// byte may be padding (BMP without an alpha mask, TGA without
    /// attribute bits).
    pub(crate) fn drop_padding_alpha(&mut self) {
        if let Some(alpha) = self.image.channel_mut(Channel::Alpha) {
            if alpha.iter().all(|&a| a == 0) {
                alpha.fill(255);
            }
        }
        self.drop_opaque_alpha();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocation_records_silence() {
        let mut s = Settings::new(LoadMode::Image);
        s.allocate(8, 8, 3, ChannelMask::IMAGE, &Limits::default())
            .unwrap();
        assert!(s.silent);
        assert_eq!(s.pixels_mut().unwrap().len(), 8 * 8 * 3);
    }

    #[test]
    fn alpha_is_refused_in_pattern_mode() {
        let mut s = Settings::new(LoadMode::Pattern);
        s.allocate(4, 4, 1, ChannelMask::IMAGE, &Limits::default())
            .unwrap();
        assert!(s.add_alpha(&Limits::default()).unwrap().is_none());
    }

    #[test]
    fn zero_alpha_is_kept_unless_it_is_padding() {
        let mut s = Settings::new(LoadMode::Image);
        s.allocate(2, 2, 3, ChannelMask::IMAGE.with(Channel::Alpha), &Limits::default())
            .unwrap();
        s.drop_opaque_alpha();
        assert_eq!(s.image.channel(Channel::Alpha), Some(&[0u8; 4][..]));
        s.drop_padding_alpha();
        assert!(!s.image.has(Channel::Alpha));
    }

    #[test]
    fn clipboard_keeps_an_opaque_alpha() {
        let mut s = Settings::new(LoadMode::Clipboard);
        s.allocate(2, 1, 1, ChannelMask::IMAGE, &Limits::default())
            .unwrap();
        s.drop_padding_alpha();
        assert_eq!(s.image.channel(Channel::Alpha), Some(&[255u8, 255][..]));
        assert_eq!(s.image.channel(Channel::Selection), Some(&[255u8, 255][..]));
    }
}
