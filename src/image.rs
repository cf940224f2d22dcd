//! Multi-channel image buffers.

use crate::error::CodecError;
use crate::palette::{Palette, RGB8};

/// One of the four parallel planes of an image.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Channel {
    /// Color data: palette indices (bpp 1) or packed RGB (bpp 3).
    Image,
    Alpha,
    Selection,
    Mask,
}

impl Channel {
    pub const ALL: [Channel; 4] = [
        Channel::Image,
        Channel::Alpha,
        Channel::Selection,
        Channel::Mask,
    ];

    const fn index(self) -> usize {
        match self {
            Channel::Image => 0,
            Channel::Alpha => 1,
            Channel::Selection => 2,
            Channel::Mask => 3,
        }
    }

    const fn bit(self) -> u8 {
        1 << self.index()
    }
}

/// Set of channels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct ChannelMask(u8);

impl ChannelMask {
    pub const NONE: Self = Self(0);
    pub const IMAGE: Self = Self(Channel::Image.bit());
    pub const ALPHA: Self = Self(Channel::Alpha.bit());
    pub const SELECTION: Self = Self(Channel::Selection.bit());
    pub const MASK: Self = Self(Channel::Mask.bit());
    pub const ALL: Self = Self(0b1111);

    pub const fn of(channel: Channel) -> Self {
        Self(channel.bit())
    }

    pub const fn contains(self, channel: Channel) -> bool {
        self.0 & channel.bit() != 0
    }

    pub const fn with(self, channel: Channel) -> Self {
        Self(self.0 | channel.bit())
    }

    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    pub const fn intersect(self, other: Self) -> Self {
        Self(self.0 & other.0)
    }

    pub const fn difference(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn iter(self) -> impl Iterator<Item = Channel> {
        Channel::ALL.into_iter().filter(move |&c| self.contains(c))
    }
}

/// Up to four same-sized channel buffers.
///
/// The image channel holds `width * height * bpp` bytes; alpha, selection
/// and mask always hold one byte per pixel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Image {
    width: u32,
    height: u32,
    bpp: u8,
    channels: [Option<Vec<u8>>; 4],
}

impl Image {
    /// Empty image geometry with no channels yet.
    pub fn new(width: u32, height: u32, bpp: u8) -> Self {
        Self {
            width,
            height,
            bpp,
            channels: Default::default(),
        }
    }

    /// Indexed image from palette indices.
    pub fn indexed(width: u32, height: u32, indices: Vec<u8>) -> Result<Self, CodecError> {
        let mut img = Self::new(width, height, 1);
        img.set_channel(Channel::Image, indices)?;
        Ok(img)
    }

    /// RGB image from packed `r, g, b` bytes.
    pub fn rgb(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self, CodecError> {
        let mut img = Self::new(width, height, 3);
        img.set_channel(Channel::Image, pixels)?;
        Ok(img)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Bytes per image-channel sample: 1 (indexed) or 3 (RGB).
    pub fn bpp(&self) -> u8 {
        self.bpp
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn bytes_per_sample(&self, channel: Channel) -> usize {
        match channel {
            Channel::Image => usize::from(self.bpp),
            _ => 1,
        }
    }

    pub fn channel_len(&self, channel: Channel) -> usize {
        self.pixel_count() * self.bytes_per_sample(channel)
    }

    pub fn has(&self, channel: Channel) -> bool {
        self.channels[channel.index()].is_some()
    }

    /// Channels currently present.
    pub fn present(&self) -> ChannelMask {
        Channel::ALL
            .into_iter()
            .filter(|&c| self.has(c))
            .fold(ChannelMask::NONE, ChannelMask::with)
    }

    pub fn channel(&self, channel: Channel) -> Option<&[u8]> {
        self.channels[channel.index()].as_deref()
    }

    pub fn channel_mut(&mut self, channel: Channel) -> Option<&mut [u8]> {
        self.channels[channel.index()].as_deref_mut()
    }

    /// Remove and return a channel buffer.
    pub fn take_channel(&mut self, channel: Channel) -> Option<Vec<u8>> {
        self.channels[channel.index()].take()
    }

    /// Install a channel buffer, checking its length against the geometry.
    pub fn set_channel(&mut self, channel: Channel, data: Vec<u8>) -> Result<(), CodecError> {
        let expected = self.channel_len(channel);
        if data.len() != expected {
            return Err(CodecError::InvalidData(format!(
                "{channel:?} channel holds {} bytes, expected {expected}",
                data.len()
            )));
        }
        self.channels[channel.index()] = Some(data);
        Ok(())
    }

    /// Change geometry. Only valid while no channel is allocated.
    pub(crate) fn reshape(&mut self, width: u32, height: u32, bpp: u8) {
        debug_assert!(self.present().is_empty());
        self.width = width;
        self.height = height;
        self.bpp = bpp;
    }

    /// RGB color of pixel `i` of the image channel.
    pub fn rgb_at(&self, palette: &Palette, i: usize) -> RGB8 {
        let Some(img) = self.channel(Channel::Image) else {
            return RGB8::default();
        };
        if self.bpp == 3 {
            RGB8::new(img[i * 3], img[i * 3 + 1], img[i * 3 + 2])
        } else {
            palette.color(img[i])
        }
    }

    /// Packed RGBA rendering (transparent index and alpha channel applied).
    pub fn to_rgba(&self, palette: &Palette) -> Vec<u8> {
        let n = self.pixel_count();
        let mut out = Vec::with_capacity(n * 4);
        let img = self.channel(Channel::Image);
        let alpha = self.channel(Channel::Alpha);
        for i in 0..n {
            let c = self.rgb_at(palette, i);
            let mut a = alpha.map_or(255, |a| a[i]);
            if self.bpp == 1 {
                if let (Some(img), Some(t)) = (img, palette.transparent()) {
                    if img[i] == t {
                        a = 0;
                    }
                }
            }
            out.extend_from_slice(&[c.r, c.g, c.b, a]);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_lengths_follow_bpp() {
        let mut img = Image::new(4, 2, 3);
        assert_eq!(img.channel_len(Channel::Image), 24);
        assert_eq!(img.channel_len(Channel::Alpha), 8);
        assert!(img.set_channel(Channel::Alpha, vec![0; 24]).is_err());
        img.set_channel(Channel::Alpha, vec![0; 8]).unwrap();
        assert_eq!(img.present(), ChannelMask::ALPHA);
    }

    #[test]
    fn rgba_honors_transparent_index() {
        let mut pal = Palette::mono();
        pal.set_transparent(Some(0)).unwrap();
        let img = Image::indexed(2, 1, vec![0, 1]).unwrap();
        assert_eq!(img.to_rgba(&pal), [0, 0, 0, 0, 255, 255, 255, 255]);
    }
}
