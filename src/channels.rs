//! Channel allocation for decoders.
//!
//! Drivers call [`allocate`] as they learn about the image, sometimes more
//! than once (palette first, then geometry, then an alpha channel found mid
//! stream). Channels that already exist are left alone. A failure part way
//! through keeps whatever was allocated before it; the caller drops the
//! whole image if the decode as a whole fails.

use crate::error::{CodecError, DimensionError};
use crate::image::{Channel, ChannelMask, Image};
use crate::limits::Limits;

/// What a load is for; decides which channels may be allocated.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[non_exhaustive]
pub enum LoadMode {
    /// Replace the current image.
    #[default]
    Image,
    /// Replace the current image, keeping the old one for undo.
    Undo,
    /// Add the file as a new layer.
    Layer,
    /// Import into the clipboard.
    Clipboard,
    /// Read only the palette.
    Palette,
    /// Replace one channel of an existing image of the given size.
    Channel {
        channel: Channel,
        width: u32,
        height: u32,
    },
    /// Import a pattern set (indexed image data only).
    Pattern,
}

impl LoadMode {
    pub fn palette_only(self) -> bool {
        matches!(self, LoadMode::Palette)
    }

    /// Channels this mode may allocate, given what the driver asked for.
    pub fn reduce(self, requested: ChannelMask) -> ChannelMask {
        match self {
            LoadMode::Image | LoadMode::Undo | LoadMode::Layer => requested,
            LoadMode::Clipboard if requested.is_empty() => ChannelMask::NONE,
            LoadMode::Clipboard => ChannelMask::ALL,
            LoadMode::Palette => ChannelMask::NONE,
            LoadMode::Channel { .. } | LoadMode::Pattern => {
                requested.intersect(ChannelMask::IMAGE)
            }
        }
    }
}

/// Outcome of an allocation request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Allocation {
    /// Channels present after the call.
    pub channels: ChannelMask,
    /// Small images load without progress reports; callers pass this on.
    pub silent: bool,
}

/// A request for backing storage.
#[derive(Clone, Copy, Debug)]
pub struct AllocRequest {
    pub mode: LoadMode,
    pub width: u32,
    pub height: u32,
    pub bpp: u8,
    pub channels: ChannelMask,
}

/// Reserve channel buffers in `image` for `req`.
pub fn allocate(
    image: &mut Image,
    req: &AllocRequest,
    limits: &Limits,
) -> Result<Allocation, CodecError> {
    limits.check(req.width, req.height)?;
    if req.bpp != 1 && req.bpp != 3 {
        return Err(CodecError::UnsupportedVariant(format!(
            "{} bytes per pixel",
            req.bpp
        )));
    }

    if let LoadMode::Channel { width, height, .. } = req.mode {
        if (width, height) != (req.width, req.height) {
            return Err(DimensionError::Mismatch {
                width: req.width,
                height: req.height,
                expected_width: width,
                expected_height: height,
            }
            .into());
        }
    }

    let wanted = req.mode.reduce(req.channels);
    let silent = limits.is_silent(req.width, req.height);

    if image.present().is_empty() {
        image.reshape(req.width, req.height, req.bpp);
    } else if (image.width(), image.height()) != (req.width, req.height)
        || (wanted.contains(Channel::Image) && image.has(Channel::Image) && image.bpp() != req.bpp)
    {
        return Err(DimensionError::Mismatch {
            width: req.width,
            height: req.height,
            expected_width: image.width(),
            expected_height: image.height(),
        }
        .into());
    }

    for channel in wanted.difference(image.present()).iter() {
        // Channels the driver will not write start opaque and fully selected.
        let fill = if channel == Channel::Image || req.channels.contains(channel) {
            0
        } else {
            255
        };
        let bytes = image.channel_len(channel);
        limits.check_memory(bytes)?;
        let mut buf: Vec<u8> = Vec::new();
        buf.try_reserve_exact(bytes)
            .map_err(|_| CodecError::OutOfMemory { bytes })?;
        buf.resize(bytes, fill);
        image.set_channel(channel, buf)?;
    }

    Ok(Allocation {
        channels: image.present(),
        silent,
    })
}
