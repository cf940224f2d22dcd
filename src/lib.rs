//! # zenraster
//!
//! Raster image loading and saving across a dozen formats, plus a frame
//! compositor for animated files.
//!
//! Every load produces a [`Settings`] record: an [`Image`] of up to four
//! parallel channels (image, alpha, selection, mask), a [`Palette`] for
//! indexed images, and per-format tags such as the GIF delay or the
//! XBM hotspot. Every save consumes one.
//!
//! ## Supported Formats
//!
//! ### Hand-written codecs (always available)
//! - **BMP**: 1/2/4/8/16/24/32 bpp, RLE4/RLE8, bitfields, OS/2 and V4/V5 headers
//! - **PNM**: P1-P6 plain and raw, P7 PAM with alpha tuple types
//! - **TGA**: color-mapped, true-color and gray, raw or RLE
//! - **PCX**: 1-8 bit, 1-4 planes, EGA and VGA palettes
//! - **XPM**, **XBM**, **LSS16** (syslinux splash)
//! - Palette files: GIMP `.gpl` and a plain-text list
//!
//! ### Library-backed codecs (cargo features)
//! - **PNG** (`png`), **GIF** (`gif`, including all animation frames),
//!   **JPEG** (`jpeg`), **TIFF** (`tiff`): on by default
//! - **JPEG 2000** (`jp2`): decode only, off by default
//!
//! A format whose feature is disabled is still detected; loading it fails
//! with [`CodecError::UnsupportedVariant`].
//!
//! ## Animation
//!
//! [`load_frameset`] returns the frames of an animated GIF either raw or
//! run through the [`Compositor`], which applies each frame's disposal
//! method and merges palettes, falling back to RGB when the colors of two
//! frames no longer fit one palette. [`explode_frames`] writes the
//! composited frames to numbered files.
//!
//! ## Credits
//!
//! The BMP bitfield scaling and the PNM header parser draw from
//! [zune-image](https://github.com/etemesi254/zune-image) by Caleb Etemesi
//! (MIT/Apache-2.0/Zlib licensed).
//!
//! ## Usage
//!
//! ```no_run
//! use std::path::Path;
//! use zenraster::{Destination, FormatId, LoadMode, LoadRequest, SaveRequest, Source};
//! use enough::Unstoppable;
//!
//! let settings = LoadRequest::new(Source::Path(Path::new("in.pcx")))
//!     .with_mode(LoadMode::Image)
//!     .load(Unstoppable)?;
//! println!("{}x{}, {} colors", settings.width(), settings.height(), settings.palette.len());
//!
//! SaveRequest::new()
//!     .with_format(FormatId::Tga)
//!     .save(Destination::Path(Path::new("out.tga")), &settings, Unstoppable)?;
//! # Ok::<(), zenraster::CodecError>(())
//! ```

#![forbid(unsafe_code)]

mod bits;
mod channels;
mod error;
mod format;
mod image;
mod limits;
mod load;
mod palette;
mod progress;
mod reader;
mod settings;

pub mod animation;
pub mod rle;

mod bmp;
mod lss16;
mod palfile;
mod pcx;
mod pnm;
mod tga;
mod xbm;
mod xpm;

#[cfg(feature = "gif")]
mod gif;
#[cfg(feature = "jp2")]
mod jp2;
#[cfg(feature = "jpeg")]
mod jpeg;
#[cfg(feature = "png")]
mod png;
#[cfg(feature = "tiff")]
mod tiff;

// Re-exports
pub use animation::{
    Compositor, Disposal, ExplodeReport, ExplodeRequest, Frame, Frameset, FramesetMode, Playback,
    Rect, explode_frames,
};
pub use bits::{BitOrder, pack, unpack, unpack_into};
pub use channels::{AllocRequest, Allocation, LoadMode, allocate};
pub use enough::{Stop, Unstoppable};
pub use error::{CodecError, DimensionError, ErrorKind};
pub use format::{FormatCaps, FormatId, FormatInfo, LAYERS_VERSION, REGISTRY, detect};
pub use image::{Channel, ChannelMask, Image};
pub use limits::{Limits, MAX_HEIGHT, MAX_WIDTH, PROGRESS_THRESHOLD};
pub use load::{
    Destination, FramesetRequest, LoadRequest, SaveRequest, Source, load, load_frameset, save,
    save_frameset,
};
pub use palette::{Palette, RGB8};
pub use progress::ProgressFn;
pub use settings::Settings;
