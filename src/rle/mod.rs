//! Run-length codecs shared by the format drivers.
//!
//! Each codec converts between a compressed byte stream and a flat sample
//! array. They know nothing about file headers; drivers hand them the
//! payload and the geometry.

pub mod bmp;
pub mod gif;
pub mod pcx;
pub mod tga;
