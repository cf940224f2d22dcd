//! Windows and OS/2 bitmaps.

mod decode;
mod encode;
mod utils;

pub(crate) use decode::load;
pub(crate) use encode::save;
