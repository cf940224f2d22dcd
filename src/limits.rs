use crate::error::{CodecError, DimensionError};

/// Hard ceiling on image width.
pub const MAX_WIDTH: u32 = 16384;
/// Hard ceiling on image height.
pub const MAX_HEIGHT: u32 = 16384;
/// Images with at most this many pixels load without progress reports.
pub const PROGRESS_THRESHOLD: u64 = 1024 * 1024;

/// Resource limits for load/save operations.
#[derive(Clone, Debug)]
pub struct Limits {
    pub max_width: u32,
    pub max_height: u32,
    /// Maximum pixel count (width * height).
    pub max_pixels: Option<u64>,
    /// Maximum bytes for any single channel allocation.
    pub max_memory_bytes: Option<u64>,
    /// Pixel count at or below which progress reporting is suppressed.
    pub progress_threshold: u64,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_width: MAX_WIDTH,
            max_height: MAX_HEIGHT,
            max_pixels: None,
            max_memory_bytes: None,
            progress_threshold: PROGRESS_THRESHOLD,
        }
    }
}

impl Limits {
    /// Check dimensions against limits.
    pub(crate) fn check(&self, width: u32, height: u32) -> Result<(), CodecError> {
        if width == 0 || height == 0 {
            return Err(DimensionError::Zero { width, height }.into());
        }
        let max_width = self.max_width.min(MAX_WIDTH);
        let max_height = self.max_height.min(MAX_HEIGHT);
        if width > max_width || height > max_height {
            return Err(DimensionError::TooLarge {
                width,
                height,
                max_width,
                max_height,
            }
            .into());
        }
        if let Some(max_px) = self.max_pixels {
            let pixels = u64::from(width) * u64::from(height);
            if pixels > max_px {
                return Err(CodecError::LimitExceeded(format!(
                    "pixel count {pixels} exceeds limit {max_px}"
                )));
            }
        }
        Ok(())
    }

    /// Check that an allocation size is within memory limits.
    pub(crate) fn check_memory(&self, bytes: usize) -> Result<(), CodecError> {
        if let Some(max_mem) = self.max_memory_bytes {
            if bytes as u64 > max_mem {
                return Err(CodecError::LimitExceeded(format!(
                    "allocation {bytes} bytes exceeds memory limit {max_mem}"
                )));
            }
        }
        Ok(())
    }

    /// Whether an image of this size is small enough to load silently.
    pub(crate) fn is_silent(&self, width: u32, height: u32) -> bool {
        u64::from(width) * u64::from(height) <= self.progress_threshold
    }
}
