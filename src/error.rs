use enough::StopReason;

/// Errors from decoding, encoding, and compositing.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum CodecError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unrecognized format magic bytes")]
    UnrecognizedFormat,

    #[error("invalid header: {0}")]
    InvalidHeader(String),

    #[error("invalid pixel data: {0}")]
    InvalidData(String),

    #[error("unexpected end of input")]
    TruncatedStream,

    #[error(transparent)]
    Dimension(#[from] DimensionError),

    #[error("out of memory allocating {bytes} bytes")]
    OutOfMemory { bytes: usize },

    #[error("unsupported format variant: {0}")]
    UnsupportedVariant(String),

    #[error("{library} failed: {message}")]
    Library {
        library: &'static str,
        message: String,
    },

    #[error("limit exceeded: {0}")]
    LimitExceeded(String),

    #[error("operation cancelled")]
    Cancelled(StopReason),
}

/// Image geometry rejected by the channel allocator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum DimensionError {
    #[error("image dimensions must be non-zero, got {width}x{height}")]
    Zero { width: u32, height: u32 },

    #[error("image is {width}x{height}, the largest supported size is {max_width}x{max_height}")]
    TooLarge {
        width: u32,
        height: u32,
        max_width: u32,
        max_height: u32,
    },

    #[error("{width}x{height} does not match the existing {expected_width}x{expected_height} image")]
    Mismatch {
        width: u32,
        height: u32,
        expected_width: u32,
        expected_height: u32,
    },
}

/// Coarse error classes that collaborators report to the user.
///
/// `OutOfMemory` and `TooLarge` are kept apart so they can be shown as
/// distinct, actionable messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    Io,
    Format,
    TruncatedStream,
    Dimension,
    TooLarge,
    OutOfMemory,
    UnsupportedVariant,
    Library,
    Cancelled,
}

impl CodecError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Io(_) => ErrorKind::Io,
            Self::UnrecognizedFormat | Self::InvalidHeader(_) | Self::InvalidData(_) => {
                ErrorKind::Format
            }
            Self::TruncatedStream => ErrorKind::TruncatedStream,
            Self::Dimension(DimensionError::TooLarge { .. }) => ErrorKind::TooLarge,
            Self::Dimension(_) | Self::LimitExceeded(_) => ErrorKind::Dimension,
            Self::OutOfMemory { .. } => ErrorKind::OutOfMemory,
            Self::UnsupportedVariant(_) => ErrorKind::UnsupportedVariant,
            Self::Library { .. } => ErrorKind::Library,
            Self::Cancelled(_) => ErrorKind::Cancelled,
        }
    }

    pub(crate) fn library(library: &'static str, err: impl core::fmt::Display) -> Self {
        Self::Library {
            library,
            message: err.to_string(),
        }
    }
}

impl From<StopReason> for CodecError {
    fn from(r: StopReason) -> Self {
        CodecError::Cancelled(r)
    }
}

/// Run a third-party codec call, converting any panic that escapes it into
/// [`CodecError::Library`].
#[cfg_attr(
    not(any(feature = "png", feature = "gif", feature = "jpeg", feature = "tiff", feature = "jp2")),
    allow(dead_code)
)]
pub(crate) fn guard<T>(
    library: &'static str,
    f: impl FnOnce() -> Result<T, CodecError>,
) -> Result<T, CodecError> {
    match std::panic::catch_unwind(std::panic::AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| (*s).to_owned())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "panic inside codec".to_owned());
            log::warn!("{library} panicked: {message}");
            Err(CodecError::Library { library, message })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn too_large_has_its_own_kind() {
        let err = CodecError::from(DimensionError::TooLarge {
            width: 20000,
            height: 1,
            max_width: 16384,
            max_height: 16384,
        });
        assert_eq!(err.kind(), ErrorKind::TooLarge);
        assert_eq!(
            CodecError::OutOfMemory { bytes: 1 }.kind(),
            ErrorKind::OutOfMemory
        );
    }

    #[test]
    fn guard_converts_panics() {
        let result: Result<(), _> = guard("testlib", || panic!("boom"));
        match result {
            Err(CodecError::Library { library, message }) => {
                assert_eq!(library, "testlib");
                assert_eq!(message, "boom");
            }
            other => panic!("expected Library error, got {other:?}"),
        }
    }
}
