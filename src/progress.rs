//! Row progress reporting and cancellation.

use enough::Stop;

use crate::error::CodecError;

/// Progress callback: `(rows_done, rows_total)`.
pub type ProgressFn<'a> = &'a dyn Fn(u32, u32);

/// Rows between two progress callbacks.
const REPORT_EVERY: u32 = 16;

/// Tracks row progress for one decode/encode pass.
///
/// The stop token is polled on every row, so a cancellation request is
/// honored within one row of work.
pub(crate) struct Progress<'a> {
    stop: &'a dyn Stop,
    callback: Option<ProgressFn<'a>>,
    silent: bool,
    total: u32,
}

impl<'a> Progress<'a> {
    pub(crate) fn new(stop: &'a dyn Stop, callback: Option<ProgressFn<'a>>) -> Self {
        Self {
            stop,
            callback,
            silent: false,
            total: 0,
        }
    }

    /// Apply the silence policy returned by the channel allocator.
    pub(crate) fn set_silent(&mut self, silent: bool) {
        self.silent |= silent;
    }

    pub(crate) fn start(&mut self, total: u32) {
        self.total = total;
        if !self.silent {
            if let Some(cb) = self.callback {
                cb(0, total);
            }
        }
    }

    /// Poll for cancellation and report every few rows.
    pub(crate) fn row(&self, done: u32) -> Result<(), CodecError> {
        self.stop.check()?;
        if !self.silent && done % REPORT_EVERY == 0 {
            if let Some(cb) = self.callback {
                cb(done, self.total);
            }
        }
        Ok(())
    }

    pub(crate) fn check(&self) -> Result<(), CodecError> {
        self.stop.check()?;
        Ok(())
    }

    pub(crate) fn finish(&self) {
        if !self.silent {
            if let Some(cb) = self.callback {
                cb(self.total, self.total);
            }
        }
    }
}
