//! Frame-by-frame playback into display buffers.

use super::Frameset;

/// Two-slot ring of owned buffers.
///
/// The buffer pushed at step N stays owned by the ring until the buffer for
/// step N+2 arrives; that push hands it back. A consumer may keep reading
/// the previous buffer while the current one is being shown.
#[derive(Clone, Debug)]
pub struct SlotRing<T> {
    slots: [Option<T>; 2],
    next: usize,
}

impl<T> Default for SlotRing<T> {
    fn default() -> Self {
        Self {
            slots: [None, None],
            next: 0,
        }
    }
}

impl<T> SlotRing<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `item` as the current buffer, returning the one from two
    /// pushes ago.
    pub fn push(&mut self, item: T) -> Option<T> {
        let released = self.slots[self.next].replace(item);
        self.next ^= 1;
        released
    }

    /// Most recently pushed buffer.
    pub fn current(&self) -> Option<&T> {
        self.slots[self.next ^ 1].as_ref()
    }

    /// Buffer pushed before the current one.
    pub fn previous(&self) -> Option<&T> {
        self.slots[self.next].as_ref()
    }

    /// Release both slots.
    pub fn clear(&mut self) -> [Option<T>; 2] {
        self.next = 0;
        [self.slots[0].take(), self.slots[1].take()]
    }
}

/// One displayed frame.
#[derive(Clone, Copy, Debug)]
pub struct PlaybackFrame<'a> {
    pub index: usize,
    /// Packed RGBA, canvas sized for composited framesets.
    pub rgba: &'a [u8],
    pub width: u32,
    pub height: u32,
    /// Hundredths of a second.
    pub delay: u16,
}

/// Steps through a (composited) frameset, rendering each frame to RGBA.
pub struct Playback<'f> {
    frames: &'f Frameset,
    position: usize,
    looping: bool,
    ring: SlotRing<Vec<u8>>,
}

impl<'f> Playback<'f> {
    pub fn new(frames: &'f Frameset, looping: bool) -> Self {
        Self {
            frames,
            position: 0,
            looping,
            ring: SlotRing::new(),
        }
    }

    /// Render the next frame. Returns `None` at the end unless looping.
    pub fn advance(&mut self) -> Option<PlaybackFrame<'_>> {
        if self.position >= self.frames.len() {
            if !self.looping || self.frames.is_empty() {
                return None;
            }
            self.position = 0;
        }
        let index = self.position;
        let frames = self.frames;
        let frame = &frames.frames[index];
        // The buffer from two frames back is no longer on screen.
        drop(self.ring.push(frame.to_rgba(frames.palette.as_ref())));
        self.position += 1;
        let rgba = self.ring.current()?;
        Some(PlaybackFrame {
            index,
            rgba,
            width: frame.image.width(),
            height: frame.image.height(),
            delay: frame.delay,
        })
    }

    /// Buffer shown before the current one, still valid for readers.
    pub fn previous(&self) -> Option<&[u8]> {
        self.ring.previous().map(Vec::as_slice)
    }

    pub fn rewind(&mut self) {
        self.position = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::animation::Frame;
    use crate::image::Image;

    #[test]
    fn ring_releases_two_steps_back() {
        let mut ring = SlotRing::new();
        assert_eq!(ring.push(1), None);
        assert_eq!(ring.push(2), None);
        assert_eq!(ring.current(), Some(&2));
        assert_eq!(ring.previous(), Some(&1));
        assert_eq!(ring.push(3), Some(1));
        assert_eq!(ring.push(4), Some(2));
        assert_eq!(ring.clear(), [Some(3), Some(4)]);
        assert_eq!(ring.current(), None);
    }

    #[test]
    fn playback_loops() {
        let mut set = Frameset::new(1, 1);
        for i in 0..2u8 {
            let mut f = Frame::new(Image::indexed(1, 1, vec![i]).unwrap());
            f.delay = 5;
            set.frames.push(f);
        }
        let mut p = Playback::new(&set, true);
        assert_eq!(p.advance().unwrap().rgba, [0, 0, 0, 255]);
        assert_eq!(p.advance().unwrap().rgba, [255, 255, 255, 255]);
        assert_eq!(p.previous(), Some(&[0, 0, 0, 255][..]));
        assert_eq!(p.advance().unwrap().index, 0);

        let mut once = Playback::new(&set, false);
        assert!(once.advance().is_some());
        assert!(once.advance().is_some());
        assert!(once.advance().is_none());
    }
}
