//! Captured frames handed from the frame source to the detector.

use std::time::Instant;

/// One captured RGB frame.
///
/// The sorter core never looks at pixels; frames only travel from a
/// [`FrameSource`](crate::ingest::FrameSource) to a
/// [`Detector`](crate::detect::Detector).
#[derive(Debug)]
pub struct Frame {
    pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Sequence number assigned by the source, starting at 1.
    pub index: u64,
    pub captured_at: Instant,
}

impl Frame {
    pub fn new(pixels: Vec<u8>, width: u32, height: u32, index: u64) -> Self {
        Self {
            pixels,
            width,
            height,
            index,
            captured_at: Instant::now(),
        }
    }

    /// All-black frame of the given size.
    pub fn blank(width: u32, height: u32, index: u64) -> Self {
        Self::new(vec![0u8; rgb_len(width, height)], width, height, index)
    }

    /// Packed RGB bytes, row-major.
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }
}

pub(crate) fn rgb_len(width: u32, height: u32) -> usize {
    width as usize * height as usize * 3
}
