//! Frame ingestion sources.
//!
//! Camera acquisition belongs to the host integration; this module defines the
//! seam the control loop drives and ships a synthetic source:
//! - `stub://` URLs: deterministic synthetic frames (testing, demos)
//!
//! Sources report failures as `SorterError::Camera`. The control loop reacts
//! by raising the error indicator and calling [`FrameSource::reacquire`].

pub mod synthetic;

pub use synthetic::SyntheticSource;

use crate::error::{Result, SorterError};
use crate::frame::Frame;

/// Something the control loop can pull frames from.
pub trait FrameSource {
    /// Open the capture device.
    fn connect(&mut self) -> Result<()>;

    /// Capture the next frame.
    fn next_frame(&mut self) -> Result<Frame>;

    /// Release and reopen the capture device after a failure.
    fn reacquire(&mut self) -> Result<()> {
        self.release();
        self.connect()
    }

    /// Release the capture device. Must be safe to call more than once.
    fn release(&mut self);

    fn is_healthy(&self) -> bool;

    fn frames_captured(&self) -> u64;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn connect(&mut self) -> Result<()> {
        (**self).connect()
    }

    fn next_frame(&mut self) -> Result<Frame> {
        (**self).next_frame()
    }

    fn reacquire(&mut self) -> Result<()> {
        (**self).reacquire()
    }

    fn release(&mut self) {
        (**self).release()
    }

    fn is_healthy(&self) -> bool {
        (**self).is_healthy()
    }

    fn frames_captured(&self) -> u64 {
        (**self).frames_captured()
    }
}

/// Configuration for opening a frame source by URL.
#[derive(Clone, Debug)]
pub struct SourceConfig {
    pub url: String,
    pub width: u32,
    pub height: u32,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            url: "stub://camera".to_string(),
            width: 640,
            height: 480,
        }
    }
}

/// Open a source by URL scheme.
pub fn open_source(config: SourceConfig) -> Result<Box<dyn FrameSource>> {
    if config.url.starts_with("stub://") {
        return Ok(Box::new(SyntheticSource::new(config)));
    }
    Err(SorterError::Camera(format!(
        "unsupported frame source '{}'; only stub:// sources are built in",
        config.url
    )))
}
