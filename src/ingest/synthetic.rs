use std::time::{Duration, Instant};

use super::{FrameSource, SourceConfig};
use crate::error::{Result, SorterError};
use crate::frame::{rgb_len, Frame};

/// Roughly a 30 fps camera.
const DEFAULT_FRAME_INTERVAL: Duration = Duration::from_millis(33);

/// Synthetic source (`stub://`). Produces a slowly shifting gradient at the
/// configured resolution, paced like a real camera.
pub struct SyntheticSource {
    config: SourceConfig,
    connected: bool,
    frame_count: u64,
    frame_interval: Duration,
    last_frame: Option<Instant>,
}

impl SyntheticSource {
    pub fn new(config: SourceConfig) -> Self {
        Self {
            config,
            connected: false,
            frame_count: 0,
            frame_interval: DEFAULT_FRAME_INTERVAL,
            last_frame: None,
        }
    }

    /// Minimum time between frames. Zero disables pacing.
    pub fn with_frame_interval(mut self, interval: Duration) -> Self {
        self.frame_interval = interval;
        self
    }

    fn pace(&mut self) {
        if let Some(last) = self.last_frame {
            let elapsed = last.elapsed();
            if elapsed < self.frame_interval {
                std::thread::sleep(self.frame_interval - elapsed);
            }
        }
        self.last_frame = Some(Instant::now());
    }

    fn generate_pixels(&self) -> Vec<u8> {
        let mut pixels = vec![0u8; rgb_len(self.config.width, self.config.height)];
        for (i, pixel) in pixels.iter_mut().enumerate() {
            *pixel = ((i as u64 + self.frame_count) % 256) as u8;
        }
        pixels
    }
}

impl FrameSource for SyntheticSource {
    fn connect(&mut self) -> Result<()> {
        log::info!(
            "SyntheticSource: connected to {} ({}x{})",
            self.config.url,
            self.config.width,
            self.config.height
        );
        self.connected = true;
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Frame> {
        if !self.connected {
            return Err(SorterError::Camera(format!(
                "{} is not connected",
                self.config.url
            )));
        }
        self.pace();
        self.frame_count += 1;
        Ok(Frame::new(
            self.generate_pixels(),
            self.config.width,
            self.config.height,
            self.frame_count,
        ))
    }

    fn release(&mut self) {
        if self.connected {
            log::info!("SyntheticSource: released {}", self.config.url);
        }
        self.connected = false;
    }

    fn is_healthy(&self) -> bool {
        self.connected
    }

    fn frames_captured(&self) -> u64 {
        self.frame_count
    }
}
