#![cfg(feature = "detect-remote")]

use std::time::Duration;

use crate::detect::backend::Detector;
use crate::detect::result::Detection;
use crate::error::{Result, SorterError};
use crate::frame::Frame;

/// Remote inference backend.
///
/// POSTs the raw RGB frame to an inference server and expects a JSON array of
/// detections back. Frame dimensions travel in `X-Frame-Width` and
/// `X-Frame-Height` headers.
pub struct RemoteDetector {
    url: String,
    agent: ureq::Agent,
}

impl RemoteDetector {
    pub fn new(url: &str, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        Self {
            url: url.to_string(),
            agent,
        }
    }
}

impl Detector for RemoteDetector {
    fn name(&self) -> &'static str {
        "remote"
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        let response = self
            .agent
            .post(&self.url)
            .set("Content-Type", "application/octet-stream")
            .set("X-Frame-Width", &frame.width.to_string())
            .set("X-Frame-Height", &frame.height.to_string())
            .send_bytes(frame.pixels())
            .map_err(|e| SorterError::Detector(format!("inference request failed: {}", e)))?;
        let body = response
            .into_string()
            .map_err(|e| SorterError::Detector(format!("inference response unreadable: {}", e)))?;
        serde_json::from_str(&body)
            .map_err(|e| SorterError::Detector(format!("inference response invalid: {}", e)))
    }
}
