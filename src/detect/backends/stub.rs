use crate::detect::backend::Detector;
use crate::detect::result::Detection;
use crate::error::Result;
use crate::frame::Frame;

/// Empty frames between objects in the demo script.
const DEMO_GAP_FRAMES: usize = 4;

/// Stub backend for testing. Replays a fixed script of per-frame detections,
/// looping forever.
pub struct StubDetector {
    script: Vec<Vec<Detection>>,
    cursor: usize,
}

impl StubDetector {
    pub fn new(script: Vec<Vec<Detection>>) -> Self {
        Self { script, cursor: 0 }
    }

    /// Each category held in view for `samples` frames, followed by a few
    /// empty frames, in order.
    pub fn demo<S: AsRef<str>>(categories: &[S], samples: usize) -> Self {
        let mut script = Vec::new();
        for category in categories {
            for _ in 0..samples {
                script.push(vec![Detection::new(category.as_ref(), 0.9)]);
            }
            script.extend(std::iter::repeat_with(Vec::new).take(DEMO_GAP_FRAMES));
        }
        Self::new(script)
    }
}

impl Detector for StubDetector {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn detect(&mut self, _frame: &Frame) -> Result<Vec<Detection>> {
        if self.script.is_empty() {
            return Ok(Vec::new());
        }
        let detections = self.script[self.cursor].clone();
        self.cursor = (self.cursor + 1) % self.script.len();
        Ok(detections)
    }
}
