use std::io::BufRead;

use crate::detect::backend::Detector;
use crate::detect::result::Detection;
use crate::error::{Result, SorterError};
use crate::frame::Frame;

/// Detections recorded ahead of time, one frame per line.
///
/// Each line is a JSON array of `{"category": ..., "score": ...}` objects.
/// A blank line is a frame with no detections. Once the input ends every
/// further frame is empty and [`Detector::exhausted`] turns true.
pub struct ReplayDetector<R: BufRead> {
    reader: R,
    source: String,
    line_no: usize,
    finished: bool,
}

impl<R: BufRead> ReplayDetector<R> {
    pub fn new(reader: R, source: &str) -> Self {
        Self {
            reader,
            source: source.to_string(),
            line_no: 0,
            finished: false,
        }
    }
}

impl<R: BufRead> Detector for ReplayDetector<R> {
    fn name(&self) -> &'static str {
        "replay"
    }

    fn detect(&mut self, _frame: &Frame) -> Result<Vec<Detection>> {
        if self.finished {
            return Ok(Vec::new());
        }
        let mut line = String::new();
        let read = self
            .reader
            .read_line(&mut line)
            .map_err(|e| SorterError::Detector(format!("failed to read {}: {}", self.source, e)))?;
        if read == 0 {
            log::info!("replay {} ended after {} frames", self.source, self.line_no);
            self.finished = true;
            return Ok(Vec::new());
        }
        self.line_no += 1;

        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(trimmed).map_err(|e| {
            SorterError::Detector(format!(
                "{} line {}: invalid detections: {}",
                self.source, self.line_no, e
            ))
        })
    }

    fn exhausted(&self) -> bool {
        self.finished
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn replays_lines_as_frames() {
        let input = "[{\"category\":\"cat\",\"score\":0.9}]\n\nnot json\n";
        let mut replay = ReplayDetector::new(Cursor::new(input), "test");
        let frame = Frame::blank(2, 2, 0);

        assert_eq!(replay.detect(&frame).unwrap(), vec![Detection::new("cat", 0.9)]);
        assert!(replay.detect(&frame).unwrap().is_empty());
        assert!(matches!(replay.detect(&frame), Err(SorterError::Detector(_))));
        assert!(!replay.exhausted());
        assert!(replay.detect(&frame).unwrap().is_empty());
        assert!(replay.exhausted());
    }
}
