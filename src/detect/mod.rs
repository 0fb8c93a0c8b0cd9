mod backend;
mod backends;
mod result;

pub use backend::Detector;
#[cfg(feature = "detect-remote")]
pub use backends::RemoteDetector;
pub use backends::{ReplayDetector, StubDetector};
pub use result::{Detection, DetectionFilter, DEFAULT_MAX_DETECTIONS, DEFAULT_SCORE_THRESHOLD};
