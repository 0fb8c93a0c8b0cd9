use crate::detect::result::Detection;
use crate::error::Result;
use crate::frame::Frame;

/// Object detector seam.
///
/// The sorter core only consumes the per-frame detection list; how it is
/// produced (local model, remote inference server, recorded replay) is up to
/// the implementation.
pub trait Detector {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run detection on a frame. Failures are reported as
    /// `SorterError::Detector`.
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }

    /// True once a finite detection feed has nothing left to report.
    fn exhausted(&self) -> bool {
        false
    }
}

impl<D: Detector + ?Sized> Detector for Box<D> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        (**self).detect(frame)
    }

    fn warm_up(&mut self) -> Result<()> {
        (**self).warm_up()
    }

    fn exhausted(&self) -> bool {
        (**self).exhausted()
    }
}
