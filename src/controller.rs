//! Frame loop with recovery.
//!
//! Every iteration pulls a frame, runs the detector and feeds the filtered
//! detections to the [`Sorter`]. Any failure inside an iteration is logged,
//! flagged on the error indicator and waited out; camera failures also
//! re-acquire the frame source. The sorting session survives recovery.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::detect::{Detection, DetectionFilter, Detector};
use crate::error::{Result, SorterError};
use crate::ingest::FrameSource;
use crate::mcu::{McuClient, McuLink};
use crate::sorter::{Sorter, SortingSession, StepOutcome};
use crate::stats::{FpsMeter, SortTally};

pub const DEFAULT_RECOVERY_DELAY: Duration = Duration::from_secs(2);

const STOP_POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RecoveryPolicy {
    /// Pause between raising and lowering the error indicator.
    pub delay: Duration,
}

impl Default for RecoveryPolicy {
    fn default() -> Self {
        Self {
            delay: DEFAULT_RECOVERY_DELAY,
        }
    }
}

/// Owns the MCU client and the sorting session for the life of the process.
pub struct Controller<L: McuLink> {
    sorter: Sorter,
    mcu: McuClient<L>,
    session: SortingSession,
    filter: DetectionFilter,
    recovery: RecoveryPolicy,
    fps: FpsMeter,
    tally: SortTally,
    failures: u64,
}

impl<L: McuLink> Controller<L> {
    pub fn new(sorter: Sorter, mcu: McuClient<L>) -> Self {
        Self {
            sorter,
            mcu,
            session: SortingSession::new(),
            filter: DetectionFilter::default(),
            recovery: RecoveryPolicy::default(),
            fps: FpsMeter::default(),
            tally: SortTally::default(),
            failures: 0,
        }
    }

    pub fn with_filter(mut self, filter: DetectionFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_recovery(mut self, recovery: RecoveryPolicy) -> Self {
        self.recovery = recovery;
        self
    }

    pub fn session(&self) -> &SortingSession {
        &self.session
    }

    pub fn mcu(&self) -> &McuClient<L> {
        &self.mcu
    }

    pub fn mcu_mut(&mut self) -> &mut McuClient<L> {
        &mut self.mcu
    }

    pub fn tally(&self) -> &SortTally {
        &self.tally
    }

    pub fn fps(&self) -> &FpsMeter {
        &self.fps
    }

    /// Iterations that ended in a recovered failure.
    pub fn failures(&self) -> u64 {
        self.failures
    }

    /// Feed one frame's raw detections through the filter and the sorter.
    ///
    /// Commits and drops are tallied from the session transition, so a step
    /// that fails after committing or after seeing the drop still counts.
    pub fn process(&mut self, detections: Vec<Detection>) -> Result<StepOutcome> {
        let detections = self.filter.apply(detections);
        let before = self.session.active_bucket();
        let result = self
            .sorter
            .step(&mut self.session, &detections, &mut self.mcu);
        match (before, self.session.active_bucket()) {
            (None, Some(bucket)) => self.tally.record_commit(bucket),
            (Some(bucket), None) => self.tally.record_drop(bucket),
            _ => {}
        }
        result
    }

    /// One iteration: capture, detect, step.
    pub fn run_once<S, D>(&mut self, source: &mut S, detector: &mut D) -> Result<StepOutcome>
    where
        S: FrameSource + ?Sized,
        D: Detector + ?Sized,
    {
        let frame = source.next_frame()?;
        let detections = detector.detect(&frame)?;
        self.fps.tick();
        self.process(detections)
    }

    /// Flag the failure, wait, and re-acquire the frame source if it was the
    /// camera that failed. Failures while recovering are only logged.
    pub fn recover<S>(&mut self, err: &SorterError, source: &mut S, stop: &AtomicBool)
    where
        S: FrameSource + ?Sized,
    {
        self.failures += 1;
        log::error!("An error occurred: {}", err);
        if let Err(e) = self.mcu.set_error_indicator(true) {
            log::warn!("could not raise the error indicator: {}", e);
        }

        log::info!(
            "Retrying in {:.1} seconds...",
            self.recovery.delay.as_secs_f64()
        );
        wait(self.recovery.delay, stop);

        if err.is_camera() {
            match source.reacquire() {
                Ok(()) => log::info!("frame source re-acquired"),
                Err(e) => log::error!("failed to re-acquire the frame source: {}", e),
            }
        }
        if let Err(e) = self.mcu.set_error_indicator(false) {
            log::warn!("could not lower the error indicator: {}", e);
        }
    }

    /// Run until `stop` is set or the detector runs dry, then shut down.
    ///
    /// The shutdown sequence runs on every exit path; its result is returned.
    pub fn run<S, D>(&mut self, source: &mut S, detector: &mut D, stop: &AtomicBool) -> Result<()>
    where
        S: FrameSource + ?Sized,
        D: Detector + ?Sized,
    {
        log::info!(
            "sorting loop started (detector: {}, samples: {})",
            detector.name(),
            self.sorter.samples()
        );
        let started = Instant::now();
        loop {
            if stop.load(Ordering::SeqCst) {
                log::info!("stop signal received");
                break;
            }
            if detector.exhausted() {
                log::info!("detector {} has no more frames", detector.name());
                break;
            }
            if let Err(e) = self.run_once(source, detector) {
                self.recover(&e, source, stop);
            }
        }
        log::info!(
            "sorting loop ran for {:.1}s",
            started.elapsed().as_secs_f64()
        );
        self.shutdown(source)
    }

    /// Release the frame source, log statistics and park the MCU.
    pub fn shutdown<S>(&mut self, source: &mut S) -> Result<()>
    where
        S: FrameSource + ?Sized,
    {
        log::info!("Exiting...");
        source.release();
        log::info!(
            "frames captured: {}, recovered failures: {}",
            source.frames_captured(),
            self.failures
        );
        log::info!("fps: {}", self.fps);
        log::info!("sorted (dropped/committed): {}", self.tally);
        if let Some(bucket) = self.session.active_bucket() {
            log::warn!("stopping while an object is still headed for bucket {}", bucket);
        }
        self.mcu.shutdown()
    }
}

/// Sleep for `delay`, returning early once `stop` is set.
fn wait(delay: Duration, stop: &AtomicBool) {
    let deadline = Instant::now() + delay;
    loop {
        if stop.load(Ordering::SeqCst) {
            return;
        }
        let now = Instant::now();
        if now >= deadline {
            return;
        }
        std::thread::sleep(STOP_POLL_INTERVAL.min(deadline - now));
    }
}
