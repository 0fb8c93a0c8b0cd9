//! Sorting state machine.
//!
//! A session is either sampling (idle) or waiting for the object it committed
//! to reach its bucket's IR sensor. Only one object is ever in flight: while a
//! drop is pending, detections are ignored and no new sampling starts.

use crate::buckets::{Bucket, BucketTable};
use crate::detect::Detection;
use crate::error::{Result, SorterError};
use crate::mcu::{McuClient, McuLink};
use crate::protocol::Response;
use crate::sampler::{Observation, SampleAggregator, SampleBuffer};

/// Live sorting state carried from frame to frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SortingSession {
    Idle(SampleBuffer),
    AwaitingDrop { bucket: Bucket },
}

impl Default for SortingSession {
    fn default() -> Self {
        SortingSession::Idle(SampleBuffer::new())
    }
}

impl SortingSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bucket whose drop is pending, if any.
    pub fn active_bucket(&self) -> Option<Bucket> {
        match self {
            SortingSession::Idle(_) => None,
            SortingSession::AwaitingDrop { bucket } => Some(*bucket),
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, SortingSession::Idle(_))
    }

    /// Pending samples while idle.
    pub fn buffer(&self) -> Option<&SampleBuffer> {
        match self {
            SortingSession::Idle(buffer) => Some(buffer),
            SortingSession::AwaitingDrop { .. } => None,
        }
    }
}

/// Result of feeding one frame to the state machine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StepOutcome {
    /// Still idle; what the frame did to the sample buffer.
    Sampling(Observation),
    /// A category was committed and the hardware set up for `bucket`.
    Committed { category: String, bucket: Bucket },
    /// Still waiting for the drop into `bucket`.
    Awaiting { bucket: Bucket },
    /// The object reached `bucket`; the session is idle again.
    Dropped { bucket: Bucket },
}

/// Per-frame decision logic. Owns the immutable bucket table; the session and
/// the MCU client are passed in by the caller.
#[derive(Clone, Debug)]
pub struct Sorter {
    table: BucketTable,
    aggregator: SampleAggregator,
}

impl Sorter {
    pub fn new(table: BucketTable, samples: usize) -> Self {
        Self {
            table,
            aggregator: SampleAggregator::new(samples),
        }
    }

    pub fn table(&self) -> &BucketTable {
        &self.table
    }

    pub fn samples(&self) -> usize {
        self.aggregator.samples()
    }

    /// Process one frame's detections.
    pub fn step<L: McuLink>(
        &self,
        session: &mut SortingSession,
        detections: &[Detection],
        mcu: &mut McuClient<L>,
    ) -> Result<StepOutcome> {
        match session {
            SortingSession::AwaitingDrop { bucket } => {
                let bucket = *bucket;
                self.poll_drop(session, bucket, mcu)
            }
            SortingSession::Idle(buffer) => {
                if detections.len() == 1 {
                    mcu.set_error_indicator(false)?;
                }
                let observation = self.aggregator.observe(buffer, detections);
                match observation {
                    Observation::Commit { category } => self.commit(session, category, mcu),
                    Observation::Ambiguous { objects } => {
                        log::warn!("{} objects in view; waiting for a single object", objects);
                        mcu.set_error_indicator(true)?;
                        Ok(StepOutcome::Sampling(observation))
                    }
                    Observation::Expired { discarded } => {
                        log::info!(
                            "object left the view before a stable read; discarded {} sample(s)",
                            discarded
                        );
                        Ok(StepOutcome::Sampling(observation))
                    }
                    Observation::Sampled { collected } => {
                        log::debug!("sampled {}/{}", collected, self.aggregator.samples());
                        Ok(StepOutcome::Sampling(observation))
                    }
                    Observation::Idle | Observation::Waiting { .. } => {
                        Ok(StepOutcome::Sampling(observation))
                    }
                }
            }
        }
    }

    fn commit<L: McuLink>(
        &self,
        session: &mut SortingSession,
        category: String,
        mcu: &mut McuClient<L>,
    ) -> Result<StepOutcome> {
        let bucket = self.table.resolve(&category);
        log::info!("Sorting '{}' into bucket {}", category, bucket);

        let gate = bucket.gate();
        if let Some(gate) = gate {
            mcu.set_gate(gate, true)?;
        }
        if let Err(e) = mcu.set_platform(true) {
            if let Some(gate) = gate {
                if let Err(close_err) = mcu.set_gate(gate, false) {
                    log::warn!("failed to close gate {} after platform error: {}", gate, close_err);
                }
            }
            return Err(e);
        }

        *session = SortingSession::AwaitingDrop { bucket };
        mcu.acknowledge_object_sort()?;
        Ok(StepOutcome::Committed { category, bucket })
    }

    fn poll_drop<L: McuLink>(
        &self,
        session: &mut SortingSession,
        bucket: Bucket,
        mcu: &mut McuClient<L>,
    ) -> Result<StepOutcome> {
        let states = match mcu.read_ir_states() {
            Ok(states) => states,
            Err(e) if e.is_reply_format() => {
                log::warn!("IR status unreadable, retrying next frame: {}", e);
                return Ok(StepOutcome::Awaiting { bucket });
            }
            Err(e) => return Err(e),
        };

        if !states.triggered(bucket) {
            for other in states.active() {
                log::warn!(
                    "IR sensor {} triggered while waiting for bucket {}",
                    other,
                    bucket
                );
            }
            return Ok(StepOutcome::Awaiting { bucket });
        }

        log::info!("Object dropped into bucket {}", bucket);
        // Once its latch is acknowledged this drop can never be observed again,
        // so the session is released before any teardown command is sent.
        *session = SortingSession::Idle(SampleBuffer::new());

        let mut failure: Option<SorterError> = None;
        let mut note = |result: Result<()>| {
            if let Err(e) = result {
                if failure.is_none() {
                    failure = Some(e);
                } else {
                    log::warn!("further error while finishing the drop: {}", e);
                }
            }
        };
        if let Some(gate) = bucket.gate() {
            note(mcu.set_gate(gate, false));
        }
        for sensor in Bucket::all() {
            note(mcu.acknowledge_ir(sensor).map(|reply| {
                if reply == Response::Failure {
                    log::warn!("The MCU could not acknowledge IR sensor {}.", sensor);
                }
            }));
        }
        note(mcu.show_statistics());
        note(mcu.set_platform(false));

        match failure {
            Some(e) => Err(e),
            None => Ok(StepOutcome::Dropped { bucket }),
        }
    }
}
