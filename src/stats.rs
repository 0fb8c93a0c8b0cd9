//! Runtime counters reported on shutdown.

use std::collections::VecDeque;
use std::fmt;
use std::time::Instant;

use crate::buckets::{Bucket, BUCKET_COUNT};

pub const DEFAULT_FPS_HISTORY: usize = 1000;
pub const DEFAULT_AVG_FRAME_COUNT: u32 = 10;

/// Frame rate measured over fixed-size frame windows.
#[derive(Clone, Debug)]
pub struct FpsMeter {
    history: VecDeque<f64>,
    history_len: usize,
    avg_frame_count: u32,
    frame_count: u32,
    window_start: Option<Instant>,
    latest: f64,
}

impl Default for FpsMeter {
    fn default() -> Self {
        Self::new(DEFAULT_FPS_HISTORY, DEFAULT_AVG_FRAME_COUNT)
    }
}

impl FpsMeter {
    pub fn new(history_len: usize, avg_frame_count: u32) -> Self {
        Self {
            history: VecDeque::new(),
            history_len: history_len.max(1),
            avg_frame_count: avg_frame_count.max(1),
            frame_count: 0,
            window_start: None,
            latest: 0.0,
        }
    }

    /// Count one processed frame.
    pub fn tick(&mut self) {
        self.tick_at(Instant::now());
    }

    pub fn tick_at(&mut self, now: Instant) {
        let start = *self.window_start.get_or_insert(now);
        self.frame_count += 1;
        if self.frame_count < self.avg_frame_count {
            return;
        }
        let elapsed = now.duration_since(start).as_secs_f64();
        if elapsed > 0.0 {
            self.record(f64::from(self.frame_count) / elapsed);
        }
        self.frame_count = 0;
        self.window_start = Some(now);
    }

    pub fn record(&mut self, fps: f64) {
        if self.history.len() == self.history_len {
            self.history.pop_front();
        }
        self.history.push_back(fps);
        self.latest = fps;
    }

    pub fn latest(&self) -> f64 {
        self.latest
    }

    pub fn minimum(&self) -> Option<f64> {
        self.history.iter().copied().reduce(f64::min)
    }

    pub fn maximum(&self) -> Option<f64> {
        self.history.iter().copied().reduce(f64::max)
    }

    pub fn average(&self) -> Option<f64> {
        if self.history.is_empty() {
            return None;
        }
        Some(self.history.iter().sum::<f64>() / self.history.len() as f64)
    }

    pub fn history(&self) -> impl Iterator<Item = f64> + '_ {
        self.history.iter().copied()
    }
}

impl fmt::Display for FpsMeter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.minimum(), self.maximum(), self.average()) {
            (Some(min), Some(max), Some(avg)) => write!(
                f,
                "latest {:.2} fps (min {:.2}, max {:.2}, avg {:.2})",
                self.latest, min, max, avg
            ),
            _ => write!(f, "no fps samples"),
        }
    }
}

/// Commits and confirmed drops per bucket.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SortTally {
    committed: [u64; BUCKET_COUNT],
    dropped: [u64; BUCKET_COUNT],
}

impl SortTally {
    pub fn record_commit(&mut self, bucket: Bucket) {
        self.committed[bucket.index()] += 1;
    }

    pub fn record_drop(&mut self, bucket: Bucket) {
        self.dropped[bucket.index()] += 1;
    }

    pub fn committed(&self, bucket: Bucket) -> u64 {
        self.committed[bucket.index()]
    }

    pub fn dropped(&self, bucket: Bucket) -> u64 {
        self.dropped[bucket.index()]
    }

    pub fn total_dropped(&self) -> u64 {
        self.dropped.iter().sum()
    }
}

impl fmt::Display for SortTally {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for bucket in Bucket::all() {
            if !first {
                write!(f, ", ")?;
            }
            first = false;
            write!(
                f,
                "bucket {}: {}/{}",
                bucket,
                self.dropped(bucket),
                self.committed(bucket)
            )?;
        }
        Ok(())
    }
}
