//! Majority-vote sampling over consecutive single-object frames.
//!
//! While the sorter is idle every frame is classified by how many objects it
//! holds:
//! - none: pending samples age; after `samples` empty frames they are dropped
//! - more than one: the scene is ambiguous and nothing is sampled
//! - exactly one: its category is sampled; a full buffer is collapsed into its
//!   majority category

use crate::detect::Detection;

/// Category samples collected for the object currently in view.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SampleBuffer {
    samples: Vec<String>,
    expiration: usize,
}

impl SampleBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn samples(&self) -> &[String] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Consecutive empty frames seen while samples were pending.
    pub fn expiration(&self) -> usize {
        self.expiration
    }

    pub fn clear(&mut self) {
        self.samples.clear();
        self.expiration = 0;
    }
}

/// What one frame did to the sample buffer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Observation {
    /// Empty frame with nothing pending.
    Idle,
    /// Empty frame while samples are pending; `expiration` empty frames so far.
    Waiting { expiration: usize },
    /// Pending samples were discarded after too many empty frames.
    Expired { discarded: usize },
    /// More than one object in view; nothing sampled.
    Ambiguous { objects: usize },
    /// One object sampled; `collected` of the required samples so far.
    Sampled { collected: usize },
    /// The buffer filled up and collapsed into this category.
    Commit { category: String },
}

/// Stateless rules applied to a [`SampleBuffer`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SampleAggregator {
    samples: usize,
}

impl SampleAggregator {
    /// `samples` is clamped to at least one.
    pub fn new(samples: usize) -> Self {
        Self {
            samples: samples.max(1),
        }
    }

    pub fn samples(&self) -> usize {
        self.samples
    }

    pub fn observe(&self, buffer: &mut SampleBuffer, detections: &[Detection]) -> Observation {
        match detections {
            [] => self.observe_empty(buffer),
            [single] => self.observe_single(buffer, &single.category),
            many => {
                buffer.expiration = 0;
                Observation::Ambiguous {
                    objects: many.len(),
                }
            }
        }
    }

    fn observe_empty(&self, buffer: &mut SampleBuffer) -> Observation {
        if buffer.samples.is_empty() {
            return Observation::Idle;
        }
        buffer.expiration += 1;
        if buffer.expiration >= self.samples {
            let discarded = buffer.samples.len();
            buffer.clear();
            return Observation::Expired { discarded };
        }
        Observation::Waiting {
            expiration: buffer.expiration,
        }
    }

    fn observe_single(&self, buffer: &mut SampleBuffer, category: &str) -> Observation {
        buffer.expiration = 0;
        if buffer.samples.len() < self.samples {
            buffer.samples.push(category.to_string());
        }
        if buffer.samples.len() < self.samples {
            return Observation::Sampled {
                collected: buffer.samples.len(),
            };
        }
        let category = majority_vote(&buffer.samples)
            .unwrap_or(category)
            .to_string();
        buffer.clear();
        Observation::Commit { category }
    }
}

/// Most frequent label. Ties go to the label whose first occurrence is
/// earliest.
pub fn majority_vote(samples: &[String]) -> Option<&str> {
    let mut counts: Vec<(&str, usize)> = Vec::new();
    for sample in samples {
        match counts.iter_mut().find(|(label, _)| *label == sample.as_str()) {
            Some((_, count)) => *count += 1,
            None => counts.push((sample.as_str(), 1)),
        }
    }
    let mut best: Option<(&str, usize)> = None;
    for (label, count) in counts {
        if best.map_or(true, |(_, top)| count > top) {
            best = Some((label, count));
        }
    }
    best.map(|(label, _)| label)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn one(category: &str) -> Vec<Detection> {
        vec![Detection::new(category, 0.9)]
    }

    #[test]
    fn majority_prefers_highest_count() {
        let samples = labels(&["dog", "cat", "cat", "dog", "cat"]);
        assert_eq!(majority_vote(&samples), Some("cat"));
    }

    #[test]
    fn majority_tie_goes_to_earliest_first_occurrence() {
        assert_eq!(majority_vote(&labels(&["dog", "cat", "cat", "dog"])), Some("dog"));
        assert_eq!(majority_vote(&labels(&["can", "box", "cat"])), Some("can"));
        assert_eq!(majority_vote(&[]), None);
    }

    #[test]
    fn full_buffer_commits_majority_and_clears() {
        let aggregator = SampleAggregator::new(3);
        let mut buffer = SampleBuffer::new();
        assert_eq!(
            aggregator.observe(&mut buffer, &one("cat")),
            Observation::Sampled { collected: 1 }
        );
        aggregator.observe(&mut buffer, &one("cat"));
        assert_eq!(
            aggregator.observe(&mut buffer, &one("dog")),
            Observation::Commit {
                category: "cat".to_string()
            }
        );
        assert!(buffer.is_empty());
    }

    #[test]
    fn partial_buffer_expires_after_exactly_samples_empty_frames() {
        let aggregator = SampleAggregator::new(4);
        let mut buffer = SampleBuffer::new();
        aggregator.observe(&mut buffer, &one("cat"));
        aggregator.observe(&mut buffer, &one("cat"));

        for expected in 1..4 {
            assert_eq!(
                aggregator.observe(&mut buffer, &[]),
                Observation::Waiting {
                    expiration: expected
                }
            );
            assert_eq!(buffer.len(), 2);
        }
        assert_eq!(
            aggregator.observe(&mut buffer, &[]),
            Observation::Expired { discarded: 2 }
        );
        assert!(buffer.is_empty());
        assert_eq!(buffer.expiration(), 0);
    }

    #[test]
    fn empty_frames_without_samples_do_nothing() {
        let aggregator = SampleAggregator::new(2);
        let mut buffer = SampleBuffer::new();
        for _ in 0..5 {
            assert_eq!(aggregator.observe(&mut buffer, &[]), Observation::Idle);
        }
        assert_eq!(buffer.expiration(), 0);
    }

    #[test]
    fn crowded_frame_resets_expiration_and_keeps_samples() {
        let aggregator = SampleAggregator::new(3);
        let mut buffer = SampleBuffer::new();
        aggregator.observe(&mut buffer, &one("cat"));
        aggregator.observe(&mut buffer, &[]);
        assert_eq!(buffer.expiration(), 1);

        let crowded = vec![Detection::new("cat", 0.9), Detection::new("dog", 0.8)];
        assert_eq!(
            aggregator.observe(&mut buffer, &crowded),
            Observation::Ambiguous { objects: 2 }
        );
        assert_eq!(buffer.samples().to_vec(), vec!["cat".to_string()]);
        assert_eq!(buffer.expiration(), 0);
    }

    #[test]
    fn single_sample_window_commits_immediately() {
        let aggregator = SampleAggregator::new(0);
        let mut buffer = SampleBuffer::new();
        assert_eq!(aggregator.samples(), 1);
        assert_eq!(
            aggregator.observe(&mut buffer, &one("can")),
            Observation::Commit {
                category: "can".to_string()
            }
        );
    }
}
