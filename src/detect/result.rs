use serde::{Deserialize, Serialize};

/// Default minimum confidence kept by [`DetectionFilter`].
pub const DEFAULT_SCORE_THRESHOLD: f32 = 0.3;
/// Default number of detections kept per frame.
pub const DEFAULT_MAX_DETECTIONS: usize = 3;

/// One detected object. Detectors may report a bounding box as well; the
/// sorter ignores it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub category: String,
    pub score: f32,
}

impl Detection {
    pub fn new(category: impl Into<String>, score: f32) -> Self {
        Self {
            category: category.into(),
            score,
        }
    }
}

/// Score threshold and result cap applied to raw detector output.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DetectionFilter {
    pub score_threshold: f32,
    pub max_detections: usize,
}

impl Default for DetectionFilter {
    fn default() -> Self {
        Self {
            score_threshold: DEFAULT_SCORE_THRESHOLD,
            max_detections: DEFAULT_MAX_DETECTIONS,
        }
    }
}

impl DetectionFilter {
    /// Keep detections at or above the threshold, best score first, capped at
    /// `max_detections`. Equal scores keep detector order.
    pub fn apply(&self, mut detections: Vec<Detection>) -> Vec<Detection> {
        detections.retain(|d| d.score >= self.score_threshold);
        detections.sort_by(|a, b| b.score.total_cmp(&a.score));
        detections.truncate(self.max_detections);
        detections
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_drops_weak_and_caps_results() {
        let filter = DetectionFilter {
            score_threshold: 0.5,
            max_detections: 2,
        };
        let kept = filter.apply(vec![
            Detection::new("cat", 0.6),
            Detection::new("dog", 0.4),
            Detection::new("can", 0.9),
            Detection::new("box", 0.7),
        ]);
        let categories: Vec<&str> = kept.iter().map(|d| d.category.as_str()).collect();
        assert_eq!(categories, vec!["can", "box"]);
    }

    #[test]
    fn detections_ignore_extra_fields() {
        let parsed: Vec<Detection> = serde_json::from_str(
            r#"[{"category": "cat", "score": 0.8, "bbox": [1, 2, 3, 4]}]"#,
        )
        .unwrap();
        assert_eq!(parsed, vec![Detection::new("cat", 0.8)]);
    }
}
