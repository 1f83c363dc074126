use crate::error::ValidationError;
use crate::geometry::OrientedBox;

pub mod prefilter;

pub use prefilter::{ClassGroups, prefilter};

/// One box reported by one model for one scene.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub scene_id: String,
    pub class_label: i64,
    pub confidence: f64,
    pub bbox: OrientedBox,
}

impl Detection {
    pub fn new(
        scene_id: impl Into<String>,
        class_label: i64,
        confidence: f64,
        bbox: OrientedBox,
    ) -> Self {
        Self {
            scene_id: scene_id.into(),
            class_label,
            confidence,
            bbox,
        }
    }

    /// Copy of this detection with a different confidence.
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }
}

/// The parallel arrays one model emits for one scene.
///
/// Boxes are `(x, y, z, l, w, h, r)`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawBatch {
    pub boxes: Vec<[f64; 7]>,
    pub scores: Vec<f64>,
    pub labels: Vec<i64>,
}

impl RawBatch {
    pub fn new(boxes: Vec<[f64; 7]>, scores: Vec<f64>, labels: Vec<i64>) -> Self {
        Self {
            boxes,
            scores,
            labels,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty() && self.scores.is_empty() && self.labels.is_empty()
    }

    pub fn push(&mut self, bbox: [f64; 7], score: f64, label: i64) {
        self.boxes.push(bbox);
        self.scores.push(score);
        self.labels.push(label);
    }
}

/// Validated detections of one model for one scene, with the model's weight.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelBatch {
    pub detections: Vec<Detection>,
    pub weight: f64,
}

impl ModelBatch {
    pub fn new(detections: Vec<Detection>, weight: f64) -> Self {
        Self { detections, weight }
    }

    /// Validates a raw batch and converts it into detections.
    ///
    /// `batch` is the batch's position and only used in error messages.
    /// Misaligned arrays fail the whole batch; nothing is truncated.
    pub fn from_raw(
        scene_id: &str,
        batch: usize,
        raw: &RawBatch,
        weight: f64,
    ) -> Result<Self, ValidationError> {
        let boxes = raw.boxes.len();
        if raw.scores.len() != boxes {
            return Err(ValidationError::ScoreCountMismatch {
                batch,
                boxes,
                scores: raw.scores.len(),
            });
        }
        if raw.labels.len() != boxes {
            return Err(ValidationError::LabelCountMismatch {
                batch,
                boxes,
                labels: raw.labels.len(),
            });
        }

        let mut detections = Vec::with_capacity(boxes);
        for (index, ((bbox, &score), &label)) in raw
            .boxes
            .iter()
            .zip(&raw.scores)
            .zip(&raw.labels)
            .enumerate()
        {
            if !score.is_finite() {
                return Err(ValidationError::NonFinite {
                    batch,
                    index,
                    field: "score",
                });
            }
            if !(0.0..=1.0).contains(&score) {
                return Err(ValidationError::ScoreOutOfRange {
                    batch,
                    index,
                    score,
                });
            }
            if !bbox.iter().all(|v| v.is_finite()) {
                return Err(ValidationError::NonFinite {
                    batch,
                    index,
                    field: "box",
                });
            }
            detections.push(Detection::new(
                scene_id,
                label,
                score,
                OrientedBox::from_array(*bbox),
            ));
        }

        Ok(Self::new(detections, weight))
    }

    pub fn len(&self) -> usize {
        self.detections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }
}
