use crate::cluster::{ConfidenceAggregation, cluster_class};
use crate::detections::{Detection, ModelBatch, RawBatch, prefilter};
use crate::error::{ConfigError, ValidationError};
use crate::geometry::{OrientedIou, OverlapMetric};

/// Library default for the overlap needed to treat two boxes as one object.
pub const DEFAULT_MATCH_IOU_THRESHOLD: f64 = 0.55;
/// Library default minimum weighted confidence.
pub const DEFAULT_SCORE_THRESHOLD: f64 = 0.0;

/// Tunables for fusing one scene.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FusionOptions {
    pub match_iou_threshold: f64,
    pub score_threshold: f64,
    pub aggregation: ConfidenceAggregation,
    /// Threshold and rank by weighted confidences above 1.0 instead of
    /// capping them first. Emitted confidences are capped either way.
    pub allow_overflow: bool,
}

impl Default for FusionOptions {
    fn default() -> Self {
        Self {
            match_iou_threshold: DEFAULT_MATCH_IOU_THRESHOLD,
            score_threshold: DEFAULT_SCORE_THRESHOLD,
            aggregation: ConfidenceAggregation::Max,
            allow_overflow: false,
        }
    }
}

impl FusionOptions {
    pub fn with_match_iou_threshold(mut self, value: f64) -> Self {
        self.match_iou_threshold = value;
        self
    }

    pub fn with_score_threshold(mut self, value: f64) -> Self {
        self.score_threshold = value;
        self
    }

    pub fn with_allow_overflow(mut self, value: bool) -> Self {
        self.allow_overflow = value;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("match_iou_threshold", self.match_iou_threshold),
            ("score_threshold", self.score_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::ThresholdOutOfRange { name, value });
            }
        }
        Ok(())
    }
}

/// Checks per-model weights against the number of models.
///
/// `None` means every model weighs 1.0. A wrong count or a negative or
/// non-finite weight resets all weights to 1.0 and returns the problem so
/// the caller can report it.
pub fn resolve_weights(
    weights: Option<&[f64]>,
    model_count: usize,
) -> (Vec<f64>, Option<ConfigError>) {
    let defaults = vec![1.0; model_count];
    let Some(weights) = weights else {
        return (defaults, None);
    };

    let problem = if weights.len() != model_count {
        Some(ConfigError::WeightCountMismatch {
            expected: model_count,
            got: weights.len(),
        })
    } else {
        weights
            .iter()
            .position(|w| !w.is_finite() || *w < 0.0)
            .map(|index| ConfigError::InvalidWeight {
                index,
                value: weights[index],
            })
    };

    match problem {
        Some(err) => {
            tracing::warn!(%err, "ignoring model weights");
            (defaults, Some(err))
        }
        None => (weights.to_vec(), None),
    }
}

/// Fused boxes of one scene plus any recoverable configuration problems
/// met on the way.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SceneFusion {
    pub boxes: Vec<Detection>,
    pub warnings: Vec<ConfigError>,
}

/// Fuses detections from several models into one box per object.
pub struct FusionEngine {
    options: FusionOptions,
    metric: Box<dyn OverlapMetric>,
}

impl FusionEngine {
    pub fn new(options: FusionOptions) -> Result<Self, ConfigError> {
        options.validate()?;
        Ok(Self {
            options,
            metric: Box::new(OrientedIou),
        })
    }

    /// Replaces the overlap measure (oriented IoU by default).
    pub fn with_metric<M: OverlapMetric + 'static>(mut self, metric: M) -> Self {
        self.metric = Box::new(metric);
        self
    }

    pub fn options(&self) -> &FusionOptions {
        &self.options
    }

    pub fn metric(&self) -> &dyn OverlapMetric {
        self.metric.as_ref()
    }

    /// Fuses one scene given each model's parallel arrays.
    ///
    /// Weights are resolved first; a misaligned batch then aborts the scene.
    pub fn fuse_scene(
        &self,
        scene_id: &str,
        raw_batches: &[RawBatch],
        weights: Option<&[f64]>,
    ) -> Result<SceneFusion, ValidationError> {
        let (weights, warning) = resolve_weights(weights, raw_batches.len());
        let batches = raw_batches
            .iter()
            .zip(&weights)
            .enumerate()
            .map(|(i, (raw, &w))| ModelBatch::from_raw(scene_id, i, raw, w))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(SceneFusion {
            boxes: self.fuse_batches(&batches),
            warnings: warning.into_iter().collect(),
        })
    }

    /// Fuses already validated batches. Output is sorted by descending
    /// confidence, never longer than the input, and every confidence is
    /// within [0, 1].
    pub fn fuse_batches(&self, batches: &[ModelBatch]) -> Vec<Detection> {
        let groups = prefilter(
            batches,
            self.options.score_threshold,
            self.options.allow_overflow,
        );
        if groups.is_empty() {
            return Vec::new();
        }

        let mut fused: Vec<Detection> = groups
            .values()
            .flat_map(|group| {
                cluster_class(
                    group,
                    self.options.match_iou_threshold,
                    self.options.aggregation,
                    self.metric.as_ref(),
                )
            })
            .map(|cluster| cluster.representative)
            .collect();
        fused.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        // capping is monotone, so the order above still holds
        for det in &mut fused {
            det.confidence = det.confidence.min(1.0);
        }
        fused
    }
}

impl std::fmt::Debug for FusionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FusionEngine")
            .field("options", &self.options)
            .field("metric", &self.metric.name())
            .finish()
    }
}

impl Default for FusionEngine {
    fn default() -> Self {
        Self {
            options: FusionOptions::default(),
            metric: Box::new(OrientedIou),
        }
    }
}
