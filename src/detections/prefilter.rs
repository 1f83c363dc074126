use super::{Detection, ModelBatch};
use std::collections::BTreeMap;

/// Detections grouped by class label, each group sorted by descending
/// confidence.
pub type ClassGroups = BTreeMap<i64, Vec<Detection>>;

/// Applies model weights, drops detections below `score_threshold` and
/// groups the rest by class.
///
/// Effective confidence is `score * weight`, capped at 1.0 unless
/// `allow_overflow` is set, in which case the uncapped value is kept for
/// thresholding and ranking only (the engine caps what it emits). Sorting is
/// stable, so equal confidences keep batch order and then row order.
pub fn prefilter(
    batches: &[ModelBatch],
    score_threshold: f64,
    allow_overflow: bool,
) -> ClassGroups {
    let mut groups = ClassGroups::new();
    let mut dropped = 0usize;

    for batch in batches {
        for det in &batch.detections {
            let mut confidence = det.confidence * batch.weight;
            if !allow_overflow {
                confidence = confidence.min(1.0);
            }
            if confidence < score_threshold {
                dropped += 1;
                continue;
            }
            groups
                .entry(det.class_label)
                .or_default()
                .push(det.clone().with_confidence(confidence));
        }
    }

    for group in groups.values_mut() {
        group.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    }

    tracing::debug!(
        classes = groups.len(),
        kept = groups.values().map(Vec::len).sum::<usize>(),
        dropped,
        "prefiltered detections"
    );
    groups
}
