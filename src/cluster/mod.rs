//! Greedy clustering of same-class detections.
//!
//! Detections are visited in descending confidence order. Each one joins the
//! existing cluster whose representative it overlaps most (strictly above the
//! match threshold), or starts a new cluster.
//!
//! The procedure is greedy and order-sensitive: when three or more
//! detections overlap each other non-transitively around the threshold, the
//! partition can depend on which model's detection was seen first. Two
//! representatives that were never compared against each other may end up
//! overlapping above the threshold.

use crate::detections::Detection;
use crate::geometry::OverlapMetric;

pub mod selector;

pub use selector::{ConfidenceAggregation, select_representative};

/// Detections believed to be the same physical object.
#[derive(Debug, Clone, PartialEq)]
pub struct Cluster {
    pub class_label: i64,
    pub members: Vec<Detection>,
    pub representative: Detection,
}

impl Cluster {
    pub fn new(first: Detection) -> Self {
        Self {
            class_label: first.class_label,
            members: vec![first.clone()],
            representative: first,
        }
    }

    /// Adds a member and re-selects the representative.
    pub fn absorb(&mut self, det: Detection, aggregation: ConfidenceAggregation) {
        debug_assert_eq!(det.class_label, self.class_label);
        self.members.push(det);
        if let Some(rep) = select_representative(&self.members, aggregation) {
            self.representative = rep.clone();
        }
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Index of the cluster whose representative overlaps `det` the most, if
/// that overlap is strictly greater than `threshold`. The earliest cluster
/// wins ties.
fn best_match(
    clusters: &[Cluster],
    det: &Detection,
    threshold: f64,
    metric: &dyn OverlapMetric,
) -> Option<usize> {
    let mut best_iou = threshold;
    let mut best = None;
    for (i, cluster) in clusters.iter().enumerate() {
        if cluster.class_label != det.class_label {
            continue;
        }
        let iou = metric.overlap(&cluster.representative.bbox, &det.bbox);
        if iou > best_iou {
            best_iou = iou;
            best = Some(i);
        }
    }
    best
}

/// Partitions one class group into clusters.
///
/// `detections` should already be sorted by descending confidence (as
/// produced by [`crate::detections::prefilter`]).
pub fn cluster_class(
    detections: &[Detection],
    match_iou_threshold: f64,
    aggregation: ConfidenceAggregation,
    metric: &dyn OverlapMetric,
) -> Vec<Cluster> {
    let mut clusters: Vec<Cluster> = Vec::new();
    for det in detections {
        match best_match(&clusters, det, match_iou_threshold, metric) {
            Some(i) => clusters[i].absorb(det.clone(), aggregation),
            None => clusters.push(Cluster::new(det.clone())),
        }
    }
    clusters
}
