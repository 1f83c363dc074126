//! Oriented 3D boxes and their intersection-over-union.

use crate::error::GeometryError;
use nalgebra::{Point2, Point3, Vector3};

pub mod polygon;

/// A 3D box with a yaw rotation about the vertical axis.
///
/// `center` is the geometric center of the box (z included), `extents` is
/// `(length, width, height)` with length measured along the heading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrientedBox {
    pub center: Point3<f64>,
    pub extents: Vector3<f64>,
    pub heading: f64,
}

impl OrientedBox {
    pub fn new(center: Point3<f64>, extents: Vector3<f64>, heading: f64) -> Self {
        Self {
            center,
            extents,
            heading,
        }
    }

    /// Builds a box from `(x, y, z, l, w, h, r)`.
    pub fn from_array(v: [f64; 7]) -> Self {
        Self::new(
            Point3::new(v[0], v[1], v[2]),
            Vector3::new(v[3], v[4], v[5]),
            v[6],
        )
    }

    /// Inverse of [`OrientedBox::from_array`].
    pub fn to_array(&self) -> [f64; 7] {
        [
            self.center.x,
            self.center.y,
            self.center.z,
            self.extents.x,
            self.extents.y,
            self.extents.z,
            self.heading,
        ]
    }

    pub fn volume(&self) -> f64 {
        self.extents.x * self.extents.y * self.extents.z
    }

    pub fn validate(&self) -> Result<(), GeometryError> {
        if !self.to_array().iter().all(|v| v.is_finite()) {
            return Err(GeometryError::NonFinite);
        }
        if self.extents.iter().any(|&e| e <= 0.0) {
            return Err(GeometryError::DegenerateExtent {
                length: self.extents.x,
                width: self.extents.y,
                height: self.extents.z,
            });
        }
        Ok(())
    }

    fn footprint(&self) -> [Point2<f64>; 4] {
        polygon::rectangle(
            Point2::new(self.center.x, self.center.y),
            self.extents.x,
            self.extents.y,
            self.heading,
        )
    }

    fn vertical_overlap(&self, other: &Self) -> f64 {
        let top =
            (self.center.z + self.extents.z / 2.0).min(other.center.z + other.extents.z / 2.0);
        let bottom =
            (self.center.z - self.extents.z / 2.0).max(other.center.z - other.extents.z / 2.0);
        (top - bottom).max(0.0)
    }
}

/// Overlap measure used to decide whether two detections are the same object.
///
/// Implementations must return a value in `[0, 1]`, be symmetric, and account
/// for heading.
pub trait OverlapMetric: Send + Sync {
    fn name(&self) -> &'static str;
    fn overlap(&self, a: &OrientedBox, b: &OrientedBox) -> f64;
}

/// Exact IoU of two yaw-rotated boxes: footprint intersection from convex
/// clipping, multiplied by the shared height range.
#[derive(Debug, Default, Clone, Copy)]
pub struct OrientedIou;

impl OverlapMetric for OrientedIou {
    fn name(&self) -> &'static str {
        "oriented-iou"
    }

    fn overlap(&self, a: &OrientedBox, b: &OrientedBox) -> f64 {
        iou(a, b)
    }
}

/// IoU of two oriented boxes, failing on degenerate input.
pub fn try_iou(a: &OrientedBox, b: &OrientedBox) -> Result<f64, GeometryError> {
    a.validate()?;
    b.validate()?;

    let height = a.vertical_overlap(b);
    if height <= 0.0 {
        return Ok(0.0);
    }
    let area = polygon::intersection_area(&a.footprint(), &b.footprint());
    let inter = area * height;
    let union = a.volume() + b.volume() - inter;
    if union <= 0.0 {
        return Ok(0.0);
    }
    Ok((inter / union).clamp(0.0, 1.0))
}

/// IoU of two oriented boxes; degenerate boxes overlap nothing.
pub fn iou(a: &OrientedBox, b: &OrientedBox) -> f64 {
    match try_iou(a, b) {
        Ok(v) => v,
        Err(err) => {
            tracing::trace!(%err, "degenerate box in overlap test");
            0.0
        }
    }
}
