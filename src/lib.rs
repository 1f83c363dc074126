pub mod cluster;
pub mod config;
pub mod detections;
pub mod engine;
pub mod error;
pub mod geometry;
pub mod orchestrator;
pub mod pointcloud;
pub mod report;
pub mod table;

pub use cluster::ConfidenceAggregation;
pub use config::BoxfuseConfig;
pub use detections::{Detection, ModelBatch, RawBatch};
pub use engine::{FusionEngine, FusionOptions, SceneFusion};
pub use error::{ConfigError, FusionError, GeometryError, ValidationError};
pub use geometry::{OrientedBox, OrientedIou, OverlapMetric, iou};
pub use orchestrator::{FusionOutput, SceneFilter, fuse_tables};
pub use report::FusionReport;
pub use table::{DetectionRow, DetectionTable};
