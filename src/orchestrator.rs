//! Runs scene fusion over every scene found in a set of model tables.

use crate::detections::RawBatch;
use crate::engine::{FusionEngine, resolve_weights};
use crate::error::ConfigError;
use crate::report::{FusionReport, SceneStatus, SceneSummary};
use crate::table::{DetectionRow, DetectionTable};
use regex::Regex;
use schemars::JsonSchema;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// Restricts a run to scene ids matching a regular expression.
#[derive(Debug, Clone)]
pub struct SceneFilter(Regex);

impl SceneFilter {
    pub fn new(pattern: &str) -> Result<Self, ConfigError> {
        Regex::new(pattern)
            .map(Self)
            .map_err(|e| ConfigError::SceneFilter(e.to_string()))
    }

    pub fn matches(&self, scene_id: &str) -> bool {
        self.0.is_match(scene_id)
    }
}

/// Fused rows of every scene, in scene order, plus the run report.
#[derive(Debug, Clone, PartialEq)]
pub struct FusionOutput {
    pub rows: Vec<DetectionRow>,
    pub report: FusionReport,
}

/// Sorted union of the scene ids of all tables.
pub fn scene_ids(tables: &[DetectionTable]) -> BTreeSet<String> {
    tables
        .iter()
        .flat_map(|t| t.scene_ids())
        .map(str::to_string)
        .collect()
}

/// Fuses every scene that appears in any of `tables` (one table per model).
///
/// Weights are checked against the number of tables once, up front. A scene
/// with rejected rows in any table is reported as failed and skipped; the
/// other scenes are unaffected.
pub fn fuse_tables(
    engine: &FusionEngine,
    tables: &[DetectionTable],
    weights: Option<&[f64]>,
    filter: Option<&SceneFilter>,
) -> FusionOutput {
    let options = engine.options();
    let mut report = FusionReport::new(options.match_iou_threshold, options.score_threshold);

    let (weights, warning) = resolve_weights(weights, tables.len());
    report.warnings.extend(warning.map(|w| w.to_string()));

    let scenes: Vec<String> = scene_ids(tables)
        .into_iter()
        .filter(|id| filter.is_none_or(|f| f.matches(id)))
        .collect();
    tracing::info!(scenes = scenes.len(), models = tables.len(), "fusing scenes");

    let outcomes = map_scenes(&scenes, |scene| fuse_one(engine, tables, &weights, scene));

    let mut rows = Vec::new();
    for (summary, scene_rows, warnings) in outcomes {
        report.push_scene(summary);
        report.warnings.extend(warnings);
        rows.extend(scene_rows);
    }
    FusionOutput { rows, report }
}

type SceneOutcome = (SceneSummary, Vec<DetectionRow>, Vec<String>);

#[cfg(feature = "parallel")]
fn map_scenes<F>(scenes: &[String], f: F) -> Vec<SceneOutcome>
where
    F: Fn(&str) -> SceneOutcome + Sync + Send,
{
    use rayon::prelude::*;
    scenes.par_iter().map(|s| f(s)).collect()
}

#[cfg(not(feature = "parallel"))]
fn map_scenes<F>(scenes: &[String], f: F) -> Vec<SceneOutcome>
where
    F: Fn(&str) -> SceneOutcome,
{
    scenes.iter().map(|s| f(s)).collect()
}

fn fuse_one(
    engine: &FusionEngine,
    tables: &[DetectionTable],
    weights: &[f64],
    scene: &str,
) -> SceneOutcome {
    let errors: Vec<String> = tables
        .iter()
        .flat_map(|t| {
            t.rejected_for(scene)
                .map(move |r| format!("{} line {}: {}", t.name(), r.line, r.reason))
        })
        .collect();

    let mut batches: Vec<RawBatch> = Vec::new();
    let mut batch_weights = Vec::new();
    for (table, &weight) in tables.iter().zip(weights) {
        let batch = table.batch_for(scene);
        if batch.is_empty() {
            continue;
        }
        batches.push(batch);
        batch_weights.push(weight);
    }
    let input_boxes = batches.iter().map(|b| b.boxes.len()).sum();

    let mut summary = SceneSummary {
        scene_id: scene.to_string(),
        status: SceneStatus::Failed,
        models: batches.len(),
        input_boxes,
        fused_boxes: 0,
        errors,
    };
    if !summary.errors.is_empty() {
        tracing::warn!(scene, errors = summary.errors.len(), "skipping scene with invalid rows");
        return (summary, Vec::new(), Vec::new());
    }

    match engine.fuse_scene(scene, &batches, Some(&batch_weights)) {
        Ok(fusion) => {
            let rows: Vec<DetectionRow> = fusion.boxes.iter().map(DetectionRow::from).collect();
            summary.fused_boxes = rows.len();
            summary.status = if rows.is_empty() {
                SceneStatus::Empty
            } else {
                SceneStatus::Fused
            };
            tracing::debug!(scene, input_boxes, fused = rows.len(), "fused scene");
            let warnings = fusion.warnings.iter().map(|w| w.to_string()).collect();
            (summary, rows, warnings)
        }
        Err(err) => {
            tracing::warn!(scene, %err, "scene failed validation");
            summary.errors.push(err.to_string());
            (summary, Vec::new(), Vec::new())
        }
    }
}

/// Per-scene contents of one table, grouped by class.
#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
pub struct SceneListing {
    pub scene_id: String,
    pub boxes: usize,
    pub classes: BTreeMap<i64, usize>,
    pub max_score: Option<f64>,
    pub rejected_rows: usize,
}

/// Groups a table by scene, listing how many boxes of each class it holds.
pub fn list_scenes(table: &DetectionTable) -> Vec<SceneListing> {
    table
        .scene_ids()
        .into_iter()
        .map(|scene| {
            let mut classes = BTreeMap::new();
            let mut max_score: Option<f64> = None;
            let mut boxes = 0;
            for row in table.rows_for(scene) {
                boxes += 1;
                *classes.entry(row.label).or_insert(0) += 1;
                max_score = Some(max_score.map_or(row.scores, |m| m.max(row.scores)));
            }
            SceneListing {
                scene_id: scene.to_string(),
                boxes,
                classes,
                max_score,
                rejected_rows: table.rejected_for(scene).count(),
            }
        })
        .collect()
}
