use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Version of the JSON report layout.
pub const REPORT_VERSION: &str = "0.1.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum SceneStatus {
    /// At least one box survived fusion.
    Fused,
    /// Nothing survived the score threshold.
    Empty,
    /// The scene was skipped because some of its input was invalid.
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SceneSummary {
    pub scene_id: String,
    pub status: SceneStatus,
    /// Number of models that contributed at least one row.
    pub models: usize,
    pub input_boxes: usize,
    pub fused_boxes: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Totals {
    pub scenes: usize,
    pub failed_scenes: usize,
    pub input_boxes: usize,
    pub fused_boxes: usize,
}

/// Outcome of a multi-scene fusion run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FusionReport {
    pub version: String,
    pub match_iou_threshold: f64,
    pub score_threshold: f64,
    pub scenes: Vec<SceneSummary>,
    #[serde(default)]
    pub warnings: Vec<String>,
    pub totals: Totals,
}

impl FusionReport {
    pub fn new(match_iou_threshold: f64, score_threshold: f64) -> Self {
        Self {
            version: REPORT_VERSION.to_string(),
            match_iou_threshold,
            score_threshold,
            scenes: Vec::new(),
            warnings: Vec::new(),
            totals: Totals::default(),
        }
    }

    pub fn push_scene(&mut self, scene: SceneSummary) {
        self.totals.scenes += 1;
        self.totals.input_boxes += scene.input_boxes;
        self.totals.fused_boxes += scene.fused_boxes;
        if scene.status == SceneStatus::Failed {
            self.totals.failed_scenes += 1;
        }
        self.scenes.push(scene);
    }

    pub fn failures(&self) -> impl Iterator<Item = &SceneSummary> {
        self.scenes
            .iter()
            .filter(|s| s.status == SceneStatus::Failed)
    }

    pub fn has_failures(&self) -> bool {
        self.totals.failed_scenes > 0
    }
}
