use crate::detections::Detection;
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How a cluster's output box is chosen from its members.
///
/// Only `Max` exists: the member with the highest confidence is emitted
/// unchanged. Confidence-weighted coordinate averaging is not implemented;
/// asking for it by name (`avg`, `average`) is rejected rather than
/// silently treated as `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceAggregation {
    #[default]
    Max,
}

impl ConfidenceAggregation {
    /// Parses a configuration value, falling back to `Max` on anything other
    /// than `max`. The returned error is meant to be surfaced as a warning.
    pub fn resolve(value: &str) -> (Self, Option<ConfigError>) {
        match value.parse() {
            Ok(agg) => (agg, None),
            Err(err) => {
                tracing::warn!(%err, "confidence aggregation fallback");
                (Self::Max, Some(err))
            }
        }
    }
}

impl FromStr for ConfidenceAggregation {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "max" => Ok(Self::Max),
            "avg" | "average" | "mean" => Err(ConfigError::UnsupportedAggregation(s.to_string())),
            _ => Err(ConfigError::UnknownAggregation(s.to_string())),
        }
    }
}

impl fmt::Display for ConfidenceAggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Max => f.write_str("max"),
        }
    }
}

/// Picks the cluster's representative: the highest-confidence member,
/// copied verbatim. The first member wins exact ties.
pub fn select_representative<'a>(
    members: &'a [Detection],
    aggregation: ConfidenceAggregation,
) -> Option<&'a Detection> {
    match aggregation {
        ConfidenceAggregation::Max => {
            let mut best: Option<&Detection> = None;
            for m in members {
                if best.is_none_or(|b| m.confidence > b.confidence) {
                    best = Some(m);
                }
            }
            best
        }
    }
}
