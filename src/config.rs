use crate::cluster::ConfidenceAggregation;
use crate::engine::FusionOptions;
use crate::error::{ConfigError, FusionError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "BOXFUSE_CONFIG";

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct BoxfuseConfig {
    #[serde(default)]
    pub fusion: FusionConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FusionConfig {
    pub match_iou_threshold: f64,
    pub score_threshold: f64,
    pub confidence_aggregation: String,
    /// One weight per input table; empty means 1.0 for every model.
    pub weights: Vec<f64>,
    /// Rank by uncapped weighted scores; emitted scores stay within [0, 1].
    pub allow_overflow: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OutputConfig {
    /// Print the fused table summary after a run.
    pub summary: bool,
    /// Treat recoverable configuration warnings as failures.
    pub strict: bool,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            match_iou_threshold: 0.7,
            score_threshold: 0.85,
            confidence_aggregation: ConfidenceAggregation::Max.to_string(),
            weights: Vec::new(),
            allow_overflow: false,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            summary: true,
            strict: false,
        }
    }
}

impl FusionConfig {
    /// Engine options plus any recoverable problem with the aggregation rule.
    pub fn options(&self) -> (FusionOptions, Option<ConfigError>) {
        let (aggregation, warning) = ConfidenceAggregation::resolve(&self.confidence_aggregation);
        let options = FusionOptions {
            match_iou_threshold: self.match_iou_threshold,
            score_threshold: self.score_threshold,
            aggregation,
            allow_overflow: self.allow_overflow,
        };
        (options, warning)
    }

    pub fn weights(&self) -> Option<&[f64]> {
        if self.weights.is_empty() {
            None
        } else {
            Some(self.weights.as_slice())
        }
    }
}

impl BoxfuseConfig {
    /// Loads the config from `explicit`, else `$BOXFUSE_CONFIG`, else the
    /// user config directory. A missing default file yields the defaults; a
    /// missing explicit file or a malformed one is an error.
    pub fn load(explicit: Option<&Path>) -> Result<Self, FusionError> {
        if let Some(path) = explicit {
            return Self::load_from(path);
        }
        if let Some(path) = std::env::var_os(CONFIG_ENV).filter(|v| !v.is_empty()) {
            return Self::load_from(Path::new(&path));
        }
        match Self::config_file_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, FusionError> {
        let content = std::fs::read_to_string(path).map_err(|e| FusionError::io(path, e))?;
        let config = toml::from_str(&content).map_err(|source| FusionError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::debug!(path = %path.display(), "loaded config");
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), FusionError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| FusionError::io(parent, e))?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| FusionError::io(path, e))
    }

    pub fn to_toml(&self) -> Result<String, FusionError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// The file `load` would read, whether or not it exists.
    pub fn resolve_path(explicit: Option<&Path>) -> Option<PathBuf> {
        explicit
            .map(Path::to_path_buf)
            .or_else(|| {
                std::env::var_os(CONFIG_ENV)
                    .filter(|v| !v.is_empty())
                    .map(PathBuf::from)
            })
            .or_else(Self::config_file_path)
    }

    pub fn config_file_path() -> Option<PathBuf> {
        Self::config_dir().map(|mut path| {
            path.push("config.toml");
            path
        })
    }

    pub fn config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|mut path| {
            path.push("boxfuse");
            path
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = BoxfuseConfig::default();
        assert_eq!(config.fusion.match_iou_threshold, 0.7);
        assert_eq!(config.fusion.score_threshold, 0.85);
        assert_eq!(config.fusion.confidence_aggregation, "max");
        assert!(config.fusion.weights.is_empty());
        assert!(!config.fusion.allow_overflow);
        assert!(config.output.summary);
        assert!(!config.output.strict);
    }

    #[test]
    fn test_config_serialization() {
        let toml_str = toml::to_string(&BoxfuseConfig::default()).unwrap();
        assert!(toml_str.contains("[fusion]"));
        assert!(toml_str.contains("[output]"));
        assert!(toml_str.contains("match_iou_threshold = 0.7"));
        assert!(toml_str.contains("confidence_aggregation = \"max\""));
    }

    #[test]
    fn test_config_deserialization() {
        let toml_str = r#"
[fusion]
match_iou_threshold = 0.55
score_threshold = 0.1
confidence_aggregation = "max"
weights = [1.0, 0.5]
allow_overflow = true

[output]
summary = false
strict = true
"#;
        let config: BoxfuseConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.fusion.match_iou_threshold, 0.55);
        assert_eq!(config.fusion.weights(), Some(&[1.0, 0.5][..]));
        assert!(config.fusion.allow_overflow);
        assert!(!config.output.summary);
        assert!(config.output.strict);
    }

    #[test]
    fn test_config_partial_deserialization() {
        let config: BoxfuseConfig = toml::from_str("[fusion]\nscore_threshold = 0.3\n").unwrap();
        assert_eq!(config.fusion.score_threshold, 0.3);
        assert_eq!(config.fusion.match_iou_threshold, 0.7);
        assert!(config.output.summary);
        assert_eq!(config.fusion.weights(), None);
    }

    #[test]
    fn average_aggregation_falls_back_with_warning() {
        let config: BoxfuseConfig =
            toml::from_str("[fusion]\nconfidence_aggregation = \"avg\"\n").unwrap();
        let (options, warning) = config.fusion.options();
        assert_eq!(options.aggregation, ConfidenceAggregation::Max);
        assert!(matches!(warning, Some(ConfigError::UnsupportedAggregation(_))));
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut config = BoxfuseConfig::default();
        config.fusion.weights = vec![2.0, 1.0];
        config.save_to(&path).unwrap();
        assert_eq!(BoxfuseConfig::load(Some(&path)).unwrap(), config);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[fusion\nscore_threshold = ").unwrap();
        assert!(matches!(
            BoxfuseConfig::load_from(&path),
            Err(FusionError::ConfigParse { .. })
        ));
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(matches!(
            BoxfuseConfig::load(Some(&missing)),
            Err(FusionError::Io { .. })
        ));
    }
}
