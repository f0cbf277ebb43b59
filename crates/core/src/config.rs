use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed reading config at {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid YAML in config at {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MockStrategy {
    /// Same tensor, same label.
    #[default]
    ContentHash,
    /// Round-robin over the mock label set.
    Cycle,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub mock_mode: bool,
    pub path: Option<PathBuf>,
    pub mock_strategy: MockStrategy,
    pub confidence_threshold: f32,
    pub low_confidence_threshold: f32,
    /// `[width, height]` of the model input.
    pub input_size: [u32; 2],
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            mock_mode: true,
            path: Some(PathBuf::from("models/leaf_centroids.json")),
            mock_strategy: MockStrategy::ContentHash,
            confidence_threshold: 0.7,
            low_confidence_threshold: 0.5,
            input_size: [224, 224],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageConfig {
    pub max_size_mb: f64,
    pub supported_formats: Vec<String>,
    /// `[width, height]` lower bounds.
    pub min_dimensions: [u32; 2],
    pub min_aspect_ratio: f32,
    pub max_aspect_ratio: f32,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            max_size_mb: 8.0,
            supported_formats: vec!["jpg".to_string(), "jpeg".to_string(), "png".to_string()],
            min_dimensions: [150, 150],
            min_aspect_ratio: 0.25,
            max_aspect_ratio: 4.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AntiOveruseConfig {
    pub max_dosage_multiplier: f64,
    pub require_confirmation_above: f64,
}

impl Default for AntiOveruseConfig {
    fn default() -> Self {
        Self {
            max_dosage_multiplier: 2.0,
            require_confirmation_above: 1.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalizationConfig {
    pub default_language: String,
    pub supported_languages: Vec<String>,
}

impl Default for LocalizationConfig {
    fn default() -> Self {
        Self {
            default_language: "en".to_string(),
            supported_languages: ["en", "es", "fr", "hi", "pt"]
                .iter()
                .map(ToString::to_string)
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub model: ModelConfig,
    pub image: ImageConfig,
    pub anti_overuse: AntiOveruseConfig,
    pub localization: LocalizationConfig,
    /// Sustainable Development Goals the advice is reported against.
    pub sdg_alignment: Vec<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            model: ModelConfig::default(),
            image: ImageConfig::default(),
            anti_overuse: AntiOveruseConfig::default(),
            localization: LocalizationConfig::default(),
            sdg_alignment: default_sdg_alignment(),
        }
    }
}

pub fn default_sdg_alignment() -> Vec<String> {
    [
        "SDG 2: Zero Hunger",
        "SDG 3: Good Health and Well-being",
        "SDG 12: Responsible Consumption and Production",
        "SDG 15: Life on Land",
    ]
    .iter()
    .map(ToString::to_string)
    .collect()
}

impl AppConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(raw).map_err(|source| ConfigError::Parse {
            path: PathBuf::from("<inline>"),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let model = &self.model;
        for (name, value) in [
            ("model.confidence_threshold", model.confidence_threshold),
            ("model.low_confidence_threshold", model.low_confidence_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Invalid(format!(
                    "{name} must be within [0, 1], got {value}"
                )));
            }
        }
        if model.low_confidence_threshold > model.confidence_threshold {
            return Err(ConfigError::Invalid(format!(
                "model.low_confidence_threshold ({}) must not exceed model.confidence_threshold ({})",
                model.low_confidence_threshold, model.confidence_threshold
            )));
        }
        if model.input_size.contains(&0) {
            return Err(ConfigError::Invalid(
                "model.input_size must be positive".to_string(),
            ));
        }

        let image = &self.image;
        if !(image.max_size_mb.is_finite() && image.max_size_mb > 0.0) {
            return Err(ConfigError::Invalid(
                "image.max_size_mb must be a positive number".to_string(),
            ));
        }
        if image.supported_formats.is_empty() {
            return Err(ConfigError::Invalid(
                "image.supported_formats must not be empty".to_string(),
            ));
        }
        if !(image.min_aspect_ratio > 0.0 && image.min_aspect_ratio <= image.max_aspect_ratio) {
            return Err(ConfigError::Invalid(format!(
                "image aspect bounds are inconsistent: {}-{}",
                image.min_aspect_ratio, image.max_aspect_ratio
            )));
        }

        let overuse = &self.anti_overuse;
        if !(overuse.require_confirmation_above >= 1.0
            && overuse.require_confirmation_above <= overuse.max_dosage_multiplier)
        {
            return Err(ConfigError::Invalid(format!(
                "anti_overuse thresholds must satisfy 1 <= require_confirmation_above ({}) <= max_dosage_multiplier ({})",
                overuse.require_confirmation_above, overuse.max_dosage_multiplier
            )));
        }

        let localization = &self.localization;
        if !localization
            .supported_languages
            .iter()
            .any(|lang| lang == &localization.default_language)
        {
            return Err(ConfigError::Invalid(format!(
                "localization.default_language '{}' is not among supported_languages",
                localization.default_language
            )));
        }

        if self.sdg_alignment.iter().any(|goal| goal.trim().is_empty()) {
            return Err(ConfigError::Invalid(
                "sdg_alignment entries must not be blank".to_string(),
            ));
        }

        Ok(())
    }

    /// Lowercased supported extensions.
    pub fn supported_extensions(&self) -> Vec<String> {
        self.image
            .supported_formats
            .iter()
            .map(|ext| ext.trim().trim_start_matches('.').to_lowercase())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_yaml_keeps_defaults() {
        let config = AppConfig::from_yaml_str(
            "model:\n  low_confidence_threshold: 0.4\nimage:\n  max_size_mb: 5\n",
        )
        .unwrap();
        assert_eq!(config.model.low_confidence_threshold, 0.4);
        assert_eq!(config.model.input_size, [224, 224]);
        assert_eq!(config.image.max_size_mb, 5.0);
        assert_eq!(config.localization.default_language, "en");
    }

    #[test]
    fn rejects_inverted_confidence_thresholds() {
        let err = AppConfig::from_yaml_str(
            "model:\n  confidence_threshold: 0.4\n  low_confidence_threshold: 0.6\n",
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_default_language_outside_supported_set() {
        let err = AppConfig::from_yaml_str(
            "localization:\n  default_language: de\n  supported_languages: [en, fr]\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("default_language"));
    }

    #[test]
    fn sdg_alignment_defaults_and_overrides() {
        let config = AppConfig::from_yaml_str("model:\n  mock_mode: true\n").unwrap();
        assert_eq!(config.sdg_alignment, default_sdg_alignment());

        let config =
            AppConfig::from_yaml_str("sdg_alignment: [\"SDG 12: Responsible Consumption\"]\n")
                .unwrap();
        assert_eq!(config.sdg_alignment, ["SDG 12: Responsible Consumption"]);

        let err = AppConfig::from_yaml_str("sdg_alignment: [\"  \"]\n").unwrap_err();
        assert!(err.to_string().contains("sdg_alignment"));
    }

    #[test]
    fn parses_mock_strategy() {
        let config = AppConfig::from_yaml_str("model:\n  mock_strategy: cycle\n").unwrap();
        assert_eq!(config.model.mock_strategy, MockStrategy::Cycle);
    }
}
