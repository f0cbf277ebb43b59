mod artifact;
mod heatmap;
mod mock;

use std::sync::Arc;

use leafcare_core::{ModelConfig, ModelInfo};
use ndarray::Array4;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

pub use artifact::{ArtifactClass, ArtifactError, CentroidArtifact, CentroidClassifier};
pub use heatmap::HeatmapError;
pub use mock::{MockClassifier, MOCK_LABELS};

#[derive(Debug, Clone, PartialEq)]
pub struct DiseasePrediction {
    pub disease_id: String,
    pub disease_name: String,
    pub confidence: f32,
    pub heatmap_base64: Option<String>,
}

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("invalid model input: {0}")]
    InvalidInput(String),
    #[error("model backend failed: {0}")]
    Backend(String),
}

impl ModelError {
    pub fn code(&self) -> &'static str {
        "MODEL_FAILURE"
    }
}

pub trait DiseaseClassifier: Send + Sync {
    fn name(&self) -> &'static str;
    fn predict(&self, tensor: &Array4<f32>) -> Result<DiseasePrediction, ModelError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelBackend {
    Mock,
    LocalArtifact,
}

impl ModelBackend {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Mock => "mock",
            Self::LocalArtifact => "local_artifact",
        }
    }
}

/// The classifier chosen once at startup, plus what is reported about it.
#[derive(Clone)]
pub struct ModelAdapter {
    backend: ModelBackend,
    classifier: Arc<dyn DiseaseClassifier>,
    config: ModelConfig,
    artifact_sha256: Option<String>,
}

impl ModelAdapter {
    /// Never fails: a missing or incompatible artifact downgrades to the mock backend.
    pub fn from_config(config: &ModelConfig) -> Self {
        let mock = || Self::mock(config);

        if config.mock_mode {
            info!(strategy = ?config.mock_strategy, "model adapter running in mock mode");
            return mock();
        }
        let Some(path) = config.path.as_ref() else {
            warn!("model.mock_mode is off but model.path is unset; using mock backend");
            return mock();
        };

        match CentroidClassifier::load(path, config.input_size) {
            Ok(classifier) => {
                info!(
                    path = %path.display(),
                    model = %classifier.artifact().name,
                    classes = classifier.artifact().classes.len(),
                    "loaded model artifact"
                );
                Self {
                    backend: ModelBackend::LocalArtifact,
                    artifact_sha256: Some(classifier.sha256().to_string()),
                    classifier: Arc::new(classifier),
                    config: config.clone(),
                }
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "model artifact unavailable; using mock backend");
                mock()
            }
        }
    }

    pub fn mock(config: &ModelConfig) -> Self {
        Self::with_classifier(
            ModelBackend::Mock,
            Arc::new(MockClassifier::new(config.mock_strategy)),
            config,
        )
    }

    pub fn with_classifier(
        backend: ModelBackend,
        classifier: Arc<dyn DiseaseClassifier>,
        config: &ModelConfig,
    ) -> Self {
        Self {
            backend,
            classifier,
            config: config.clone(),
            artifact_sha256: None,
        }
    }

    pub fn backend(&self) -> ModelBackend {
        self.backend
    }

    pub fn is_mock_mode(&self) -> bool {
        self.backend == ModelBackend::Mock
    }

    /// Confidence is clamped to [0, 1]; a non-finite confidence is a backend failure.
    pub fn predict(&self, tensor: &Array4<f32>) -> Result<DiseasePrediction, ModelError> {
        let mut prediction = self.classifier.predict(tensor)?;
        if !prediction.confidence.is_finite() {
            return Err(ModelError::Backend(format!(
                "{} returned a non-finite confidence",
                self.classifier.name()
            )));
        }
        prediction.confidence = prediction.confidence.clamp(0.0, 1.0);
        Ok(prediction)
    }

    pub fn model_info(&self) -> ModelInfo {
        ModelInfo {
            backend: self.backend.as_str().to_string(),
            mock_mode: self.is_mock_mode(),
            model_loaded: self.backend == ModelBackend::LocalArtifact,
            model_path: self
                .config
                .path
                .as_ref()
                .map(|path| path.display().to_string()),
            input_size: self.config.input_size,
            confidence_threshold: self.config.confidence_threshold,
            artifact_sha256: self.artifact_sha256.clone(),
        }
    }
}
