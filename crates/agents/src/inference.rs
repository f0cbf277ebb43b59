use leafcare_core::{AppConfig, ConfidenceLevel, ConfidencePolicy, InferenceResult, ModelInfo};
use leafcare_ml::{ModelAdapter, ModelError};
use leafcare_vision::{ImageValidator, ValidationError};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum InferenceError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Model(#[from] ModelError),
}

impl InferenceError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(err) => err.code(),
            Self::Model(err) => err.code(),
        }
    }
}

/// Validate, preprocess, predict. Failures are returned, never retried.
#[derive(Clone)]
pub struct InferenceOrchestrator {
    validator: ImageValidator,
    adapter: ModelAdapter,
    policy: ConfidencePolicy,
}

impl InferenceOrchestrator {
    pub fn new(config: &AppConfig, adapter: ModelAdapter) -> Self {
        Self {
            validator: ImageValidator::new(config.image.clone(), config.model.input_size),
            adapter,
            policy: ConfidencePolicy::from_config(&config.model),
        }
    }

    pub fn process_image(
        &self,
        bytes: &[u8],
        filename: &str,
    ) -> Result<InferenceResult, InferenceError> {
        let validated = self.validator.inspect(bytes, filename)?;
        let tensor = self.validator.to_tensor(&validated.image);
        let prediction = self.adapter.predict(&tensor)?;
        debug!(
            disease_id = %prediction.disease_id,
            confidence = prediction.confidence,
            "prediction complete"
        );

        Ok(InferenceResult {
            disease_id: prediction.disease_id,
            disease_name: prediction.disease_name,
            confidence: prediction.confidence,
            heatmap_base64: prediction.heatmap_base64,
            backend: self.adapter.backend().as_str().to_string(),
            mock_mode: self.adapter.is_mock_mode(),
            confidence_threshold: self.policy.high_threshold(),
            image: validated.metadata,
        })
    }

    pub fn get_confidence_level(&self, confidence: f32) -> ConfidenceLevel {
        self.policy.level(confidence)
    }

    pub fn should_recommend_treatment(&self, confidence: f32, disease_id: &str) -> bool {
        self.policy.should_recommend_treatment(confidence, disease_id)
    }

    pub fn get_uncertainty_message(&self, confidence: f32, disease_id: &str) -> Option<String> {
        self.policy.uncertainty_message(confidence, disease_id)
    }

    pub fn validator(&self) -> &ImageValidator {
        &self.validator
    }

    pub fn is_mock_mode(&self) -> bool {
        self.adapter.is_mock_mode()
    }

    pub fn model_info(&self) -> ModelInfo {
        self.adapter.model_info()
    }
}
