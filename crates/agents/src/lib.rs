pub mod inference;

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use leafcare_core::{
    AppConfig, ConfidencePolicy, DetectionResponse, DiseaseListing, DosageReport, ErrorResponse,
    FormatError, GrowthStage, HealthResponse, KnowledgeBase, ModelInfo, RecommendationEngine,
    RecommendationResult, RequestMetadata, ResponseFormatter, TreatmentLookupResponse,
};
use leafcare_ml::ModelAdapter;
use leafcare_observability::AppMetrics;
use leafcare_vision::ValidationErrorKind;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, instrument, warn};

pub use inference::{InferenceError, InferenceOrchestrator};

/// Optional context a farmer attaches to an upload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRequest {
    pub crop_type: Option<String>,
    pub growth_stage: Option<GrowthStage>,
    pub location: Option<String>,
    pub language: Option<String>,
}

#[derive(Debug, Error)]
pub enum AdvisorError {
    #[error(transparent)]
    Inference(#[from] InferenceError),
    #[error(transparent)]
    Format(#[from] FormatError),
}

impl AdvisorError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Inference(err) => err.code(),
            Self::Format(err) => err.code(),
        }
    }

    pub fn validation_kind(&self) -> Option<ValidationErrorKind> {
        match self {
            Self::Inference(InferenceError::Validation(err)) => Some(err.kind()),
            _ => None,
        }
    }
}

/// The full pipeline: validation, inference, recommendation and presentation.
#[derive(Clone)]
pub struct PlantCareAdvisor {
    config: Arc<AppConfig>,
    orchestrator: InferenceOrchestrator,
    engine: RecommendationEngine,
    formatter: ResponseFormatter,
    metrics: Arc<AppMetrics>,
}

impl PlantCareAdvisor {
    pub fn new(config: AppConfig, kb: Arc<KnowledgeBase>, metrics: Arc<AppMetrics>) -> Self {
        let adapter = ModelAdapter::from_config(&config.model);
        Self::with_adapter(config, kb, adapter, metrics)
    }

    pub fn with_adapter(
        config: AppConfig,
        kb: Arc<KnowledgeBase>,
        adapter: ModelAdapter,
        metrics: Arc<AppMetrics>,
    ) -> Self {
        let policy = ConfidencePolicy::from_config(&config.model);
        Self {
            orchestrator: InferenceOrchestrator::new(&config, adapter),
            engine: RecommendationEngine::new(kb, policy, config.anti_overuse.clone())
                .with_sdg_alignment(config.sdg_alignment.clone()),
            formatter: ResponseFormatter::new(&config.localization, policy),
            config: Arc::new(config),
            metrics,
        }
    }

    /// Reads the config (defaults when `config_path` is `None`) and knowledge base.
    pub fn load(
        config_path: Option<&Path>,
        kb_path: &Path,
        metrics: Arc<AppMetrics>,
    ) -> Result<Self> {
        let config = match config_path {
            Some(path) => AppConfig::load(path)
                .with_context(|| format!("failed loading config from {}", path.display()))?,
            None => AppConfig::default(),
        };
        let kb = KnowledgeBase::load(kb_path).with_context(|| {
            format!("failed loading knowledge base from {}", kb_path.display())
        })?;
        info!(diseases = kb.len(), kb = %kb_path.display(), "knowledge base loaded");

        Ok(Self::new(config, Arc::new(kb), metrics))
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn metrics(&self) -> &Arc<AppMetrics> {
        &self.metrics
    }

    pub fn orchestrator(&self) -> &InferenceOrchestrator {
        &self.orchestrator
    }

    pub fn engine(&self) -> &RecommendationEngine {
        &self.engine
    }

    pub fn formatter(&self) -> &ResponseFormatter {
        &self.formatter
    }

    pub fn model_info(&self) -> ModelInfo {
        self.orchestrator.model_info()
    }

    #[instrument(skip(self, bytes, request), fields(size = bytes.len()))]
    pub fn analyze_image(
        &self,
        bytes: &[u8],
        filename: &str,
        request: AnalysisRequest,
    ) -> Result<DetectionResponse, AdvisorError> {
        let started = Instant::now();
        self.metrics.inc_request();

        let inference = match self.orchestrator.process_image(bytes, filename) {
            Ok(result) => result,
            Err(err) => {
                match &err {
                    InferenceError::Validation(validation) => {
                        self.metrics.inc_validation_failure(validation.code());
                        info!(code = validation.code(), error = %validation, "upload rejected");
                    }
                    InferenceError::Model(model) => {
                        self.metrics.inc_model_failure();
                        warn!(error = %model, "inference failed");
                    }
                }
                self.metrics.observe_latency(started.elapsed());
                return Err(err.into());
            }
        };
        self.metrics.inc_inference(inference.mock_mode);

        let recommendation = self.recommend(
            &inference.disease_id,
            inference.confidence,
            &request,
        );
        let treatments = recommendation.recommended_treatments.len();
        let response = self.formatter.format_detection_response(
            &inference,
            recommendation,
            request.language.as_deref(),
        )?;

        self.metrics.observe_latency(started.elapsed());
        info!(
            disease_id = %response.disease.id,
            confidence = inference.confidence,
            backend = %inference.backend,
            treatments,
            language = %response.metadata.language,
            "image analyzed"
        );
        Ok(response)
    }

    pub fn recommend(
        &self,
        disease_id: &str,
        confidence: f32,
        request: &AnalysisRequest,
    ) -> RecommendationResult {
        let language = self
            .formatter
            .catalog()
            .resolve_language(request.language.as_deref());
        self.engine.get_recommendations(
            disease_id,
            confidence,
            RequestMetadata {
                crop_type: request.crop_type.clone(),
                growth_stage: request.growth_stage,
                location: request.location.clone(),
                language,
            },
        )
    }

    #[instrument(skip(self))]
    pub fn treatment_info(
        &self,
        disease_id: &str,
        language: Option<&str>,
    ) -> Result<TreatmentLookupResponse, AdvisorError> {
        self.metrics.inc_request();
        let entry = self.engine.get_treatment_by_id(disease_id);
        if entry.is_none() {
            info!(disease_id, "treatment lookup for unknown disease");
        }
        Ok(self
            .formatter
            .format_treatment_lookup_response(entry, language)?)
    }

    pub fn list_diseases(&self) -> Vec<DiseaseListing> {
        self.engine.list_diseases()
    }

    #[instrument(skip(self))]
    pub fn validate_dosage(
        &self,
        disease_id: &str,
        remedy_name: &str,
        requested_dosage: &str,
    ) -> DosageReport {
        self.metrics.inc_request();
        let verdict = self
            .engine
            .validate_dosage(disease_id, remedy_name, requested_dosage);
        self.metrics.record_dosage_check(verdict.is_blocked());
        if verdict.is_blocked() {
            warn!(warning = verdict.warning().unwrap_or_default(), "dosage request blocked");
        }
        verdict.report()
    }

    pub fn health(&self) -> HealthResponse {
        self.formatter
            .format_health_check_response(self.orchestrator.model_info())
    }

    pub fn error_response(&self, err: &AdvisorError, language: Option<&str>) -> ErrorResponse {
        self.formatter
            .format_error_response(err.to_string(), err.code(), language)
    }
}
