//! Presentation layer: merges inference and recommendation output, attaches
//! localized labels and derives display-only indicators.

use serde::Serialize;
use thiserror::Error;

use crate::config::LocalizationConfig;
use crate::localization::{LabelCatalog, LocalizedLabels};
use crate::models::{
    DiseaseRef, DiseaseSummary, ImageMetadata, InferenceResult, ModelInfo, RecommendationResult,
    Remedy, RemedyKind, RequestMetadata, TreatmentCatalogEntry,
};
use crate::policy::{ConfidenceLevel, ConfidencePolicy};

pub const SERVICE_NAME: &str = "LeafCare Plant Disease Advisor";
pub const TREATMENT_NOT_FOUND: &str = "Treatment not found";

#[derive(Debug, Error)]
pub enum FormatError {
    #[error("remedy '{remedy}' has a malformed cost estimate")]
    MalformedCost { remedy: String },
}

impl FormatError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::MalformedCost { .. } => "MALFORMED_COST",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SafetyLevel {
    Low,
    Medium,
    High,
}

impl SafetyLevel {
    pub fn from_ppe_count(count: usize) -> Self {
        match count {
            0 => Self::Low,
            1 | 2 => Self::Medium,
            _ => Self::High,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CostLevel {
    Free,
    Low,
    Medium,
    High,
}

impl CostLevel {
    pub fn from_amount(amount: f64) -> Self {
        if amount == 0.0 {
            Self::Free
        } else if amount <= 20.0 {
            Self::Low
        } else if amount <= 50.0 {
            Self::Medium
        } else {
            Self::High
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VisualIndicators {
    pub badge: RemedyKind,
    pub color: &'static str,
    pub safety_level: SafetyLevel,
    pub cost_level: CostLevel,
}

/// A remedy as shown to the farmer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TreatmentView {
    #[serde(flatten)]
    pub remedy: Remedy,
    pub cost_display: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub indicators: Option<VisualIndicators>,
}

impl From<Remedy> for TreatmentView {
    fn from(remedy: Remedy) -> Self {
        Self {
            cost_display: remedy.cost_estimate.display(),
            remedy,
            indicators: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelSnapshot {
    pub backend: String,
    pub mock_mode: bool,
    pub confidence_threshold: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectionMetadata {
    pub language: String,
    pub model_info: ModelSnapshot,
    pub image_metadata: ImageMetadata,
    pub recommendation_metadata: RequestMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectionResponse {
    pub disease: DiseaseSummary,
    pub confidence_level: ConfidenceLevel,
    pub treatment_recommended: bool,
    pub recommended_treatments: Vec<TreatmentView>,
    pub notes: String,
    pub summary: String,
    pub supporting_heatmap_base64: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_warning: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uncertainty_warning: Option<String>,
    pub sdg_alignment: Vec<String>,
    pub labels: LocalizedLabels,
    pub metadata: DetectionMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LookupMetadata {
    pub language: String,
    pub source: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TreatmentLookupResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub disease: Option<DiseaseRef>,
    pub treatments: Vec<TreatmentView>,
    pub labels: LocalizedLabels,
    pub metadata: LookupMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorResponse {
    pub error: bool,
    pub error_code: String,
    pub message: String,
    pub language: String,
    pub labels: LocalizedLabels,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthFeatures {
    pub image_upload: bool,
    pub disease_detection: bool,
    pub treatment_recommendations: bool,
    pub anti_overuse_protection: bool,
    pub multilingual_support: bool,
    pub mock_mode: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
    pub model: ModelInfo,
    pub features: HealthFeatures,
    pub supported_languages: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ResponseFormatter {
    catalog: LabelCatalog,
    policy: ConfidencePolicy,
}

impl ResponseFormatter {
    pub fn new(config: &LocalizationConfig, policy: ConfidencePolicy) -> Self {
        Self {
            catalog: LabelCatalog::new(config),
            policy,
        }
    }

    pub fn catalog(&self) -> &LabelCatalog {
        &self.catalog
    }

    pub fn format_detection_response(
        &self,
        inference: &InferenceResult,
        recommendation: RecommendationResult,
        language: Option<&str>,
    ) -> Result<DetectionResponse, FormatError> {
        let language = self.catalog.resolve_language(language);
        let labels = self.catalog.labels_for(&language);
        let treatments = self.add_visual_indicators(
            recommendation
                .recommended_treatments
                .iter()
                .cloned()
                .map(TreatmentView::from)
                .collect(),
        )?;
        let summary = localized_summary(&labels, &recommendation);

        Ok(DetectionResponse {
            confidence_level: self.policy.level(inference.confidence),
            treatment_recommended: self
                .policy
                .should_recommend_treatment(inference.confidence, &recommendation.disease.id),
            disease: recommendation.disease,
            recommended_treatments: treatments,
            notes: recommendation.notes,
            summary,
            supporting_heatmap_base64: inference.heatmap_base64.clone(),
            image_warning: inference.image.warning.clone(),
            uncertainty_warning: recommendation.uncertainty_warning,
            sdg_alignment: recommendation.sdg_alignment,
            labels,
            metadata: DetectionMetadata {
                language,
                model_info: ModelSnapshot {
                    backend: inference.backend.clone(),
                    mock_mode: inference.mock_mode,
                    confidence_threshold: inference.confidence_threshold,
                },
                image_metadata: inference.image.clone(),
                recommendation_metadata: recommendation.metadata,
            },
        })
    }

    /// Recomputes indicators from remedy data, so re-applying is a no-op.
    pub fn add_visual_indicators(
        &self,
        treatments: Vec<TreatmentView>,
    ) -> Result<Vec<TreatmentView>, FormatError> {
        treatments
            .into_iter()
            .map(|mut view| {
                view.indicators = Some(visual_indicators(&view.remedy)?);
                Ok(view)
            })
            .collect()
    }

    pub fn format_treatment_lookup_response(
        &self,
        entry: Option<TreatmentCatalogEntry>,
        language: Option<&str>,
    ) -> Result<TreatmentLookupResponse, FormatError> {
        let language = self.catalog.resolve_language(language);
        let labels = self.catalog.labels_for(&language);
        let metadata = LookupMetadata {
            language,
            source: "offline_lookup",
        };

        let Some(entry) = entry else {
            return Ok(TreatmentLookupResponse {
                error: Some(TREATMENT_NOT_FOUND.to_string()),
                disease: None,
                treatments: Vec::new(),
                labels,
                metadata,
            });
        };

        Ok(TreatmentLookupResponse {
            error: None,
            treatments: self
                .add_visual_indicators(entry.remedies.into_iter().map(TreatmentView::from).collect())?,
            disease: Some(entry.disease),
            labels,
            metadata,
        })
    }

    pub fn format_error_response(
        &self,
        message: impl Into<String>,
        error_code: &str,
        language: Option<&str>,
    ) -> ErrorResponse {
        let language = self.catalog.resolve_language(language);
        ErrorResponse {
            error: true,
            error_code: error_code.to_string(),
            message: message.into(),
            labels: self.catalog.labels_for(&language),
            language,
        }
    }

    pub fn format_health_check_response(&self, model: ModelInfo) -> HealthResponse {
        HealthResponse {
            status: "healthy",
            service: SERVICE_NAME,
            version: env!("CARGO_PKG_VERSION"),
            features: HealthFeatures {
                image_upload: true,
                disease_detection: true,
                treatment_recommendations: true,
                anti_overuse_protection: true,
                multilingual_support: self.catalog.supported_languages().len() > 1,
                mock_mode: model.mock_mode,
            },
            model,
            supported_languages: self.catalog.supported_languages().to_vec(),
        }
    }
}

fn visual_indicators(remedy: &Remedy) -> Result<VisualIndicators, FormatError> {
    if !remedy.cost_estimate.is_well_formed() {
        return Err(FormatError::MalformedCost {
            remedy: remedy.name.clone(),
        });
    }

    Ok(VisualIndicators {
        badge: remedy.kind,
        color: match remedy.kind {
            RemedyKind::Organic => "green",
            RemedyKind::Chemical => "orange",
        },
        safety_level: SafetyLevel::from_ppe_count(remedy.safety.ppe.len()),
        cost_level: CostLevel::from_amount(remedy.cost_estimate.amount),
    })
}

fn label<'a>(labels: &'a LocalizedLabels, key: &'a str) -> &'a str {
    labels.get(key).map(String::as_str).unwrap_or(key)
}

fn localized_summary(labels: &LocalizedLabels, recommendation: &RecommendationResult) -> String {
    if recommendation.recommended_treatments.is_empty() {
        return recommendation.notes.clone();
    }

    let mut parts = vec![format!(
        "{}: {}",
        label(labels, "disease_detected"),
        recommendation.disease.name
    )];
    if let Some(organic) = recommendation.organic_treatments().next() {
        parts.push(format!(
            "{}: {} ({})",
            label(labels, "organic_treatment"),
            organic.name,
            organic.dosage
        ));
    }
    if let Some(chemical) = recommendation.chemical_treatments().next() {
        parts.push(format!(
            "{}: {} ({}), {}: {}, {}: {}d",
            label(labels, "chemical_treatment"),
            chemical.name,
            chemical.dosage,
            label(labels, "ppe_required"),
            chemical.safety.ppe.join(", "),
            label(labels, "pre_harvest_interval"),
            chemical.safety.pre_harvest_interval_days
        ));
    }
    parts.join(" | ")
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::AntiOveruseConfig;
    use crate::knowledge::sample_knowledge_base;
    use crate::recommender::RecommendationEngine;

    fn policy() -> ConfidencePolicy {
        ConfidencePolicy::new(0.5, 0.7)
    }

    fn formatter() -> ResponseFormatter {
        ResponseFormatter::new(&LocalizationConfig::default(), policy())
    }

    fn engine() -> RecommendationEngine {
        RecommendationEngine::new(
            Arc::new(sample_knowledge_base()),
            policy(),
            AntiOveruseConfig::default(),
        )
    }

    fn inference(disease_id: &str, confidence: f32, warning: Option<&str>) -> InferenceResult {
        InferenceResult {
            disease_id: disease_id.to_string(),
            disease_name: disease_id.to_string(),
            confidence,
            heatmap_base64: None,
            backend: "mock".to_string(),
            mock_mode: true,
            confidence_threshold: 0.7,
            image: ImageMetadata {
                width: 300,
                height: 300,
                aspect_ratio: 1.0,
                size_mb: 0.01,
                format: "png".to_string(),
                warning: warning.map(ToString::to_string),
            },
        }
    }

    #[test]
    fn detection_response_merges_both_stages() {
        let engine = engine();
        let recommendation = engine.get_recommendations(
            "powdery_mildew",
            0.3,
            RequestMetadata::for_language("es"),
        );
        let response = formatter()
            .format_detection_response(
                &inference("powdery_mildew", 0.3, Some("Extreme aspect ratio detected: 5.00")),
                recommendation,
                Some("es-MX"),
            )
            .unwrap();

        assert_eq!(response.metadata.language, "es");
        assert_eq!(response.labels["disease_detected"], "Enfermedad Detectada");
        assert_eq!(response.confidence_level, ConfidenceLevel::Low);
        assert!(!response.treatment_recommended);
        assert!(response.image_warning.is_some());
        assert!(response.uncertainty_warning.is_some());
        assert!(response.summary.starts_with("Enfermedad Detectada: Powdery Mildew"));
        assert!(!response.sdg_alignment.is_empty());
        assert_eq!(response.labels["sdg_alignment"], "Alineación ODS");
        assert!(response
            .recommended_treatments
            .iter()
            .all(|t| t.indicators.is_some()));
    }

    #[test]
    fn unsupported_language_falls_back_to_default() {
        let response = formatter().format_error_response("boom", "MODEL_FAILURE", Some("de"));
        assert_eq!(response.language, "en");
        assert_eq!(response.labels["confidence"], "Confidence");
        assert!(response.error);
    }

    #[test]
    fn indicators_follow_cost_and_ppe_breakpoints() {
        let entry = engine().get_treatment_by_id("powdery_mildew").unwrap();
        let views = formatter()
            .add_visual_indicators(entry.remedies.into_iter().map(TreatmentView::from).collect())
            .unwrap();
        let levels = views
            .iter()
            .map(|v| {
                let i = v.indicators.as_ref().unwrap();
                (i.color, i.safety_level, i.cost_level)
            })
            .collect::<Vec<_>>();
        assert_eq!(
            levels,
            vec![
                ("green", SafetyLevel::Medium, CostLevel::Low),
                ("orange", SafetyLevel::High, CostLevel::Medium),
                ("green", SafetyLevel::Low, CostLevel::Low),
                ("orange", SafetyLevel::High, CostLevel::High),
            ]
        );
        assert_eq!(views[0].cost_display, "USD 15 per hectare");
    }

    #[test]
    fn indicators_are_idempotent() {
        let formatter = formatter();
        let entry = engine().get_treatment_by_id("powdery_mildew").unwrap();
        let once = formatter
            .add_visual_indicators(entry.remedies.into_iter().map(TreatmentView::from).collect())
            .unwrap();
        let twice = formatter.add_visual_indicators(once.clone()).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn malformed_cost_fails_loudly() {
        let mut entry = engine().get_treatment_by_id("powdery_mildew").unwrap();
        entry.remedies[0].cost_estimate.currency.clear();
        let err = formatter()
            .format_treatment_lookup_response(Some(entry), None)
            .unwrap_err();
        assert_eq!(err.code(), "MALFORMED_COST");
    }

    #[test]
    fn missing_treatment_lookup() {
        let response = formatter()
            .format_treatment_lookup_response(None, Some("fr"))
            .unwrap();
        assert_eq!(response.error.as_deref(), Some(TREATMENT_NOT_FOUND));
        assert!(response.treatments.is_empty());
        assert_eq!(response.labels["confidence"], "Confiance");
    }

    #[test]
    fn health_reports_mock_mode() {
        let health = formatter().format_health_check_response(ModelInfo {
            backend: "mock".to_string(),
            mock_mode: true,
            model_loaded: false,
            model_path: None,
            input_size: [224, 224],
            confidence_threshold: 0.7,
            artifact_sha256: None,
        });
        assert_eq!(health.status, "healthy");
        assert!(health.features.mock_mode);
        assert_eq!(health.supported_languages.len(), 5);
    }
}
