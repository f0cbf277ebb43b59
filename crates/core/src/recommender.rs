use std::sync::Arc;

use tracing::warn;

use crate::config::{default_sdg_alignment, AntiOveruseConfig};
use crate::dosage::{assess_dosage, BlockReason, DosageVerdict};
use crate::knowledge::KnowledgeBase;
use crate::models::{
    DiseaseListing, DiseaseRef, DiseaseSummary, RecommendationResult, Remedy, RequestMetadata,
    TreatmentCatalogEntry, UNKNOWN_DISEASE_ID,
};
use crate::policy::ConfidencePolicy;

pub const UNKNOWN_DISEASE_NAME: &str = "Unknown Disease";
pub const UNKNOWN_DISEASE_NOTE: &str =
    "Unknown disease detected. Please consult with a local agricultural expert.";
pub const UNKNOWN_DISEASE_WARNING: &str = "Disease not recognized. Manual inspection recommended.";

/// Turns a detection into a gated, ordered treatment plan.
#[derive(Debug, Clone)]
pub struct RecommendationEngine {
    kb: Arc<KnowledgeBase>,
    policy: ConfidencePolicy,
    anti_overuse: AntiOveruseConfig,
    sdg_alignment: Vec<String>,
}

impl RecommendationEngine {
    pub fn new(
        kb: Arc<KnowledgeBase>,
        policy: ConfidencePolicy,
        anti_overuse: AntiOveruseConfig,
    ) -> Self {
        Self {
            kb,
            policy,
            anti_overuse,
            sdg_alignment: default_sdg_alignment(),
        }
    }

    pub fn with_sdg_alignment(mut self, sdg_alignment: Vec<String>) -> Self {
        self.sdg_alignment = sdg_alignment;
        self
    }

    pub fn sdg_alignment(&self) -> &[String] {
        &self.sdg_alignment
    }

    pub fn knowledge_base(&self) -> &KnowledgeBase {
        &self.kb
    }

    pub fn policy(&self) -> &ConfidencePolicy {
        &self.policy
    }

    /// Organic remedies are always kept. Chemical remedies are filtered by
    /// evidence score, or all kept behind confirmation when confidence is low.
    pub fn get_recommendations(
        &self,
        disease_id: &str,
        confidence: f32,
        metadata: RequestMetadata,
    ) -> RecommendationResult {
        let Some(record) = self.kb.get(disease_id) else {
            warn!(disease_id, "recommendation requested for unknown disease");
            return unknown_disease_result(self.sdg_alignment.clone(), metadata);
        };

        let low_confidence = self.policy.is_low(confidence);
        let organic = record.remedies.iter().filter(|r| r.is_organic()).cloned();
        let chemical = record
            .remedies
            .iter()
            .filter(|r| r.is_chemical())
            .filter(|r| low_confidence || confidence >= r.evidence_score)
            .map(|r| Remedy {
                requires_confirmation: low_confidence,
                ..r.clone()
            });
        let recommended_treatments = organic.chain(chemical).collect::<Vec<_>>();

        RecommendationResult {
            notes: human_summary(&record.name, &recommended_treatments),
            uncertainty_warning: self.policy.uncertainty_message(confidence, disease_id),
            disease: DiseaseSummary {
                id: record.id.clone(),
                name: record.name.clone(),
                confidence,
            },
            recommended_treatments,
            sdg_alignment: self.sdg_alignment.clone(),
            metadata,
        }
    }

    pub fn validate_dosage(
        &self,
        disease_id: &str,
        remedy_name: &str,
        requested_dosage: &str,
    ) -> DosageVerdict {
        let Some(record) = self.kb.get(disease_id) else {
            return DosageVerdict::blocked(BlockReason::UnknownDisease, "Unknown disease");
        };
        let Some(remedy) = record.remedies.iter().find(|r| r.name == remedy_name) else {
            return DosageVerdict::blocked(BlockReason::UnknownRemedy, "Remedy not found");
        };

        assess_dosage(&remedy.dosage, requested_dosage, &self.anti_overuse)
    }

    pub fn get_treatment_by_id(&self, disease_id: &str) -> Option<TreatmentCatalogEntry> {
        self.kb.get(disease_id).map(|record| TreatmentCatalogEntry {
            disease: DiseaseRef {
                id: record.id.clone(),
                name: record.name.clone(),
            },
            remedies: record.remedies.clone(),
        })
    }

    pub fn list_diseases(&self) -> Vec<DiseaseListing> {
        self.kb
            .iter()
            .map(|record| DiseaseListing {
                id: record.id.clone(),
                name: record.name.clone(),
                remedy_count: record.remedies.len(),
            })
            .collect()
    }
}

fn unknown_disease_result(
    sdg_alignment: Vec<String>,
    metadata: RequestMetadata,
) -> RecommendationResult {
    RecommendationResult {
        disease: DiseaseSummary {
            id: UNKNOWN_DISEASE_ID.to_string(),
            name: UNKNOWN_DISEASE_NAME.to_string(),
            confidence: 0.0,
        },
        recommended_treatments: Vec::new(),
        notes: UNKNOWN_DISEASE_NOTE.to_string(),
        uncertainty_warning: Some(UNKNOWN_DISEASE_WARNING.to_string()),
        sdg_alignment,
        metadata,
    }
}

fn human_summary(disease_name: &str, treatments: &[Remedy]) -> String {
    if treatments.is_empty() {
        return format!("No specific treatment needed for {disease_name}.");
    }

    let mut parts = vec![format!("Detected: {disease_name}")];
    if let Some(organic) = treatments.iter().find(|r| r.is_organic()) {
        parts.push(format!("Try: {} ({})", organic.name, organic.dosage));
    }
    if let Some(chemical) = treatments.iter().find(|r| r.is_chemical()) {
        let mut line = format!("If needed: {} ({})", chemical.name, chemical.dosage);
        if !chemical.safety.ppe.is_empty() {
            line.push_str(&format!(", wear {}", chemical.safety.ppe.join(", ")));
        }
        line.push_str(&format!(
            ", wait {} days before harvest",
            chemical.safety.pre_harvest_interval_days
        ));
        parts.push(line);
    }
    parts.join(" | ")
}
