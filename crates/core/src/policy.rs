use serde::{Deserialize, Serialize};

use crate::config::ModelConfig;
use crate::models::HEALTHY_DISEASE_ID;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceLevel {
    Low,
    Medium,
    High,
}

impl ConfidenceLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

/// Confidence thresholds shared by the inference and recommendation stages.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfidencePolicy {
    low_threshold: f32,
    high_threshold: f32,
}

impl ConfidencePolicy {
    pub fn new(low_threshold: f32, high_threshold: f32) -> Self {
        Self {
            low_threshold,
            high_threshold,
        }
    }

    pub fn from_config(config: &ModelConfig) -> Self {
        Self::new(config.low_confidence_threshold, config.confidence_threshold)
    }

    pub fn low_threshold(&self) -> f32 {
        self.low_threshold
    }

    pub fn high_threshold(&self) -> f32 {
        self.high_threshold
    }

    pub fn is_low(&self, confidence: f32) -> bool {
        confidence < self.low_threshold
    }

    pub fn level(&self, confidence: f32) -> ConfidenceLevel {
        if confidence >= self.high_threshold {
            ConfidenceLevel::High
        } else if confidence >= self.low_threshold {
            ConfidenceLevel::Medium
        } else {
            ConfidenceLevel::Low
        }
    }

    pub fn should_recommend_treatment(&self, confidence: f32, disease_id: &str) -> bool {
        disease_id != HEALTHY_DISEASE_ID && confidence >= self.high_threshold
    }

    pub fn uncertainty_message(&self, confidence: f32, disease_id: &str) -> Option<String> {
        uncertainty_message(confidence, disease_id, self.low_threshold)
    }
}

/// Advisory text for a prediction below `low_threshold`; `None` for healthy plants.
pub fn uncertainty_message(confidence: f32, disease_id: &str, low_threshold: f32) -> Option<String> {
    if disease_id == HEALTHY_DISEASE_ID || confidence >= low_threshold {
        return None;
    }

    Some(format!(
        "Low confidence detection ({:.1}%). Consider additional scouting or confirmatory tests before treatment.",
        confidence * 100.0
    ))
}
