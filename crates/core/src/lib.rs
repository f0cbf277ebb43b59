pub mod config;
pub mod dosage;
pub mod formatter;
pub mod knowledge;
pub mod localization;
pub mod models;
pub mod policy;
pub mod recommender;

pub use config::{
    default_sdg_alignment, AntiOveruseConfig, AppConfig, ConfigError, ImageConfig,
    LocalizationConfig, MockStrategy, ModelConfig,
};
pub use dosage::{assess_dosage, parse_dose, BlockReason, DosageReport, DosageVerdict};
pub use formatter::{
    DetectionResponse, ErrorResponse, FormatError, HealthResponse, ResponseFormatter,
    TreatmentLookupResponse, TreatmentView,
};
pub use knowledge::{KnowledgeBase, KnowledgeBaseError};
pub use localization::{LabelCatalog, LocalizedLabels};
pub use models::*;
pub use policy::{uncertainty_message, ConfidenceLevel, ConfidencePolicy};
pub use recommender::RecommendationEngine;
