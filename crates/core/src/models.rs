use serde::{Deserialize, Serialize};

/// Sentinel id for a plant with no detected disease.
pub const HEALTHY_DISEASE_ID: &str = "healthy";
/// Id reported when a prediction has no knowledge-base entry.
pub const UNKNOWN_DISEASE_ID: &str = "unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemedyKind {
    Organic,
    Chemical,
}

impl RemedyKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Organic => "organic",
            Self::Chemical => "chemical",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrowthStage {
    Seedling,
    Vegetative,
    Flowering,
    Fruiting,
    Mature,
}

impl GrowthStage {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "seedling" => Some(Self::Seedling),
            "vegetative" => Some(Self::Vegetative),
            "flowering" | "bloom" => Some(Self::Flowering),
            "fruiting" => Some(Self::Fruiting),
            "mature" | "maturity" => Some(Self::Mature),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Seedling => "seedling",
            Self::Vegetative => "vegetative",
            Self::Flowering => "flowering",
            Self::Fruiting => "fruiting",
            Self::Mature => "mature",
        }
    }
}

/// Estimated treatment cost as a number plus currency; rendering happens in the formatter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostEstimate {
    pub amount: f64,
    pub currency: String,
    #[serde(default = "default_cost_basis")]
    pub per: String,
}

fn default_cost_basis() -> String {
    "hectare".to_string()
}

impl CostEstimate {
    pub fn is_well_formed(&self) -> bool {
        self.amount.is_finite() && self.amount >= 0.0 && !self.currency.trim().is_empty()
    }

    pub fn display(&self) -> String {
        let amount = if self.amount.fract() == 0.0 {
            format!("{:.0}", self.amount)
        } else {
            format!("{:.2}", self.amount)
        };
        format!("{} {} per {}", self.currency.trim(), amount, self.per)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SafetyProfile {
    #[serde(default)]
    pub ppe: Vec<String>,
    #[serde(default)]
    pub warning: Option<String>,
    #[serde(default)]
    pub pre_harvest_interval_days: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Remedy {
    #[serde(rename = "type")]
    pub kind: RemedyKind,
    pub name: String,
    pub application: String,
    pub dosage: String,
    pub frequency: String,
    pub best_time: String,
    pub cost_estimate: CostEstimate,
    #[serde(default)]
    pub safety: SafetyProfile,
    pub evidence_score: f32,
    pub max_applications_per_season: u32,
    #[serde(default)]
    pub requires_confirmation: bool,
}

impl Remedy {
    pub fn is_organic(&self) -> bool {
        self.kind == RemedyKind::Organic
    }

    pub fn is_chemical(&self) -> bool {
        self.kind == RemedyKind::Chemical
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiseaseRecord {
    pub id: String,
    pub name: String,
    pub remedies: Vec<Remedy>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiseaseRef {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiseaseSummary {
    pub id: String,
    pub name: String,
    pub confidence: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestMetadata {
    pub crop_type: Option<String>,
    pub growth_stage: Option<GrowthStage>,
    pub location: Option<String>,
    pub language: String,
}

impl RequestMetadata {
    pub fn for_language(language: impl Into<String>) -> Self {
        Self {
            crop_type: None,
            growth_stage: None,
            location: None,
            language: language.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationResult {
    pub disease: DiseaseSummary,
    pub recommended_treatments: Vec<Remedy>,
    pub notes: String,
    pub uncertainty_warning: Option<String>,
    #[serde(default)]
    pub sdg_alignment: Vec<String>,
    pub metadata: RequestMetadata,
}

impl RecommendationResult {
    pub fn organic_treatments(&self) -> impl Iterator<Item = &Remedy> {
        self.recommended_treatments.iter().filter(|r| r.is_organic())
    }

    pub fn chemical_treatments(&self) -> impl Iterator<Item = &Remedy> {
        self.recommended_treatments.iter().filter(|r| r.is_chemical())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreatmentCatalogEntry {
    pub disease: DiseaseRef,
    pub remedies: Vec<Remedy>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiseaseListing {
    pub id: String,
    pub name: String,
    pub remedy_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageMetadata {
    pub width: u32,
    pub height: u32,
    pub aspect_ratio: f32,
    pub size_mb: f64,
    pub format: String,
    pub warning: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceResult {
    pub disease_id: String,
    pub disease_name: String,
    pub confidence: f32,
    pub heatmap_base64: Option<String>,
    pub backend: String,
    pub mock_mode: bool,
    pub confidence_threshold: f32,
    pub image: ImageMetadata,
}

impl InferenceResult {
    pub fn warning(&self) -> Option<&str> {
        self.image.warning.as_deref()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub backend: String,
    pub mock_mode: bool,
    pub model_loaded: bool,
    pub model_path: Option<String>,
    pub input_size: [u32; 2],
    pub confidence_threshold: f32,
    pub artifact_sha256: Option<String>,
}
