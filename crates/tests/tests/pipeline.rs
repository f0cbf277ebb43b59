use std::io::Cursor;
use std::path::PathBuf;
use std::sync::Arc;

use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use leafcare_agents::{AnalysisRequest, PlantCareAdvisor};
use leafcare_core::{AppConfig, ConfidenceLevel, KnowledgeBase, RemedyKind};
use leafcare_observability::AppMetrics;

fn workspace_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../..")
}

/// The shipped config with the centroid artifact switched on.
fn artifact_advisor() -> PlantCareAdvisor {
    let root = workspace_root();
    let mut config = AppConfig::load(root.join("config.yaml")).unwrap();
    config.model.mock_mode = false;
    config.model.path = Some(root.join("models/leaf_centroids.json"));

    let kb = KnowledgeBase::load(root.join("kb")).unwrap();
    PlantCareAdvisor::new(config, Arc::new(kb), AppMetrics::shared())
}

fn solid_png(width: u32, height: u32, colour: [u8; 3]) -> Vec<u8> {
    let img = RgbImage::from_pixel(width, height, Rgb(colour));
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img)
        .write_to(&mut out, ImageFormat::Png)
        .unwrap();
    out.into_inner()
}

fn analyze(advisor: &PlantCareAdvisor, colour: [u8; 3]) -> leafcare_core::DetectionResponse {
    advisor
        .analyze_image(
            &solid_png(320, 320, colour),
            "leaf.png",
            AnalysisRequest::default(),
        )
        .unwrap()
}

#[test]
fn shipped_artifact_is_loaded() {
    let info = artifact_advisor().model_info();
    assert_eq!(info.backend, "local_artifact");
    assert!(info.model_loaded);
    assert!(!info.mock_mode);
    assert_eq!(info.artifact_sha256.as_deref().map(str::len), Some(64));
}

#[test]
fn healthy_leaf_gets_no_treatment() {
    let response = analyze(&artifact_advisor(), [56, 140, 46]);

    assert_eq!(response.disease.id, "healthy");
    assert_eq!(response.confidence_level, ConfidenceLevel::High);
    assert!(!response.treatment_recommended);
    assert!(response.uncertainty_warning.is_none());
    assert!(response.supporting_heatmap_base64.is_some());
}

#[test]
fn confident_rust_includes_supported_chemicals() {
    let response = analyze(&artifact_advisor(), [153, 97, 36]);

    assert_eq!(response.disease.id, "rust");
    assert!(response.disease.confidence > 0.9);
    assert!(response.treatment_recommended);

    let kinds = response
        .recommended_treatments
        .iter()
        .map(|view| view.remedy.kind)
        .collect::<Vec<_>>();
    assert_eq!(
        kinds,
        [
            RemedyKind::Organic,
            RemedyKind::Organic,
            RemedyKind::Chemical,
            RemedyKind::Chemical
        ]
    );
    assert!(response
        .recommended_treatments
        .iter()
        .all(|view| !view.remedy.requires_confirmation));
}

#[test]
fn medium_confidence_withholds_chemicals_above_the_evidence_bar() {
    let response = analyze(&artifact_advisor(), [77, 97, 41]);

    assert_eq!(response.disease.id, "bacterial_spot");
    assert_eq!(response.confidence_level, ConfidenceLevel::Medium);
    // Copper (0.75) and streptomycin (0.9) both need more certainty than this.
    assert!(response
        .recommended_treatments
        .iter()
        .all(|view| view.remedy.is_organic()));
    assert_eq!(response.recommended_treatments.len(), 2);
    assert!(response.uncertainty_warning.is_none());
}

#[test]
fn low_confidence_flags_every_chemical_for_confirmation() {
    let response = analyze(&artifact_advisor(), [120, 105, 55]);

    assert_eq!(response.disease.id, "bacterial_spot");
    assert_eq!(response.confidence_level, ConfidenceLevel::Low);
    assert!(response
        .uncertainty_warning
        .as_deref()
        .is_some_and(|warning| warning.starts_with("Low confidence detection")));

    let chemicals = response
        .recommended_treatments
        .iter()
        .filter(|view| !view.remedy.is_organic())
        .collect::<Vec<_>>();
    assert_eq!(chemicals.len(), 2);
    assert!(chemicals.iter().all(|view| view.remedy.requires_confirmation));
}

#[test]
fn sdg_alignment_is_reported_from_config() {
    let response = analyze(&artifact_advisor(), [153, 97, 36]);
    let goals = response.sdg_alignment.join(" ");
    for goal in ["SDG 3", "SDG 12", "SDG 15"] {
        assert!(goals.contains(goal), "{goal}");
    }
    assert!(response.labels.contains_key("sdg_alignment"));
}

#[test]
fn extreme_aspect_ratio_is_a_warning_not_a_failure() {
    let advisor = artifact_advisor();
    let response = advisor
        .analyze_image(
            &solid_png(1000, 200, [56, 140, 46]),
            "strip.png",
            AnalysisRequest::default(),
        )
        .unwrap();
    assert!(response.image_warning.is_some());
    assert_eq!(response.metadata.image_metadata.width, 1000);
}

#[test]
fn same_bytes_give_the_same_answer() {
    let advisor = artifact_advisor();
    let bytes = solid_png(300, 300, [158, 178, 148]);
    let first = advisor
        .analyze_image(&bytes, "leaf.png", AnalysisRequest::default())
        .unwrap();
    let second = advisor
        .analyze_image(&bytes, "leaf.png", AnalysisRequest::default())
        .unwrap();

    assert_eq!(first.disease.id, "powdery_mildew");
    assert_eq!(first.disease, second.disease);
    assert_eq!(first.recommended_treatments, second.recommended_treatments);
}
