//! Colour-grid centroid model loaded from a JSON artifact.
//!
//! The image is split into a `grid × grid` partition and each cell contributes
//! its mean R, G and B values, giving a feature vector of `3 · grid²` values.
//! Each class is a centroid in that space; class scores are cosine similarities
//! passed through a temperature softmax.

use std::fs;
use std::path::{Path, PathBuf};

use ndarray::{s, Array4};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::warn;

use crate::heatmap;
use crate::{DiseaseClassifier, DiseasePrediction, ModelError};

pub const SUPPORTED_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("failed reading model artifact at {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("model artifact at {path} is not valid JSON")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("incompatible model artifact: {0}")]
    Incompatible(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactClass {
    pub id: String,
    pub name: String,
    pub centroid: Vec<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CentroidArtifact {
    pub format_version: u32,
    pub name: String,
    /// `[width, height]` the centroids were computed at.
    pub input_size: [u32; 2],
    pub grid: usize,
    pub temperature: f32,
    pub classes: Vec<ArtifactClass>,
}

impl CentroidArtifact {
    pub fn feature_len(&self) -> usize {
        3 * self.grid * self.grid
    }

    pub fn check_compatible(&self, expected_input_size: [u32; 2]) -> Result<(), ArtifactError> {
        if self.format_version != SUPPORTED_FORMAT_VERSION {
            return Err(ArtifactError::Incompatible(format!(
                "format_version {} is not supported (expected {SUPPORTED_FORMAT_VERSION})",
                self.format_version
            )));
        }
        if self.input_size != expected_input_size {
            return Err(ArtifactError::Incompatible(format!(
                "input_size {:?} does not match configured {:?}",
                self.input_size, expected_input_size
            )));
        }
        let [width, height] = self.input_size;
        if self.grid == 0 || self.grid as u32 > width.min(height) {
            return Err(ArtifactError::Incompatible(format!(
                "grid {} does not fit input_size {:?}",
                self.grid, self.input_size
            )));
        }
        if !(self.temperature.is_finite() && self.temperature > 0.0) {
            return Err(ArtifactError::Incompatible(
                "temperature must be a positive number".to_string(),
            ));
        }
        if self.classes.is_empty() {
            return Err(ArtifactError::Incompatible("artifact has no classes".to_string()));
        }
        for class in &self.classes {
            if class.centroid.len() != self.feature_len() {
                return Err(ArtifactError::Incompatible(format!(
                    "class '{}' centroid has {} values, grid {} needs {}",
                    class.id,
                    class.centroid.len(),
                    self.grid,
                    self.feature_len()
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct CentroidClassifier {
    artifact: CentroidArtifact,
    path: PathBuf,
    sha256: String,
}

impl CentroidClassifier {
    pub fn load(path: impl AsRef<Path>, expected_input_size: [u32; 2]) -> Result<Self, ArtifactError> {
        let path = path.as_ref();
        let raw = fs::read(path).map_err(|source| ArtifactError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let artifact: CentroidArtifact =
            serde_json::from_slice(&raw).map_err(|source| ArtifactError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        artifact.check_compatible(expected_input_size)?;

        Ok(Self {
            artifact,
            path: path.to_path_buf(),
            sha256: hex_encode(Sha256::digest(&raw).as_slice()),
        })
    }

    pub fn artifact(&self) -> &CentroidArtifact {
        &self.artifact
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn sha256(&self) -> &str {
        &self.sha256
    }

    fn check_shape(&self, tensor: &Array4<f32>) -> Result<(), ModelError> {
        let [width, height] = self.artifact.input_size;
        let expected = [1, height as usize, width as usize, 3];
        if tensor.shape() != expected {
            return Err(ModelError::InvalidInput(format!(
                "expected tensor shape {expected:?}, got {:?}",
                tensor.shape()
            )));
        }
        Ok(())
    }
}

impl DiseaseClassifier for CentroidClassifier {
    fn name(&self) -> &'static str {
        "local_artifact"
    }

    fn predict(&self, tensor: &Array4<f32>) -> Result<DiseasePrediction, ModelError> {
        self.check_shape(tensor)?;
        let features = grid_features(tensor, self.artifact.grid);

        let scores = self
            .artifact
            .classes
            .iter()
            .map(|class| cosine_similarity(&features, &class.centroid))
            .collect::<Vec<_>>();
        let probabilities = softmax(&scores, self.artifact.temperature);

        let (best, confidence) = probabilities
            .iter()
            .copied()
            .enumerate()
            .fold((0, f32::NEG_INFINITY), |acc, (idx, p)| if p > acc.1 { (idx, p) } else { acc });
        if !confidence.is_finite() {
            return Err(ModelError::Backend(format!(
                "{} produced a non-finite score",
                self.artifact.name
            )));
        }

        let winner = &self.artifact.classes[best];
        let heatmap_base64 = heatmap::render(
            &cell_similarity(&features, &winner.centroid),
            self.artifact.grid,
            self.artifact.input_size,
        )
        .map_err(|err| warn!(error = %err, "heatmap generation failed"))
        .ok();

        Ok(DiseasePrediction {
            disease_id: winner.id.clone(),
            disease_name: winner.name.clone(),
            confidence,
            heatmap_base64,
        })
    }
}

/// Per-cell RGB means of an NHWC tensor, row-major over cells.
pub fn grid_features(tensor: &Array4<f32>, grid: usize) -> Vec<f32> {
    let (height, width) = (tensor.shape()[1], tensor.shape()[2]);
    let mut features = Vec::with_capacity(3 * grid * grid);

    for gy in 0..grid {
        let (y0, y1) = (gy * height / grid, (gy + 1) * height / grid);
        for gx in 0..grid {
            let (x0, x1) = (gx * width / grid, (gx + 1) * width / grid);
            let cell = tensor.slice(s![0, y0..y1, x0..x1, ..]);
            let count = ((y1 - y0) * (x1 - x0)).max(1) as f32;
            for channel in 0..3 {
                features.push(cell.slice(s![.., .., channel]).sum() / count);
            }
        }
    }
    features
}

fn cell_similarity(features: &[f32], centroid: &[f32]) -> Vec<f32> {
    features
        .chunks(3)
        .zip(centroid.chunks(3))
        .map(|(cell, center)| cosine_similarity(cell, center))
        .collect()
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0;
    let mut a_norm = 0.0;
    let mut b_norm = 0.0;
    for (lhs, rhs) in a.iter().zip(b.iter()) {
        dot += lhs * rhs;
        a_norm += lhs * lhs;
        b_norm += rhs * rhs;
    }

    if a_norm == 0.0 || b_norm == 0.0 {
        0.0
    } else {
        dot / (a_norm.sqrt() * b_norm.sqrt())
    }
}

fn softmax(scores: &[f32], temperature: f32) -> Vec<f32> {
    let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps = scores
        .iter()
        .map(|s| ((s - max) / temperature).exp())
        .collect::<Vec<_>>();
    let total = exps.iter().sum::<f32>();
    exps.into_iter().map(|e| e / total).collect()
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push_str(format!("{:02x}", byte).as_str());
    }
    out
}

#[cfg(test)]
pub(crate) mod tests {
    use std::env;

    use super::*;

    pub(crate) fn green_red_artifact(input_size: [u32; 2]) -> CentroidArtifact {
        CentroidArtifact {
            format_version: 1,
            name: "test-colour-grid".to_string(),
            input_size,
            grid: 2,
            temperature: 0.05,
            classes: vec![
                ArtifactClass {
                    id: "healthy".to_string(),
                    name: "Healthy".to_string(),
                    centroid: [0.1, 0.8, 0.1].repeat(4),
                },
                ArtifactClass {
                    id: "rust".to_string(),
                    name: "Rust".to_string(),
                    centroid: [0.7, 0.3, 0.1].repeat(4),
                },
            ],
        }
    }

    pub(crate) fn write_artifact(artifact: &CentroidArtifact) -> PathBuf {
        let path = env::temp_dir().join(format!("leafcare-artifact-{}.json", uuid::Uuid::new_v4()));
        fs::write(&path, serde_json::to_vec(artifact).unwrap()).unwrap();
        path
    }

    fn solid(rgb: [f32; 3]) -> Array4<f32> {
        Array4::from_shape_fn((1, 16, 16, 3), |(_, _, _, c)| rgb[c])
    }

    #[test]
    fn classifies_by_nearest_colour_centroid() {
        let path = write_artifact(&green_red_artifact([16, 16]));
        let classifier = CentroidClassifier::load(&path, [16, 16]).unwrap();

        let prediction = classifier.predict(&solid([0.65, 0.35, 0.1])).unwrap();
        assert_eq!(prediction.disease_id, "rust");
        assert!(prediction.confidence > 0.5 && prediction.confidence <= 1.0);
        assert!(prediction.heatmap_base64.is_some());
        assert_eq!(classifier.sha256().len(), 64);

        fs::remove_file(path).ok();
    }

    #[test]
    fn rejects_input_size_mismatch() {
        let path = write_artifact(&green_red_artifact([16, 16]));
        let err = CentroidClassifier::load(&path, [224, 224]).unwrap_err();
        assert!(matches!(err, ArtifactError::Incompatible(_)));
        fs::remove_file(path).ok();
    }

    #[test]
    fn rejects_centroid_length_mismatch() {
        let mut artifact = green_red_artifact([16, 16]);
        artifact.classes[0].centroid.pop();
        assert!(artifact.check_compatible([16, 16]).is_err());
    }

    #[test]
    fn rejects_wrong_tensor_shape() {
        let path = write_artifact(&green_red_artifact([16, 16]));
        let classifier = CentroidClassifier::load(&path, [16, 16]).unwrap();
        let err = classifier
            .predict(&Array4::zeros((1, 8, 8, 3)))
            .unwrap_err();
        assert!(matches!(err, ModelError::InvalidInput(_)));
        fs::remove_file(path).ok();
    }

    #[test]
    fn heatmap_failure_still_returns_a_prediction() {
        // Centroids sized for a 2x2 grid under a 3x3 partition: cell scores no
        // longer cover the grid, so rendering fails.
        let mut artifact = green_red_artifact([16, 16]);
        artifact.grid = 3;
        let classifier = CentroidClassifier {
            artifact,
            path: PathBuf::from("inline.json"),
            sha256: String::new(),
        };

        let prediction = classifier.predict(&solid([0.65, 0.35, 0.1])).unwrap();
        assert!(prediction.heatmap_base64.is_none());
        assert!(prediction.confidence.is_finite());
        assert!(["healthy", "rust"].contains(&prediction.disease_id.as_str()));
    }

    #[test]
    fn grid_features_average_each_cell() {
        let tensor = Array4::from_shape_fn((1, 4, 4, 3), |(_, y, x, c)| {
            if c == 0 && y < 2 && x < 2 { 1.0 } else { 0.0 }
        });
        let features = grid_features(&tensor, 2);
        assert_eq!(features.len(), 12);
        assert_eq!(&features[0..3], &[1.0, 0.0, 0.0]);
        assert_eq!(&features[3..6], &[0.0, 0.0, 0.0]);
    }
}
