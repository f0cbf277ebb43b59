use std::sync::atomic::{AtomicUsize, Ordering};

use leafcare_core::MockStrategy;
use ndarray::Array4;

use crate::{DiseaseClassifier, DiseasePrediction, ModelError};

/// `(id, display name, confidence)` returned by the placeholder backend.
pub const MOCK_LABELS: [(&str, &str, f32); 4] = [
    ("powdery_mildew", "Powdery Mildew", 0.92),
    ("bacterial_spot", "Bacterial Spot", 0.87),
    ("rust", "Rust", 0.78),
    ("healthy", "Healthy", 0.95),
];

#[derive(Debug, Default)]
pub struct MockClassifier {
    strategy: MockStrategy,
    cursor: AtomicUsize,
}

impl MockClassifier {
    pub fn new(strategy: MockStrategy) -> Self {
        Self {
            strategy,
            cursor: AtomicUsize::new(0),
        }
    }

    pub fn strategy(&self) -> MockStrategy {
        self.strategy
    }

    fn pick(&self, tensor: &Array4<f32>) -> usize {
        match self.strategy {
            MockStrategy::ContentHash => (fingerprint(tensor) % MOCK_LABELS.len() as u64) as usize,
            MockStrategy::Cycle => self.cursor.fetch_add(1, Ordering::Relaxed) % MOCK_LABELS.len(),
        }
    }
}

impl DiseaseClassifier for MockClassifier {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn predict(&self, tensor: &Array4<f32>) -> Result<DiseasePrediction, ModelError> {
        if tensor.is_empty() {
            return Err(ModelError::InvalidInput("empty input tensor".to_string()));
        }

        let (id, name, confidence) = MOCK_LABELS[self.pick(tensor)];
        Ok(DiseasePrediction {
            disease_id: id.to_string(),
            disease_name: name.to_string(),
            confidence,
            heatmap_base64: None,
        })
    }
}

/// FNV-1a over the tensor's bit patterns.
fn fingerprint(tensor: &Array4<f32>) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for value in tensor.iter() {
        for byte in value.to_bits().to_le_bytes() {
            hash ^= byte as u64;
            hash = hash.wrapping_mul(0x100000001b3);
        }
    }
    hash
}
