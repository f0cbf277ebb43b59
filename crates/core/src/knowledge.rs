use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use walkdir::WalkDir;

use crate::models::{DiseaseRecord, Remedy, RemedyKind, HEALTHY_DISEASE_ID};

#[derive(Debug, Error)]
pub enum KnowledgeBaseError {
    #[error("failed reading knowledge base at {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed walking knowledge base directory {path}")]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },
    #[error("invalid YAML in knowledge base file {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("disease id '{0}' is defined more than once")]
    DuplicateId(String),
    #[error("disease '{disease}': {message}")]
    InvalidRecord { disease: String, message: String },
    #[error("knowledge base at {0} contains no diseases")]
    Empty(PathBuf),
}

#[derive(Debug, Deserialize)]
struct DiseaseEntry {
    name: String,
    #[serde(default)]
    remedies: Vec<Remedy>,
}

/// Read-only disease catalogue keyed by disease id.
#[derive(Debug, Clone, Default)]
pub struct KnowledgeBase {
    diseases: BTreeMap<String, DiseaseRecord>,
}

impl KnowledgeBase {
    /// Loads a single YAML file, or every `*.yml`/`*.yaml` file under a directory.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, KnowledgeBaseError> {
        let root = path.as_ref();
        let files = if root.is_dir() {
            let mut files = Vec::new();
            for entry in WalkDir::new(root).follow_links(true) {
                let entry = entry.map_err(|source| KnowledgeBaseError::Walk {
                    path: root.to_path_buf(),
                    source,
                })?;
                let is_yaml = entry
                    .path()
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .map(|ext| matches!(ext.to_lowercase().as_str(), "yml" | "yaml"))
                    .unwrap_or(false);
                if entry.file_type().is_file() && is_yaml {
                    files.push(entry.into_path());
                }
            }
            files.sort();
            files
        } else {
            vec![root.to_path_buf()]
        };

        let mut records = Vec::new();
        for file in &files {
            let raw = fs::read_to_string(file).map_err(|source| KnowledgeBaseError::Io {
                path: file.clone(),
                source,
            })?;
            records.extend(parse_entries(&raw, file)?);
        }

        if records.is_empty() {
            return Err(KnowledgeBaseError::Empty(root.to_path_buf()));
        }

        Self::from_records(records)
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self, KnowledgeBaseError> {
        Self::from_records(parse_entries(raw, Path::new("<inline>"))?)
    }

    pub fn from_records(records: Vec<DiseaseRecord>) -> Result<Self, KnowledgeBaseError> {
        let mut diseases = BTreeMap::new();
        for record in records {
            validate_record(&record)?;
            if diseases.contains_key(&record.id) {
                return Err(KnowledgeBaseError::DuplicateId(record.id));
            }
            diseases.insert(record.id.clone(), record);
        }
        Ok(Self { diseases })
    }

    pub fn get(&self, disease_id: &str) -> Option<&DiseaseRecord> {
        self.diseases.get(disease_id)
    }

    pub fn contains(&self, disease_id: &str) -> bool {
        self.diseases.contains_key(disease_id)
    }

    /// Records in id order.
    pub fn iter(&self) -> impl Iterator<Item = &DiseaseRecord> {
        self.diseases.values()
    }

    pub fn len(&self) -> usize {
        self.diseases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.diseases.is_empty()
    }
}

fn parse_entries(raw: &str, path: &Path) -> Result<Vec<DiseaseRecord>, KnowledgeBaseError> {
    let entries: BTreeMap<String, DiseaseEntry> =
        serde_yaml::from_str(raw).map_err(|source| KnowledgeBaseError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

    Ok(entries
        .into_iter()
        .map(|(id, entry)| DiseaseRecord {
            id,
            name: entry.name,
            remedies: entry.remedies,
        })
        .collect())
}

fn validate_record(record: &DiseaseRecord) -> Result<(), KnowledgeBaseError> {
    let invalid = |message: String| KnowledgeBaseError::InvalidRecord {
        disease: record.id.clone(),
        message,
    };

    if record.id.trim().is_empty() {
        return Err(invalid("disease id must not be empty".to_string()));
    }

    for remedy in &record.remedies {
        if !(0.0..=1.0).contains(&remedy.evidence_score) {
            return Err(invalid(format!(
                "remedy '{}' has evidence_score {} outside [0, 1]",
                remedy.name, remedy.evidence_score
            )));
        }
        if !remedy.cost_estimate.is_well_formed() {
            return Err(invalid(format!(
                "remedy '{}' has a malformed cost estimate",
                remedy.name
            )));
        }
        if remedy.requires_confirmation {
            return Err(invalid(format!(
                "remedy '{}' must not preset requires_confirmation",
                remedy.name
            )));
        }
    }

    if record.id == HEALTHY_DISEASE_ID {
        let organic_only = record.remedies.len() == 1
            && record.remedies[0].kind == RemedyKind::Organic;
        if !organic_only {
            return Err(invalid(
                "the healthy record must carry exactly one organic remedy".to_string(),
            ));
        }
    }

    Ok(())
}

#[cfg(test)]
pub(crate) const SAMPLE_KB: &str = r#"
healthy:
  name: Healthy Plant
  remedies:
    - type: organic
      name: Preventive care - balanced irrigation
      application: Keep foliage dry and remove debris
      dosage: 0 ml per L
      frequency: Weekly inspection
      best_time: Morning
      cost_estimate: { amount: 0, currency: USD }
      evidence_score: 0.9
      max_applications_per_season: 52
powdery_mildew:
  name: Powdery Mildew
  remedies:
    - type: organic
      name: Neem oil 1% spray
      application: Spray both leaf surfaces until runoff
      dosage: 10 ml per L
      frequency: Every 7 days
      best_time: Early morning
      cost_estimate: { amount: 15, currency: USD }
      safety: { ppe: [gloves] }
      evidence_score: 0.7
      max_applications_per_season: 6
    - type: chemical
      name: Sulfur 80% WP
      application: Dilute and spray evenly
      dosage: 2.5 g per L
      frequency: Every 10-14 days
      best_time: Below 30C
      cost_estimate: { amount: 25, currency: USD }
      safety:
        ppe: [gloves, mask, goggles]
        warning: Do not apply above 30C
        pre_harvest_interval_days: 1
      evidence_score: 0.6
      max_applications_per_season: 4
    - type: organic
      name: Potassium bicarbonate
      application: Spray on infected leaves
      dosage: 5 g per L
      frequency: Every 7 days
      best_time: Evening
      cost_estimate: { amount: 10, currency: USD }
      evidence_score: 0.95
      max_applications_per_season: 8
    - type: chemical
      name: Myclobutanil
      application: Systemic foliar spray
      dosage: 0.5 ml per L
      frequency: Every 14 days
      best_time: Morning
      cost_estimate: { amount: 60, currency: USD }
      safety:
        ppe: [gloves, respirator, coveralls, goggles]
        pre_harvest_interval_days: 14
      evidence_score: 0.8
      max_applications_per_season: 3
"#;

#[cfg(test)]
pub(crate) fn sample_knowledge_base() -> KnowledgeBase {
    KnowledgeBase::from_yaml_str(SAMPLE_KB).expect("sample knowledge base should parse")
}
