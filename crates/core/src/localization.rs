use std::collections::BTreeMap;

use crate::config::LocalizationConfig;

/// Label key → display string for one language.
pub type LocalizedLabels = BTreeMap<String, String>;

pub const LABEL_KEYS: [&str; 12] = [
    "disease_detected",
    "confidence",
    "organic_treatment",
    "chemical_treatment",
    "safety_warning",
    "ppe_required",
    "pre_harvest_interval",
    "cost_estimate",
    "frequency",
    "best_time",
    "uncertainty_warning",
    "sdg_alignment",
];

const EN: &[(&str, &str)] = &[
    ("disease_detected", "Disease Detected"),
    ("confidence", "Confidence"),
    ("organic_treatment", "Organic Treatment"),
    ("chemical_treatment", "Chemical Treatment"),
    ("safety_warning", "Safety Warning"),
    ("ppe_required", "PPE Required"),
    ("pre_harvest_interval", "Pre-harvest Interval"),
    ("cost_estimate", "Cost Estimate"),
    ("frequency", "Frequency"),
    ("best_time", "Best Time"),
    ("uncertainty_warning", "Uncertainty Warning"),
    ("sdg_alignment", "SDG Alignment"),
];

const ES: &[(&str, &str)] = &[
    ("disease_detected", "Enfermedad Detectada"),
    ("confidence", "Confianza"),
    ("organic_treatment", "Tratamiento Orgánico"),
    ("chemical_treatment", "Tratamiento Químico"),
    ("safety_warning", "Advertencia de Seguridad"),
    ("ppe_required", "EPP Requerido"),
    ("pre_harvest_interval", "Intervalo Pre-cosecha"),
    ("cost_estimate", "Estimación de Costo"),
    ("frequency", "Frecuencia"),
    ("best_time", "Mejor Momento"),
    ("uncertainty_warning", "Advertencia de Incertidumbre"),
    ("sdg_alignment", "Alineación ODS"),
];

const FR: &[(&str, &str)] = &[
    ("disease_detected", "Maladie Détectée"),
    ("confidence", "Confiance"),
    ("organic_treatment", "Traitement Biologique"),
    ("chemical_treatment", "Traitement Chimique"),
    ("safety_warning", "Avertissement de Sécurité"),
    ("ppe_required", "EPI Requis"),
    ("pre_harvest_interval", "Intervalle Pré-récolte"),
    ("cost_estimate", "Estimation des Coûts"),
    ("frequency", "Fréquence"),
    ("best_time", "Meilleur Moment"),
    ("uncertainty_warning", "Avertissement d'Incertitude"),
    ("sdg_alignment", "Alignement ODD"),
];

const HI: &[(&str, &str)] = &[
    ("disease_detected", "रोग का पता चला"),
    ("confidence", "विश्वास स्तर"),
    ("organic_treatment", "जैविक उपचार"),
    ("chemical_treatment", "रासायनिक उपचार"),
    ("safety_warning", "सुरक्षा चेतावनी"),
    ("ppe_required", "आवश्यक सुरक्षा उपकरण"),
    ("pre_harvest_interval", "कटाई पूर्व अंतराल"),
    ("cost_estimate", "लागत अनुमान"),
    ("frequency", "आवृत्ति"),
    ("best_time", "सबसे अच्छा समय"),
    ("uncertainty_warning", "अनिश्चितता चेतावनी"),
    ("sdg_alignment", "सतत विकास लक्ष्य संरेखण"),
];

// Portuguese has no `best_time` entry yet; it falls back to the default language.
const PT: &[(&str, &str)] = &[
    ("disease_detected", "Doença Detectada"),
    ("confidence", "Confiança"),
    ("organic_treatment", "Tratamento Orgânico"),
    ("chemical_treatment", "Tratamento Químico"),
    ("safety_warning", "Aviso de Segurança"),
    ("ppe_required", "EPI Necessário"),
    ("pre_harvest_interval", "Intervalo Pré-colheita"),
    ("cost_estimate", "Estimativa de Custo"),
    ("frequency", "Frequência"),
    ("uncertainty_warning", "Aviso de Incerteza"),
    ("sdg_alignment", "Alinhamento ODS"),
];

fn builtin_table(language: &str) -> Option<&'static [(&'static str, &'static str)]> {
    match language {
        "en" => Some(EN),
        "es" => Some(ES),
        "fr" => Some(FR),
        "hi" => Some(HI),
        "pt" => Some(PT),
        _ => None,
    }
}

/// Normalises `es-MX`, ` ES ` and `pt_BR` style tags to their primary subtag.
pub fn normalize_language_tag(value: &str) -> String {
    value
        .trim()
        .split(['-', '_'])
        .next()
        .unwrap_or_default()
        .to_lowercase()
}

#[derive(Debug, Clone)]
pub struct LabelCatalog {
    default_language: String,
    supported_languages: Vec<String>,
}

impl LabelCatalog {
    pub fn new(config: &LocalizationConfig) -> Self {
        Self {
            default_language: normalize_language_tag(&config.default_language),
            supported_languages: config
                .supported_languages
                .iter()
                .map(|lang| normalize_language_tag(lang))
                .collect(),
        }
    }

    pub fn default_language(&self) -> &str {
        &self.default_language
    }

    pub fn supported_languages(&self) -> &[String] {
        &self.supported_languages
    }

    /// Supported language for `requested`, or the default language.
    pub fn resolve_language(&self, requested: Option<&str>) -> String {
        requested
            .map(normalize_language_tag)
            .filter(|lang| self.supported_languages.iter().any(|s| s == lang))
            .unwrap_or_else(|| self.default_language.clone())
    }

    /// Full label set for an already-resolved language; missing keys come from
    /// the default language, then English.
    pub fn labels_for(&self, language: &str) -> LocalizedLabels {
        let chain = [
            builtin_table(language),
            builtin_table(&self.default_language),
            Some(EN),
        ];

        LABEL_KEYS
            .iter()
            .map(|key| {
                let value = chain
                    .iter()
                    .flatten()
                    .find_map(|table| lookup(table, key))
                    .unwrap_or(*key);
                (key.to_string(), value.to_string())
            })
            .collect()
    }
}

fn lookup(table: &[(&'static str, &'static str)], key: &str) -> Option<&'static str> {
    table.iter().find(|(k, _)| *k == key).map(|(_, v)| *v)
}
