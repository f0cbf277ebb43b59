//! Dosage text parsing and anti-overuse verdicts.
//!
//! Accepted forms are `<amount> <unit> per [<amount>] <basis>` (also with `/`
//! instead of `per`) and `<amount>%`. Units are ml, l, g, kg and mg; bases are
//! litre, hectare, acre and plant. A percentage is a concentration of ten
//! millilitres per litre per percent, and millilitres and grams are treated as
//! interchangeable for concentrations in water-based sprays.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::AntiOveruseConfig;

const ACRE_IN_HECTARES: f64 = 0.404_686;

static RATE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(\d+(?:[.,]\d+)?)\s*(mg|ml|g|kg|l)s?\b\s*(?:per\b|/)\s*(?:(\d+(?:[.,]\d+)?)\s*)?(litres?|liters?|l|hectares?|ha|acres?|plants?)\b",
    )
    .expect("dosage rate pattern is valid")
});

static PERCENT_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+(?:[.,]\d+)?)\s*%").expect("dosage percent pattern is valid"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DoseBasis {
    Litre,
    Hectare,
    Plant,
}

/// Quantity in millilitres-or-grams per one unit of `basis`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Dose {
    pub amount: f64,
    pub basis: DoseBasis,
}

pub fn parse_dose(text: &str) -> Option<Dose> {
    if let Some(caps) = RATE_PATTERN.captures(text) {
        let amount = parse_number(caps.get(1)?.as_str())?;
        let unit_scale = match caps.get(2)?.as_str().to_lowercase().as_str() {
            "mg" => 0.001,
            "ml" | "g" => 1.0,
            "kg" | "l" => 1000.0,
            _ => return None,
        };
        let basis_amount = match caps.get(3) {
            Some(value) => parse_number(value.as_str())?,
            None => 1.0,
        };
        if basis_amount <= 0.0 {
            return None;
        }
        let basis_text = caps.get(4)?.as_str().to_lowercase();
        let (basis, basis_scale) = if basis_text.starts_with('l') {
            (DoseBasis::Litre, 1.0)
        } else if basis_text.starts_with('h') {
            (DoseBasis::Hectare, 1.0)
        } else if basis_text.starts_with('a') {
            (DoseBasis::Hectare, ACRE_IN_HECTARES)
        } else {
            (DoseBasis::Plant, 1.0)
        };

        return Some(Dose {
            amount: amount * unit_scale / (basis_amount * basis_scale),
            basis,
        });
    }

    let caps = PERCENT_PATTERN.captures(text)?;
    let percent = parse_number(caps.get(1)?.as_str())?;
    Some(Dose {
        amount: percent * 10.0,
        basis: DoseBasis::Litre,
    })
}

fn parse_number(raw: &str) -> Option<f64> {
    raw.replace(',', ".").parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Ratio of `requested` to `reference`, if both parse onto the same basis.
///
/// A zero label dose matches only a zero request (1.0); anything more is
/// infinitely over the label.
pub fn dosage_multiplier(reference: &str, requested: &str) -> Option<f64> {
    let reference = parse_dose(reference)?;
    let requested = parse_dose(requested)?;
    if reference.basis != requested.basis {
        return None;
    }
    if reference.amount <= 0.0 {
        return Some(if requested.amount <= 0.0 { 1.0 } else { f64::INFINITY });
    }
    Some(requested.amount / reference.amount)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockReason {
    UnknownDisease,
    UnknownRemedy,
    ExceedsMaximum,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DosageVerdict {
    Approved {
        multiplier: f64,
    },
    NeedsConfirmation {
        multiplier: Option<f64>,
        warning: String,
    },
    Blocked {
        reason: BlockReason,
        multiplier: Option<f64>,
        warning: String,
    },
}

impl DosageVerdict {
    pub fn blocked(reason: BlockReason, warning: impl Into<String>) -> Self {
        Self::Blocked {
            reason,
            multiplier: None,
            warning: warning.into(),
        }
    }

    pub fn is_valid(&self) -> bool {
        !self.is_blocked()
    }

    pub fn is_blocked(&self) -> bool {
        matches!(self, Self::Blocked { .. })
    }

    pub fn requires_confirmation(&self) -> bool {
        matches!(self, Self::NeedsConfirmation { .. })
    }

    pub fn warning(&self) -> Option<&str> {
        match self {
            Self::Approved { .. } => None,
            Self::NeedsConfirmation { warning, .. } | Self::Blocked { warning, .. } => {
                Some(warning.as_str())
            }
        }
    }

    pub fn multiplier(&self) -> Option<f64> {
        match self {
            Self::Approved { multiplier } => Some(*multiplier),
            Self::NeedsConfirmation { multiplier, .. } | Self::Blocked { multiplier, .. } => {
                *multiplier
            }
        }
    }

    pub fn report(&self) -> DosageReport {
        DosageReport {
            valid: self.is_valid(),
            blocked: self.is_blocked(),
            requires_confirmation: self.requires_confirmation(),
            warning: self.warning().map(ToString::to_string),
            multiplier: self.multiplier(),
            reason: match self {
                Self::Blocked { reason, .. } => Some(*reason),
                _ => None,
            },
        }
    }
}

/// Wire shape of a [`DosageVerdict`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DosageReport {
    pub valid: bool,
    pub blocked: bool,
    pub requires_confirmation: bool,
    pub warning: Option<String>,
    pub multiplier: Option<f64>,
    pub reason: Option<BlockReason>,
}

/// Compares a requested dosage against the label dosage of a known remedy.
pub fn assess_dosage(
    reference: &str,
    requested: &str,
    limits: &AntiOveruseConfig,
) -> DosageVerdict {
    let Some(multiplier) = dosage_multiplier(reference, requested) else {
        return DosageVerdict::NeedsConfirmation {
            multiplier: None,
            warning: format!(
                "Requested dosage '{}' could not be compared to the label dosage '{}'; confirm manually",
                requested.trim(),
                reference.trim()
            ),
        };
    };

    if multiplier.is_infinite() {
        DosageVerdict::Blocked {
            reason: BlockReason::ExceedsMaximum,
            multiplier: None,
            warning: format!(
                "Dosage exceeds maximum allowed (label dosage '{}' applies no product)",
                reference.trim()
            ),
        }
    } else if multiplier > limits.max_dosage_multiplier {
        DosageVerdict::Blocked {
            reason: BlockReason::ExceedsMaximum,
            multiplier: Some(multiplier),
            warning: format!(
                "Dosage exceeds maximum allowed ({}x recommended)",
                limits.max_dosage_multiplier
            ),
        }
    } else if multiplier > limits.require_confirmation_above {
        DosageVerdict::NeedsConfirmation {
            multiplier: Some(multiplier),
            warning: format!("High dosage requested ({multiplier:.2}x recommended)"),
        }
    } else {
        DosageVerdict::Approved { multiplier }
    }
}
