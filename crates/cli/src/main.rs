use std::fmt::Write as _;
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use leafcare_agents::{AnalysisRequest, PlantCareAdvisor};
use leafcare_core::formatter::TreatmentView;
use leafcare_core::{
    DetectionResponse, DiseaseListing, DosageReport, ErrorResponse, GrowthStage,
    TreatmentLookupResponse,
};
use leafcare_observability::{init_tracing, AppMetrics};
use serde::Serialize;

#[derive(Debug, Parser)]
#[command(name = "leafcare")]
#[command(about = "Leaf disease detection and treatment advice")]
struct Cli {
    /// YAML config; built-in defaults when omitted.
    #[arg(long, env = "LEAFCARE_CONFIG")]
    config: Option<PathBuf>,

    /// Disease knowledge base file or directory.
    #[arg(long, env = "LEAFCARE_KB", default_value = "kb")]
    kb: PathBuf,

    #[arg(long, value_enum, default_value_t = OutputFormat::Json, global = true)]
    output: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Json,
    Text,
    Table,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Analyze a leaf photo and recommend treatments.
    Analyze {
        image: PathBuf,
        #[arg(long)]
        crop_type: Option<String>,
        #[arg(long, value_parser = parse_growth_stage)]
        growth_stage: Option<GrowthStage>,
        #[arg(long)]
        location: Option<String>,
        #[arg(long, default_value = "en")]
        language: String,
    },
    /// Offline treatment lookup for a disease id.
    Treatment {
        disease_id: String,
        #[arg(long, default_value = "en")]
        language: String,
    },
    /// List the diseases in the knowledge base.
    Diseases,
    /// Check a requested dosage against anti-overuse limits.
    Validate {
        disease_id: String,
        remedy_name: String,
        requested_dosage: String,
    },
    /// Show model backend, supported languages and counters.
    Info,
}

fn parse_growth_stage(value: &str) -> Result<GrowthStage, String> {
    GrowthStage::parse(value).ok_or_else(|| {
        format!("unknown growth stage '{value}' (seedling, vegetative, flowering, fruiting, mature)")
    })
}

fn main() -> Result<ExitCode> {
    init_tracing("leafcare_cli");
    let cli = Cli::parse();

    let advisor = PlantCareAdvisor::load(cli.config.as_deref(), &cli.kb, AppMetrics::shared())?;
    let output = cli.output;

    match cli.command {
        Command::Analyze {
            image,
            crop_type,
            growth_stage,
            location,
            language,
        } => {
            let bytes = fs::read(&image)
                .with_context(|| format!("failed reading image {}", image.display()))?;
            let filename = image
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
            let request = AnalysisRequest {
                crop_type,
                growth_stage,
                location,
                language: Some(language.clone()),
            };

            match advisor.analyze_image(&bytes, &filename, request) {
                Ok(response) => emit(output, &response)?,
                Err(err) => {
                    let body = advisor.error_response(&err, Some(&language));
                    emit(output, &body)?;
                    return Ok(ExitCode::FAILURE);
                }
            }
        }
        Command::Treatment {
            disease_id,
            language,
        } => {
            let response = advisor.treatment_info(&disease_id, Some(&language))?;
            emit(output, &response)?;
            if response.error.is_some() {
                return Ok(ExitCode::FAILURE);
            }
        }
        Command::Diseases => {
            let listing = advisor.list_diseases();
            emit(output, &listing)?;
        }
        Command::Validate {
            disease_id,
            remedy_name,
            requested_dosage,
        } => {
            let report = advisor.validate_dosage(&disease_id, &remedy_name, &requested_dosage);
            emit(output, &report)?;
            if report.blocked {
                return Ok(ExitCode::FAILURE);
            }
        }
        Command::Info => {
            let info = serde_json::json!({
                "health": advisor.health(),
                "metrics": advisor.metrics().snapshot(),
            });
            emit(output, &info)?;
        }
    }

    Ok(ExitCode::SUCCESS)
}

/// Human-readable renderings; `table` defaults to the text form.
trait Render {
    fn text(&self) -> String;

    fn table(&self) -> String {
        self.text()
    }
}

fn emit<T: Serialize + Render>(output: OutputFormat, value: &T) -> Result<()> {
    match output {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
        OutputFormat::Text => println!("{}", value.text()),
        OutputFormat::Table => println!("{}", value.table()),
    }
    Ok(())
}

impl Render for DetectionResponse {
    fn text(&self) -> String {
        let labels = &self.labels;
        let label = |key: &str| labels.get(key).cloned().unwrap_or_else(|| key.to_string());

        let mut out = String::new();
        let _ = writeln!(out, "{}: {}", label("disease_detected"), self.disease.name);
        let _ = writeln!(
            out,
            "{}: {:.1}% ({})",
            label("confidence"),
            self.disease.confidence * 100.0,
            self.confidence_level.as_str()
        );
        if let Some(warning) = &self.image_warning {
            let _ = writeln!(out, "! {warning}");
        }
        out.push('\n');
        render_treatments(&mut out, &self.recommended_treatments, &label);
        let _ = writeln!(out, "\n{}", self.summary);
        if let Some(warning) = &self.uncertainty_warning {
            let _ = writeln!(out, "\n{}: {warning}", label("uncertainty_warning"));
        }
        if !self.sdg_alignment.is_empty() {
            let _ = writeln!(
                out,
                "\n{}: {}",
                label("sdg_alignment"),
                self.sdg_alignment.join("; ")
            );
        }
        out
    }

    fn table(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "DISEASE DETECTION");
        let _ = writeln!(out, "{}", "=".repeat(50));
        let _ = writeln!(out, "Name: {}", self.disease.name);
        let _ = writeln!(out, "Confidence: {:.1}%\n", self.disease.confidence * 100.0);
        out.push_str(&treatment_table(&self.recommended_treatments));
        out
    }
}

impl Render for TreatmentLookupResponse {
    fn text(&self) -> String {
        if let Some(error) = &self.error {
            return format!("Error: {error}");
        }
        let labels = &self.labels;
        let label = |key: &str| labels.get(key).cloned().unwrap_or_else(|| key.to_string());

        let mut out = String::new();
        if let Some(disease) = &self.disease {
            let _ = writeln!(out, "{} ({})\n", disease.name, disease.id);
        }
        render_treatments(&mut out, &self.treatments, &label);
        out
    }

    fn table(&self) -> String {
        if let Some(error) = &self.error {
            return format!("Error: {error}");
        }
        let mut out = String::new();
        if let Some(disease) = &self.disease {
            let _ = writeln!(out, "{} ({})\n", disease.name, disease.id);
        }
        out.push_str(&treatment_table(&self.treatments));
        out
    }
}

impl Render for ErrorResponse {
    fn text(&self) -> String {
        format!("Error [{}]: {}", self.error_code, self.message)
    }
}

impl Render for Vec<DiseaseListing> {
    fn text(&self) -> String {
        let mut out = String::new();
        for disease in self {
            let _ = writeln!(
                out,
                "{:<18} {:<20} {} remedies",
                disease.id, disease.name, disease.remedy_count
            );
        }
        out
    }

    fn table(&self) -> String {
        let rows = self
            .iter()
            .map(|d| vec![d.id.clone(), d.name.clone(), d.remedy_count.to_string()])
            .collect::<Vec<_>>();
        grid(&["ID", "NAME", "REMEDIES"], &rows)
    }
}

impl Render for DosageReport {
    fn text(&self) -> String {
        let status = if self.blocked {
            "BLOCKED"
        } else if self.requires_confirmation {
            "NEEDS CONFIRMATION"
        } else {
            "OK"
        };
        match &self.warning {
            Some(warning) => format!("{status}: {warning}"),
            None => status.to_string(),
        }
    }
}

impl Render for serde_json::Value {
    fn text(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }
}

fn render_treatments(out: &mut String, treatments: &[TreatmentView], label: &dyn Fn(&str) -> String) {
    if treatments.is_empty() {
        let _ = writeln!(out, "No specific treatments recommended.");
        return;
    }
    for (idx, view) in treatments.iter().enumerate() {
        let remedy = &view.remedy;
        let _ = writeln!(
            out,
            "{}. {} ({}){}",
            idx + 1,
            remedy.name,
            remedy.kind.as_str().to_uppercase(),
            if remedy.requires_confirmation {
                " [confirm before use]"
            } else {
                ""
            }
        );
        let _ = writeln!(out, "   Dosage: {}", remedy.dosage);
        let _ = writeln!(out, "   {}: {}", label("frequency"), remedy.frequency);
        let _ = writeln!(out, "   {}: {}", label("best_time"), remedy.best_time);
        let _ = writeln!(out, "   {}: {}", label("cost_estimate"), view.cost_display);
        if !remedy.safety.ppe.is_empty() {
            let _ = writeln!(out, "   {}: {}", label("ppe_required"), remedy.safety.ppe.join(", "));
        }
        if remedy.safety.pre_harvest_interval_days > 0 {
            let _ = writeln!(
                out,
                "   {}: {} days",
                label("pre_harvest_interval"),
                remedy.safety.pre_harvest_interval_days
            );
        }
        if let Some(warning) = &remedy.safety.warning {
            let _ = writeln!(out, "   {}: {warning}", label("safety_warning"));
        }
    }
}

fn treatment_table(treatments: &[TreatmentView]) -> String {
    if treatments.is_empty() {
        return "No specific treatments recommended.\n".to_string();
    }
    let rows = treatments
        .iter()
        .enumerate()
        .map(|(idx, view)| {
            vec![
                (idx + 1).to_string(),
                view.remedy.name.clone(),
                view.remedy.kind.as_str().to_uppercase(),
                view.remedy.dosage.clone(),
                view.remedy.frequency.clone(),
                view.cost_display.clone(),
            ]
        })
        .collect::<Vec<_>>();
    format!(
        "TREATMENT RECOMMENDATIONS\n{}\n{}",
        "=".repeat(50),
        grid(&["#", "NAME", "TYPE", "DOSAGE", "FREQUENCY", "COST"], &rows)
    )
}

/// Left-aligned columns padded to the widest cell.
fn grid(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths = headers.iter().map(|h| h.chars().count()).collect::<Vec<_>>();
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let mut out = String::new();
    let _ = writeln!(out, "{}", padded(headers.iter().copied(), &widths));
    for row in rows {
        let _ = writeln!(out, "{}", padded(row.iter().map(String::as_str), &widths));
    }
    out
}

fn padded<'a>(cells: impl Iterator<Item = &'a str>, widths: &[usize]) -> String {
    cells
        .zip(widths)
        .map(|(cell, width)| format!("{cell:<width$}"))
        .collect::<Vec<_>>()
        .join("  ")
        .trim_end()
        .to_string()
}
