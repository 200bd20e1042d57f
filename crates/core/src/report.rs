//! Per-run report assembly and rendering.
//!
//! Groups classified results into per-patient sections with stable ordering
//! and renders a plain markdown body. HTML styling, charts and attachments are
//! delivery concerns and live outside this crate.

use crate::classify::{BatchStats, Bucket, ClassifiedResult, ObservationKind};
use crate::{PipelineError, PipelineResult};
use chrono::{DateTime, SecondsFormat, Utc};
use labwatch_types::NonEmptyText;
use std::collections::BTreeMap;
use uuid::Uuid;

/// All results for one patient.
#[derive(Clone, Debug)]
pub struct PatientSummary {
    pub patient_id: String,
    pub display_name: String,
    pub results: Vec<ClassifiedResult>,
}

impl PatientSummary {
    /// The abnormal results for this patient.
    pub fn abnormal(&self) -> impl Iterator<Item = &ClassifiedResult> {
        self.results.iter().filter(|r| r.is_abnormal())
    }
}

/// Bucket totals across one run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReportTotals {
    pub normal: usize,
    pub abnormal_labs: usize,
    pub abnormal_vitals: usize,
    pub unclassified: usize,
}

impl ReportTotals {
    pub fn abnormal(&self) -> usize {
        self.abnormal_labs + self.abnormal_vitals
    }
}

/// One run's aggregated output.
#[derive(Clone, Debug)]
pub struct RunReport {
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    /// Per-patient sections, sorted by display name then id.
    pub patients: Vec<PatientSummary>,
    pub totals: ReportTotals,
    pub stats: BatchStats,
    /// Patients present in the export's identity file, whether or not they
    /// produced results.
    pub patient_count: usize,
}

impl RunReport {
    /// Group classified results into per-patient sections.
    ///
    /// Sections and totals depend only on the inputs, so repeated runs over
    /// the same data render identically apart from run id and timestamp.
    pub fn build(
        run_id: Uuid,
        generated_at: DateTime<Utc>,
        results: Vec<ClassifiedResult>,
        stats: BatchStats,
        patient_count: usize,
    ) -> Self {
        let mut totals = ReportTotals::default();
        let mut grouped: BTreeMap<String, PatientSummary> = BTreeMap::new();
        for result in results {
            match (result.bucket, result.kind) {
                (Bucket::Normal, _) => totals.normal += 1,
                (Bucket::Abnormal, ObservationKind::Lab) => totals.abnormal_labs += 1,
                (Bucket::Abnormal, ObservationKind::Vital) => totals.abnormal_vitals += 1,
                (Bucket::Unclassified, _) => totals.unclassified += 1,
            }
            grouped
                .entry(result.patient_id.clone())
                .or_insert_with(|| PatientSummary {
                    patient_id: result.patient_id.clone(),
                    display_name: result.patient_display_name.clone(),
                    results: Vec::new(),
                })
                .results
                .push(result);
        }

        let mut patients: Vec<PatientSummary> = grouped.into_values().collect();
        patients.sort_by(|a, b| {
            (a.display_name.as_str(), a.patient_id.as_str())
                .cmp(&(b.display_name.as_str(), b.patient_id.as_str()))
        });

        Self {
            run_id,
            generated_at,
            patients,
            totals,
            stats,
            patient_count,
        }
    }

    /// The notification subject line:
    /// `Daily Patient Report: N Abnormal Labs, M Abnormal Vitals`.
    pub fn subject(&self) -> String {
        format!(
            "Daily Patient Report: {} Abnormal Labs, {} Abnormal Vitals",
            self.totals.abnormal_labs, self.totals.abnormal_vitals
        )
    }

    /// Render the report body as markdown.
    ///
    /// A run with zero abnormal results still renders, with the counts and an
    /// explicit all-clear line; silence must mean breakage, never good news.
    pub fn render(&self) -> PipelineResult<NonEmptyText> {
        let mut out = String::new();
        out.push_str("# Daily Patient Report\n\n");
        out.push_str(&format!("**Run:** {}\n", self.run_id));
        out.push_str(&format!(
            "**Generated:** {}\n",
            self.generated_at.to_rfc3339_opts(SecondsFormat::Secs, true)
        ));
        out.push_str(&format!("**Patients:** {}\n", self.patient_count));
        out.push_str(&format!(
            "**Results:** {} normal, {} abnormal ({} labs, {} vitals), {} unclassified\n",
            self.totals.normal,
            self.totals.abnormal(),
            self.totals.abnormal_labs,
            self.totals.abnormal_vitals,
            self.totals.unclassified
        ));
        if self.stats.skipped() > 0 {
            out.push_str(&format!(
                "**Skipped lines:** {} ({} malformed, {} without a value)\n",
                self.stats.skipped(),
                self.stats.malformed,
                self.stats.missing_value
            ));
        }

        out.push_str("\n## Abnormal results\n");
        if self.totals.abnormal() == 0 {
            out.push_str("\nNo abnormal results in this run.\n");
        } else {
            for patient in &self.patients {
                let abnormal: Vec<&ClassifiedResult> = patient.abnormal().collect();
                if abnormal.is_empty() {
                    continue;
                }
                out.push_str(&format!(
                    "\n### {} ({})\n\n",
                    patient.display_name, patient.patient_id
                ));
                for result in abnormal {
                    out.push_str(&render_result_line(result));
                }
            }
        }

        NonEmptyText::new(out).map_err(|e| PipelineError::Render(e.to_string()))
    }
}

/// One abnormal result as a list entry, reference range attached.
fn render_result_line(result: &ClassifiedResult) -> String {
    let value_part = if result.unit.is_empty() {
        format_value(result.value)
    } else {
        format!("{} {}", format_value(result.value), result.unit)
    };
    let range_part = format!(
        "ref {}-{}",
        result.low.map(format_value).unwrap_or_else(|| "?".into()),
        result.high.map(format_value).unwrap_or_else(|| "?".into())
    );
    let when = result
        .timestamp
        .as_deref()
        .map(|t| format!(" at {t}"))
        .unwrap_or_default();
    format!(
        "- {} [{}]: {value_part} ({range_part}){when}\n",
        result.test_label, result.kind
    )
}

/// Trim trailing `.0` noise off whole-number values.
fn format_value(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}
