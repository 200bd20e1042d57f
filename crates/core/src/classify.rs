//! Observation classification.
//!
//! Turns already-fetched NDJSON observation text into bucketed results plus
//! per-batch accounting.
//!
//! Responsibilities:
//! - Route each line to the lab or vital rules by category
//! - Resolve a lookup code (LOINC-first, free-text fallback for vitals)
//! - Compare values against the threshold table, strict on both bounds
//! - Count every non-blank line as emitted, malformed or missing a value
//!
//! Notes:
//! - Classification is read-only over its inputs and carries no state between
//!   calls; the same text classifies identically every time
//! - Values are compared and carried through unchanged, no unit conversion

use crate::patients::PatientIndex;
use crate::thresholds::ThresholdTable;
use fhir::{ndjson, Observation};

/// Category code that routes a line to the vital rules.
const VITAL_SIGNS_CATEGORY: &str = "vital-signs";

/// Display label when nothing on the observation names the test.
const UNKNOWN_TEST_LABEL: &str = "unknown";

/// Patient key when the observation carries no usable subject reference.
pub const UNKNOWN_PATIENT_ID: &str = "unknown";

// ============================================================================
// Verdicts and policies
// ============================================================================

/// Classification outcome for one observation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Bucket {
    /// Inside the reference range, or no range applied under the lab policy.
    Normal,
    /// Strictly outside the reference range on at least one present bound.
    Abnormal,
    /// No code or no threshold could be resolved; the value is carried
    /// through without a verdict.
    Unclassified,
}

impl std::fmt::Display for Bucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Bucket::Normal => "normal",
            Bucket::Abnormal => "abnormal",
            Bucket::Unclassified => "unclassified",
        };
        write!(f, "{label}")
    }
}

/// Which rule set classified an observation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ObservationKind {
    Lab,
    Vital,
}

impl std::fmt::Display for ObservationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ObservationKind::Lab => "lab",
            ObservationKind::Vital => "vital",
        };
        write!(f, "{label}")
    }
}

/// What to do with an observation whose resolved code has no threshold entry
/// and no embedded range.
///
/// The legacy rules differ between labs and vitals, so the policy is an
/// explicit knob on the classifier rather than a silent default.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MissingThresholdPolicy {
    /// Count the observation as normal, with no bounds attached.
    TreatAsNormal,
    /// Route the observation to the unclassified bucket.
    RouteToUnclassified,
}

/// Reference policy for labs with no threshold entry.
pub const DEFAULT_LAB_POLICY: MissingThresholdPolicy = MissingThresholdPolicy::TreatAsNormal;

/// Reference policy for vitals with no threshold entry.
pub const DEFAULT_VITAL_POLICY: MissingThresholdPolicy = MissingThresholdPolicy::RouteToUnclassified;

/// The range verdict for a value against optional inclusive bounds.
///
/// Strict on both sides: a value exactly equal to a bound is normal. Only
/// bounds that are present participate.
pub fn range_bucket(value: f64, low: Option<f64>, high: Option<f64>) -> Bucket {
    let below = low.is_some_and(|l| value < l);
    let above = high.is_some_and(|h| value > h);
    if below || above {
        Bucket::Abnormal
    } else {
        Bucket::Normal
    }
}

// ============================================================================
// Free-text vital names
// ============================================================================

/// Best-effort mapping from free-text vital names to lookup codes.
///
/// Some feeds omit codings on vital observations and carry only display text.
/// This table maps a small fixed set of common names onto codes by
/// case-insensitive substring match. It can mis-map loose text ("blood
/// pressure" alone lands on the systolic code) and is swappable on the
/// classifier for feeds that need different entries.
#[derive(Clone, Debug)]
pub struct VitalNameMap {
    entries: Vec<(String, String)>,
}

impl VitalNameMap {
    /// The standard entries: heart rate, blood pressure and temperature.
    pub fn standard() -> Self {
        Self {
            entries: vec![
                ("heart rate".into(), "8867-4".into()),
                ("blood pressure".into(), "8480-6".into()),
                ("temperature".into(), "8310-5".into()),
            ],
        }
    }

    /// An empty map; switches the free-text fallback off.
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Add or replace a mapping from a name fragment to a code.
    pub fn with_entry(mut self, fragment: impl Into<String>, code: impl Into<String>) -> Self {
        let fragment = fragment.into().to_lowercase();
        self.entries.retain(|(f, _)| *f != fragment);
        self.entries.push((fragment, code.into()));
        self
    }

    /// Resolve free text to a code by case-insensitive substring match.
    pub fn resolve(&self, text: &str) -> Option<&str> {
        let haystack = text.to_lowercase();
        self.entries
            .iter()
            .find(|(fragment, _)| haystack.contains(fragment.as_str()))
            .map(|(_, code)| code.as_str())
    }
}

impl Default for VitalNameMap {
    fn default() -> Self {
        Self::standard()
    }
}

// ============================================================================
// Results and accounting
// ============================================================================

/// One bucketed observation.
#[derive(Clone, Debug, PartialEq)]
pub struct ClassifiedResult {
    /// Observation resource id, when the line carried one.
    pub id: Option<String>,
    /// Patient id resolved from the subject reference.
    pub patient_id: String,
    /// Display label for the patient; the raw id when no identity is known.
    pub patient_display_name: String,
    /// Human label for the test.
    pub test_label: String,
    /// The measured value, carried through unchanged.
    pub value: f64,
    /// Display unit: the threshold's when one matched, else the observation's.
    pub unit: String,
    /// Lower reference bound, when one applied.
    pub low: Option<f64>,
    /// Upper reference bound, when one applied.
    pub high: Option<f64>,
    /// Observation timestamp (`effectiveDateTime`, falling back to `issued`).
    pub timestamp: Option<String>,
    /// Which rule set classified this observation.
    pub kind: ObservationKind,
    /// The verdict.
    pub bucket: Bucket,
}

impl ClassifiedResult {
    pub fn is_abnormal(&self) -> bool {
        self.bucket == Bucket::Abnormal
    }
}

/// Accounting for one classification batch.
///
/// Every non-blank input line lands in exactly one counter, so
/// `emitted + malformed + missing_value == lines` always holds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BatchStats {
    /// Non-blank lines seen.
    pub lines: usize,
    /// Lines dropped because the JSON would not parse.
    pub malformed: usize,
    /// Lines dropped for lacking a numeric quantity value.
    pub missing_value: usize,
    /// Results emitted.
    pub emitted: usize,
}

impl BatchStats {
    /// Lines skipped for any reason.
    pub fn skipped(&self) -> usize {
        self.malformed + self.missing_value
    }

    /// Fold another batch's counters into this one.
    pub fn absorb(&mut self, other: BatchStats) {
        self.lines += other.lines;
        self.malformed += other.malformed;
        self.missing_value += other.missing_value;
        self.emitted += other.emitted;
    }
}

/// The results and accounting from one classification call.
#[derive(Clone, Debug, Default)]
pub struct ClassifiedBatch {
    pub results: Vec<ClassifiedResult>,
    pub stats: BatchStats,
}

impl ClassifiedBatch {
    /// Fold another batch into this one, results and counters both.
    pub fn absorb(&mut self, other: ClassifiedBatch) {
        self.results.extend(other.results);
        self.stats.absorb(other.stats);
    }
}

// ============================================================================
// Classifier
// ============================================================================

/// Classifies NDJSON observation lines against a threshold table.
pub struct ObservationClassifier {
    thresholds: ThresholdTable,
    vital_names: VitalNameMap,
    lab_policy: MissingThresholdPolicy,
    vital_policy: MissingThresholdPolicy,
}

impl ObservationClassifier {
    /// Create a classifier with the reference policies and standard vital
    /// name fallback.
    pub fn new(thresholds: ThresholdTable) -> Self {
        Self {
            thresholds,
            vital_names: VitalNameMap::standard(),
            lab_policy: DEFAULT_LAB_POLICY,
            vital_policy: DEFAULT_VITAL_POLICY,
        }
    }

    /// Override the missing-threshold policy for labs.
    pub fn with_lab_policy(mut self, policy: MissingThresholdPolicy) -> Self {
        self.lab_policy = policy;
        self
    }

    /// Override the missing-threshold policy for vitals.
    pub fn with_vital_policy(mut self, policy: MissingThresholdPolicy) -> Self {
        self.vital_policy = policy;
        self
    }

    /// Replace the free-text vital name fallback table.
    pub fn with_vital_names(mut self, names: VitalNameMap) -> Self {
        self.vital_names = names;
        self
    }

    /// Classify every non-blank line of an NDJSON document.
    ///
    /// Data-shape problems never fail the batch: malformed lines and lines
    /// without a numeric value are logged, counted and skipped.
    pub fn classify(&self, ndjson_text: &str, patients: &PatientIndex) -> ClassifiedBatch {
        let mut batch = ClassifiedBatch::default();
        for (line_no, line) in ndjson::lines(ndjson_text) {
            batch.stats.lines += 1;
            let observation = match Observation::parse(line) {
                Ok(obs) => obs,
                Err(err) => {
                    tracing::warn!("skipping malformed observation line {line_no}: {err}");
                    batch.stats.malformed += 1;
                    continue;
                }
            };
            match self.classify_one(&observation, patients) {
                Some(result) => {
                    batch.stats.emitted += 1;
                    batch.results.push(result);
                }
                None => {
                    tracing::debug!(
                        "skipping observation {} (line {line_no}): no numeric quantity value",
                        observation.id.as_deref().unwrap_or("<no id>")
                    );
                    batch.stats.missing_value += 1;
                }
            }
        }
        batch
    }

    /// Classify one parsed observation; `None` when it lacks a numeric value
    /// and therefore cannot be classified at all.
    fn classify_one(
        &self,
        obs: &Observation,
        patients: &PatientIndex,
    ) -> Option<ClassifiedResult> {
        // Vitals demand an explicit category confirmation; everything else,
        // including uncategorised lines, goes through the lab rules.
        let kind = if obs.has_category(VITAL_SIGNS_CATEGORY) {
            ObservationKind::Vital
        } else {
            ObservationKind::Lab
        };

        let coding = obs.preferred_coding();
        let code: Option<String> = match coding.and_then(|c| c.code.as_deref()) {
            Some(code) => Some(code.to_string()),
            None if kind == ObservationKind::Vital => obs
                .code_text()
                .and_then(|text| self.vital_names.resolve(text))
                .map(str::to_owned),
            None => None,
        };

        let value = obs.value()?;

        let policy = match kind {
            ObservationKind::Lab => self.lab_policy,
            ObservationKind::Vital => self.vital_policy,
        };
        let threshold = code.as_deref().and_then(|c| self.thresholds.get(c));

        let (bucket, low, high) = match (&code, threshold) {
            // No resolvable code: nothing to look a range up by.
            (None, _) => (Bucket::Unclassified, None, None),
            (Some(_), Some(def)) => (
                range_bucket(value, Some(def.low), Some(def.high)),
                Some(def.low),
                Some(def.high),
            ),
            (Some(_), None) => {
                // Labs may carry their own reference range on the resource.
                let (embedded_low, embedded_high) = match kind {
                    ObservationKind::Lab => obs.embedded_range(),
                    ObservationKind::Vital => (None, None),
                };
                if embedded_low.is_some() || embedded_high.is_some() {
                    (
                        range_bucket(value, embedded_low, embedded_high),
                        embedded_low,
                        embedded_high,
                    )
                } else {
                    match policy {
                        MissingThresholdPolicy::TreatAsNormal => (Bucket::Normal, None, None),
                        MissingThresholdPolicy::RouteToUnclassified => {
                            (Bucket::Unclassified, None, None)
                        }
                    }
                }
            }
        };

        // Label: threshold name, coding display, resource free text, raw code.
        let test_label = threshold
            .map(|def| def.name.clone())
            .or_else(|| coding.and_then(|c| c.display.clone()))
            .or_else(|| obs.code_text().map(str::to_owned))
            .or_else(|| code.clone())
            .unwrap_or_else(|| UNKNOWN_TEST_LABEL.to_string());

        let unit = threshold
            .map(|def| def.unit.clone())
            .or_else(|| obs.unit().map(str::to_owned))
            .unwrap_or_default();

        let patient_id = obs.patient_id().unwrap_or(UNKNOWN_PATIENT_ID).to_string();
        let patient_display_name = patients.display_name(&patient_id).to_string();

        Some(ClassifiedResult {
            id: obs.id.clone(),
            patient_id,
            patient_display_name,
            test_label,
            value,
            unit,
            low,
            high,
            timestamp: obs.timestamp().map(str::to_owned),
            kind,
            bucket,
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
