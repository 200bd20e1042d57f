//! FHIR-aligned observation wire model and read-side helpers.
//!
//! Bulk-export NDJSON carries one observation resource per line. This module
//! parses a line into a lenient [`Observation`] and offers the small read-side
//! views the classifier needs.
//!
//! Responsibilities:
//! - Define a lenient wire model where every field is optional
//! - Resolve the preferred coding (LOINC first) for threshold lookup
//! - Extract the subject's patient id, measured value, unit and timestamp
//!
//! Notes:
//! - A missing quantity or an empty coding list must survive deserialisation
//!   rather than fail it; skip decisions belong to the caller
//! - A quantity `value` that is present but non-numeric on the wire is read
//!   as absent, so the line counts as missing a value, not as malformed

use crate::{parse_with_path, FhirResult};
use serde::{Deserialize, Deserializer};

// ============================================================================
// Wire types
// ============================================================================

/// A single coding entry (system / code / display).
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct Coding {
    pub system: Option<String>,
    pub code: Option<String>,
    pub display: Option<String>,
}

/// A codeable concept: zero or more codings plus optional free text.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct CodeableConcept {
    #[serde(default)]
    pub coding: Vec<Coding>,
    pub text: Option<String>,
}

/// A measured quantity. `value` survives only when it is numeric on the wire.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct Quantity {
    #[serde(default, deserialize_with = "numeric_or_none")]
    pub value: Option<f64>,
    pub unit: Option<String>,
}

/// One bound of an embedded reference range.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct RangeBound {
    #[serde(default, deserialize_with = "numeric_or_none")]
    pub value: Option<f64>,
}

/// A reference range carried on the observation itself.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct ReferenceRange {
    pub low: Option<RangeBound>,
    pub high: Option<RangeBound>,
}

/// A reference to another resource, e.g. `Patient/123`.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct Reference {
    pub reference: Option<String>,
}

/// Lenient wire model for one observation resource.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Observation {
    pub id: Option<String>,
    pub code: Option<CodeableConcept>,
    pub subject: Option<Reference>,
    #[serde(default)]
    pub category: Vec<CodeableConcept>,
    pub value_quantity: Option<Quantity>,
    #[serde(default)]
    pub reference_range: Vec<ReferenceRange>,
    pub effective_date_time: Option<String>,
    pub issued: Option<String>,
}

// ============================================================================
// Read-side helpers
// ============================================================================

impl Observation {
    /// Parse one NDJSON line into an observation.
    pub fn parse(json_line: &str) -> FhirResult<Self> {
        parse_with_path("Observation", json_line)
    }

    /// The patient id from the subject reference, with any resource-type
    /// prefix stripped: `"Patient/p1"` and a bare `"p1"` both resolve to `p1`.
    pub fn patient_id(&self) -> Option<&str> {
        let reference = self.subject.as_ref()?.reference.as_deref()?;
        let id = reference.rsplit('/').next()?;
        if id.is_empty() {
            None
        } else {
            Some(id)
        }
    }

    /// True when any category coding carries the given code.
    pub fn has_category(&self, code: &str) -> bool {
        self.category
            .iter()
            .any(|concept| concept.coding.iter().any(|c| c.code.as_deref() == Some(code)))
    }

    /// The coding to resolve thresholds against: the first coding whose system
    /// mentions LOINC, otherwise the first coding that carries a code at all.
    pub fn preferred_coding(&self) -> Option<&Coding> {
        let concept = self.code.as_ref()?;
        concept
            .coding
            .iter()
            .find(|c| {
                c.code.is_some()
                    && c.system
                        .as_deref()
                        .is_some_and(|s| s.to_ascii_lowercase().contains("loinc"))
            })
            .or_else(|| concept.coding.iter().find(|c| c.code.is_some()))
    }

    /// Free text attached to the code, e.g. `"Heart rate"`.
    pub fn code_text(&self) -> Option<&str> {
        self.code.as_ref()?.text.as_deref()
    }

    /// The measured numeric value, when one survived deserialisation.
    pub fn value(&self) -> Option<f64> {
        self.value_quantity.as_ref()?.value
    }

    /// The measured unit, when present.
    pub fn unit(&self) -> Option<&str> {
        self.value_quantity.as_ref()?.unit.as_deref()
    }

    /// Bounds of the first embedded reference range entry, when present.
    pub fn embedded_range(&self) -> (Option<f64>, Option<f64>) {
        match self.reference_range.first() {
            Some(range) => (
                range.low.as_ref().and_then(|b| b.value),
                range.high.as_ref().and_then(|b| b.value),
            ),
            None => (None, None),
        }
    }

    /// Best-effort timestamp: `effectiveDateTime`, falling back to `issued`.
    pub fn timestamp(&self) -> Option<&str> {
        self.effective_date_time
            .as_deref()
            .or(self.issued.as_deref())
    }
}

/// Accept a JSON number, read anything else (strings, null) as absent.
fn numeric_or_none<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(value.as_f64())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn glucose_line() -> &'static str {
        r#"{
            "resourceType": "Observation",
            "id": "obs-1",
            "status": "final",
            "category": [{"coding": [{"system": "http://terminology.hl7.org/CodeSystem/observation-category", "code": "laboratory"}]}],
            "code": {"coding": [{"system": "http://loinc.org", "code": "2345-7", "display": "Glucose"}], "text": "Glucose [Mass/volume] in Blood"},
            "subject": {"reference": "Patient/p1"},
            "effectiveDateTime": "2026-08-20T07:30:00Z",
            "valueQuantity": {"value": 118, "unit": "mg/dL"}
        }"#
    }

    #[test]
    fn parses_a_complete_lab_line() {
        let obs = Observation::parse(glucose_line()).unwrap();
        assert_eq!(obs.id.as_deref(), Some("obs-1"));
        assert_eq!(obs.patient_id(), Some("p1"));
        assert_eq!(obs.value(), Some(118.0));
        assert_eq!(obs.unit(), Some("mg/dL"));
        assert_eq!(obs.timestamp(), Some("2026-08-20T07:30:00Z"));
        assert!(obs.has_category("laboratory"));
        assert!(!obs.has_category("vital-signs"));
    }

    #[test]
    fn tolerates_a_nearly_empty_resource() {
        let obs = Observation::parse(r#"{"resourceType": "Observation"}"#).unwrap();
        assert_eq!(obs.id, None);
        assert_eq!(obs.patient_id(), None);
        assert_eq!(obs.value(), None);
        assert!(obs.preferred_coding().is_none());
        assert_eq!(obs.timestamp(), None);
    }

    #[test]
    fn rejects_broken_json() {
        let err = Observation::parse("{not json").unwrap_err();
        assert!(matches!(err, crate::FhirError::InvalidJson(_)));
    }

    #[test]
    fn schema_mismatch_reports_the_path() {
        // category must be an array of concepts
        let err = Observation::parse(r#"{"category": "laboratory"}"#).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("Observation schema mismatch"), "{message}");
        assert!(message.contains("category"), "{message}");
    }

    #[test]
    fn prefers_the_loinc_coding() {
        let obs = Observation::parse(
            r#"{"code": {"coding": [
                {"system": "urn:oid:2.16.840.1.113883.6.96", "code": "271649006"},
                {"system": "http://LOINC.org", "code": "8480-6", "display": "Systolic BP"}
            ]}}"#,
        )
        .unwrap();
        let coding = obs.preferred_coding().unwrap();
        assert_eq!(coding.code.as_deref(), Some("8480-6"));
    }

    #[test]
    fn falls_back_to_first_coding_with_a_code() {
        let obs = Observation::parse(
            r#"{"code": {"coding": [
                {"system": "http://loinc.org", "display": "codeless entry"},
                {"system": "urn:oid:2.16.840.1.113883.6.96", "code": "271649006"}
            ]}}"#,
        )
        .unwrap();
        let coding = obs.preferred_coding().unwrap();
        assert_eq!(coding.code.as_deref(), Some("271649006"));
    }

    #[test]
    fn non_numeric_quantity_value_reads_as_absent() {
        let obs =
            Observation::parse(r#"{"valueQuantity": {"value": "high", "unit": "mg/dL"}}"#).unwrap();
        assert_eq!(obs.value(), None);
        assert_eq!(obs.unit(), Some("mg/dL"));
    }

    #[test]
    fn bare_subject_reference_still_yields_an_id() {
        let obs = Observation::parse(r#"{"subject": {"reference": "p42"}}"#).unwrap();
        assert_eq!(obs.patient_id(), Some("p42"));
    }

    #[test]
    fn embedded_reference_range_exposes_bounds() {
        let obs = Observation::parse(
            r#"{"referenceRange": [{"low": {"value": 3.5}, "high": {"value": 5.2}}]}"#,
        )
        .unwrap();
        assert_eq!(obs.embedded_range(), (Some(3.5), Some(5.2)));
    }

    #[test]
    fn timestamp_falls_back_to_issued() {
        let obs = Observation::parse(r#"{"issued": "2026-08-20T08:00:00Z"}"#).unwrap();
        assert_eq!(obs.timestamp(), Some("2026-08-20T08:00:00Z"));
    }
}
