//! FHIR-aligned patient wire model.
//!
//! The patient export file exists to put names on classified results, so this
//! model reads only identity fields: id, name entries, gender and birth date.
//!
//! Responsibilities:
//! - Define a lenient wire model where every field is optional
//! - Assemble a display name from the first name entry
//! - Parse the birth date into a calendar date when it is well-formed
//!
//! Notes:
//! - Partial FHIR dates (`"1992"`, `"1992-03"`) are treated as absent; a
//!   guessed age is worse than no age

use crate::{parse_with_path, FhirResult};
use chrono::NaiveDate;
use serde::Deserialize;

/// A human name entry in a patient resource.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct HumanName {
    pub family: Option<String>,
    #[serde(default)]
    pub given: Vec<String>,
    pub text: Option<String>,
}

/// Lenient wire model for one patient resource.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Patient {
    pub id: Option<String>,
    #[serde(default)]
    pub name: Vec<HumanName>,
    pub gender: Option<String>,
    pub birth_date: Option<String>,
}

impl Patient {
    /// Parse one NDJSON line into a patient.
    pub fn parse(json_line: &str) -> FhirResult<Self> {
        parse_with_path("Patient", json_line)
    }

    /// Display name from the first name entry: given names then family, joined
    /// with spaces; the entry's free `text` when the structured parts are
    /// empty. `None` when nothing usable survives.
    pub fn display_name(&self) -> Option<String> {
        let entry = self.name.first()?;
        let mut parts: Vec<&str> = entry
            .given
            .iter()
            .map(|g| g.trim())
            .filter(|g| !g.is_empty())
            .collect();
        if let Some(family) = entry.family.as_deref() {
            let family = family.trim();
            if !family.is_empty() {
                parts.push(family);
            }
        }
        if !parts.is_empty() {
            return Some(parts.join(" "));
        }
        entry
            .text
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_owned)
    }

    /// The birth date as a calendar date, when present and fully specified.
    pub fn birth_date_parsed(&self) -> Option<NaiveDate> {
        let raw = self.birth_date.as_deref()?;
        NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_complete_patient_line() {
        let patient = Patient::parse(
            r#"{
                "resourceType": "Patient",
                "id": "p1",
                "name": [{"family": "Argonaut", "given": ["Jason", "Q"]}],
                "gender": "male",
                "birthDate": "1985-06-14"
            }"#,
        )
        .unwrap();
        assert_eq!(patient.id.as_deref(), Some("p1"));
        assert_eq!(patient.display_name().as_deref(), Some("Jason Q Argonaut"));
        assert_eq!(patient.gender.as_deref(), Some("male"));
        assert_eq!(
            patient.birth_date_parsed(),
            NaiveDate::from_ymd_opt(1985, 6, 14)
        );
    }

    #[test]
    fn display_name_copes_with_given_only() {
        let patient = Patient::parse(r#"{"name": [{"given": ["Ada"]}]}"#).unwrap();
        assert_eq!(patient.display_name().as_deref(), Some("Ada"));
    }

    #[test]
    fn display_name_falls_back_to_free_text() {
        let patient =
            Patient::parse(r#"{"name": [{"given": [""], "text": "Baby Girl Smith"}]}"#).unwrap();
        assert_eq!(patient.display_name().as_deref(), Some("Baby Girl Smith"));
    }

    #[test]
    fn display_name_absent_when_no_name_entries() {
        let patient = Patient::parse(r#"{"id": "p2"}"#).unwrap();
        assert_eq!(patient.display_name(), None);
    }

    #[test]
    fn partial_birth_date_reads_as_absent() {
        let patient = Patient::parse(r#"{"birthDate": "1992"}"#).unwrap();
        assert_eq!(patient.birth_date_parsed(), None);
    }

    #[test]
    fn nonsense_birth_date_reads_as_absent() {
        let patient = Patient::parse(r#"{"birthDate": "not-a-date"}"#).unwrap();
        assert_eq!(patient.birth_date_parsed(), None);
    }
}
