//! Patient identity index.
//!
//! Builds an id-to-identity map from an NDJSON patient export, once per run.
//! The index exists to put names on classified results; it never fails a run,
//! the worst case is an entry degrading to its raw id.

use chrono::{Datelike, NaiveDate};
use fhir::{ndjson, Patient};
use std::collections::HashMap;

/// Display identity for one patient.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PatientIdentity {
    pub id: String,
    /// Assembled display name; the raw id when the resource had no usable name.
    pub display_name: String,
    pub gender: Option<String>,
    /// Whole years at the run date; absent when the birth date is missing or
    /// not fully specified.
    pub age_years: Option<u32>,
}

/// id-to-identity map built from the patient export.
#[derive(Clone, Debug, Default)]
pub struct PatientIndex {
    by_id: HashMap<String, PatientIdentity>,
}

impl PatientIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ingest one NDJSON patient document, adding an entry per usable line.
    ///
    /// `today` anchors the age computation. Malformed lines and lines without
    /// an id are skipped with a diagnostic. A repeated id replaces the earlier
    /// entry.
    pub fn ingest_ndjson(&mut self, ndjson_text: &str, today: NaiveDate) {
        for (line_no, line) in ndjson::lines(ndjson_text) {
            let patient = match Patient::parse(line) {
                Ok(p) => p,
                Err(err) => {
                    tracing::warn!("skipping malformed patient line {line_no}: {err}");
                    continue;
                }
            };
            let Some(id) = patient
                .id
                .as_deref()
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(str::to_owned)
            else {
                tracing::warn!("skipping patient line {line_no}: no id");
                continue;
            };
            let display_name = patient.display_name().unwrap_or_else(|| id.clone());
            let age_years = patient
                .birth_date_parsed()
                .map(|birth| age_in_years(birth, today));
            self.insert(PatientIdentity {
                id,
                display_name,
                gender: patient.gender.clone(),
                age_years,
            });
        }
    }

    /// Add one identity, replacing any previous entry for the same id.
    pub fn insert(&mut self, identity: PatientIdentity) {
        self.by_id.insert(identity.id.clone(), identity);
    }

    pub fn get(&self, id: &str) -> Option<&PatientIdentity> {
        self.by_id.get(id)
    }

    /// The display label for an id: the indexed name, or the raw id itself
    /// when the patient is unknown.
    pub fn display_name<'a>(&'a self, id: &'a str) -> &'a str {
        self.by_id
            .get(id)
            .map(|identity| identity.display_name.as_str())
            .unwrap_or(id)
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Identities sorted by id, for stable listings.
    pub fn sorted(&self) -> Vec<&PatientIdentity> {
        let mut all: Vec<&PatientIdentity> = self.by_id.values().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }
}

/// Whole years between `birth` and `today`, corrected for whether the
/// birthday has happened yet this year.
pub fn age_in_years(birth: NaiveDate, today: NaiveDate) -> u32 {
    let mut age = today.year() - birth.year();
    if (today.month(), today.day()) < (birth.month(), birth.day()) {
        age -= 1;
    }
    age.max(0) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 8, 24).unwrap()
    }

    #[test]
    fn test_ingest_builds_identities() {
        let mut index = PatientIndex::new();
        index.ingest_ndjson(
            concat!(
                r#"{"id": "p1", "name": [{"family": "Argonaut", "given": ["Jason"]}], "gender": "male", "birthDate": "1985-06-14"}"#,
                "\n",
                r#"{"id": "p2", "name": [{"family": "Loom", "given": ["Ada"]}], "gender": "female"}"#,
                "\n",
            ),
            today(),
        );
        assert_eq!(index.len(), 2);
        let p1 = index.get("p1").unwrap();
        assert_eq!(p1.display_name, "Jason Argonaut");
        assert_eq!(p1.gender.as_deref(), Some("male"));
        assert_eq!(p1.age_years, Some(41));
        assert_eq!(index.get("p2").unwrap().age_years, None);
    }

    #[test]
    fn test_nameless_patient_uses_raw_id_as_display_name() {
        let mut index = PatientIndex::new();
        index.ingest_ndjson(r#"{"id": "P1"}"#, today());
        assert_eq!(index.display_name("P1"), "P1");
        assert_eq!(index.get("P1").unwrap().display_name, "P1");
    }

    #[test]
    fn test_unknown_id_displays_as_itself() {
        let index = PatientIndex::new();
        assert_eq!(index.display_name("ghost"), "ghost");
    }

    #[test]
    fn test_malformed_and_idless_lines_are_skipped() {
        let mut index = PatientIndex::new();
        index.ingest_ndjson(
            "{broken\n{\"name\": [{\"family\": \"NoId\"}]}\n{\"id\": \"p3\"}\n",
            today(),
        );
        assert_eq!(index.len(), 1);
        assert!(index.get("p3").is_some());
    }

    #[test]
    fn test_repeated_id_replaces_the_earlier_entry() {
        let mut index = PatientIndex::new();
        index.ingest_ndjson(
            concat!(
                r#"{"id": "p1", "name": [{"family": "First"}]}"#,
                "\n",
                r#"{"id": "p1", "name": [{"family": "Second"}]}"#,
                "\n",
            ),
            today(),
        );
        assert_eq!(index.len(), 1);
        assert_eq!(index.display_name("p1"), "Second");
    }

    #[test]
    fn test_age_counts_whole_years_only() {
        let birth = NaiveDate::from_ymd_opt(1990, 8, 25).unwrap();
        // birthday is tomorrow relative to today()
        assert_eq!(age_in_years(birth, today()), 35);
        let birth = NaiveDate::from_ymd_opt(1990, 8, 24).unwrap();
        assert_eq!(age_in_years(birth, today()), 36);
        let birth = NaiveDate::from_ymd_opt(1990, 8, 23).unwrap();
        assert_eq!(age_in_years(birth, today()), 36);
    }

    #[test]
    fn test_future_birth_date_clamps_to_zero() {
        let birth = NaiveDate::from_ymd_opt(2027, 1, 1).unwrap();
        assert_eq!(age_in_years(birth, today()), 0);
    }

    #[test]
    fn test_sorted_listing_orders_by_id() {
        let mut index = PatientIndex::new();
        index.ingest_ndjson("{\"id\": \"pb\"}\n{\"id\": \"pa\"}\n", today());
        let ids: Vec<&str> = index.sorted().iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["pa", "pb"]);
    }
}
