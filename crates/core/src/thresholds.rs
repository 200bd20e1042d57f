//! Reference threshold table.
//!
//! A threshold definition names the inclusive normal range for one lab or
//! vital code. The table is loaded once at startup, either the compiled-in
//! default set or an operator-supplied JSON file, and is read-only for the
//! rest of the run.
//!
//! The wire shape matches the operator file format: a JSON object keyed by
//! code, each value carrying `name`, `low`, `high` and `unit`.

use crate::{PipelineError, PipelineResult};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

/// The compiled-in default threshold set.
const BUILTIN_TABLE: &str = include_str!("../data/thresholds.json");

/// Wire entry for one code in the table file.
#[derive(Clone, Debug, Deserialize, PartialEq)]
struct ThresholdEntryWire {
    name: String,
    low: f64,
    high: f64,
    unit: String,
}

/// The reference range for one lab or vital code.
#[derive(Clone, Debug, PartialEq)]
pub struct ThresholdDefinition {
    /// The code this range applies to, e.g. `2345-7`.
    pub code: String,
    /// Display name, e.g. `"Glucose"`.
    pub name: String,
    /// Inclusive lower bound of the normal range.
    pub low: f64,
    /// Inclusive upper bound of the normal range.
    pub high: f64,
    /// Unit the bounds are expressed in; authoritative for display, never
    /// converted against the observation's own unit.
    pub unit: String,
}

/// All threshold definitions for a run, keyed by code.
#[derive(Clone, Debug, Default)]
pub struct ThresholdTable {
    by_code: HashMap<String, ThresholdDefinition>,
}

impl ThresholdTable {
    /// The compiled-in default table.
    pub fn builtin() -> PipelineResult<Self> {
        Self::parse(BUILTIN_TABLE)
            .map_err(|e| PipelineError::ThresholdTable(format!("embedded table: {e}")))
    }

    /// Load the active table: the operator override when one is set, otherwise
    /// the compiled-in default.
    pub fn load(override_path: Option<&Path>) -> PipelineResult<Self> {
        match override_path {
            Some(path) => Self::from_file(path),
            None => Self::builtin(),
        }
    }

    /// Load a table from an operator-supplied JSON file.
    pub fn from_file(path: &Path) -> PipelineResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::ThresholdTable(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::parse(&text)
    }

    /// Parse a threshold table from JSON text.
    ///
    /// Malformed JSON, an inverted range, an empty name or two keys that
    /// collide after trimming are all configuration errors: a run must not
    /// start with a table it only half understands.
    pub fn parse(json_text: &str) -> PipelineResult<Self> {
        let wire: HashMap<String, ThresholdEntryWire> =
            serde_json::from_str(json_text).map_err(|e| {
                PipelineError::ThresholdTable(format!("table is not valid JSON: {e}"))
            })?;

        let mut by_code = HashMap::with_capacity(wire.len());
        for (raw_code, entry) in wire {
            let code = raw_code.trim().to_string();
            if code.is_empty() {
                return Err(PipelineError::ThresholdTable("blank code key".into()));
            }
            if entry.name.trim().is_empty() {
                return Err(PipelineError::ThresholdTable(format!(
                    "entry {code} has a blank name"
                )));
            }
            if entry.low > entry.high {
                return Err(PipelineError::ThresholdTable(format!(
                    "range for {code} is inverted: low {} > high {}",
                    entry.low, entry.high
                )));
            }
            let definition = ThresholdDefinition {
                code: code.clone(),
                name: entry.name,
                low: entry.low,
                high: entry.high,
                unit: entry.unit,
            };
            if by_code.insert(code.clone(), definition).is_some() {
                return Err(PipelineError::ThresholdTable(format!(
                    "duplicate entry for code {code}"
                )));
            }
        }
        Ok(Self { by_code })
    }

    /// Look up the definition for a code.
    pub fn get(&self, code: &str) -> Option<&ThresholdDefinition> {
        self.by_code.get(code)
    }

    pub fn len(&self) -> usize {
        self.by_code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_code.is_empty()
    }

    /// Definitions sorted by code, for stable listings.
    pub fn sorted(&self) -> Vec<&ThresholdDefinition> {
        let mut all: Vec<&ThresholdDefinition> = self.by_code.values().collect();
        all.sort_by(|a, b| a.code.cmp(&b.code));
        all
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn builtin_table_parses_and_covers_the_core_panel() {
        let table = ThresholdTable::builtin().unwrap();
        assert!(!table.is_empty());
        let glucose = table.get("2345-7").unwrap();
        assert_eq!(glucose.name, "Glucose");
        assert_eq!(glucose.low, 70.0);
        assert_eq!(glucose.high, 140.0);
        assert_eq!(glucose.unit, "mg/dL");
        // vitals ship in the same table
        assert!(table.get("8867-4").is_some());
    }

    #[test]
    fn unknown_code_yields_none() {
        let table = ThresholdTable::builtin().unwrap();
        assert!(table.get("0000-0").is_none());
    }

    #[test]
    fn operator_file_overrides_the_builtin_set() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"9999-9": {{"name": "Custom assay", "low": 1, "high": 2, "unit": "u"}}}}"#
        )
        .unwrap();
        let table = ThresholdTable::load(Some(file.path())).unwrap();
        assert_eq!(table.len(), 1);
        assert!(table.get("9999-9").is_some());
        assert!(table.get("2345-7").is_none());
    }

    #[test]
    fn unreadable_file_is_a_configuration_error() {
        let err = ThresholdTable::from_file(Path::new("/nonexistent/thresholds.json")).unwrap_err();
        assert!(matches!(err, PipelineError::ThresholdTable(_)));
    }

    #[test]
    fn inverted_range_is_rejected() {
        let err = ThresholdTable::parse(
            r#"{"2345-7": {"name": "Glucose", "low": 140, "high": 70, "unit": "mg/dL"}}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("inverted"), "{err}");
    }

    #[test]
    fn keys_colliding_after_trim_are_rejected() {
        let err = ThresholdTable::parse(
            r#"{
                "2345-7": {"name": "Glucose", "low": 70, "high": 140, "unit": "mg/dL"},
                " 2345-7": {"name": "Glucose again", "low": 60, "high": 150, "unit": "mg/dL"}
            }"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("duplicate"), "{err}");
    }

    #[test]
    fn sorted_listing_is_stable() {
        let table = ThresholdTable::builtin().unwrap();
        let codes: Vec<&str> = table.sorted().iter().map(|d| d.code.as_str()).collect();
        let mut resorted = codes.clone();
        resorted.sort();
        assert_eq!(codes, resorted);
    }
}
