//! FHIR wire/boundary support for the export-and-classify pipeline.
//!
//! This crate provides **lenient wire models** for the resources that cross the
//! bulk-export boundary:
//! - NDJSON `Observation` and `Patient` lines
//! - the export status manifest (completed-job file listing)
//!
//! This crate focuses on:
//! - tolerant deserialisation of partially populated resource shapes
//! - small read-side helpers (code selection, subject references, display names)
//! - NDJSON line handling
//!
//! Unlike a validating FHIR store, nothing here rejects unknown fields: upstream
//! servers attach far more to a resource than this pipeline reads, and a strict
//! schema would turn every vendor quirk into a dropped record. What counts as a
//! *usable* record is the classifier's decision, not the parser's.

pub mod manifest;
pub mod ndjson;
pub mod observation;
pub mod patient;

// Re-export wire types
pub use manifest::{ExportManifest, ExportOutputFile};
pub use observation::{CodeableConcept, Coding, Observation, Quantity, Reference};
pub use patient::{HumanName, Patient};

/// Errors returned by the `fhir` boundary crate.
#[derive(Debug, thiserror::Error)]
pub enum FhirError {
    #[error("invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("translation error: {0}")]
    Translation(String),
}

/// Type alias for Results that can fail with a [`FhirError`].
pub type FhirResult<T> = Result<T, FhirError>;

/// Deserialise JSON text, surfacing the path to the failing field.
///
/// Unparseable text maps to [`FhirError::InvalidJson`]. Parseable text that
/// does not match the wire schema maps to [`FhirError::Translation`] with a
/// best-effort "path" (e.g. `output.1.url`) to the failing field, so protocol
/// problems can be diagnosed from logs alone.
pub(crate) fn parse_with_path<'de, T>(resource: &str, json_text: &'de str) -> FhirResult<T>
where
    T: serde::Deserialize<'de>,
{
    let mut deserializer = serde_json::Deserializer::from_str(json_text);
    serde_path_to_error::deserialize(&mut deserializer).map_err(|err| {
        let path = err.path().to_string();
        let source = err.into_inner();
        if matches!(
            source.classify(),
            serde_json::error::Category::Syntax | serde_json::error::Category::Eof
        ) {
            return FhirError::InvalidJson(source);
        }
        let path = if path.is_empty() || path == "." {
            "<root>".to_string()
        } else {
            path
        };
        FhirError::Translation(format!("{resource} schema mismatch at {path}: {source}"))
    })
}
