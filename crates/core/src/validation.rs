//! Input validation utilities.
//!
//! This module contains functions for validating operator-supplied inputs to ensure they meet
//! safety and correctness requirements before being used in operations.

use crate::{PipelineError, PipelineResult};

/// Validates that a cohort (FHIR Group) id is safe for embedding in a URL path.
///
/// The id is embedded into the export kick-off URL: `{base}/Group/{cohort}/$export`.
/// This function applies guardrails to prevent injection or malformed URLs:
/// - Rejects empty or whitespace-only strings
/// - Bounds the length to the FHIR id limit
/// - Restricts characters to a conservative ASCII set suitable for a path segment
///
/// # Arguments
///
/// * `cohort` - The Group id to validate.
///
/// # Errors
///
/// Returns a `PipelineError::InvalidConfig` if the id is invalid.
pub fn validate_cohort_id(cohort: &str) -> PipelineResult<()> {
    const MAX_COHORT_LEN: usize = 64;

    if cohort.trim().is_empty() {
        return Err(PipelineError::InvalidConfig(
            "cohort id cannot be empty".into(),
        ));
    }

    if cohort.len() > MAX_COHORT_LEN {
        return Err(PipelineError::InvalidConfig(format!(
            "cohort id exceeds maximum length of {} characters",
            MAX_COHORT_LEN
        )));
    }

    if !cohort.is_ascii() {
        return Err(PipelineError::InvalidConfig(
            "cohort id must contain only ASCII characters".into(),
        ));
    }

    let ok = cohort
        .bytes()
        .all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'z' | b'A'..=b'Z' | b'.' | b'-' | b'_'));

    if !ok {
        return Err(PipelineError::InvalidConfig(
            "cohort id contains invalid characters (only alphanumeric, '.', '-', '_' allowed)"
                .into(),
        ));
    }

    Ok(())
}
