//! Export status manifest wire model.
//!
//! A completed bulk-export job answers its status poll with a manifest whose
//! `output` array lists the NDJSON files to download. Files are routed by each
//! entry's resource type; order within the array carries no meaning.

use crate::{parse_with_path, FhirResult};
use serde::Deserialize;

/// One downloadable file in a completed export.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct ExportOutputFile {
    /// The resource type the file contains, e.g. `Patient` or `Observation`.
    #[serde(rename = "type")]
    pub resource_type: String,
    /// URL of the NDJSON file; fetched with the same bearer token.
    pub url: String,
    /// Resource count, sent by some servers; tolerated but not relied on.
    #[serde(default)]
    pub count: Option<u64>,
}

/// The manifest returned by a completed export job.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExportManifest {
    pub transaction_time: Option<String>,
    pub request: Option<String>,
    pub requires_access_token: Option<bool>,
    #[serde(default)]
    pub output: Vec<ExportOutputFile>,
    #[serde(default)]
    pub error: Vec<ExportOutputFile>,
}

impl ExportManifest {
    /// Parse a status-endpoint body into a manifest.
    pub fn parse(json_text: &str) -> FhirResult<Self> {
        parse_with_path("ExportManifest", json_text)
    }
}
