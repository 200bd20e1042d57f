//! Run configuration.
//!
//! This module defines configuration that should be resolved once at process startup and then
//! passed into the pipeline. The intent is to avoid reading process-wide environment variables
//! during a run, which can lead to inconsistent behaviour in multi-threaded runtimes and test
//! harnesses.

use crate::validation::validate_cohort_id;
use crate::{PipelineError, PipelineResult};
use labwatch_types::EmailAddress;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_FHIR_BASE: &str = "FHIR_BASE";
pub const ENV_GROUP_ID: &str = "GROUP_ID";
pub const ENV_ALERT_EMAIL: &str = "ALERT_EMAIL";
pub const ENV_ACCESS_TOKEN: &str = "FHIR_ACCESS_TOKEN";
pub const ENV_POLL_INTERVAL: &str = "POLL_INTERVAL_SECS";
pub const ENV_POLL_DEADLINE: &str = "POLL_DEADLINE_SECS";
pub const ENV_CONFLICT_RETRY_WAIT: &str = "EXPORT_RETRY_WAIT_SECS";
pub const ENV_CONFLICT_RETRY_LIMIT: &str = "EXPORT_RETRY_LIMIT";
pub const ENV_THRESHOLDS_FILE: &str = "THRESHOLDS_FILE";

const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;
const DEFAULT_CONFLICT_RETRY_WAIT_SECS: u64 = 30;
const DEFAULT_CONFLICT_RETRY_LIMIT: u32 = 1;

/// Pipeline configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct RunConfig {
    fhir_base: String,
    cohort: String,
    alert_recipient: EmailAddress,
    access_token: String,
    poll_interval: Duration,
    poll_deadline: Option<Duration>,
    conflict_retry_wait: Duration,
    conflict_retry_limit: u32,
    thresholds_file: Option<PathBuf>,
}

impl RunConfig {
    /// Resolve configuration from the process environment.
    pub fn from_env() -> PipelineResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolve configuration from an arbitrary key-to-value lookup.
    ///
    /// Split out from [`RunConfig::from_env`] so resolution logic can be tested
    /// without mutating process-wide environment state.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> PipelineResult<Self> {
        let fhir_base = required(&lookup, ENV_FHIR_BASE)?
            .trim_end_matches('/')
            .to_string();
        if fhir_base.is_empty() {
            return Err(PipelineError::InvalidConfig(format!(
                "{ENV_FHIR_BASE} must be a base URL, not just slashes"
            )));
        }

        let cohort = required(&lookup, ENV_GROUP_ID)?;
        validate_cohort_id(&cohort)?;

        let alert_recipient = EmailAddress::new(required(&lookup, ENV_ALERT_EMAIL)?)
            .map_err(|e| PipelineError::InvalidConfig(format!("{ENV_ALERT_EMAIL}: {e}")))?;

        let access_token = required(&lookup, ENV_ACCESS_TOKEN)?;

        let poll_interval = Duration::from_secs(
            seconds_from_value(ENV_POLL_INTERVAL, lookup(ENV_POLL_INTERVAL))?
                .unwrap_or(DEFAULT_POLL_INTERVAL_SECS),
        );
        if poll_interval.is_zero() {
            return Err(PipelineError::InvalidConfig(format!(
                "{ENV_POLL_INTERVAL} must be at least 1 second"
            )));
        }
        let poll_deadline = seconds_from_value(ENV_POLL_DEADLINE, lookup(ENV_POLL_DEADLINE))?
            .map(Duration::from_secs);

        let conflict_retry_wait = Duration::from_secs(
            seconds_from_value(ENV_CONFLICT_RETRY_WAIT, lookup(ENV_CONFLICT_RETRY_WAIT))?
                .unwrap_or(DEFAULT_CONFLICT_RETRY_WAIT_SECS),
        );
        let conflict_retry_limit =
            match seconds_from_value(ENV_CONFLICT_RETRY_LIMIT, lookup(ENV_CONFLICT_RETRY_LIMIT))? {
                Some(raw) => u32::try_from(raw).map_err(|_| {
                    PipelineError::InvalidConfig(format!("{ENV_CONFLICT_RETRY_LIMIT} is too large"))
                })?,
                None => DEFAULT_CONFLICT_RETRY_LIMIT,
            };

        let thresholds_file = lookup(ENV_THRESHOLDS_FILE)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);

        Ok(Self {
            fhir_base,
            cohort,
            alert_recipient,
            access_token,
            poll_interval,
            poll_deadline,
            conflict_retry_wait,
            conflict_retry_limit,
            thresholds_file,
        })
    }

    /// FHIR base URL, normalised without a trailing slash.
    pub fn fhir_base(&self) -> &str {
        &self.fhir_base
    }

    /// The FHIR Group id whose members get exported.
    pub fn cohort(&self) -> &str {
        &self.cohort
    }

    pub fn alert_recipient(&self) -> &EmailAddress {
        &self.alert_recipient
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Optional upper bound on total time spent waiting between status polls.
    pub fn poll_deadline(&self) -> Option<Duration> {
        self.poll_deadline
    }

    pub fn conflict_retry_wait(&self) -> Duration {
        self.conflict_retry_wait
    }

    pub fn conflict_retry_limit(&self) -> u32 {
        self.conflict_retry_limit
    }

    /// Optional operator override for the threshold table file.
    pub fn thresholds_file(&self) -> Option<&Path> {
        self.thresholds_file.as_deref()
    }
}

fn required(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> PipelineResult<String> {
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| PipelineError::MissingEnv(key.to_string()))
}

/// Parse an optional whole-seconds value.
///
/// `None` and empty/whitespace values are treated as unset; anything else must
/// parse as a non-negative integer.
fn seconds_from_value(key: &str, value: Option<String>) -> PipelineResult<Option<u64>> {
    let value = value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty());
    match value {
        Some(raw) => raw.parse::<u64>().map(Some).map_err(|_| {
            PipelineError::InvalidConfig(format!(
                "{key} must be a whole number of seconds, got '{raw}'"
            ))
        }),
        None => Ok(None),
    }
}
