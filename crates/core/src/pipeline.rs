//! Run orchestration.
//!
//! Sequences one report run end to end: token, export kick-off (with a
//! bounded wait-and-retry on the duplicate-export conflict), status polling,
//! manifest routing by resource type, patient index, observation
//! classification, report assembly, notification.
//!
//! Notes:
//! - Each run is a fresh computation; nothing carries across invocations
//! - Identities load before observations: losing a patient file aborts the
//!   run, losing an observation file only skips that file
//! - A manifest without both resource types fails before any download

use crate::classify::{ClassifiedBatch, ObservationClassifier};
use crate::config::RunConfig;
use crate::export::{ExportJobClient, ExportJobHandle, ExportTransport, Sleeper, TokioSleeper};
use crate::notify::Notifier;
use crate::patients::PatientIndex;
use crate::report::RunReport;
use crate::token::TokenProvider;
use crate::{PipelineError, PipelineResult};
use chrono::Utc;
use fhir::ExportOutputFile;
use std::sync::Arc;
use uuid::Uuid;

/// Manifest entry type carrying patient identities.
const PATIENT_TYPE: &str = "Patient";

/// Manifest entry type carrying observations.
const OBSERVATION_TYPE: &str = "Observation";

/// One-shot report pipeline over injected collaborators.
pub struct ReportPipeline<T> {
    client: ExportJobClient<T>,
    classifier: ObservationClassifier,
    tokens: Box<dyn TokenProvider>,
    notifier: Box<dyn Notifier>,
    sleeper: Arc<dyn Sleeper>,
    config: RunConfig,
}

impl<T: ExportTransport> ReportPipeline<T> {
    pub fn new(
        client: ExportJobClient<T>,
        classifier: ObservationClassifier,
        tokens: Box<dyn TokenProvider>,
        notifier: Box<dyn Notifier>,
        config: RunConfig,
    ) -> Self {
        Self {
            client,
            classifier,
            tokens,
            notifier,
            sleeper: Arc::new(TokioSleeper),
            config,
        }
    }

    /// Replace the sleeper used for the conflict-retry wait; tests use this.
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Execute one full run and hand the rendered report to the notifier.
    ///
    /// Returns the assembled [`RunReport`] so callers can log or reuse the
    /// computed outcome independently of delivery.
    pub async fn run(&self) -> PipelineResult<RunReport> {
        let run_id = Uuid::new_v4();
        tracing::info!("starting report run {run_id}");

        let token = self.tokens.access_token().await?;
        let handle = self.submit_with_conflict_retry(&token).await?;
        let files = self.client.poll(&handle, &token).await?;

        let (patient_files, observation_files) = route_manifest(&files)?;

        let mut index = PatientIndex::new();
        let today = Utc::now().date_naive();
        for file in &patient_files {
            let body = self.client.fetch_file(&file.url, &token).await?;
            index.ingest_ndjson(&body, today);
        }
        tracing::info!("patient index built with {} identities", index.len());

        let mut batch = ClassifiedBatch::default();
        for file in &observation_files {
            let body = match self.client.fetch_file(&file.url, &token).await {
                Ok(body) => body,
                Err(err) => {
                    tracing::warn!("skipping observation file {}: {err}", file.url);
                    continue;
                }
            };
            batch.absorb(self.classifier.classify(&body, &index));
        }
        tracing::info!(
            "classified {} observations, {} lines skipped",
            batch.stats.emitted,
            batch.stats.skipped()
        );

        let report = RunReport::build(run_id, Utc::now(), batch.results, batch.stats, index.len());

        let body = report.render()?;
        let subject = report.subject();
        if let Err(err) = self
            .notifier
            .send(self.config.alert_recipient(), &subject, body.as_str())
            .await
        {
            // The classification outcome above is sound; only delivery failed.
            tracing::error!("report computed but notification failed: {err}");
            return Err(err);
        }
        tracing::info!(
            "report {run_id} sent to {}",
            self.config.alert_recipient()
        );

        Ok(report)
    }

    /// Kick off the export, absorbing the duplicate-export conflict by
    /// waiting and retrying a bounded number of times.
    async fn submit_with_conflict_retry(&self, token: &str) -> PipelineResult<ExportJobHandle> {
        let mut attempt = 0u32;
        loop {
            match self.client.submit(self.config.cohort(), token).await {
                Err(PipelineError::ExportInFlight)
                    if attempt < self.config.conflict_retry_limit() =>
                {
                    attempt += 1;
                    tracing::warn!(
                        "export already in flight, retrying in {}s (attempt {attempt} of {})",
                        self.config.conflict_retry_wait().as_secs(),
                        self.config.conflict_retry_limit()
                    );
                    self.sleeper.sleep(self.config.conflict_retry_wait()).await;
                }
                other => return other,
            }
        }
    }
}

/// Split the manifest by resource type, failing before any download when
/// either side is missing: zero observation files means nothing to classify,
/// zero patient files means nothing to report against.
fn route_manifest(
    files: &[ExportOutputFile],
) -> PipelineResult<(Vec<&ExportOutputFile>, Vec<&ExportOutputFile>)> {
    let patient_files: Vec<&ExportOutputFile> = files
        .iter()
        .filter(|f| f.resource_type == PATIENT_TYPE)
        .collect();
    let observation_files: Vec<&ExportOutputFile> = files
        .iter()
        .filter(|f| f.resource_type == OBSERVATION_TYPE)
        .collect();

    if observation_files.is_empty() {
        return Err(PipelineError::NoObservationFiles);
    }
    if patient_files.is_empty() {
        return Err(PipelineError::NoPatientFiles);
    }
    Ok((patient_files, observation_files))
}

// ============================================================================
// Tests
// ============================================================================
