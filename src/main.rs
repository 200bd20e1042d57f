use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use labwatch_core::config::RunConfig;
use labwatch_core::export::{ExportJobClient, HttpTransport};
use labwatch_core::notify::ConsoleNotifier;
use labwatch_core::token::StaticTokenProvider;
use labwatch_core::{ObservationClassifier, ReportPipeline, ThresholdTable};

/// Main entry point for the labwatch daily report job
///
/// Runs the export-and-classify pipeline exactly once and exits, so it can sit
/// behind cron or any other scheduler:
/// - kicks off a group-level bulk export (Observation + Patient)
/// - polls until the NDJSON files are ready and downloads them
/// - classifies observations against the active threshold table
/// - hands the rendered report to the notifier (stdout in this binary)
///
/// # Environment Variables
/// - `FHIR_BASE`: FHIR server base URL
/// - `GROUP_ID`: FHIR Group id whose members get exported
/// - `ALERT_EMAIL`: report recipient address
/// - `FHIR_ACCESS_TOKEN`: pre-issued bearer token for the export API
/// - `POLL_INTERVAL_SECS`: pause between status polls (default: 5)
/// - `POLL_DEADLINE_SECS`: optional cap on total poll waiting
/// - `EXPORT_RETRY_WAIT_SECS`: wait before retrying a conflicting export (default: 30)
/// - `EXPORT_RETRY_LIMIT`: retries after a conflicting export (default: 1)
/// - `THRESHOLDS_FILE`: optional threshold table JSON overriding the built-in set
///
/// # Returns
/// * `Ok(())` - If the run completed and the report was handed off
/// * `Err(anyhow::Error)` - If configuration, the export protocol or delivery failed
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("labwatch_core=info".parse()?)
                .add_directive("labwatch_run=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = RunConfig::from_env()?;
    let thresholds = ThresholdTable::load(config.thresholds_file())?;
    tracing::info!("++ Loaded {} threshold definitions", thresholds.len());
    tracing::info!(
        "++ Starting report run for cohort {} against {}",
        config.cohort(),
        config.fhir_base()
    );

    let transport = HttpTransport::new()?;
    let mut client = ExportJobClient::new(transport, config.fhir_base())
        .with_poll_interval(config.poll_interval());
    if let Some(deadline) = config.poll_deadline() {
        client = client.with_poll_deadline(deadline);
    }

    let pipeline = ReportPipeline::new(
        client,
        ObservationClassifier::new(thresholds),
        Box::new(StaticTokenProvider::new(config.access_token())),
        Box::new(ConsoleNotifier),
        config,
    );

    let report = pipeline.run().await?;
    tracing::info!(
        "++ Run {} complete: {} patients, {} abnormal, {} unclassified",
        report.run_id,
        report.patient_count,
        report.totals.abnormal(),
        report.totals.unclassified
    );

    Ok(())
}
