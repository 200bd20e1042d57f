//! Asynchronous bulk-export client.
//!
//! Drives the provider's fire-and-poll export protocol: kick the job off, poll
//! the status URL until the NDJSON files are ready, then download them.
//!
//! Responsibilities:
//! - Build the kick-off URL (both resource types, category-filtered observations)
//! - Interpret kick-off, poll and download responses by status code
//! - Pace the poll loop and enforce the optional poll deadline
//!
//! Notes:
//! - The provider pushes nothing; a fixed-interval poll is the only strategy
//! - Status codes are the authority at every step, response bodies are carried
//!   for diagnostics (with one exception: the duplicate-export conflict, which
//!   some servers report only as prose in a 4xx body)

use crate::{PipelineError, PipelineResult};
use async_trait::async_trait;
use fhir::{ExportManifest, ExportOutputFile};
use std::sync::Arc;
use std::time::Duration;

/// Accept header value for every export call.
const ACCEPT_FHIR_JSON: &str = "application/fhir+json";

/// Marker some servers put in a kick-off rejection body when this client
/// already has an export running.
const DUPLICATE_EXPORT_MARKER: &str = "same Client";

/// Default pause between status polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Per-request timeout for export calls. File downloads can be tens of
/// megabytes of NDJSON, so this is deliberately generous.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// Transport seam
// ============================================================================

/// A minimal view of one wire exchange: everything the export state machine
/// reads from a response.
#[derive(Clone, Debug)]
pub struct WireResponse {
    pub status: u16,
    pub content_location: Option<String>,
    pub body: String,
}

/// Transport seam for the export protocol.
///
/// Production wires [`HttpTransport`]; tests script exchanges without a server.
#[async_trait]
pub trait ExportTransport: Send + Sync {
    /// GET with `Accept: application/fhir+json`, `Prefer: respond-async` and
    /// bearer auth: the export kick-off request.
    async fn kick_off(&self, url: &str, token: &str) -> PipelineResult<WireResponse>;

    /// GET with `Accept: application/fhir+json` and bearer auth: one status poll.
    async fn poll_status(&self, url: &str, token: &str) -> PipelineResult<WireResponse>;

    /// GET with bearer auth: one NDJSON file download.
    async fn fetch_body(&self, url: &str, token: &str) -> PipelineResult<WireResponse>;
}

/// Cooperative sleep seam so tests can observe waits instead of serving them.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// The production sleeper; suspends on the tokio timer.
#[derive(Clone, Copy, Debug, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

// ============================================================================
// HTTP transport
// ============================================================================

/// [`ExportTransport`] over a shared `reqwest` client.
#[derive(Clone, Debug)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Build a transport with connection and request timeouts applied.
    pub fn new() -> PipelineResult<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self { client })
    }

    async fn capture(response: reqwest::Response) -> PipelineResult<WireResponse> {
        let status = response.status().as_u16();
        let content_location = response
            .headers()
            .get(reqwest::header::CONTENT_LOCATION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);
        let body = response.text().await?;
        Ok(WireResponse {
            status,
            content_location,
            body,
        })
    }
}

#[async_trait]
impl ExportTransport for HttpTransport {
    async fn kick_off(&self, url: &str, token: &str) -> PipelineResult<WireResponse> {
        let response = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, ACCEPT_FHIR_JSON)
            .header("Prefer", "respond-async")
            .bearer_auth(token)
            .send()
            .await?;
        Self::capture(response).await
    }

    async fn poll_status(&self, url: &str, token: &str) -> PipelineResult<WireResponse> {
        let response = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, ACCEPT_FHIR_JSON)
            .bearer_auth(token)
            .send()
            .await?;
        Self::capture(response).await
    }

    async fn fetch_body(&self, url: &str, token: &str) -> PipelineResult<WireResponse> {
        let response = self.client.get(url).bearer_auth(token).send().await?;
        Self::capture(response).await
    }
}

// ============================================================================
// Export job client
// ============================================================================

/// Handle to an accepted export job: the status URL to poll.
///
/// Created by [`ExportJobClient::submit`], consumed by [`ExportJobClient::poll`],
/// worthless after the job reaches a terminal state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExportJobHandle {
    status_url: String,
}

impl ExportJobHandle {
    pub fn status_url(&self) -> &str {
        &self.status_url
    }
}

/// Drives one export job end to end over an [`ExportTransport`].
pub struct ExportJobClient<T> {
    transport: T,
    base_url: String,
    poll_interval: Duration,
    poll_deadline: Option<Duration>,
    sleeper: Arc<dyn Sleeper>,
}

impl<T: ExportTransport> ExportJobClient<T> {
    /// Create a client against a FHIR base URL.
    pub fn new(transport: T, base_url: impl Into<String>) -> Self {
        Self {
            transport,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            poll_deadline: None,
            sleeper: Arc::new(TokioSleeper),
        }
    }

    /// Override the pause between status polls.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Bound the total time spent waiting between polls. Unset means the poll
    /// loop runs until the server answers something other than 202.
    pub fn with_poll_deadline(mut self, deadline: Duration) -> Self {
        self.poll_deadline = Some(deadline);
        self
    }

    /// Replace the sleeper; tests use this to observe waits instead of serving
    /// them.
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// The kick-off URL for a cohort: both resource types, with observations
    /// restricted to the laboratory and vital-signs categories server-side.
    fn export_url(&self, cohort: &str) -> String {
        format!(
            "{}/Group/{}/$export\
             ?_type=Observation&_type=Patient\
             &_typeFilter=Observation%3Fcategory%3Dlaboratory\
             &_typeFilter=Observation%3Fcategory%3Dvital-signs",
            self.base_url, cohort
        )
    }

    /// Submit the export request.
    ///
    /// Acceptance is exactly a 202 carrying a `Content-Location` header; a 202
    /// without the header is a failure, not a success with a quirk. A response
    /// recognisable as a duplicate-concurrent-export conflict maps to
    /// [`PipelineError::ExportInFlight`] so the caller can wait and retry.
    pub async fn submit(&self, cohort: &str, token: &str) -> PipelineResult<ExportJobHandle> {
        let url = self.export_url(cohort);
        tracing::info!("kicking off export for cohort {cohort}");
        let response = self.transport.kick_off(&url, token).await?;

        if response.status != 202 {
            if response.status == 409 || response.body.contains(DUPLICATE_EXPORT_MARKER) {
                return Err(PipelineError::ExportInFlight);
            }
            return Err(PipelineError::KickOffRejected {
                status: response.status,
                body: response.body,
            });
        }

        let status_url = response
            .content_location
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .ok_or(PipelineError::MissingContentLocation)?;

        tracing::info!("export accepted, status URL {status_url}");
        Ok(ExportJobHandle { status_url })
    }

    /// Poll the status URL until the export reaches a terminal state.
    ///
    /// 202 means still processing: sleep one interval and ask again. 200 means
    /// done: the body is the manifest and must list at least one output file.
    /// Any other status fails the job immediately, body attached as context.
    pub async fn poll(
        &self,
        handle: &ExportJobHandle,
        token: &str,
    ) -> PipelineResult<Vec<ExportOutputFile>> {
        let mut waited = Duration::ZERO;
        loop {
            let response = self.transport.poll_status(handle.status_url(), token).await?;
            match response.status {
                202 => {
                    if let Some(deadline) = self.poll_deadline {
                        if waited + self.poll_interval > deadline {
                            return Err(PipelineError::PollDeadlineExceeded {
                                waited_secs: waited.as_secs(),
                            });
                        }
                    }
                    tracing::info!(
                        "export still processing, next poll in {}s",
                        self.poll_interval.as_secs()
                    );
                    self.sleeper.sleep(self.poll_interval).await;
                    waited += self.poll_interval;
                }
                200 => {
                    let manifest = ExportManifest::parse(&response.body)
                        .map_err(|err| PipelineError::Manifest(err.to_string()))?;
                    if manifest.output.is_empty() {
                        return Err(PipelineError::Manifest(
                            "completed export lists no output files".into(),
                        ));
                    }
                    tracing::info!("export complete, {} output files", manifest.output.len());
                    return Ok(manifest.output);
                }
                status => {
                    return Err(PipelineError::PollFailed {
                        status,
                        body: response.body,
                    });
                }
            }
        }
    }

    /// Download one NDJSON file body.
    ///
    /// Whether a failure here is fatal belongs to the caller: the pipeline
    /// aborts on a lost patient file but only skips a lost observation file.
    pub async fn fetch_file(&self, url: &str, token: &str) -> PipelineResult<String> {
        let response = self.transport.fetch_body(url, token).await?;
        if !(200..300).contains(&response.status) {
            return Err(PipelineError::FileFetch {
                url: url.to_string(),
                status: response.status,
                body: response.body,
            });
        }
        Ok(response.body)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Pops pre-scripted responses in order, recording each requested URL.
    struct ScriptedTransport {
        responses: Mutex<VecDeque<WireResponse>>,
        requests: Mutex<Vec<String>>,
    }

    impl ScriptedTransport {
        fn new(responses: Vec<WireResponse>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn next(&self, url: &str) -> PipelineResult<WireResponse> {
            self.requests.lock().unwrap().push(url.to_string());
            Ok(self
                .responses
                .lock()
                .unwrap()
                .pop_front()
                .expect("script exhausted"))
        }

        fn request_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl ExportTransport for ScriptedTransport {
        async fn kick_off(&self, url: &str, _token: &str) -> PipelineResult<WireResponse> {
            self.next(url)
        }

        async fn poll_status(&self, url: &str, _token: &str) -> PipelineResult<WireResponse> {
            self.next(url)
        }

        async fn fetch_body(&self, url: &str, _token: &str) -> PipelineResult<WireResponse> {
            self.next(url)
        }
    }

    /// Records requested sleeps without actually sleeping.
    #[derive(Default)]
    struct RecordingSleeper {
        slept: Mutex<Vec<Duration>>,
    }

    #[async_trait]
    impl Sleeper for RecordingSleeper {
        async fn sleep(&self, duration: Duration) {
            self.slept.lock().unwrap().push(duration);
        }
    }

    fn accepted() -> WireResponse {
        WireResponse {
            status: 202,
            content_location: Some("https://fhir.example.org/status/job-1".into()),
            body: String::new(),
        }
    }

    fn in_progress() -> WireResponse {
        WireResponse {
            status: 202,
            content_location: None,
            body: String::new(),
        }
    }

    fn manifest_ready() -> WireResponse {
        WireResponse {
            status: 200,
            content_location: None,
            body: r#"{"output": [
                {"type": "Patient", "url": "https://fhir.example.org/files/p"},
                {"type": "Observation", "url": "https://fhir.example.org/files/o"}
            ]}"#
            .into(),
        }
    }

    fn client(transport: ScriptedTransport) -> ExportJobClient<ScriptedTransport> {
        ExportJobClient::new(transport, "https://fhir.example.org/api/FHIR/R4/")
            .with_sleeper(Arc::new(RecordingSleeper::default()))
    }

    #[tokio::test]
    async fn submit_returns_the_status_url() {
        let client = client(ScriptedTransport::new(vec![accepted()]));
        let handle = client.submit("ward-7", "tok").await.unwrap();
        assert_eq!(handle.status_url(), "https://fhir.example.org/status/job-1");
    }

    #[tokio::test]
    async fn submit_builds_the_filtered_export_url() {
        let transport = ScriptedTransport::new(vec![accepted()]);
        let client = ExportJobClient::new(transport, "https://fhir.example.org/api/FHIR/R4/");
        client.submit("ward-7", "tok").await.unwrap();
        let requests = client.transport.requests.lock().unwrap();
        let url = &requests[0];
        assert!(url.starts_with("https://fhir.example.org/api/FHIR/R4/Group/ward-7/$export?"));
        assert!(url.contains("_type=Observation"));
        assert!(url.contains("_type=Patient"));
        assert!(url.contains("_typeFilter=Observation%3Fcategory%3Dlaboratory"));
        assert!(url.contains("_typeFilter=Observation%3Fcategory%3Dvital-signs"));
    }

    #[tokio::test]
    async fn submit_without_content_location_fails() {
        let client = client(ScriptedTransport::new(vec![in_progress()]));
        let err = client.submit("ward-7", "tok").await.unwrap_err();
        assert!(matches!(err, PipelineError::MissingContentLocation));
    }

    #[tokio::test]
    async fn submit_rejection_carries_status_and_body() {
        let client = client(ScriptedTransport::new(vec![WireResponse {
            status: 400,
            content_location: None,
            body: "bad request".into(),
        }]));
        let err = client.submit("ward-7", "tok").await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::KickOffRejected { status: 400, ref body } if body == "bad request"
        ));
    }

    #[tokio::test]
    async fn submit_recognises_conflict_status() {
        let client = client(ScriptedTransport::new(vec![WireResponse {
            status: 409,
            content_location: None,
            body: String::new(),
        }]));
        let err = client.submit("ward-7", "tok").await.unwrap_err();
        assert!(matches!(err, PipelineError::ExportInFlight));
    }

    #[tokio::test]
    async fn submit_recognises_conflict_prose_in_other_statuses() {
        let client = client(ScriptedTransport::new(vec![WireResponse {
            status: 429,
            content_location: None,
            body: "Another request for this same Client and Group is in progress".into(),
        }]));
        let err = client.submit("ward-7", "tok").await.unwrap_err();
        assert!(matches!(err, PipelineError::ExportInFlight));
    }

    #[tokio::test]
    async fn poll_sleeps_through_in_progress_then_returns_files() {
        let transport =
            ScriptedTransport::new(vec![in_progress(), in_progress(), manifest_ready()]);
        let sleeper = Arc::new(RecordingSleeper::default());
        let client = ExportJobClient::new(transport, "https://fhir.example.org")
            .with_poll_interval(Duration::from_secs(5))
            .with_sleeper(sleeper.clone());
        let handle = ExportJobHandle {
            status_url: "https://fhir.example.org/status/job-1".into(),
        };

        let files = client.poll(&handle, "tok").await.unwrap();

        assert_eq!(files.len(), 2);
        assert_eq!(files[0].resource_type, "Patient");
        assert_eq!(client.transport.request_count(), 3);
        let slept = sleeper.slept.lock().unwrap();
        assert_eq!(*slept, vec![Duration::from_secs(5), Duration::from_secs(5)]);
    }

    #[tokio::test]
    async fn poll_gives_up_at_the_deadline_without_sleeping_past_it() {
        let transport = ScriptedTransport::new(vec![in_progress(), in_progress()]);
        let sleeper = Arc::new(RecordingSleeper::default());
        let client = ExportJobClient::new(transport, "https://fhir.example.org")
            .with_poll_interval(Duration::from_secs(5))
            .with_poll_deadline(Duration::from_secs(8))
            .with_sleeper(sleeper.clone());
        let handle = ExportJobHandle {
            status_url: "https://fhir.example.org/status/job-1".into(),
        };

        let err = client.poll(&handle, "tok").await.unwrap_err();

        assert!(matches!(
            err,
            PipelineError::PollDeadlineExceeded { waited_secs: 5 }
        ));
        // one sleep fits inside 8s, a second would overshoot
        assert_eq!(client.transport.request_count(), 2);
        assert_eq!(sleeper.slept.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn poll_fails_fast_on_unexpected_status() {
        let client = client(ScriptedTransport::new(vec![WireResponse {
            status: 500,
            content_location: None,
            body: "boom".into(),
        }]));
        let handle = ExportJobHandle {
            status_url: "https://fhir.example.org/status/job-1".into(),
        };
        let err = client.poll(&handle, "tok").await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::PollFailed { status: 500, ref body } if body == "boom"
        ));
    }

    #[tokio::test]
    async fn poll_rejects_an_empty_manifest() {
        let client = client(ScriptedTransport::new(vec![WireResponse {
            status: 200,
            content_location: None,
            body: r#"{"output": []}"#.into(),
        }]));
        let handle = ExportJobHandle {
            status_url: "https://fhir.example.org/status/job-1".into(),
        };
        let err = client.poll(&handle, "tok").await.unwrap_err();
        assert!(matches!(err, PipelineError::Manifest(_)));
    }

    #[tokio::test]
    async fn poll_rejects_an_unparseable_manifest() {
        let client = client(ScriptedTransport::new(vec![WireResponse {
            status: 200,
            content_location: None,
            body: "not json".into(),
        }]));
        let handle = ExportJobHandle {
            status_url: "https://fhir.example.org/status/job-1".into(),
        };
        let err = client.poll(&handle, "tok").await.unwrap_err();
        assert!(matches!(err, PipelineError::Manifest(_)));
    }

    #[tokio::test]
    async fn fetch_file_returns_the_body_on_success() {
        let client = client(ScriptedTransport::new(vec![WireResponse {
            status: 200,
            content_location: None,
            body: "{\"resourceType\":\"Observation\"}\n".into(),
        }]));
        let body = client
            .fetch_file("https://fhir.example.org/files/o", "tok")
            .await
            .unwrap();
        assert!(body.contains("Observation"));
    }

    #[tokio::test]
    async fn fetch_file_surfaces_http_failures() {
        let client = client(ScriptedTransport::new(vec![WireResponse {
            status: 404,
            content_location: None,
            body: "gone".into(),
        }]));
        let err = client
            .fetch_file("https://fhir.example.org/files/o", "tok")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::FileFetch { status: 404, .. }
        ));
    }
}
