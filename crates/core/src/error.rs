#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("missing required environment variable {0}")]
    MissingEnv(String),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("invalid threshold table: {0}")]
    ThresholdTable(String),

    #[error("export kick-off rejected: {status} {body}")]
    KickOffRejected { status: u16, body: String },
    #[error("export accepted without a Content-Location header")]
    MissingContentLocation,
    #[error("an export for this cohort is already in flight")]
    ExportInFlight,
    #[error("export status poll failed: {status} {body}")]
    PollFailed { status: u16, body: String },
    #[error("export still processing after {waited_secs}s, giving up")]
    PollDeadlineExceeded { waited_secs: u64 },
    #[error("export manifest unusable: {0}")]
    Manifest(String),
    #[error("export manifest lists no Observation files")]
    NoObservationFiles,
    #[error("export manifest lists no Patient files")]
    NoPatientFiles,
    #[error("failed to fetch export file {url}: {status} {body}")]
    FileFetch {
        url: String,
        status: u16,
        body: String,
    },

    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("token provider failed: {0}")]
    Token(String),
    #[error("notification failed: {0}")]
    Notification(String),
    #[error("report rendering failed: {0}")]
    Render(String),
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;
