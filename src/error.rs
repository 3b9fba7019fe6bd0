use std::path::PathBuf;

use thiserror::Error;

/// Why a single endpoint could not be fetched.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("local file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("response is neither an M3U nor a name,url playlist")]
    NotAPlaylist,
}

impl FetchError {
    /// Only network errors are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, FetchError::Http(_))
    }
}

/// Why a stream candidate was dropped by the validator.
#[derive(Error, Debug)]
pub enum Rejection {
    #[error("HTTP status {0}")]
    Status(reqwest::StatusCode),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("not an M3U8 or TS stream")]
    UnrecognizedStreamType,

    #[error("resolution too low: {height}p")]
    LowResolution { height: u32 },

    #[error("no stream data")]
    EmptyStream,
}

impl Rejection {
    /// Short label used for metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            Rejection::Status(_) => "status",
            Rejection::Transport(e) if e.is_timeout() => "timeout",
            Rejection::Transport(_) => "transport",
            Rejection::UnrecognizedStreamType => "stream_type",
            Rejection::LowResolution { .. } => "low_resolution",
            Rejection::EmptyStream => "empty",
        }
    }
}

#[derive(Error, Debug)]
pub enum WriteError {
    #[error("failed to write {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Stage-level failures that abort a run without touching the output file.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),

    #[error("no sources available: all {endpoints} endpoints failed")]
    NoSources { endpoints: usize },

    #[error("no channels left after parsing and filtering")]
    NoChannels,

    #[error("no playable streams among {probed} candidates")]
    NoValidStreams { probed: usize },

    #[error(transparent)]
    Write(#[from] WriteError),
}
