use http::StatusCode;
use parley_core::HttpError;
use thiserror::Error;

/// Longest upstream error excerpt kept for logs and the caller
pub const MAX_DETAIL_CHARS: usize = 500;

/// Terminal upstream failure after retries are exhausted
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{} after {attempts} attempt(s)", outcome(.status.as_ref()))]
pub struct UpstreamFailure {
    /// Status of the last response, `None` when no response arrived
    pub status: Option<StatusCode>,
    /// Excerpt of the upstream error body or transport error
    pub detail: String,
    /// Calls made, including the first
    pub attempts: u32,
}

impl UpstreamFailure {
    pub fn new(status: Option<StatusCode>, detail: &str, attempts: u32) -> Self {
        Self {
            status,
            detail: excerpt(detail),
            attempts,
        }
    }
}

fn outcome(status: Option<&StatusCode>) -> String {
    status.map_or_else(|| "upstream unreachable".to_owned(), |status| format!("upstream returned {status}"))
}

/// Trim an error body to [`MAX_DETAIL_CHARS`] characters
pub fn excerpt(text: &str) -> String {
    let text = text.trim();
    match text.char_indices().nth(MAX_DETAIL_CHARS) {
        Some((index, _)) => text[..index].to_owned(),
        None => text.to_owned(),
    }
}

/// Errors surfaced to the caller of the chat endpoint
#[derive(Debug, Error)]
pub enum ChatError {
    /// Upstream provider failed and no local answer was possible
    #[error("{0}")]
    Upstream(UpstreamFailure),

    /// Unexpected internal error
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ChatError {
    /// Upstream status to report alongside the error, if any
    pub fn upstream_status(&self) -> Option<StatusCode> {
        match self {
            Self::Upstream(failure) => failure.status,
            Self::Internal(_) => None,
        }
    }

    /// Upstream error excerpt, if any
    pub fn detail(&self) -> Option<&str> {
        match self {
            Self::Upstream(failure) => Some(failure.detail.as_str()),
            Self::Internal(_) => None,
        }
    }
}

impl From<UpstreamFailure> for ChatError {
    fn from(failure: UpstreamFailure) -> Self {
        Self::Upstream(failure)
    }
}

impl HttpError for ChatError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_type(&self) -> &str {
        match self {
            Self::Upstream(_) => "upstream_error",
            Self::Internal(_) => "internal_error",
        }
    }

    fn client_message(&self) -> String {
        match self {
            Self::Internal(_) => "an internal error occurred".to_owned(),
            Self::Upstream(failure) => failure.to_string(),
        }
    }
}
